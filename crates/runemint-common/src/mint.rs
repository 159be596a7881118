//! Persistent mint records: keysets, spent proofs and reserve UTXOs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use runemint_protocol::{Amount, AssetId, CurrencyUnit, Id, Keys, PublicKey, Secret, State};

/// A keyset as persisted by the mint.
///
/// Public keys are stored in the clear; each private scalar is stored
/// AES-256-CBC encrypted as `iv_hex:ciphertext_hex` with a per-row random IV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredKeyset {
    /// Keyset id derived from the public-key map
    pub id: Id,
    /// Unit the keyset denominates
    pub unit: CurrencyUnit,
    /// Backing asset
    pub asset_id: AssetId,
    /// Whether the keyset signs new outputs
    pub active: bool,
    /// Denomination to public key
    pub public_keys: Keys,
    /// Denomination to encrypted private scalar
    pub encrypted_keys: BTreeMap<Amount, String>,
    /// Input fee in parts-per-thousand per proof
    pub input_fee_ppk: u64,
    /// Optional hard expiry, Unix seconds
    pub final_expiry: Option<u64>,
    /// Creation time, Unix seconds
    pub created_at: u64,
}

impl StoredKeyset {
    /// The invariant every stored keyset must satisfy: the private map keys
    /// the same denominations as the public map.
    pub fn maps_are_aligned(&self) -> bool {
        self.public_keys.len() == self.encrypted_keys.len()
            && self
                .public_keys
                .iter()
                .all(|(amount, _)| self.encrypted_keys.contains_key(amount))
    }
}

/// A spent-proof row, keyed by `Y`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpentProof {
    /// `Y = hash_to_curve(secret)`
    pub y: PublicKey,
    /// Keyset the proof was signed under
    pub keyset_id: Id,
    /// Denomination
    pub amount: Amount,
    /// The revealed secret, kept for audit
    pub secret: Secret,
    /// The unblinded signature point
    pub c: PublicKey,
    /// Stored witness JSON, if the proof carried one
    pub witness: Option<String>,
    /// Always [`State::Spent`] for stored rows
    pub state: State,
    /// When the proof was spent, Unix seconds
    pub spent_at: u64,
    /// The swap or melt transaction that consumed the proof
    pub transaction_id: String,
}

/// A mint-owned on-chain output carrying reserve runes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveUtxo {
    /// Transaction id
    pub txid: String,
    /// Output index
    pub vout: u32,
    /// Asset carried by the output
    pub asset_id: AssetId,
    /// Rune amount in the output
    pub amount: u128,
    /// Address holding the output
    pub address: String,
    /// Bitcoin value of the output
    pub value_sats: u64,
    /// Whether the output was consumed by a withdrawal
    pub spent: bool,
    /// Txid of the withdrawal that consumed the output
    pub spent_in_txid: Option<String>,
    /// When the row was created, Unix seconds
    pub created_at: u64,
}

impl ReserveUtxo {
    /// The `txid:vout` key used for spent-set exclusion.
    pub fn outpoint_key(&self) -> String {
        outpoint_key(&self.txid, self.vout)
    }
}

/// Render a `txid:vout` outpoint key.
pub fn outpoint_key(txid: &str, vout: u32) -> String {
    format!("{txid}:{vout}")
}
