//! The mint's on-chain wallet.
//!
//! Holds the two keys every withdrawal needs: a segwit key (fee input and
//! change) at `m/84'/1'/0'/0/0` and a taproot key (rune custody) at
//! `m/86'/1'/0'/0/0`, both derived from the mint seed. The taproot address
//! doubles as the deposit address for every mint quote.

use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use bitcoin::address::KnownHrp;
use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::key::Keypair;
use bitcoin::secp256k1::SecretKey;
use bitcoin::{Address, AddressType, CompressedPublicKey, Network};

use runemint_common::chain::{self, with_retry, ChainView, DepositAddressProvider};
use runemint_common::Error;
use runemint_protocol::{Amount, AssetId, SECP256K1};

use crate::psbt::{build_withdrawal_psbt, sign_withdrawal_psbt, WithdrawalParams, WITHDRAWAL_FEE_SATS};
use crate::select::{select_fee_utxo, select_rune_utxos};

const SEGWIT_PATH: &str = "84'/1'/0'/0/0";
const TAPROOT_PATH: &str = "86'/1'/0'/0/0";

/// Outcome of a broadcast withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalReceipt {
    /// The verified txid
    pub txid: String,
    /// Sats paid to the miner
    pub fee_paid: u64,
    /// Reserve outpoints consumed, as `(txid, vout)`
    pub spent_outpoints: Vec<(String, u32)>,
}

/// Seed-derived keys and addresses for on-chain settlement.
pub struct MintWallet {
    network: Network,
    segwit_key: SecretKey,
    taproot_keypair: Keypair,
    segwit_address: Address,
    taproot_address: Address,
}

impl std::fmt::Debug for MintWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MintWallet")
            .field("network", &self.network)
            .field("segwit_address", &self.segwit_address)
            .field("taproot_address", &self.taproot_address)
            .finish_non_exhaustive()
    }
}

fn known_hrp(network: Network) -> KnownHrp {
    match network {
        Network::Bitcoin => KnownHrp::Mainnet,
        Network::Regtest => KnownHrp::Regtest,
        _ => KnownHrp::Testnets,
    }
}

impl MintWallet {
    /// Derive the wallet from the 32-byte mint seed.
    pub fn from_seed(seed: &[u8; 32], network: Network) -> Result<Self, Error> {
        let xpriv = Xpriv::new_master(network, seed)
            .map_err(|e| Error::Internal(format!("master key: {e}")))?;

        let segwit_path = DerivationPath::from_str(SEGWIT_PATH)
            .map_err(|e| Error::Internal(format!("derivation path: {e}")))?;
        let taproot_path = DerivationPath::from_str(TAPROOT_PATH)
            .map_err(|e| Error::Internal(format!("derivation path: {e}")))?;

        let segwit_key = xpriv
            .derive_priv(&SECP256K1, &segwit_path)
            .map_err(|e| Error::Internal(format!("segwit derivation: {e}")))?
            .private_key;
        let taproot_key = xpriv
            .derive_priv(&SECP256K1, &taproot_path)
            .map_err(|e| Error::Internal(format!("taproot derivation: {e}")))?
            .private_key;

        let segwit_pubkey = CompressedPublicKey(segwit_key.public_key(&SECP256K1));
        let segwit_address = Address::p2wpkh(&segwit_pubkey, known_hrp(network));

        let taproot_keypair = Keypair::from_secret_key(&SECP256K1, &taproot_key);
        let (x_only, _) = taproot_keypair.x_only_public_key();
        let taproot_address = Address::p2tr(&SECP256K1, x_only, None, known_hrp(network));

        Ok(Self {
            network,
            segwit_key,
            taproot_keypair,
            segwit_address,
            taproot_address,
        })
    }

    /// The taproot address holding the rune reserve.
    pub fn taproot_address(&self) -> &Address {
        &self.taproot_address
    }

    /// The segwit address funding miner fees.
    pub fn segwit_address(&self) -> &Address {
        &self.segwit_address
    }

    /// The segwit signing key.
    pub fn segwit_key(&self) -> &SecretKey {
        &self.segwit_key
    }

    /// The untweaked taproot keypair.
    pub fn taproot_keypair(&self) -> &Keypair {
        &self.taproot_keypair
    }

    /// Select, assemble, sign and broadcast a withdrawal of `amount` runes
    /// to `recipient`.
    ///
    /// The broadcast txid must equal the locally computed txid; a mismatch
    /// means the broadcaster mutated the transaction and aborts the
    /// withdrawal as [`Error::BroadcastMismatch`].
    #[tracing::instrument(skip(self, chain, excluded), fields(asset = %asset_id, amount))]
    pub async fn withdraw(
        &self,
        chain: &dyn ChainView,
        asset_id: AssetId,
        amount: u128,
        recipient: &Address,
        excluded: &HashSet<String>,
    ) -> Result<WithdrawalReceipt, Error> {
        let rune_utxos = select_rune_utxos(
            chain,
            &self.taproot_address.to_string(),
            &asset_id,
            amount,
            excluded,
        )
        .await?;
        let fee_utxo = select_fee_utxo(chain, &self.segwit_address.to_string()).await?;

        let params = WithdrawalParams {
            fee_utxo: &fee_utxo,
            rune_utxos: &rune_utxos,
            asset_id,
            amount,
            recipient,
            rune_return: &self.taproot_address,
            fee_change: &self.segwit_address,
        };
        let psbt = build_withdrawal_psbt(&params)?;
        let tx = sign_withdrawal_psbt(psbt, &self.segwit_key, &self.taproot_keypair)?;

        let local_txid = tx.compute_txid().to_string();
        let raw_tx = serialize_hex(&tx);

        let broadcast_txid = with_retry("broadcast", || chain.broadcast(&raw_tx))
            .await
            .map_err(|e| Error::ChainView(e.to_string()))?;

        if broadcast_txid != local_txid {
            tracing::error!(
                "broadcast returned a different txid: local {local_txid}, remote {broadcast_txid}"
            );
            return Err(Error::BroadcastMismatch {
                expected: local_txid,
                got: broadcast_txid,
            });
        }

        tracing::info!("withdrawal {local_txid} broadcast, {amount} {asset_id} to {recipient}");

        Ok(WithdrawalReceipt {
            txid: local_txid,
            fee_paid: WITHDRAWAL_FEE_SATS,
            spent_outpoints: rune_utxos
                .into_iter()
                .map(|utxo| (utxo.txid, utxo.vout))
                .collect(),
        })
    }
}

/// Every quote deposits to the mint's single taproot address.
#[async_trait]
impl DepositAddressProvider for MintWallet {
    async fn create_deposit_address(
        &self,
        _quote_id: &str,
        _amount: Amount,
        _asset_id: &AssetId,
    ) -> Result<String, chain::Error> {
        Ok(self.taproot_address.to_string())
    }
}

/// Parse and validate a withdrawal destination: bech32 segwit or taproot on
/// the mint's network.
pub fn validate_destination(address: &str, network: Network) -> Result<Address, Error> {
    let parsed = Address::from_str(address)
        .map_err(|_| Error::InvalidDestination(address.to_string()))?
        .require_network(network)
        .map_err(|_| Error::InvalidDestination(address.to_string()))?;

    match parsed.address_type() {
        Some(AddressType::P2wpkh | AddressType::P2wsh | AddressType::P2tr) => Ok(parsed),
        _ => Err(Error::InvalidDestination(address.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_addresses_are_deterministic() {
        let a = MintWallet::from_seed(&[5u8; 32], Network::Testnet).unwrap();
        let b = MintWallet::from_seed(&[5u8; 32], Network::Testnet).unwrap();
        assert_eq!(a.taproot_address(), b.taproot_address());
        assert_eq!(a.segwit_address(), b.segwit_address());

        let c = MintWallet::from_seed(&[6u8; 32], Network::Testnet).unwrap();
        assert_ne!(a.taproot_address(), c.taproot_address());

        assert_eq!(a.segwit_address().address_type(), Some(AddressType::P2wpkh));
        assert_eq!(a.taproot_address().address_type(), Some(AddressType::P2tr));
    }

    #[test]
    fn destination_validation() {
        // Mainnet P2WPKH on mainnet: fine.
        assert!(validate_destination(
            "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh",
            Network::Bitcoin
        )
        .is_ok());
        // Wrong network.
        assert!(validate_destination(
            "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh",
            Network::Testnet
        )
        .is_err());
        // Not an address.
        assert!(validate_destination("not-an-address", Network::Bitcoin).is_err());
        // Legacy base58 is refused.
        assert!(validate_destination(
            "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2",
            Network::Bitcoin
        )
        .is_err());
    }
}
