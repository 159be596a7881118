//! Proofs, blinded messages and blind signatures.

use serde::de::Error as _;
use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::dhke;
use crate::keys::PublicKey;
use crate::keyset::Id;
use crate::p2pk::P2PKWitness;
use crate::secret::Secret;

/// A client-blinded secret to be signed: `B_`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindedMessage {
    /// Denomination
    pub amount: Amount,
    /// Keyset to sign with
    #[serde(rename = "id")]
    pub keyset_id: Id,
    /// The blinded point
    #[serde(rename = "B_")]
    pub blinded_secret: PublicKey,
}

/// The mint's signature on a blinded message: `C_ = k·B_`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlindSignature {
    /// Denomination
    pub amount: Amount,
    /// Keyset that signed
    #[serde(rename = "id")]
    pub keyset_id: Id,
    /// The signed point
    #[serde(rename = "C_")]
    pub c: PublicKey,
}

/// Witness data attached to a proof.
///
/// On the wire a witness arrives either as structured JSON or as a
/// JSON-encoded string; both forms deserialize to the structured variant and
/// re-serialize canonically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Witness {
    /// P2PK signatures
    P2PK(P2PKWitness),
}

impl Witness {
    /// Canonical JSON string form, as stored.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// The P2PK witness, if that is what this is.
    pub fn p2pk(&self) -> Option<&P2PKWitness> {
        match self {
            Witness::P2PK(witness) => Some(witness),
        }
    }
}

impl<'de> Deserialize<'de> for Witness {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let value = match value {
            serde_json::Value::String(inner) => {
                serde_json::from_str(&inner).map_err(D::Error::custom)?
            }
            other => other,
        };
        let witness = serde_json::from_value::<P2PKWitness>(value).map_err(D::Error::custom)?;
        Ok(Witness::P2PK(witness))
    }
}

/// An unblinded bearer proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Denomination
    pub amount: Amount,
    /// Keyset the proof was signed under
    #[serde(rename = "id")]
    pub keyset_id: Id,
    /// The secret the client committed to
    pub secret: Secret,
    /// The unblinded signature point
    #[serde(rename = "C")]
    pub c: PublicKey,
    /// Optional witness satisfying the secret's spending conditions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub witness: Option<Witness>,
}

impl Proof {
    /// The spent-record key `Y = hash_to_curve(secret)`.
    pub fn y(&self) -> Result<PublicKey, dhke::Error> {
        dhke::hash_to_curve(self.secret.as_bytes())
    }
}

/// A list of proofs.
pub type Proofs = Vec<Proof>;

/// Aggregations over proof lists.
pub trait ProofsMethods {
    /// Sum of proof amounts.
    fn total_amount(&self) -> Result<Amount, crate::amount::Error>;

    /// `Y` values of every proof, in order.
    fn ys(&self) -> Result<Vec<PublicKey>, dhke::Error>;
}

impl ProofsMethods for Proofs {
    fn total_amount(&self) -> Result<Amount, crate::amount::Error> {
        Amount::try_sum(self.iter().map(|p| p.amount))
    }

    fn ys(&self) -> Result<Vec<PublicKey>, dhke::Error> {
        self.iter().map(|p| p.y()).collect()
    }
}
