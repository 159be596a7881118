//! Keysets and keyset identifiers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bitcoin::hashes::{sha256, Hash};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::Amount;
use crate::keys::PublicKey;

/// Keyset error
#[derive(Debug, Error)]
pub enum Error {
    /// Id is not 14 hex characters
    #[error("invalid keyset id: {0}")]
    InvalidId(String),
    /// Invalid hex
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
}

/// A keyset identifier: 14 lowercase hex characters derived from the
/// public-key map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id([u8; 7]);

impl Id {
    const STR_LEN: usize = 14;

    /// Derive the id of a public-key map: SHA-256 over the compressed keys
    /// concatenated in ascending-amount order, truncated to the first seven
    /// bytes.
    pub fn from_keys(keys: &Keys) -> Self {
        let mut engine = sha256::Hash::engine();
        for pubkey in keys.iter().map(|(_, pk)| pk) {
            bitcoin::hashes::HashEngine::input(&mut engine, &pubkey.to_bytes());
        }
        let digest = sha256::Hash::from_engine(engine).to_byte_array();

        let mut id = [0u8; 7];
        id.copy_from_slice(&digest[..7]);
        Self(id)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::STR_LEN {
            return Err(Error::InvalidId(s.to_string()));
        }
        let bytes = hex::decode(s)?;
        let mut id = [0u8; 7];
        id.copy_from_slice(&bytes);
        Ok(Self(id))
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Id::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// The unit a keyset is denominated in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CurrencyUnit {
    /// Satoshis
    Sat,
    /// A named asset unit, e.g. a rune ticker
    Custom(String),
}

impl fmt::Display for CurrencyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurrencyUnit::Sat => write!(f, "sat"),
            CurrencyUnit::Custom(unit) => write!(f, "{unit}"),
        }
    }
}

impl FromStr for CurrencyUnit {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "sat" => CurrencyUnit::Sat,
            other => CurrencyUnit::Custom(other.to_string()),
        })
    }
}

impl Serialize for CurrencyUnit {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CurrencyUnit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(CurrencyUnit::from_str(&s).unwrap_or(CurrencyUnit::Custom(s)))
    }
}

/// The public-key map of a keyset, denomination to compressed point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keys(BTreeMap<Amount, PublicKey>);

impl Keys {
    /// Wrap a map.
    pub fn new(keys: BTreeMap<Amount, PublicKey>) -> Self {
        Self(keys)
    }

    /// The public key for a denomination.
    pub fn amount_key(&self, amount: Amount) -> Option<PublicKey> {
        self.0.get(&amount).copied()
    }

    /// Iterate in ascending-amount order.
    pub fn iter(&self) -> impl Iterator<Item = (&Amount, &PublicKey)> {
        self.0.iter()
    }

    /// Number of denominations.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A keyset as distributed to clients: id, unit and the public-key map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet {
    /// Keyset id
    pub id: Id,
    /// Unit
    pub unit: CurrencyUnit,
    /// Denomination to public key
    pub keys: Keys,
}

/// Keyset metadata as listed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySetInfo {
    /// Keyset id
    pub id: Id,
    /// Unit
    pub unit: CurrencyUnit,
    /// Whether the mint signs new outputs with this keyset
    pub active: bool,
    /// Input fee in parts-per-thousand per proof
    pub input_fee_ppk: u64,
}

/// Response carrying full keysets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysResponse {
    /// Keysets
    pub keysets: Vec<KeySet>,
}

/// Response carrying keyset metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysetResponse {
    /// Keyset infos
    pub keysets: Vec<KeySetInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SecretKey;

    fn test_keys() -> Keys {
        let mut map = BTreeMap::new();
        for (i, amount) in [1u64, 2, 4, 8].into_iter().enumerate() {
            let mut bytes = [0u8; 32];
            bytes[31] = i as u8 + 1;
            let sk = SecretKey::from_slice(&bytes).unwrap();
            map.insert(Amount::from(amount), sk.public_key());
        }
        Keys::new(map)
    }

    #[test]
    fn id_is_fourteen_hex_chars() {
        let id = Id::from_keys(&test_keys());
        let rendered = id.to_string();
        assert_eq!(rendered.len(), 14);
        assert!(rendered.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(rendered.parse::<Id>().unwrap(), id);
    }

    #[test]
    fn id_depends_on_keys() {
        let id = Id::from_keys(&test_keys());
        let mut map = BTreeMap::new();
        let sk = SecretKey::from_hex(
            "0000000000000000000000000000000000000000000000000000000000000042",
        )
        .unwrap();
        map.insert(Amount::from(1), sk.public_key());
        assert_ne!(Id::from_keys(&Keys::new(map)), id);
    }

    #[test]
    fn id_rejects_bad_lengths() {
        assert!("00ff".parse::<Id>().is_err());
        assert!("00ff00ff00ff00ff".parse::<Id>().is_err());
    }
}
