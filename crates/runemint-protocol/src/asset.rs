//! On-chain asset identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Asset id error
#[derive(Debug, Error)]
pub enum Error {
    /// Not of the form `block:tx`
    #[error("invalid asset id: {0}")]
    InvalidAssetId(String),
}

/// A Runes asset identifier: the block height and transaction index of the
/// etching, rendered as `block:tx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetId {
    /// Etching block height
    pub block: u64,
    /// Transaction index within the etching block
    pub tx: u32,
}

impl AssetId {
    /// Construct from the two halves.
    pub fn new(block: u64, tx: u32) -> Self {
        Self { block, tx }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.tx)
    }
}

impl FromStr for AssetId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (block, tx) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidAssetId(s.to_string()))?;
        Ok(Self {
            block: block
                .parse()
                .map_err(|_| Error::InvalidAssetId(s.to_string()))?,
            tx: tx
                .parse()
                .map_err(|_| Error::InvalidAssetId(s.to_string()))?,
        })
    }
}

impl Serialize for AssetId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AssetId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        AssetId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_render() {
        let id: AssetId = "1527352:1".parse().unwrap();
        assert_eq!(id, AssetId::new(1527352, 1));
        assert_eq!(id.to_string(), "1527352:1");

        assert!("1527352".parse::<AssetId>().is_err());
        assert!("a:b".parse::<AssetId>().is_err());
    }
}
