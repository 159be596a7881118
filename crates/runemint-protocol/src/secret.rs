//! Proof secrets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Secret error
#[derive(Debug, Error)]
pub enum Error {
    /// Empty secret
    #[error("secret is empty")]
    Empty,
}

/// The opaque secret string carried by a proof.
///
/// The mint treats it as bytes for `hash_to_curve`; a secret that parses as a
/// well-known structured kind (P2PK) additionally carries spending
/// conditions, see [`crate::p2pk`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a string as a secret.
    pub fn new<S: Into<String>>(secret: S) -> Self {
        Self(secret.into())
    }

    /// The raw bytes, as hashed and as signed by P2PK witnesses.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The raw string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Secret {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::Empty);
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Self(s)
    }
}
