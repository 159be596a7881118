//! Keys on secp256k1.
//!
//! Thin wrappers over the `secp256k1` types with the hex wire encodings the
//! protocol uses: 33-byte SEC1 compressed points rendered as 66 lowercase hex
//! characters, and BIP-340 Schnorr signatures over the SHA-256 digest of the
//! signed message.

use std::fmt;
use std::str::FromStr;

use bitcoin::hashes::{sha256, Hash};
use bitcoin::secp256k1;
use bitcoin::secp256k1::schnorr::Signature;
use bitcoin::secp256k1::{Keypair, Message, Scalar, XOnlyPublicKey};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shared secp256k1 context.
pub static SECP256K1: Lazy<secp256k1::Secp256k1<secp256k1::All>> =
    Lazy::new(secp256k1::Secp256k1::new);

/// Key error
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid hex
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
    /// Not a valid point or scalar
    #[error(transparent)]
    Secp256k1(#[from] secp256k1::Error),
    /// Signature is not 64 bytes
    #[error("invalid signature length: {0}")]
    InvalidSignatureLength(usize),
    /// Signature did not verify
    #[error("signature verification failed")]
    InvalidSignature,
}

/// A compressed public key on secp256k1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey {
    inner: secp256k1::PublicKey,
}

impl PublicKey {
    /// Parse from a 33-byte SEC1 compressed encoding.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            inner: secp256k1::PublicKey::from_slice(bytes)?,
        })
    }

    /// Parse from 66 hex characters.
    pub fn from_hex(hex: &str) -> Result<Self, Error> {
        let bytes = hex::decode(hex)?;
        Self::from_slice(&bytes)
    }

    /// The 33-byte compressed encoding.
    pub fn to_bytes(&self) -> [u8; 33] {
        self.inner.serialize()
    }

    /// 66 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// The x-only form used by BIP-340.
    pub fn x_only_public_key(&self) -> XOnlyPublicKey {
        self.inner.x_only_public_key().0
    }

    /// Multiply this point by a scalar: `k · P`.
    pub fn mul_tweak(&self, scalar: &Scalar) -> Result<PublicKey, Error> {
        Ok(Self {
            inner: self.inner.mul_tweak(&SECP256K1, scalar)?,
        })
    }

    /// Add another point to this one.
    pub fn combine(&self, other: &PublicKey) -> Result<PublicKey, Error> {
        Ok(Self {
            inner: self.inner.combine(&other.inner)?,
        })
    }

    /// Negate the point.
    pub fn negate(&self) -> PublicKey {
        Self {
            inner: self.inner.negate(&SECP256K1),
        }
    }

    /// Verify a BIP-340 Schnorr signature over `msg`.
    ///
    /// The message is hashed with SHA-256 before verification; the parity
    /// byte of the compressed key is discarded.
    pub fn verify(&self, msg: &[u8], signature: &Signature) -> Result<(), Error> {
        let digest = sha256::Hash::hash(msg);
        SECP256K1
            .verify_schnorr(
                signature,
                &Message::from_digest(digest.to_byte_array()),
                &self.x_only_public_key(),
            )
            .map_err(|_| Error::InvalidSignature)
    }
}

impl From<secp256k1::PublicKey> for PublicKey {
    fn from(inner: secp256k1::PublicKey) -> Self {
        Self { inner }
    }
}

impl From<PublicKey> for secp256k1::PublicKey {
    fn from(key: PublicKey) -> Self {
        key.inner
    }
}

impl FromStr for PublicKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A secret scalar on secp256k1.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey {
    inner: secp256k1::SecretKey,
}

impl SecretKey {
    /// Parse from 32 raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        Ok(Self {
            inner: secp256k1::SecretKey::from_slice(bytes)?,
        })
    }

    /// Parse from 64 hex characters.
    pub fn from_hex(hex: &str) -> Result<Self, Error> {
        let bytes = hex::decode(hex)?;
        Self::from_slice(&bytes)
    }

    /// The 32-byte scalar.
    pub fn to_secret_bytes(&self) -> [u8; 32] {
        self.inner.secret_bytes()
    }

    /// 64 lowercase hex characters. Handle with care.
    pub fn to_secret_hex(&self) -> String {
        hex::encode(self.to_secret_bytes())
    }

    /// The corresponding public point `G · k`.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.public_key(&SECP256K1),
        }
    }

    /// The scalar form used for point multiplication.
    pub fn as_scalar(&self) -> Scalar {
        Scalar::from(self.inner)
    }

    /// Produce a BIP-340 Schnorr signature over the SHA-256 digest of `msg`.
    pub fn sign(&self, msg: &[u8]) -> Signature {
        let digest = sha256::Hash::hash(msg);
        let keypair = Keypair::from_secret_key(&SECP256K1, &self.inner);
        SECP256K1.sign_schnorr(&Message::from_digest(digest.to_byte_array()), &keypair)
    }
}

impl From<secp256k1::SecretKey> for SecretKey {
    fn from(inner: secp256k1::SecretKey) -> Self {
        Self { inner }
    }
}

impl From<SecretKey> for secp256k1::SecretKey {
    fn from(key: SecretKey) -> Self {
        key.inner
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the scalar.
        write!(f, "SecretKey(..)")
    }
}

impl FromStr for SecretKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Parse a 64-byte Schnorr signature from 128 hex characters.
pub fn signature_from_hex(hex_sig: &str) -> Result<Signature, Error> {
    let bytes = hex::decode(hex_sig)?;
    if bytes.len() != 64 {
        return Err(Error::InvalidSignatureLength(bytes.len()));
    }
    Ok(Signature::from_slice(&bytes)?)
}
