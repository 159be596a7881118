//! Blind Diffie-Hellman key exchange.
//!
//! The mint signs a blinded point `B_` with its per-amount secret scalar `k`,
//! producing `C_ = k·B_`. The client unblinds `C = C_ − r·K` and later
//! presents `(secret, C)`; the proof is valid iff `C == k·hash_to_curve(secret)`.

use bitcoin::hashes::{sha256, Hash};
use thiserror::Error;

use crate::keys::{self, PublicKey, SecretKey};

/// Domain-separation prefix for [`hash_to_curve`], 28 bytes.
const DOMAIN_SEPARATOR: &[u8; 28] = b"Secp256k1_HashToCurve_Cashu_";

/// DHKE error
#[derive(Debug, Error)]
pub enum Error {
    /// No valid point found within the counter bound
    #[error("no valid curve point found for message")]
    NoValidPoint,
    /// Key error
    #[error(transparent)]
    Keys(#[from] keys::Error),
}

/// Map a message to a curve point deterministically.
///
/// `base = SHA256(DOMAIN_SEPARATOR || message)`, then for counter
/// 0, 1, 2, … the candidate `0x02 || SHA256(base || counter_be32)` is parsed
/// as a compressed point; the first valid point wins. The counter bound of
/// `2^16` is unreachable in practice.
pub fn hash_to_curve(message: &[u8]) -> Result<PublicKey, Error> {
    let mut engine = sha256::Hash::engine();
    bitcoin::hashes::HashEngine::input(&mut engine, DOMAIN_SEPARATOR);
    bitcoin::hashes::HashEngine::input(&mut engine, message);
    let base = sha256::Hash::from_engine(engine).to_byte_array();

    for counter in 0..u32::pow(2, 16) {
        let mut engine = sha256::Hash::engine();
        bitcoin::hashes::HashEngine::input(&mut engine, &base);
        bitcoin::hashes::HashEngine::input(&mut engine, &counter.to_be_bytes());
        let candidate = sha256::Hash::from_engine(engine).to_byte_array();

        let mut encoded = [0u8; 33];
        encoded[0] = 0x02;
        encoded[1..].copy_from_slice(&candidate);

        if let Ok(point) = PublicKey::from_slice(&encoded) {
            return Ok(point);
        }
    }

    Err(Error::NoValidPoint)
}

/// Sign a blinded message: `C_ = k·B_`.
pub fn sign_message(k: &SecretKey, blinded_message: &PublicKey) -> Result<PublicKey, Error> {
    Ok(blinded_message.mul_tweak(&k.as_scalar())?)
}

/// Verify an unblinded proof: `C == k·hash_to_curve(secret)`.
pub fn verify_message(k: &SecretKey, c: PublicKey, secret_msg: &[u8]) -> Result<bool, Error> {
    let y = hash_to_curve(secret_msg)?;
    Ok(y.mul_tweak(&k.as_scalar())? == c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_to_curve_is_deterministic() {
        let a = hash_to_curve(b"test_message").unwrap();
        let b = hash_to_curve(b"test_message").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, hash_to_curve(b"test_messagf").unwrap());
    }

    #[test]
    fn hash_to_curve_output_shape() {
        let point = hash_to_curve(b"").unwrap();
        let hex = point.to_hex();
        assert_eq!(hex.len(), 66);
        // Candidates are always built with an even-parity prefix.
        assert!(hex.starts_with("02"));
    }

    #[test]
    fn sign_then_verify() {
        let k = SecretKey::from_hex(
            "0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        let secret = b"a proof secret";
        let y = hash_to_curve(secret).unwrap();
        let c = sign_message(&k, &y).unwrap();

        assert!(verify_message(&k, c, secret).unwrap());
        assert!(!verify_message(&k, c, b"a different secret").unwrap());
    }

    /// The full client round trip: blind, sign, unblind, verify.
    ///
    /// `Y = hash_to_curve(s)`, `B_ = Y + r·G`, `C_ = k·B_`,
    /// `C = C_ − r·K` where `K = k·G`. The unblinded `C` must verify.
    #[test]
    fn blinding_round_trip() {
        let k = SecretKey::from_hex(
            "7f2b6b941a3805c95a8e5ca2b01f43a0db14a43e787a33d2b43aaf43a7500b3a",
        )
        .unwrap();
        let r = SecretKey::from_hex(
            "5e63b441172b73a1e44b0b9d62c2876add3ee776c892c981966cbdac03c49a70",
        )
        .unwrap();

        let secret = b"round trip secret";
        let y = hash_to_curve(secret).unwrap();

        // B_ = Y + r·G
        let b_ = y.combine(&r.public_key()).unwrap();
        // C_ = k·B_
        let c_ = sign_message(&k, &b_).unwrap();
        // C = C_ - r·K
        let r_k = k.public_key().mul_tweak(&r.as_scalar()).unwrap();
        let c = c_.combine(&r_k.negate()).unwrap();

        assert!(verify_message(&k, c, secret).unwrap());
    }
}
