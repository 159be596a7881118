//! Pay-to-public-key spending conditions.
//!
//! A P2PK-shaped secret is a JSON array `["P2PK", {nonce, data, tags?}]`
//! embedded in the proof's opaque secret string. Spendability is gated on
//! Schnorr signatures over the raw secret string, with optional locktime,
//! refund keys and n-of-m thresholds carried as tags.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys::{self, signature_from_hex, PublicKey};
use crate::proof::Proof;
use crate::secret::Secret;
use crate::util::unix_time;

/// P2PK error
#[derive(Debug, Error)]
pub enum Error {
    /// The secret is not P2PK-shaped; treat the proof as a plain secret
    #[error("secret is not a P2PK secret")]
    NotP2PK,
    /// The secret claimed to be P2PK but its body is malformed
    #[error("malformed P2PK secret: {0}")]
    MalformedSecret(String),
    /// A tag value could not be parsed
    #[error("invalid value for tag {0}")]
    InvalidTagValue(String),
    /// A public key could not be normalized
    #[error("invalid public key: {0}")]
    InvalidPubkey(String),
    /// The proof carries no witness but the conditions require signatures
    #[error("witness required but missing")]
    MissingWitness,
    /// Compound SIG_ALL signing is not supported by this mint
    #[error("SIG_ALL spending conditions are not supported")]
    SigAllUnsupported,
    /// Fewer valid signatures than the conditions require
    #[error("not enough valid signatures: required {required}, found {found}")]
    NotEnoughSignatures {
        /// Signatures the conditions require
        required: u64,
        /// Valid signatures found in the witness
        found: u64,
    },
    /// Key error
    #[error(transparent)]
    Keys(#[from] keys::Error),
}

/// Signature aggregation mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigFlag {
    /// Each input proof is signed individually
    #[default]
    #[serde(rename = "SIG_INPUTS")]
    SigInputs,
    /// All proofs are signed as one compound message (unsupported)
    #[serde(rename = "SIG_ALL")]
    SigAll,
}

impl FromStr for SigFlag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SIG_INPUTS" => Ok(SigFlag::SigInputs),
            "SIG_ALL" => Ok(SigFlag::SigAll),
            other => Err(Error::InvalidTagValue(other.to_string())),
        }
    }
}

/// The body of a P2PK secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct P2PKSecret {
    /// Client nonce making the secret unique
    pub nonce: String,
    /// Primary authorized public key
    pub data: String,
    /// Condition tags: each inner array is `[name, value, ...]`
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
}

impl TryFrom<&Secret> for P2PKSecret {
    type Error = Error;

    fn try_from(secret: &Secret) -> Result<Self, Self::Error> {
        let value: serde_json::Value =
            serde_json::from_str(secret.as_str()).map_err(|_| Error::NotP2PK)?;
        let array = value.as_array().ok_or(Error::NotP2PK)?;
        if array.first().and_then(|kind| kind.as_str()) != Some("P2PK") {
            return Err(Error::NotP2PK);
        }
        // From here on the secret claims to be P2PK: malformed bodies fail
        // closed instead of falling back to plain-secret handling.
        let body = array
            .get(1)
            .ok_or_else(|| Error::MalformedSecret("missing body".to_string()))?;
        serde_json::from_value(body.clone()).map_err(|e| Error::MalformedSecret(e.to_string()))
    }
}

/// Whether a secret is P2PK-shaped.
pub fn is_p2pk_shaped(secret: &Secret) -> bool {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(secret.as_str()) else {
        return false;
    };
    value
        .as_array()
        .and_then(|array| array.first())
        .and_then(|kind| kind.as_str())
        == Some("P2PK")
}

/// Spending conditions extracted from a P2PK secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conditions {
    /// Authorized keys before the locktime: `data` first, then `pubkeys`
    pub pubkeys: Vec<PublicKey>,
    /// Required signature count before the locktime
    pub n_sigs: u64,
    /// Unix seconds after which the refund branch applies
    pub locktime: Option<u64>,
    /// Keys authorized after the locktime
    pub refund_keys: Vec<PublicKey>,
    /// Required signature count after the locktime; defaults to all refund keys
    pub n_sigs_refund: Option<u64>,
    /// Signature aggregation mode
    pub sig_flag: SigFlag,
}

impl TryFrom<&P2PKSecret> for Conditions {
    type Error = Error;

    fn try_from(secret: &P2PKSecret) -> Result<Self, Self::Error> {
        let mut pubkeys = vec![normalize_pubkey(&secret.data)?];
        let mut n_sigs = 1;
        let mut locktime = None;
        let mut refund_keys = Vec::new();
        let mut n_sigs_refund = None;
        let mut sig_flag = SigFlag::default();

        for tag in &secret.tags {
            let Some((name, values)) = tag.split_first() else {
                continue;
            };
            match name.as_str() {
                "pubkeys" => {
                    for value in values {
                        pubkeys.push(normalize_pubkey(value)?);
                    }
                }
                "n_sigs" => {
                    n_sigs = values
                        .first()
                        .and_then(|v| v.parse().ok())
                        .ok_or_else(|| Error::InvalidTagValue("n_sigs".to_string()))?;
                }
                "locktime" => {
                    locktime = Some(
                        values
                            .first()
                            .and_then(|v| v.parse().ok())
                            .ok_or_else(|| Error::InvalidTagValue("locktime".to_string()))?,
                    );
                }
                "refund" => {
                    for value in values {
                        refund_keys.push(normalize_pubkey(value)?);
                    }
                }
                "n_sigs_refund" => {
                    n_sigs_refund = Some(
                        values
                            .first()
                            .and_then(|v| v.parse().ok())
                            .ok_or_else(|| Error::InvalidTagValue("n_sigs_refund".to_string()))?,
                    );
                }
                "sigflag" => {
                    sig_flag = values
                        .first()
                        .ok_or_else(|| Error::InvalidTagValue("sigflag".to_string()))?
                        .parse()?;
                }
                _ => {}
            }
        }

        Ok(Conditions {
            pubkeys,
            n_sigs,
            locktime,
            refund_keys,
            n_sigs_refund,
            sig_flag,
        })
    }
}

/// Normalize a wire public key to its compressed form.
///
/// Accepted inputs: 66-hex compressed, 64-hex x-only (even parity is
/// assumed), or a legacy decimal-comma byte list.
pub fn normalize_pubkey(raw: &str) -> Result<PublicKey, Error> {
    if raw.contains(',') {
        let bytes: Vec<u8> = raw
            .split(',')
            .map(|part| part.trim().parse::<u8>())
            .collect::<Result<_, _>>()
            .map_err(|_| Error::InvalidPubkey(raw.to_string()))?;
        return match bytes.len() {
            33 => Ok(PublicKey::from_slice(&bytes)?),
            32 => {
                let mut compressed = [0u8; 33];
                compressed[0] = 0x02;
                compressed[1..].copy_from_slice(&bytes);
                Ok(PublicKey::from_slice(&compressed)?)
            }
            _ => Err(Error::InvalidPubkey(raw.to_string())),
        };
    }

    match raw.len() {
        66 => Ok(PublicKey::from_hex(raw)?),
        64 => Ok(PublicKey::from_hex(&format!("02{raw}"))?),
        _ => Err(Error::InvalidPubkey(raw.to_string())),
    }
}

/// The signatures satisfying a P2PK condition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct P2PKWitness {
    /// 128-hex Schnorr signatures over the raw secret string
    pub signatures: Vec<String>,
}

impl Proof {
    /// Verify this proof's P2PK spending conditions against the current
    /// clock.
    pub fn verify_p2pk(&self) -> Result<(), Error> {
        self.verify_p2pk_at(unix_time())
    }

    /// Verify this proof's P2PK spending conditions at a given Unix time.
    ///
    /// Before the locktime the authorized set is `data` plus `pubkeys` and
    /// `n_sigs` signatures are required. At or after the locktime the refund
    /// keys take over; an empty refund set makes the proof spendable by
    /// anyone. Each provided signature is matched against the authorized
    /// keys at most once; the signed message is the raw secret string.
    pub fn verify_p2pk_at(&self, now: u64) -> Result<(), Error> {
        let secret = P2PKSecret::try_from(&self.secret)?;
        let conditions = Conditions::try_from(&secret)?;

        if conditions.sig_flag == SigFlag::SigAll {
            return Err(Error::SigAllUnsupported);
        }

        let (authorized, required) = match conditions.locktime {
            Some(locktime) if now >= locktime => {
                if conditions.refund_keys.is_empty() {
                    // Locktime passed with no refund keys: anyone may spend.
                    return Ok(());
                }
                let required = conditions
                    .n_sigs_refund
                    .unwrap_or(conditions.refund_keys.len() as u64);
                (conditions.refund_keys, required)
            }
            _ => (conditions.pubkeys, conditions.n_sigs),
        };

        let witness = self
            .witness
            .as_ref()
            .and_then(|w| w.p2pk())
            .ok_or(Error::MissingWitness)?;

        let mut seen = std::collections::HashSet::new();
        let mut found: u64 = 0;
        for sig_hex in &witness.signatures {
            if !seen.insert(sig_hex.as_str()) {
                continue;
            }
            let Ok(signature) = signature_from_hex(sig_hex) else {
                continue;
            };
            if authorized
                .iter()
                .any(|key| key.verify(self.secret.as_bytes(), &signature).is_ok())
            {
                found += 1;
            }
        }

        if found >= required {
            Ok(())
        } else {
            Err(Error::NotEnoughSignatures { required, found })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::keys::SecretKey;
    use crate::proof::Witness;

    fn signing_key(fill: u8) -> SecretKey {
        SecretKey::from_slice(&[fill; 32]).expect("valid scalar")
    }

    fn p2pk_secret(data: &str, tags: serde_json::Value) -> Secret {
        Secret::new(
            serde_json::json!([
                "P2PK",
                { "nonce": "859d4935c4907062a6297cf4e663e2835d90d97ecdd510745d32f6816323a41f",
                  "data": data,
                  "tags": tags }
            ])
            .to_string(),
        )
    }

    fn proof_with(secret: Secret, witness: Option<Witness>) -> Proof {
        Proof {
            amount: Amount::from(1),
            keyset_id: "00deadbeef0001".parse().expect("valid id"),
            secret,
            c: signing_key(9).public_key(),
            witness,
        }
    }

    fn sign_secret(sk: &SecretKey, secret: &Secret) -> String {
        hex::encode(sk.sign(secret.as_bytes()).serialize())
    }

    #[test]
    fn plain_secret_is_not_p2pk_shaped() {
        assert!(!is_p2pk_shaped(&Secret::new("just bytes")));
        assert!(!is_p2pk_shaped(&Secret::new("[\"HTLC\", {}]")));
        assert!(matches!(
            P2PKSecret::try_from(&Secret::new("just bytes")),
            Err(Error::NotP2PK)
        ));
    }

    #[test]
    fn p2pk_with_malformed_body_fails_closed() {
        let secret = Secret::new(r#"["P2PK", {"nonce": 17}]"#);
        assert!(is_p2pk_shaped(&secret));
        assert!(matches!(
            P2PKSecret::try_from(&secret),
            Err(Error::MalformedSecret(_))
        ));
    }

    #[test]
    fn missing_witness_is_rejected() {
        let sk = signing_key(1);
        let secret = p2pk_secret(&sk.public_key().to_hex(), serde_json::json!([]));
        let proof = proof_with(secret, None);
        assert!(matches!(proof.verify_p2pk(), Err(Error::MissingWitness)));
    }

    #[test]
    fn valid_signature_spends() {
        let sk = signing_key(1);
        let secret = p2pk_secret(&sk.public_key().to_hex(), serde_json::json!([]));
        let signature = sign_secret(&sk, &secret);
        let proof = proof_with(
            secret,
            Some(Witness::P2PK(P2PKWitness {
                signatures: vec![signature],
            })),
        );
        proof.verify_p2pk().expect("valid signature");
    }

    #[test]
    fn wrong_key_does_not_spend() {
        let sk = signing_key(1);
        let other = signing_key(2);
        let secret = p2pk_secret(&sk.public_key().to_hex(), serde_json::json!([]));
        let signature = sign_secret(&other, &secret);
        let proof = proof_with(
            secret,
            Some(Witness::P2PK(P2PKWitness {
                signatures: vec![signature],
            })),
        );
        assert!(matches!(
            proof.verify_p2pk(),
            Err(Error::NotEnoughSignatures {
                required: 1,
                found: 0
            })
        ));
    }

    #[test]
    fn duplicated_signature_counts_once() {
        let alice = signing_key(1);
        let bob = signing_key(2);
        let secret = p2pk_secret(
            &alice.public_key().to_hex(),
            serde_json::json!([
                ["pubkeys", bob.public_key().to_hex()],
                ["n_sigs", "2"]
            ]),
        );
        let signature = sign_secret(&alice, &secret);
        let proof = proof_with(
            secret.clone(),
            Some(Witness::P2PK(P2PKWitness {
                signatures: vec![signature.clone(), signature],
            })),
        );
        assert!(matches!(
            proof.verify_p2pk(),
            Err(Error::NotEnoughSignatures {
                required: 2,
                found: 1
            })
        ));

        let proof = proof_with(
            secret.clone(),
            Some(Witness::P2PK(P2PKWitness {
                signatures: vec![sign_secret(&alice, &secret), sign_secret(&bob, &secret)],
            })),
        );
        proof.verify_p2pk().expect("two of two");
    }

    #[test]
    fn locktime_boundary_uses_refund_branch() {
        let alice = signing_key(1);
        let refund = signing_key(3);
        let now = 1_700_000_000;
        let secret = p2pk_secret(
            &alice.public_key().to_hex(),
            serde_json::json!([
                ["locktime", now.to_string()],
                ["refund", refund.public_key().to_hex()]
            ]),
        );

        // At exactly the locktime the refund key is authoritative.
        let refund_sig = sign_secret(&refund, &secret);
        let proof = proof_with(
            secret.clone(),
            Some(Witness::P2PK(P2PKWitness {
                signatures: vec![refund_sig],
            })),
        );
        proof.verify_p2pk_at(now).expect("refund key spends at locktime");

        // One second earlier only the primary key may spend.
        let alice_sig = sign_secret(&alice, &secret);
        let proof = proof_with(
            secret,
            Some(Witness::P2PK(P2PKWitness {
                signatures: vec![alice_sig],
            })),
        );
        proof.verify_p2pk_at(now - 1).expect("primary key before locktime");
        assert!(proof.verify_p2pk_at(now).is_err());
    }

    #[test]
    fn expired_locktime_without_refund_is_open() {
        let alice = signing_key(1);
        let secret = p2pk_secret(
            &alice.public_key().to_hex(),
            serde_json::json!([["locktime", "1"]]),
        );
        let proof = proof_with(secret, None);
        proof.verify_p2pk().expect("anyone can spend");
    }

    #[test]
    fn sig_all_is_rejected() {
        let alice = signing_key(1);
        let secret = p2pk_secret(
            &alice.public_key().to_hex(),
            serde_json::json!([["sigflag", "SIG_ALL"]]),
        );
        let signature = sign_secret(&alice, &secret);
        let proof = proof_with(
            secret,
            Some(Witness::P2PK(P2PKWitness {
                signatures: vec![signature],
            })),
        );
        assert!(matches!(proof.verify_p2pk(), Err(Error::SigAllUnsupported)));
    }

    #[test]
    fn pubkey_normalization_accepts_all_forms() {
        let sk = signing_key(4);
        let compressed = sk.public_key().to_hex();
        let x_only = compressed[2..].to_string();
        let decimal: Vec<String> = sk
            .public_key()
            .to_bytes()
            .iter()
            .map(|b| b.to_string())
            .collect();

        let from_hex = normalize_pubkey(&compressed).unwrap();
        let from_decimal = normalize_pubkey(&decimal.join(",")).unwrap();
        assert_eq!(from_hex, from_decimal);

        // X-only form resolves to the even-parity point with that x.
        let from_x_only = normalize_pubkey(&x_only).unwrap();
        assert_eq!(from_x_only.x_only_public_key(), from_hex.x_only_public_key());

        assert!(normalize_pubkey("zz").is_err());
        assert!(normalize_pubkey("1,2,3").is_err());
    }
}
