//! In-memory signatory.
//!
//! Owns the mint's key material: keyset generation, at-rest encryption of
//! the per-amount private scalars, a decrypted in-memory cache, blind
//! signing and proof verification. The rest of the mint reaches the keys
//! only through the [`Signatory`] trait; the scalars never leave this crate.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use rand::RngCore;
use tokio::sync::RwLock;

use runemint_common::database::{self, MintDatabase};
use runemint_common::{Error, Signatory, StoredKeyset};
use runemint_protocol::util::unix_time;
use runemint_protocol::{
    dhke, p2pk, Amount, AssetId, BlindSignature, BlindedMessage, CurrencyUnit, Id, KeySet,
    KeySetInfo, KeysResponse, KeysetResponse, Proof, Secret, SecretKey,
};

pub mod encryption;
pub mod keygen;

/// Compressed-point hex of `hash_to_curve(secret)`.
pub fn hash_secret(secret: &Secret) -> Result<String, dhke::Error> {
    Ok(dhke::hash_to_curve(secret.as_bytes())?.to_hex())
}

type PrivateKeyMap = Arc<BTreeMap<Amount, SecretKey>>;

/// The default signatory: key material in process memory, encrypted at rest.
pub struct MemorySignatory {
    localstore: Arc<dyn MintDatabase>,
    seed: [u8; 32],
    encryption_key: [u8; 32],
    keysets: RwLock<HashMap<Id, PrivateKeyMap>>,
}

impl std::fmt::Debug for MemorySignatory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySignatory").finish_non_exhaustive()
    }
}

impl MemorySignatory {
    /// Create a signatory over a storage backend.
    pub fn new(localstore: Arc<dyn MintDatabase>, seed: [u8; 32], encryption_key: [u8; 32]) -> Self {
        Self {
            localstore,
            seed,
            encryption_key,
            keysets: RwLock::new(HashMap::new()),
        }
    }

    fn decrypt_keyset(&self, keyset: &StoredKeyset) -> Result<PrivateKeyMap, Error> {
        let mut private_keys = BTreeMap::new();
        for (amount, stored) in &keyset.encrypted_keys {
            let plaintext = encryption::decrypt(&self.encryption_key, stored)
                .map_err(|e| Error::Internal(format!("keyset {} decryption: {e}", keyset.id)))?;
            let secret_key = SecretKey::from_slice(&plaintext)
                .map_err(|e| Error::Internal(format!("keyset {} scalar: {e}", keyset.id)))?;
            private_keys.insert(*amount, secret_key);
        }
        Ok(Arc::new(private_keys))
    }

    /// Load a keyset row and make sure its decrypted keys are cached.
    async fn load_keyset(&self, id: &Id) -> Result<StoredKeyset, Error> {
        let keyset = self
            .localstore
            .get_keyset(id)
            .await?
            .ok_or_else(|| Error::KeysetNotFound(id.to_string()))?;

        let cached = self.keysets.read().await.contains_key(id);
        if !cached {
            let private_keys = self.decrypt_keyset(&keyset)?;
            self.keysets.write().await.insert(keyset.id, private_keys);
        }
        Ok(keyset)
    }

    /// The private scalar for signing: the keyset must be active and the
    /// amount one of its denominations.
    async fn signing_key(&self, keyset_id: &Id, amount: Amount) -> Result<SecretKey, Error> {
        let keyset = self.load_keyset(keyset_id).await?;
        if !keyset.active {
            return Err(Error::KeysetInactive(keyset_id.to_string()));
        }
        self.cached_key(keyset_id, amount).await
    }

    /// The private scalar for verification: deactivated keysets still verify.
    async fn verification_key(&self, keyset_id: &Id, amount: Amount) -> Result<SecretKey, Error> {
        self.load_keyset(keyset_id).await?;
        self.cached_key(keyset_id, amount).await
    }

    async fn cached_key(&self, keyset_id: &Id, amount: Amount) -> Result<SecretKey, Error> {
        if !amount.is_standard_denomination() {
            return Err(Error::UnknownDenomination(amount));
        }
        let keysets = self.keysets.read().await;
        keysets
            .get(keyset_id)
            .and_then(|keys| keys.get(&amount))
            .cloned()
            .ok_or(Error::UnknownDenomination(amount))
    }
}

#[async_trait]
impl Signatory for MemorySignatory {
    #[tracing::instrument(skip(self))]
    async fn generate_keyset(
        &self,
        asset_id: AssetId,
        unit: CurrencyUnit,
    ) -> Result<KeySetInfo, Error> {
        let mut r = [0u8; 32];
        rand::rng().fill_bytes(&mut r);

        let (public_keys, private_keys) = keygen::derive_keyset_keys(&self.seed, &asset_id, &r)
            .map_err(|e| Error::SignFailed(e.to_string()))?;
        let id = Id::from_keys(&public_keys);

        let encrypted_keys = private_keys
            .iter()
            .map(|(amount, secret_key)| {
                (
                    *amount,
                    encryption::encrypt(&self.encryption_key, &secret_key.to_secret_bytes()),
                )
            })
            .collect();

        let keyset = StoredKeyset {
            id,
            unit: unit.clone(),
            asset_id,
            active: true,
            public_keys,
            encrypted_keys,
            input_fee_ppk: 0,
            final_expiry: None,
            created_at: unix_time(),
        };
        debug_assert!(keyset.maps_are_aligned());

        match self.localstore.add_keyset(keyset.clone()).await {
            Ok(()) => {
                self.keysets
                    .write()
                    .await
                    .insert(id, Arc::new(private_keys));
                tracing::info!("generated keyset {id} for {asset_id} ({unit})");
                Ok(KeySetInfo {
                    id,
                    unit,
                    active: true,
                    input_fee_ppk: 0,
                })
            }
            // Lost a concurrent-create race: the store's uniqueness constraint
            // picked a winner, adopt it.
            Err(database::Error::Duplicate) => {
                let winner = self
                    .localstore
                    .get_active_keyset(&asset_id, &unit)
                    .await?
                    .ok_or_else(|| Error::KeysetNotFound(format!("{asset_id}/{unit}")))?;
                tracing::debug!(
                    "keyset create for {asset_id} ({unit}) collided, adopting {}",
                    winner.id
                );
                let private_keys = self.decrypt_keyset(&winner)?;
                self.keysets.write().await.insert(winner.id, private_keys);
                Ok(KeySetInfo {
                    id: winner.id,
                    unit: winner.unit,
                    active: winner.active,
                    input_fee_ppk: winner.input_fee_ppk,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip_all, fields(keyset_id = %message.keyset_id, amount = %message.amount))]
    async fn blind_sign(&self, message: BlindedMessage) -> Result<BlindSignature, Error> {
        let key = self.signing_key(&message.keyset_id, message.amount).await?;
        let c = dhke::sign_message(&key, &message.blinded_secret)
            .map_err(|e| Error::SignFailed(e.to_string()))?;

        Ok(BlindSignature {
            amount: message.amount,
            keyset_id: message.keyset_id,
            c,
        })
    }

    async fn blind_sign_batch(
        &self,
        messages: Vec<BlindedMessage>,
    ) -> Result<Vec<BlindSignature>, Error> {
        let mut signatures = Vec::with_capacity(messages.len());
        for message in messages {
            signatures.push(self.blind_sign(message).await?);
        }
        Ok(signatures)
    }

    #[tracing::instrument(skip_all, fields(keyset_id = %proof.keyset_id, amount = %proof.amount))]
    async fn verify_proof(&self, proof: Proof) -> Result<(), Error> {
        // A secret that parses as a known condition kind is enforced; any
        // other secret is treated as plain. The mint cannot police unknown
        // kinds since secrets are blinded at signing time.
        if p2pk::is_p2pk_shaped(&proof.secret) {
            proof.verify_p2pk()?;
        }

        let key = self
            .verification_key(&proof.keyset_id, proof.amount)
            .await?;
        let valid = dhke::verify_message(&key, proof.c, proof.secret.as_bytes())
            .map_err(|e| Error::SignFailed(e.to_string()))?;

        if valid {
            Ok(())
        } else {
            Err(Error::InvalidProof {
                secret: proof.secret.to_string(),
            })
        }
    }

    async fn keyset(&self, id: Id) -> Result<Option<KeySet>, Error> {
        Ok(self.localstore.get_keyset(&id).await?.map(|k| KeySet {
            id: k.id,
            unit: k.unit,
            keys: k.public_keys,
        }))
    }

    async fn keyset_pubkeys(&self, id: Id) -> Result<KeysResponse, Error> {
        let keyset = self
            .keyset(id)
            .await?
            .ok_or_else(|| Error::KeysetNotFound(id.to_string()))?;
        Ok(KeysResponse {
            keysets: vec![keyset],
        })
    }

    async fn pubkeys(&self) -> Result<KeysResponse, Error> {
        let keysets = self.localstore.get_keysets().await?;
        Ok(KeysResponse {
            keysets: keysets
                .into_iter()
                .filter(|k| k.active)
                .map(|k| KeySet {
                    id: k.id,
                    unit: k.unit,
                    keys: k.public_keys,
                })
                .collect(),
        })
    }

    async fn keysets(&self) -> Result<KeysetResponse, Error> {
        let keysets = self.localstore.get_keysets().await?;
        Ok(KeysetResponse {
            keysets: keysets
                .into_iter()
                .map(|k| KeySetInfo {
                    id: k.id,
                    unit: k.unit,
                    active: k.active,
                    input_fee_ppk: k.input_fee_ppk,
                })
                .collect(),
        })
    }

    async fn active_keyset(
        &self,
        asset_id: &AssetId,
        unit: &CurrencyUnit,
    ) -> Result<Option<KeySetInfo>, Error> {
        Ok(self
            .localstore
            .get_active_keyset(asset_id, unit)
            .await?
            .map(|k| KeySetInfo {
                id: k.id,
                unit: k.unit,
                active: k.active,
                input_fee_ppk: k.input_fee_ppk,
            }))
    }

    #[tracing::instrument(skip(self))]
    async fn deactivate_keyset(&self, id: Id) -> Result<(), Error> {
        self.localstore.set_keyset_active(&id, false).await?;
        self.keysets.write().await.remove(&id);
        tracing::info!("deactivated keyset {id}");
        Ok(())
    }
}
