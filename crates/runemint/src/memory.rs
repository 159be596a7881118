//! In-memory storage backend.
//!
//! One `RwLock` guards the whole store, which is what makes the
//! check-then-insert of `add_spent_proofs` atomic: of two concurrent spends
//! of one proof, exactly one writes and the other observes
//! `ProofAlreadySpent`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use runemint_common::database::{Error, MintDatabase};
use runemint_common::{outpoint_key, MeltQuote, MintQuote, ReserveUtxo, SpentProof, StoredKeyset};
use runemint_protocol::util::unix_time;
use runemint_protocol::{
    AssetId, BlindSignature, CurrencyUnit, Id, MeltQuoteState, MintQuoteState, Proof, PublicKey,
    State,
};

#[derive(Debug, Default)]
struct Storage {
    keysets: HashMap<Id, StoredKeyset>,
    /// `(asset_id, unit)` rendered as a string key -> active keyset id;
    /// stands in for the relational unique index resolving create races
    active_keysets: HashMap<String, Id>,
    mint_quotes: HashMap<String, MintQuote>,
    melt_quotes: HashMap<String, MeltQuote>,
    proofs: HashMap<PublicKey, SpentProof>,
    /// secret -> `Y`, the backup uniqueness index
    secret_index: HashMap<String, PublicKey>,
    blind_signatures: HashMap<PublicKey, BlindSignature>,
    quote_signatures: HashMap<String, Vec<BlindSignature>>,
    reserve_utxos: HashMap<String, ReserveUtxo>,
}

fn unit_key(asset_id: &AssetId, unit: &CurrencyUnit) -> String {
    format!("{asset_id}/{unit}")
}

/// In-memory [`MintDatabase`].
#[derive(Debug, Clone, Default)]
pub struct MintMemoryDatabase {
    inner: Arc<RwLock<Storage>>,
}

impl MintMemoryDatabase {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MintDatabase for MintMemoryDatabase {
    async fn add_keyset(&self, keyset: StoredKeyset) -> Result<(), Error> {
        let mut storage = self.inner.write().await;
        let key = unit_key(&keyset.asset_id, &keyset.unit);
        if keyset.active {
            if let Some(existing) = storage.active_keysets.get(&key) {
                if storage.keysets.get(existing).is_some_and(|k| k.active) {
                    return Err(Error::Duplicate);
                }
            }
            storage.active_keysets.insert(key, keyset.id);
        }
        storage.keysets.insert(keyset.id, keyset);
        Ok(())
    }

    async fn get_keyset(&self, id: &Id) -> Result<Option<StoredKeyset>, Error> {
        Ok(self.inner.read().await.keysets.get(id).cloned())
    }

    async fn get_keysets(&self) -> Result<Vec<StoredKeyset>, Error> {
        Ok(self.inner.read().await.keysets.values().cloned().collect())
    }

    async fn get_active_keyset(
        &self,
        asset_id: &AssetId,
        unit: &CurrencyUnit,
    ) -> Result<Option<StoredKeyset>, Error> {
        let storage = self.inner.read().await;
        Ok(storage
            .active_keysets
            .get(&unit_key(asset_id, unit))
            .and_then(|id| storage.keysets.get(id))
            .filter(|keyset| keyset.active)
            .cloned())
    }

    async fn set_keyset_active(&self, id: &Id, active: bool) -> Result<(), Error> {
        let mut storage = self.inner.write().await;
        let Some(keyset) = storage.keysets.get_mut(id) else {
            return Err(Error::Internal(format!("unknown keyset {id}")));
        };
        keyset.active = active;
        let key = unit_key(&keyset.asset_id, &keyset.unit);
        if active {
            storage.active_keysets.insert(key, *id);
        } else if storage.active_keysets.get(&key) == Some(id) {
            storage.active_keysets.remove(&key);
        }
        Ok(())
    }

    async fn add_mint_quote(&self, quote: MintQuote) -> Result<(), Error> {
        let mut storage = self.inner.write().await;
        if storage.mint_quotes.contains_key(&quote.id) {
            return Err(Error::Duplicate);
        }
        storage.mint_quotes.insert(quote.id.clone(), quote);
        Ok(())
    }

    async fn get_mint_quote(&self, quote_id: &str) -> Result<Option<MintQuote>, Error> {
        Ok(self.inner.read().await.mint_quotes.get(quote_id).cloned())
    }

    async fn update_mint_quote_state(
        &self,
        quote_id: &str,
        state: MintQuoteState,
    ) -> Result<MintQuoteState, Error> {
        let mut storage = self.inner.write().await;
        let quote = storage
            .mint_quotes
            .get_mut(quote_id)
            .ok_or(Error::UnknownQuote)?;
        let previous = quote.state;
        quote.state = state;
        if state == MintQuoteState::Paid && quote.paid_at.is_none() {
            quote.paid_at = Some(unix_time());
        }
        Ok(previous)
    }

    async fn set_mint_quote_deposit(
        &self,
        quote_id: &str,
        txid: &str,
        vout: u32,
    ) -> Result<(), Error> {
        let mut storage = self.inner.write().await;
        let quote = storage
            .mint_quotes
            .get_mut(quote_id)
            .ok_or(Error::UnknownQuote)?;
        quote.deposit_txid = Some(txid.to_string());
        quote.deposit_vout = Some(vout);
        Ok(())
    }

    async fn get_mint_quotes_by_state(
        &self,
        state: MintQuoteState,
        limit: usize,
    ) -> Result<Vec<MintQuote>, Error> {
        let storage = self.inner.read().await;
        let mut quotes: Vec<MintQuote> = storage
            .mint_quotes
            .values()
            .filter(|quote| quote.state == state)
            .cloned()
            .collect();
        quotes.sort_by_key(|quote| quote.created_at);
        quotes.truncate(limit);
        Ok(quotes)
    }

    async fn get_expired_mint_quotes(&self, now: u64) -> Result<Vec<MintQuote>, Error> {
        Ok(self
            .inner
            .read()
            .await
            .mint_quotes
            .values()
            .filter(|quote| quote.state == MintQuoteState::Unpaid && quote.expiry < now)
            .cloned()
            .collect())
    }

    async fn add_melt_quote(&self, quote: MeltQuote) -> Result<(), Error> {
        let mut storage = self.inner.write().await;
        if storage.melt_quotes.contains_key(&quote.id) {
            return Err(Error::Duplicate);
        }
        storage.melt_quotes.insert(quote.id.clone(), quote);
        Ok(())
    }

    async fn get_melt_quote(&self, quote_id: &str) -> Result<Option<MeltQuote>, Error> {
        Ok(self.inner.read().await.melt_quotes.get(quote_id).cloned())
    }

    async fn update_melt_quote_state(
        &self,
        quote_id: &str,
        state: MeltQuoteState,
    ) -> Result<MeltQuoteState, Error> {
        let mut storage = self.inner.write().await;
        let quote = storage
            .melt_quotes
            .get_mut(quote_id)
            .ok_or(Error::UnknownQuote)?;
        let previous = quote.state;
        quote.state = state;
        if state == MeltQuoteState::Paid && quote.paid_at.is_none() {
            quote.paid_at = Some(unix_time());
        }
        Ok(previous)
    }

    async fn set_melt_quote_withdrawal(
        &self,
        quote_id: &str,
        txid: &str,
        fee_paid: u64,
    ) -> Result<(), Error> {
        let mut storage = self.inner.write().await;
        let quote = storage
            .melt_quotes
            .get_mut(quote_id)
            .ok_or(Error::UnknownQuote)?;
        quote.withdrawal_txid = Some(txid.to_string());
        quote.fee_paid = Some(fee_paid);
        Ok(())
    }

    async fn get_melt_quotes_by_state(
        &self,
        state: MeltQuoteState,
        limit: usize,
    ) -> Result<Vec<MeltQuote>, Error> {
        let storage = self.inner.read().await;
        let mut quotes: Vec<MeltQuote> = storage
            .melt_quotes
            .values()
            .filter(|quote| quote.state == state)
            .cloned()
            .collect();
        quotes.sort_by_key(|quote| quote.created_at);
        quotes.truncate(limit);
        Ok(quotes)
    }

    async fn get_expired_melt_quotes(&self, now: u64) -> Result<Vec<MeltQuote>, Error> {
        Ok(self
            .inner
            .read()
            .await
            .melt_quotes
            .values()
            .filter(|quote| {
                quote.expiry < now
                    && matches!(
                        quote.state,
                        MeltQuoteState::Unpaid | MeltQuoteState::Pending
                    )
            })
            .cloned()
            .collect())
    }

    async fn add_spent_proofs(
        &self,
        proofs: &[Proof],
        ys: &[PublicKey],
        transaction_id: &str,
    ) -> Result<(), Error> {
        if proofs.len() != ys.len() {
            return Err(Error::Internal("proofs and ys length mismatch".to_string()));
        }

        let mut storage = self.inner.write().await;

        // Recheck under the write lock before any insert.
        for (proof, y) in proofs.iter().zip(ys) {
            if storage.proofs.contains_key(y) {
                return Err(Error::ProofAlreadySpent { y: y.to_hex() });
            }
            if let Some(existing_y) = storage.secret_index.get(proof.secret.as_str()) {
                if existing_y != y {
                    tracing::error!(
                        "secret index collision: one secret mapped to two Y values ({existing_y}, {y})"
                    );
                    return Err(Error::SecretCollision {
                        secret: proof.secret.to_string(),
                    });
                }
                return Err(Error::ProofAlreadySpent { y: y.to_hex() });
            }
        }

        let spent_at = unix_time();
        for (proof, y) in proofs.iter().zip(ys) {
            storage.secret_index.insert(proof.secret.to_string(), *y);
            storage.proofs.insert(
                *y,
                SpentProof {
                    y: *y,
                    keyset_id: proof.keyset_id,
                    amount: proof.amount,
                    secret: proof.secret.clone(),
                    c: proof.c,
                    witness: proof.witness.as_ref().map(|w| w.to_json_string()),
                    state: State::Spent,
                    spent_at,
                    transaction_id: transaction_id.to_string(),
                },
            );
        }
        Ok(())
    }

    async fn get_spent_proofs(
        &self,
        ys: &[PublicKey],
    ) -> Result<Vec<Option<SpentProof>>, Error> {
        let storage = self.inner.read().await;
        Ok(ys.iter().map(|y| storage.proofs.get(y).cloned()).collect())
    }

    async fn get_spent_proofs_by_keyset(
        &self,
        keyset_id: &Id,
    ) -> Result<Vec<SpentProof>, Error> {
        Ok(self
            .inner
            .read()
            .await
            .proofs
            .values()
            .filter(|proof| proof.keyset_id == *keyset_id)
            .cloned()
            .collect())
    }

    async fn remove_proofs_by_transaction_id(&self, transaction_id: &str) -> Result<u64, Error> {
        let mut storage = self.inner.write().await;
        let doomed: Vec<PublicKey> = storage
            .proofs
            .iter()
            .filter(|(_, proof)| proof.transaction_id == transaction_id)
            .map(|(y, _)| *y)
            .collect();
        for y in &doomed {
            if let Some(proof) = storage.proofs.remove(y) {
                storage.secret_index.remove(proof.secret.as_str());
            }
        }
        Ok(doomed.len() as u64)
    }

    async fn add_blind_signatures(
        &self,
        blinded_secrets: &[PublicKey],
        signatures: &[BlindSignature],
        quote_id: Option<&str>,
    ) -> Result<(), Error> {
        let mut storage = self.inner.write().await;
        for blinded in blinded_secrets {
            if storage.blind_signatures.contains_key(blinded) {
                return Err(Error::Duplicate);
            }
        }
        for (blinded, signature) in blinded_secrets.iter().zip(signatures) {
            storage.blind_signatures.insert(*blinded, *signature);
        }
        if let Some(quote_id) = quote_id {
            storage
                .quote_signatures
                .insert(quote_id.to_string(), signatures.to_vec());
        }
        Ok(())
    }

    async fn get_blind_signatures(
        &self,
        blinded_secrets: &[PublicKey],
    ) -> Result<Vec<Option<BlindSignature>>, Error> {
        let storage = self.inner.read().await;
        Ok(blinded_secrets
            .iter()
            .map(|blinded| storage.blind_signatures.get(blinded).copied())
            .collect())
    }

    async fn get_blind_signatures_for_keyset(
        &self,
        keyset_id: &Id,
    ) -> Result<Vec<BlindSignature>, Error> {
        Ok(self
            .inner
            .read()
            .await
            .blind_signatures
            .values()
            .filter(|signature| signature.keyset_id == *keyset_id)
            .copied()
            .collect())
    }

    async fn add_reserve_utxo(&self, utxo: ReserveUtxo) -> Result<bool, Error> {
        let mut storage = self.inner.write().await;
        let key = utxo.outpoint_key();
        if storage.reserve_utxos.contains_key(&key) {
            return Ok(false);
        }
        storage.reserve_utxos.insert(key, utxo);
        Ok(true)
    }

    async fn get_reserve_utxo(
        &self,
        txid: &str,
        vout: u32,
    ) -> Result<Option<ReserveUtxo>, Error> {
        Ok(self
            .inner
            .read()
            .await
            .reserve_utxos
            .get(&outpoint_key(txid, vout))
            .cloned())
    }

    async fn mark_reserve_utxo_spent(
        &self,
        txid: &str,
        vout: u32,
        spent_in_txid: &str,
    ) -> Result<(), Error> {
        let mut storage = self.inner.write().await;
        let utxo = storage
            .reserve_utxos
            .get_mut(&outpoint_key(txid, vout))
            .ok_or_else(|| Error::Internal(format!("unknown reserve utxo {txid}:{vout}")))?;
        utxo.spent = true;
        utxo.spent_in_txid = Some(spent_in_txid.to_string());
        Ok(())
    }

    async fn get_unspent_reserve_utxos(
        &self,
        asset_id: &AssetId,
    ) -> Result<Vec<ReserveUtxo>, Error> {
        Ok(self
            .inner
            .read()
            .await
            .reserve_utxos
            .values()
            .filter(|utxo| !utxo.spent && utxo.asset_id == *asset_id)
            .cloned()
            .collect())
    }

    async fn get_spent_reserve_keys(&self) -> Result<std::collections::HashSet<String>, Error> {
        Ok(self
            .inner
            .read()
            .await
            .reserve_utxos
            .values()
            .filter(|utxo| utxo.spent)
            .map(ReserveUtxo::outpoint_key)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runemint_protocol::{Amount, Secret, SecretKey};

    fn test_proof(fill: u8, secret: &str) -> (Proof, PublicKey) {
        let proof = Proof {
            amount: Amount::from(1),
            keyset_id: "00aa00aa00aa00".parse().expect("id"),
            secret: Secret::new(secret),
            c: SecretKey::from_slice(&[fill; 32]).expect("key").public_key(),
            witness: None,
        };
        let y = proof.y().expect("y");
        (proof, y)
    }

    #[tokio::test]
    async fn double_spend_is_rejected_atomically() {
        let db = MintMemoryDatabase::new();
        let (proof, y) = test_proof(1, "secret-a");

        db.add_spent_proofs(&[proof.clone()], &[y], "swap_1")
            .await
            .expect("first spend");

        let err = db
            .add_spent_proofs(&[proof], &[y], "swap_2")
            .await
            .expect_err("second spend");
        assert!(matches!(err, Error::ProofAlreadySpent { .. }));
    }

    #[tokio::test]
    async fn batch_spend_is_all_or_nothing() {
        let db = MintMemoryDatabase::new();
        let (spent, spent_y) = test_proof(1, "already-spent");
        db.add_spent_proofs(&[spent.clone()], &[spent_y], "melt_a")
            .await
            .expect("prime");

        let (fresh, fresh_y) = test_proof(2, "fresh");
        let err = db
            .add_spent_proofs(
                &[fresh.clone(), spent],
                &[fresh_y, spent_y],
                "melt_b",
            )
            .await
            .expect_err("batch with a spent member");
        assert!(matches!(err, Error::ProofAlreadySpent { .. }));

        // The fresh proof must not have been written.
        let states = db.get_spent_proofs(&[fresh_y]).await.expect("lookup");
        assert!(states[0].is_none());
    }

    #[tokio::test]
    async fn revert_by_transaction_id_is_observable() {
        let db = MintMemoryDatabase::new();
        let (a, ya) = test_proof(1, "m-a");
        let (b, yb) = test_proof(2, "m-b");
        db.add_spent_proofs(&[a.clone(), b.clone()], &[ya, yb], "melt_x")
            .await
            .expect("spend");

        let removed = db
            .remove_proofs_by_transaction_id("melt_x")
            .await
            .expect("revert");
        assert_eq!(removed, 2);

        let states = db.get_spent_proofs(&[ya, yb]).await.expect("lookup");
        assert!(states.iter().all(Option::is_none));

        // And the proofs are spendable again.
        db.add_spent_proofs(&[a], &[ya], "swap_y")
            .await
            .expect("respend after revert");
    }

    #[tokio::test]
    async fn active_keyset_uniqueness_resolves_create_race() {
        let db = MintMemoryDatabase::new();
        let asset: AssetId = "840000:1".parse().expect("asset");
        let unit = CurrencyUnit::Custom("UNIT".into());

        let keyset = |id: &str| StoredKeyset {
            id: id.parse().expect("id"),
            unit: unit.clone(),
            asset_id: asset,
            active: true,
            public_keys: Default::default(),
            encrypted_keys: Default::default(),
            input_fee_ppk: 0,
            final_expiry: None,
            created_at: 0,
        };

        db.add_keyset(keyset("00aa00aa00aa00")).await.expect("first");
        let err = db.add_keyset(keyset("00bb00bb00bb00")).await;
        assert!(matches!(err, Err(Error::Duplicate)));

        let active = db
            .get_active_keyset(&asset, &unit)
            .await
            .expect("lookup")
            .expect("active");
        assert_eq!(active.id.to_string(), "00aa00aa00aa00");
    }

    #[tokio::test]
    async fn blind_signature_replay_is_rejected() {
        let db = MintMemoryDatabase::new();
        let blinded = SecretKey::from_slice(&[3; 32]).expect("key").public_key();
        let signature = BlindSignature {
            amount: Amount::from(1),
            keyset_id: "00aa00aa00aa00".parse().expect("id"),
            c: SecretKey::from_slice(&[4; 32]).expect("key").public_key(),
        };

        db.add_blind_signatures(&[blinded], &[signature], None)
            .await
            .expect("first");
        assert!(matches!(
            db.add_blind_signatures(&[blinded], &[signature], None).await,
            Err(Error::Duplicate)
        ));
    }
}
