//! The reserve tracker.
//!
//! Persistent per-UTXO accounting of the mint-owned rune outputs that back
//! outstanding proofs. The sum of unspent rows per asset is the usable
//! reserve; issuance must never exceed it.

use std::collections::HashSet;
use std::sync::Arc;

use runemint_common::database::MintDatabase;
use runemint_common::{Error, ReserveUtxo};
use runemint_protocol::AssetId;

/// Tracks mint-owned reserve UTXOs in storage.
#[derive(Clone)]
pub struct ReserveTracker {
    db: Arc<dyn MintDatabase>,
}

impl std::fmt::Debug for ReserveTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReserveTracker").finish_non_exhaustive()
    }
}

impl ReserveTracker {
    /// Wrap a storage backend.
    pub fn new(db: Arc<dyn MintDatabase>) -> Self {
        Self { db }
    }

    /// Insert a UTXO; a primary-key collision is a no-op. Returns whether a
    /// row was added.
    pub async fn add_utxo(&self, utxo: ReserveUtxo) -> Result<bool, Error> {
        let added = self.db.add_reserve_utxo(utxo.clone()).await?;
        if added {
            tracing::debug!(
                "tracking reserve utxo {} with {} {}",
                utxo.outpoint_key(),
                utxo.amount,
                utxo.asset_id
            );
        }
        Ok(added)
    }

    /// Whether an outpoint is already tracked.
    pub async fn is_tracked(&self, txid: &str, vout: u32) -> Result<bool, Error> {
        Ok(self.db.get_reserve_utxo(txid, vout).await?.is_some())
    }

    /// Mark a UTXO consumed by a withdrawal.
    pub async fn mark_spent(
        &self,
        txid: &str,
        vout: u32,
        spent_in_txid: &str,
    ) -> Result<(), Error> {
        self.db
            .mark_reserve_utxo_spent(txid, vout, spent_in_txid)
            .await?;
        tracing::debug!("reserve utxo {txid}:{vout} spent in {spent_in_txid}");
        Ok(())
    }

    /// Unspent rows for an asset.
    pub async fn unspent(&self, asset_id: &AssetId) -> Result<Vec<ReserveUtxo>, Error> {
        Ok(self.db.get_unspent_reserve_utxos(asset_id).await?)
    }

    /// Sum of rune amounts over unspent rows: the usable reserve.
    pub async fn balance(&self, asset_id: &AssetId) -> Result<u128, Error> {
        Ok(self
            .unspent(asset_id)
            .await?
            .iter()
            .map(|utxo| utxo.amount)
            .sum())
    }

    /// `txid:vout` keys of every spent row, for selector exclusion.
    pub async fn spent_keys(&self) -> Result<HashSet<String>, Error> {
        Ok(self.db.get_spent_reserve_keys().await?)
    }

    /// Insert-if-absent for a batch observed on-chain. Existing rows are
    /// never updated. Returns how many rows were added.
    pub async fn sync_from_chain(&self, utxos: Vec<ReserveUtxo>) -> Result<usize, Error> {
        let mut added = 0;
        for utxo in utxos {
            if self.add_utxo(utxo).await? {
                added += 1;
            }
        }
        Ok(added)
    }
}
