//! Storage trait for the mint.
//!
//! One backend owns all five tables (keysets, mint quotes, melt quotes,
//! proofs, reserve UTXOs). The services never touch rows directly; all
//! contention is mediated here. `add_spent_proofs` is the single operation
//! that must be atomic: concurrent spends of one proof produce exactly one
//! success and one [`Error::ProofAlreadySpent`].

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use runemint_protocol::{
    AssetId, BlindSignature, CurrencyUnit, Id, MeltQuoteState, MintQuoteState, Proof, PublicKey,
};

use crate::mint::{ReserveUtxo, SpentProof, StoredKeyset};
use crate::quote::{MeltQuote, MintQuote};

/// Storage error
#[derive(Debug, Error)]
pub enum Error {
    /// No quote with the requested id
    #[error("unknown quote")]
    UnknownQuote,
    /// A uniqueness constraint rejected the write
    #[error("duplicate entry")]
    Duplicate,
    /// The proof keyed by this `Y` is already recorded as spent
    #[error("proof already spent: {y}")]
    ProofAlreadySpent {
        /// Offending `Y` in compressed hex
        y: String,
    },
    /// Two different `Y` values mapped to one secret; hash-to-curve is broken
    #[error("secret uniqueness violated for secret: {secret}")]
    SecretCollision {
        /// Offending secret
        secret: String,
    },
    /// Backend failure
    #[error("database error: {0}")]
    Internal(String),
}

/// Mint storage backend.
#[async_trait]
pub trait MintDatabase: Send + Sync {
    // -------- keysets --------

    /// Persist a keyset.
    ///
    /// Fails with [`Error::Duplicate`] when an active keyset for the same
    /// `(asset_id, unit)` already exists; the caller resolves the
    /// concurrent-create race by reloading.
    async fn add_keyset(&self, keyset: StoredKeyset) -> Result<(), Error>;

    /// Fetch a keyset by id.
    async fn get_keyset(&self, id: &Id) -> Result<Option<StoredKeyset>, Error>;

    /// All keysets.
    async fn get_keysets(&self) -> Result<Vec<StoredKeyset>, Error>;

    /// The active keyset for an asset and unit, if any.
    async fn get_active_keyset(
        &self,
        asset_id: &AssetId,
        unit: &CurrencyUnit,
    ) -> Result<Option<StoredKeyset>, Error>;

    /// Flip a keyset's active flag.
    async fn set_keyset_active(&self, id: &Id, active: bool) -> Result<(), Error>;

    // -------- mint quotes --------

    /// Insert a mint quote.
    async fn add_mint_quote(&self, quote: MintQuote) -> Result<(), Error>;

    /// Fetch a mint quote.
    async fn get_mint_quote(&self, quote_id: &str) -> Result<Option<MintQuote>, Error>;

    /// Write a mint quote's state, returning the previous state.
    ///
    /// Writes `paid_at` when moving to PAID. The store does not police
    /// transition legality; the services do.
    async fn update_mint_quote_state(
        &self,
        quote_id: &str,
        state: MintQuoteState,
    ) -> Result<MintQuoteState, Error>;

    /// Record the matched deposit outpoint on a mint quote.
    async fn set_mint_quote_deposit(
        &self,
        quote_id: &str,
        txid: &str,
        vout: u32,
    ) -> Result<(), Error>;

    /// Mint quotes in a state, oldest first, bounded.
    async fn get_mint_quotes_by_state(
        &self,
        state: MintQuoteState,
        limit: usize,
    ) -> Result<Vec<MintQuote>, Error>;

    /// UNPAID mint quotes whose expiry has passed.
    async fn get_expired_mint_quotes(&self, now: u64) -> Result<Vec<MintQuote>, Error>;

    // -------- melt quotes --------

    /// Insert a melt quote.
    async fn add_melt_quote(&self, quote: MeltQuote) -> Result<(), Error>;

    /// Fetch a melt quote.
    async fn get_melt_quote(&self, quote_id: &str) -> Result<Option<MeltQuote>, Error>;

    /// Write a melt quote's state, returning the previous state.
    ///
    /// Writes `paid_at` when moving to PAID.
    async fn update_melt_quote_state(
        &self,
        quote_id: &str,
        state: MeltQuoteState,
    ) -> Result<MeltQuoteState, Error>;

    /// Record the broadcast withdrawal on a melt quote.
    async fn set_melt_quote_withdrawal(
        &self,
        quote_id: &str,
        txid: &str,
        fee_paid: u64,
    ) -> Result<(), Error>;

    /// Melt quotes in a state, oldest first, bounded.
    async fn get_melt_quotes_by_state(
        &self,
        state: MeltQuoteState,
        limit: usize,
    ) -> Result<Vec<MeltQuote>, Error>;

    /// UNPAID or PENDING melt quotes whose expiry has passed.
    async fn get_expired_melt_quotes(&self, now: u64) -> Result<Vec<MeltQuote>, Error>;

    // -------- proofs --------

    /// Atomically record proofs as spent.
    ///
    /// Rechecks inside the storage transaction: if any `Y` already has a
    /// non-UNSPENT row the whole batch fails with
    /// [`Error::ProofAlreadySpent`] and nothing is written. A row whose
    /// secret collides with a different `Y` fails with
    /// [`Error::SecretCollision`].
    async fn add_spent_proofs(
        &self,
        proofs: &[Proof],
        ys: &[PublicKey],
        transaction_id: &str,
    ) -> Result<(), Error>;

    /// Spent-proof rows for the requested `Y` values, in request order;
    /// `None` for `Y` values never seen.
    async fn get_spent_proofs(&self, ys: &[PublicKey]) -> Result<Vec<Option<SpentProof>>, Error>;

    /// Spent-proof rows recorded under a keyset.
    async fn get_spent_proofs_by_keyset(&self, keyset_id: &Id)
        -> Result<Vec<SpentProof>, Error>;

    /// Delete every row written under a transaction id, returning the count.
    ///
    /// Used to revert a melt whose broadcast failed; deletion is immediately
    /// observable to subsequent reads.
    async fn remove_proofs_by_transaction_id(&self, transaction_id: &str) -> Result<u64, Error>;

    // -------- blind signatures --------

    /// Record issued blind signatures keyed by `B_`.
    ///
    /// Fails with [`Error::Duplicate`] if any `B_` was signed before.
    async fn add_blind_signatures(
        &self,
        blinded_secrets: &[PublicKey],
        signatures: &[BlindSignature],
        quote_id: Option<&str>,
    ) -> Result<(), Error>;

    /// Issued signatures for the requested `B_` values, in request order.
    async fn get_blind_signatures(
        &self,
        blinded_secrets: &[PublicKey],
    ) -> Result<Vec<Option<BlindSignature>>, Error>;

    /// All signatures issued under a keyset.
    async fn get_blind_signatures_for_keyset(
        &self,
        keyset_id: &Id,
    ) -> Result<Vec<BlindSignature>, Error>;

    // -------- reserve UTXOs --------

    /// Insert a reserve UTXO; a primary-key collision is a no-op.
    ///
    /// Returns whether a row was added.
    async fn add_reserve_utxo(&self, utxo: ReserveUtxo) -> Result<bool, Error>;

    /// Fetch one reserve UTXO by outpoint.
    async fn get_reserve_utxo(
        &self,
        txid: &str,
        vout: u32,
    ) -> Result<Option<ReserveUtxo>, Error>;

    /// Mark a reserve UTXO as consumed by a withdrawal.
    async fn mark_reserve_utxo_spent(
        &self,
        txid: &str,
        vout: u32,
        spent_in_txid: &str,
    ) -> Result<(), Error>;

    /// Unspent reserve UTXOs carrying an asset.
    async fn get_unspent_reserve_utxos(
        &self,
        asset_id: &AssetId,
    ) -> Result<Vec<ReserveUtxo>, Error>;

    /// `txid:vout` keys of every spent reserve UTXO.
    async fn get_spent_reserve_keys(&self) -> Result<HashSet<String>, Error>;
}
