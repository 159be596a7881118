//! The signatory seam.
//!
//! All key-related operations go through this trait so the key material can
//! live in-process or behind a boundary without the services caring.

use async_trait::async_trait;

use runemint_protocol::{
    AssetId, BlindSignature, BlindedMessage, CurrencyUnit, Id, KeySet, KeySetInfo, KeysResponse,
    KeysetResponse, Proof,
};

use crate::error::Error;

/// Key operations the mint services depend on.
#[async_trait]
pub trait Signatory: Send + Sync {
    /// Generate, persist and activate a keyset for an asset and unit.
    ///
    /// Concurrent generation for the same `(asset_id, unit)` may race; the
    /// loser of the storage-level uniqueness check reloads and returns the
    /// winner's keyset.
    async fn generate_keyset(
        &self,
        asset_id: AssetId,
        unit: CurrencyUnit,
    ) -> Result<KeySetInfo, Error>;

    /// Sign one blinded message: `C_ = k·B_`.
    async fn blind_sign(&self, message: BlindedMessage) -> Result<BlindSignature, Error>;

    /// Sign a batch; fails as a whole if any element fails.
    async fn blind_sign_batch(
        &self,
        messages: Vec<BlindedMessage>,
    ) -> Result<Vec<BlindSignature>, Error>;

    /// Verify a proof's signature and, for condition-bearing secrets, its
    /// spending conditions.
    async fn verify_proof(&self, proof: Proof) -> Result<(), Error>;

    /// Fetch one keyset's public keys.
    async fn keyset(&self, id: Id) -> Result<Option<KeySet>, Error>;

    /// Public keys of one keyset, response-shaped.
    async fn keyset_pubkeys(&self, id: Id) -> Result<KeysResponse, Error>;

    /// Public keys of every active keyset.
    async fn pubkeys(&self) -> Result<KeysResponse, Error>;

    /// Metadata of every keyset, active or not.
    async fn keysets(&self) -> Result<KeysetResponse, Error>;

    /// The active keyset for an asset and unit, if one exists.
    async fn active_keyset(
        &self,
        asset_id: &AssetId,
        unit: &CurrencyUnit,
    ) -> Result<Option<KeySetInfo>, Error>;

    /// Stop signing with a keyset; verification of old proofs keeps working.
    async fn deactivate_keyset(&self, id: Id) -> Result<(), Error>;
}
