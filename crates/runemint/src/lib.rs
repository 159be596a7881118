//! A custodial Cashu mint backed one-to-one by a Runes asset.
//!
//! Deposits of the on-chain asset are exchanged for unlinkable blind-signed
//! proofs; proofs can be swapped, checked for spentness, and redeemed back
//! on-chain. Three guarantees hold throughout: every signed proof is backed
//! by confirmed reserves, no proof spends twice, and no redemption settles
//! without cryptographically valid proofs.

use std::collections::HashMap;
use std::sync::Arc;

use runemint_chain::{MintWallet, ReserveTracker};
use runemint_common::database::MintDatabase;
use runemint_common::{ChainView, Error, MintConfig, Signatory};
use runemint_protocol::{
    Amount, CurrencyUnit, Id, KeySet, KeySetInfo, KeysResponse, KeysetResponse,
};
use runemint_signatory::MemorySignatory;

mod check_spendable;
mod deposit;
mod melt;
pub mod memory;
mod mint;
mod swap;
mod utxo_sync;
mod verification;

pub use runemint_chain as chain;
pub use runemint_common as common;
pub use runemint_protocol as protocol;
pub use runemint_signatory as signatory;

/// The mint: three state machines (mint, swap, melt) over shared storage,
/// a signatory, a chain view and the reserve tracker.
#[derive(Clone)]
pub struct Mint {
    /// Storage backend
    pub localstore: Arc<dyn MintDatabase>,
    /// Key operations
    pub signatory: Arc<dyn Signatory>,
    /// Chain access
    pub chain: Arc<dyn ChainView>,
    /// On-chain wallet
    pub wallet: Arc<MintWallet>,
    /// Reserve accounting
    pub reserve: ReserveTracker,
    config: MintConfig,
}

impl std::fmt::Debug for Mint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mint")
            .field("asset_id", &self.config.asset_id)
            .field("unit", &self.config.unit)
            .finish_non_exhaustive()
    }
}

impl Mint {
    /// Create a mint over a storage backend and a chain view.
    ///
    /// Runs one reserve reconciliation pass before serving so the tracker
    /// reflects the chain; reconciliation errors are logged, not fatal.
    pub async fn new(
        config: MintConfig,
        localstore: Arc<dyn MintDatabase>,
        chain: Arc<dyn ChainView>,
    ) -> Result<Self, Error> {
        let wallet = Arc::new(MintWallet::from_seed(&config.seed, config.network)?);
        let signatory = Arc::new(MemorySignatory::new(
            localstore.clone(),
            config.seed,
            config.encryption_key,
        ));
        let reserve = ReserveTracker::new(localstore.clone());

        let mint = Self {
            localstore,
            signatory,
            chain,
            wallet,
            reserve,
            config,
        };

        if let Err(e) = mint.sync_reserve_once().await {
            tracing::warn!("startup reserve reconciliation failed: {e}");
        }

        Ok(mint)
    }

    /// The mint's configuration.
    pub fn config(&self) -> &MintConfig {
        &self.config
    }

    /// Make sure an active keyset exists for the configured asset and unit,
    /// generating one when missing.
    pub(crate) async fn ensure_active_keyset(&self) -> Result<KeySetInfo, Error> {
        if let Some(keyset) = self
            .signatory
            .active_keyset(&self.config.asset_id, &self.config.unit)
            .await?
        {
            return Ok(keyset);
        }
        self.signatory
            .generate_keyset(self.config.asset_id, self.config.unit.clone())
            .await
    }

    /// Public keys of every active keyset.
    pub async fn pubkeys(&self) -> Result<KeysResponse, Error> {
        self.signatory.pubkeys().await
    }

    /// Public keys of one keyset.
    pub async fn keyset_pubkeys(&self, keyset_id: &Id) -> Result<KeysResponse, Error> {
        self.signatory.keyset_pubkeys(*keyset_id).await
    }

    /// One keyset, if known.
    pub async fn keyset(&self, keyset_id: &Id) -> Result<Option<KeySet>, Error> {
        self.signatory.keyset(*keyset_id).await
    }

    /// Metadata of every keyset.
    pub async fn keysets(&self) -> Result<KeysetResponse, Error> {
        self.signatory.keysets().await
    }

    /// Deactivate the active keyset and generate its successor.
    pub async fn rotate_keyset(&self) -> Result<KeySetInfo, Error> {
        if let Some(current) = self
            .signatory
            .active_keyset(&self.config.asset_id, &self.config.unit)
            .await?
        {
            self.signatory.deactivate_keyset(current.id).await?;
        }
        self.signatory
            .generate_keyset(self.config.asset_id, self.config.unit.clone())
            .await
    }

    /// Total amount issued per keyset, from the stored blind signatures.
    pub async fn total_issued(&self) -> Result<HashMap<Id, Amount>, Error> {
        let keysets = self.signatory.keysets().await?;
        let mut totals = HashMap::new();
        for keyset in keysets.keysets {
            let signatures = self
                .localstore
                .get_blind_signatures_for_keyset(&keyset.id)
                .await?;
            let total = Amount::try_sum(signatures.iter().map(|s| s.amount))?;
            totals.insert(keyset.id, total);
        }
        Ok(totals)
    }

    /// Total amount redeemed per keyset, from the spent-proof rows.
    pub async fn total_redeemed(&self) -> Result<HashMap<Id, Amount>, Error> {
        let keysets = self.signatory.keysets().await?;
        let mut totals = HashMap::new();
        for keyset in keysets.keysets {
            let proofs = self
                .localstore
                .get_spent_proofs_by_keyset(&keyset.id)
                .await?;
            let total = Amount::try_sum(proofs.iter().map(|p| p.amount))?;
            totals.insert(keyset.id, total);
        }
        Ok(totals)
    }

    pub(crate) fn unit(&self) -> &CurrencyUnit {
        &self.config.unit
    }
}
