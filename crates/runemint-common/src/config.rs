//! Process-wide mint configuration.

use std::time::Duration;

use bitcoin::Network;

use runemint_protocol::{Amount, AssetId, CurrencyUnit};

/// Amount range validators for mint and melt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintMeltLimits {
    /// Smallest mintable amount
    pub min_mint: Amount,
    /// Largest mintable amount
    pub max_mint: Amount,
    /// Smallest meltable amount
    pub min_melt: Amount,
    /// Largest meltable amount
    pub max_melt: Amount,
}

impl Default for MintMeltLimits {
    fn default() -> Self {
        Self {
            min_mint: Amount::from(1),
            max_mint: Amount::from(1_000_000),
            min_melt: Amount::from(1),
            max_melt: Amount::from(1_000_000),
        }
    }
}

/// Deposit-monitor pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositMonitorConfig {
    /// Time between scans
    pub poll_interval: Duration,
    /// UNPAID quotes examined per scan
    pub batch_size: usize,
    /// Quotes older than this are skipped, milliseconds
    pub max_age_ms: u64,
}

impl Default for DepositMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            batch_size: 50,
            max_age_ms: 24 * 60 * 60 * 1000,
        }
    }
}

/// Everything the mint needs to run against one asset.
#[derive(Clone)]
pub struct MintConfig {
    /// 32-byte master secret; derives keyset entropy and wallet keys
    pub seed: [u8; 32],
    /// AES-256 key for at-rest private-key encryption
    pub encryption_key: [u8; 32],
    /// The backing asset's `block:tx` id
    pub asset_id: AssetId,
    /// Display name used in chain-view lookups
    pub asset_name: String,
    /// Unit label quotes and keysets are denominated in
    pub unit: CurrencyUnit,
    /// Network addresses render for
    pub network: Network,
    /// Amount range validators
    pub limits: MintMeltLimits,
    /// Confirmations required before issuance
    pub mint_confirmations: u64,
    /// Deposit-monitor pacing
    pub deposit_monitor: DepositMonitorConfig,
    /// Time between reserve reconciliation passes
    pub utxo_sync_interval: Duration,
}

impl std::fmt::Debug for MintConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The seed and encryption key never reach logs.
        f.debug_struct("MintConfig")
            .field("asset_id", &self.asset_id)
            .field("asset_name", &self.asset_name)
            .field("unit", &self.unit)
            .field("network", &self.network)
            .field("limits", &self.limits)
            .field("mint_confirmations", &self.mint_confirmations)
            .field("deposit_monitor", &self.deposit_monitor)
            .field("utxo_sync_interval", &self.utxo_sync_interval)
            .finish_non_exhaustive()
    }
}

impl MintConfig {
    /// A config with the standard defaults for everything but the secrets
    /// and the asset.
    pub fn new(
        seed: [u8; 32],
        encryption_key: [u8; 32],
        asset_id: AssetId,
        asset_name: impl Into<String>,
        unit: CurrencyUnit,
        network: Network,
    ) -> Self {
        Self {
            seed,
            encryption_key,
            asset_id,
            asset_name: asset_name.into(),
            unit,
            network,
            limits: MintMeltLimits::default(),
            mint_confirmations: 1,
            deposit_monitor: DepositMonitorConfig::default(),
            utxo_sync_interval: Duration::from_secs(5 * 60),
        }
    }
}
