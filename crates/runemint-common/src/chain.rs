//! The chain-view seam.
//!
//! The indexer and mempool services behind these calls are external; the
//! mint sees only this trait. All calls may fail transiently and are wrapped
//! in [`with_retry`] by callers that need the backoff policy.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use runemint_protocol::{Amount, AssetId};

/// Chain-view error
#[derive(Debug, Error)]
pub enum Error {
    /// Worth retrying
    #[error("transient chain error: {0}")]
    Transient(String),
    /// Retrying will not help
    #[error("chain error: {0}")]
    Permanent(String),
}

/// Rune balance entry reported for an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuneBalance {
    /// Rune name
    pub name: String,
    /// Decimal string amount
    pub amount: String,
    /// Display symbol
    pub symbol: Option<String>,
}

/// Outputs and rune balances at an address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressOutputs {
    /// Outpoints as `txid:vout`
    pub outputs: Vec<String>,
    /// Aggregate rune balances at the address
    pub rune_balances: Vec<RuneBalance>,
}

/// Rune content of one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuneAmount {
    /// Amount in the smallest rune unit
    pub amount: u128,
    /// The rune's `block:tx` id
    pub id: AssetId,
}

/// Details of one output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDetails {
    /// Bitcoin value
    pub value_sats: u64,
    /// Rune name to content
    pub runes: HashMap<String, RuneAmount>,
}

/// Confirmation status of a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStatus {
    /// Whether the transaction is in a block
    pub confirmed: bool,
    /// Height of that block
    pub block_height: Option<u64>,
}

/// A transaction as the mint cares about it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInfo {
    /// Confirmation status
    pub status: TxStatus,
}

/// Whether an output has been spent on-chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outspend {
    /// Spent flag
    pub spent: bool,
    /// The spending transaction, when known
    pub txid: Option<String>,
}

/// Read and broadcast access to the chain.
#[async_trait]
pub trait ChainView: Send + Sync {
    /// Every output currently at an address, with aggregate rune balances.
    async fn address_outputs(&self, address: &str) -> Result<AddressOutputs, Error>;

    /// Value and rune contents of one output.
    async fn output_details(&self, txid: &str, vout: u32) -> Result<OutputDetails, Error>;

    /// Confirmation status of a transaction.
    async fn transaction(&self, txid: &str) -> Result<TransactionInfo, Error>;

    /// Spend status of an output.
    async fn outspend(&self, txid: &str, vout: u32) -> Result<Outspend, Error>;

    /// Current chain tip height.
    async fn block_height(&self) -> Result<u64, Error>;

    /// Submit a raw transaction; returns the txid the backend computed.
    async fn broadcast(&self, raw_tx_hex: &str) -> Result<String, Error>;

    /// Raw hex of a transaction.
    async fn tx_hex(&self, txid: &str) -> Result<String, Error>;
}

/// Produces deposit addresses for mint quotes.
///
/// Current policy returns the mint's single taproot address for every quote.
#[async_trait]
pub trait DepositAddressProvider: Send + Sync {
    /// The address a quote's deposit must pay to.
    async fn create_deposit_address(
        &self,
        quote_id: &str,
        amount: Amount,
        asset_id: &AssetId,
    ) -> Result<String, Error>;
}

/// Retry schedule for transient chain-view failures: three retries with
/// exponential backoff (1 s, 2 s, 4 s), each capped at 10 s.
const MAX_RETRIES: u32 = 3;
const BACKOFF_CAP: Duration = Duration::from_secs(10);

/// Run a chain-view call with the standard retry policy.
pub async fn with_retry<T, F, Fut>(operation: &str, mut call: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt: u32 = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(Error::Permanent(detail)) => return Err(Error::Permanent(detail)),
            Err(Error::Transient(detail)) => {
                if attempt >= MAX_RETRIES {
                    tracing::warn!("{operation} failed after {attempt} retries: {detail}");
                    return Err(Error::Transient(detail));
                }
                let backoff = Duration::from_secs(1 << attempt).min(BACKOFF_CAP);
                tracing::debug!(
                    "{operation} failed transiently, retrying in {}s: {detail}",
                    backoff.as_secs()
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_from_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry("op", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::Transient("flaky".into()))
            } else {
                Ok(7u32)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_three_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = with_retry("op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Transient("down".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn permanent_errors_do_not_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = with_retry("op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Permanent("nope".into()))
        })
        .await;
        assert!(matches!(result, Err(Error::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
