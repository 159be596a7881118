//! Shared types and seams for the runemint mint.
//!
//! This crate defines the contracts between the mint services and their
//! collaborators: the storage backend, the chain view, the signatory, the
//! quote records and the error taxonomy. Implementations live elsewhere.

pub mod chain;
pub mod config;
pub mod database;
pub mod error;
pub mod mint;
pub mod quote;
pub mod signatory;

pub use chain::{ChainView, DepositAddressProvider};
pub use config::{DepositMonitorConfig, MintConfig, MintMeltLimits};
pub use database::MintDatabase;
pub use error::{Error, ErrorResponse};
pub use mint::{outpoint_key, ReserveUtxo, SpentProof, StoredKeyset};
pub use quote::{MeltQuote, MeltQuoteResponse, MintQuote, MintQuoteResponse};
pub use signatory::Signatory;
