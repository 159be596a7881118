//! The mint error taxonomy.
//!
//! Every user-visible error carries an integer code in the protocol ranges:
//! 10000 quote, 11000 proof, 12000 amount, 13000 keyset, 14000 on-chain.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use runemint_protocol::amount::Amount;
use runemint_protocol::{dhke, p2pk};

use crate::database;

/// Mint error
#[derive(Debug, Error)]
pub enum Error {
    // Quote errors (10000)
    /// No quote with the requested id
    #[error("quote not found: {0}")]
    QuoteNotFound(String),
    /// The quote's expiry has passed
    #[error("quote expired: {0}")]
    QuoteExpired(String),
    /// The quote has not been paid
    #[error("quote not paid: {0}")]
    QuoteNotPaid(String),
    /// Signatures were already issued for the quote
    #[error("quote already issued: {0}")]
    AlreadyIssued(String),
    /// The quote is being settled by another request
    #[error("quote pending: {0}")]
    QuotePending(String),

    // Proof errors (11000)
    /// A proof was already spent
    #[error("proof already spent: {y}")]
    ProofAlreadySpent {
        /// `Y = hash_to_curve(secret)` of the offending proof
        y: String,
    },
    /// A proof failed blind-signature verification
    #[error("invalid proof for secret: {secret}")]
    InvalidProof {
        /// The offending secret
        secret: String,
    },
    /// A P2PK spending condition was not satisfied
    #[error("P2PK verification failed: {0}")]
    P2PKVerificationFailed(String),
    /// The same proof appears more than once in one request
    #[error("duplicate inputs in request")]
    DuplicateInputs,
    /// The blinded message was signed before
    #[error("blinded message already signed: {0}")]
    OutputAlreadySigned(String),

    // Amount errors (12000)
    /// An expected and an observed amount disagree
    #[error("amount mismatch: expected {expected}, actual {actual}")]
    AmountMismatch {
        /// What the quote requires
        expected: u64,
        /// What was provided or observed
        actual: u64,
    },
    /// Amount outside the configured mint/melt range
    #[error("amount {amount} outside allowed range [{min}, {max}]")]
    AmountOutOfRange {
        /// Offending amount
        amount: u64,
        /// Lower bound
        min: u64,
        /// Upper bound
        max: u64,
    },
    /// Amount arithmetic overflowed
    #[error("amount overflow")]
    AmountOverflow,

    // Keyset errors (13000)
    /// No keyset with the requested id
    #[error("keyset not found: {0}")]
    KeysetNotFound(String),
    /// The keyset is no longer signing
    #[error("keyset inactive: {0}")]
    KeysetInactive(String),
    /// The amount is not a denomination of the keyset
    #[error("no key for amount {0}")]
    UnknownDenomination(Amount),
    /// Blind signing failed
    #[error("signing failed: {0}")]
    SignFailed(String),
    /// Inputs or outputs span more than one unit
    #[error("request mixes more than one unit")]
    MultipleUnits,

    // On-chain errors (14000)
    /// Deposit lacks the required confirmations
    #[error("insufficient confirmations: have {have}, need {need}")]
    InsufficientConfirmations {
        /// Confirmations observed
        have: u64,
        /// Confirmations required
        need: u64,
    },
    /// The reserve cannot cover the withdrawal
    #[error("insufficient funds for withdrawal")]
    InsufficientFunds,
    /// The broadcast txid did not match the locally computed txid
    #[error("broadcast txid mismatch: expected {expected}, got {got}")]
    BroadcastMismatch {
        /// Locally computed txid
        expected: String,
        /// Txid returned by the broadcaster
        got: String,
    },
    /// The withdrawal failed; proofs and quote were reverted
    #[error("withdrawal failed: {0}")]
    WithdrawalFailed(String),
    /// The chain view failed after exhausting retries
    #[error("chain view error: {0}")]
    ChainView(String),
    /// The destination address is not valid bech32 for the network
    #[error("invalid destination address: {0}")]
    InvalidDestination(String),

    /// Storage error
    #[error(transparent)]
    Database(#[from] database::Error),
    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The protocol error code of this error.
    pub fn code(&self) -> u16 {
        match self {
            Error::QuoteNotFound(_) => 10001,
            Error::QuoteExpired(_) => 10002,
            Error::QuoteNotPaid(_) => 10003,
            Error::AlreadyIssued(_) => 10004,
            Error::QuotePending(_) => 10005,

            Error::ProofAlreadySpent { .. } => 11001,
            Error::InvalidProof { .. } => 11002,
            Error::P2PKVerificationFailed(_) => 11003,
            Error::DuplicateInputs => 11004,
            Error::OutputAlreadySigned(_) => 11005,

            Error::AmountMismatch { .. } => 12001,
            Error::AmountOutOfRange { .. } => 12002,
            Error::AmountOverflow => 12003,

            Error::KeysetNotFound(_) => 13001,
            Error::KeysetInactive(_) => 13002,
            Error::UnknownDenomination(_) => 13003,
            Error::SignFailed(_) => 13004,
            Error::MultipleUnits => 13005,

            Error::InsufficientConfirmations { .. } => 14001,
            Error::InsufficientFunds => 14002,
            Error::BroadcastMismatch { .. } => 14003,
            Error::WithdrawalFailed(_) => 14004,
            Error::ChainView(_) => 14005,
            Error::InvalidDestination(_) => 14006,

            Error::Database(_) | Error::Internal(_) => 20000,
        }
    }
}

impl From<runemint_protocol::amount::Error> for Error {
    fn from(_: runemint_protocol::amount::Error) -> Self {
        Error::AmountOverflow
    }
}

impl From<dhke::Error> for Error {
    fn from(err: dhke::Error) -> Self {
        Error::SignFailed(err.to_string())
    }
}

impl From<p2pk::Error> for Error {
    fn from(err: p2pk::Error) -> Self {
        Error::P2PKVerificationFailed(err.to_string())
    }
}

/// The wire shape of an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Protocol error code
    pub code: u16,
    /// Short human-readable detail
    pub detail: String,
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        ErrorResponse {
            code: err.code(),
            detail: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_sit_in_their_ranges() {
        assert_eq!(Error::QuoteNotFound("q".into()).code() / 1000, 10);
        assert_eq!(Error::ProofAlreadySpent { y: "y".into() }.code() / 1000, 11);
        assert_eq!(
            Error::AmountMismatch {
                expected: 1,
                actual: 2
            }
            .code()
                / 1000,
            12
        );
        assert_eq!(Error::KeysetNotFound("k".into()).code() / 1000, 13);
        assert_eq!(Error::InsufficientFunds.code() / 1000, 14);
    }

    #[test]
    fn response_carries_code_and_detail() {
        let err = Error::AmountMismatch {
            expected: 500,
            actual: 2000,
        };
        let response = ErrorResponse::from(&err);
        assert_eq!(response.code, 12001);
        assert!(response.detail.contains("500"));
        assert!(response.detail.contains("2000"));
    }
}
