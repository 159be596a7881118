//! Client-facing operation contracts, transport-agnostic.

use serde::{Deserialize, Serialize};

use crate::amount::{Amount, Error as AmountError};
use crate::keys::PublicKey;
use crate::proof::{BlindSignature, BlindedMessage, Proofs, ProofsMethods};
use crate::state::ProofState;

/// State of a mint (deposit) quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MintQuoteState {
    /// No matching deposit observed yet
    Unpaid,
    /// A confirmed deposit of the exact amount was observed
    Paid,
    /// Signatures were returned to the client
    Issued,
}

/// State of a melt (withdrawal) quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeltQuoteState {
    /// Inputs not yet locked
    Unpaid,
    /// Inputs locked, withdrawal in flight
    Pending,
    /// Withdrawal broadcast and verified
    Paid,
}

/// Issue request: redeem a paid mint quote for blind signatures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintRequest {
    /// Quote id
    pub quote: String,
    /// Blinded messages summing to the quote amount
    pub outputs: Vec<BlindedMessage>,
}

impl MintRequest {
    /// Sum of the output amounts.
    pub fn total_amount(&self) -> Result<Amount, AmountError> {
        Amount::try_sum(self.outputs.iter().map(|output| output.amount))
    }
}

/// Issue response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintResponse {
    /// One blind signature per requested output
    pub signatures: Vec<BlindSignature>,
}

/// Swap request: spend inputs, receive signatures on fresh outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRequest {
    /// Proofs to spend
    pub inputs: Proofs,
    /// Blinded messages to sign
    pub outputs: Vec<BlindedMessage>,
}

impl SwapRequest {
    /// Sum of the input amounts.
    pub fn input_amount(&self) -> Result<Amount, AmountError> {
        self.inputs.total_amount()
    }

    /// Sum of the output amounts.
    pub fn output_amount(&self) -> Result<Amount, AmountError> {
        Amount::try_sum(self.outputs.iter().map(|output| output.amount))
    }
}

/// Swap response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapResponse {
    /// One blind signature per requested output
    pub signatures: Vec<BlindSignature>,
}

/// Redeem request: spend proofs against a melt quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeltRequest {
    /// Quote id
    pub quote: String,
    /// Proofs covering at least the quote amount
    pub inputs: Proofs,
}

impl MeltRequest {
    /// Sum of the input amounts.
    pub fn inputs_amount(&self) -> Result<Amount, AmountError> {
        self.inputs.total_amount()
    }
}

/// Redeem response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeltResponse {
    /// Final quote state
    pub state: MeltQuoteState,
    /// Whether the withdrawal settled
    pub paid: bool,
    /// The withdrawal txid when paid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_preimage: Option<String>,
}

/// Spent-state lookup request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckStateRequest {
    /// `Y` values to look up
    #[serde(rename = "Ys")]
    pub ys: Vec<PublicKey>,
}

/// Spent-state lookup response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckStateResponse {
    /// One entry per requested `Y`, in request order
    pub states: Vec<ProofState>,
}
