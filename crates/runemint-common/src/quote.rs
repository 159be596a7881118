//! Mint and melt quote records.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use runemint_protocol::util::{unix_time, unix_time_ms};
use runemint_protocol::{Amount, AssetId, CurrencyUnit, MeltQuoteState, MintQuoteState};

/// Lifetime of a mint quote: 24 hours.
pub const MINT_QUOTE_TTL_SECS: u64 = 24 * 60 * 60;

/// Lifetime of a melt quote: 1 hour.
pub const MELT_QUOTE_TTL_SECS: u64 = 60 * 60;

/// A fresh 32-byte quote id, 64 hex characters.
pub fn random_quote_id() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// A deposit quote: the server-side record tying a client's intent to
/// deposit to a bounded-lifetime on-chain observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintQuote {
    /// 64-hex quote id
    pub id: String,
    /// Requested amount in the smallest asset unit
    pub amount: Amount,
    /// Unit
    pub unit: CurrencyUnit,
    /// Backing asset
    pub asset_id: AssetId,
    /// Deposit address the client must pay
    pub request: String,
    /// Quote state
    pub state: MintQuoteState,
    /// Expiry, Unix seconds
    pub expiry: u64,
    /// Creation time, Unix milliseconds
    pub created_at: u64,
    /// Txid of the matched deposit, once observed
    pub deposit_txid: Option<String>,
    /// Vout of the matched deposit, once observed
    pub deposit_vout: Option<u32>,
    /// When the quote moved to PAID, Unix seconds
    pub paid_at: Option<u64>,
}

impl MintQuote {
    /// Create an UNPAID quote with a fresh id and a 24 h expiry.
    pub fn new(
        amount: Amount,
        unit: CurrencyUnit,
        asset_id: AssetId,
        deposit_address: String,
    ) -> Self {
        Self {
            id: random_quote_id(),
            amount,
            unit,
            asset_id,
            request: deposit_address,
            state: MintQuoteState::Unpaid,
            expiry: unix_time() + MINT_QUOTE_TTL_SECS,
            created_at: unix_time_ms(),
            deposit_txid: None,
            deposit_vout: None,
            paid_at: None,
        }
    }
}

/// The wire shape of a mint quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintQuoteResponse {
    /// Quote id
    pub quote: String,
    /// Deposit address
    pub request: String,
    /// Quote state
    pub state: MintQuoteState,
    /// Expiry, Unix seconds
    pub expiry: u64,
    /// Requested amount
    pub amount: Amount,
    /// Unit
    pub unit: CurrencyUnit,
}

impl From<&MintQuote> for MintQuoteResponse {
    fn from(quote: &MintQuote) -> Self {
        Self {
            quote: quote.id.clone(),
            request: quote.request.clone(),
            state: quote.state,
            expiry: quote.expiry,
            amount: quote.amount,
            unit: quote.unit.clone(),
        }
    }
}

/// A withdrawal quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltQuote {
    /// 64-hex quote id
    pub id: String,
    /// Amount to withdraw in the smallest asset unit
    pub amount: Amount,
    /// Fee reserve; zero, the mint absorbs the on-chain fee
    pub fee_reserve: Amount,
    /// Unit
    pub unit: CurrencyUnit,
    /// Backing asset
    pub asset_id: AssetId,
    /// Destination address
    pub request: String,
    /// Quote state
    pub state: MeltQuoteState,
    /// Expiry, Unix seconds
    pub expiry: u64,
    /// Creation time, Unix milliseconds
    pub created_at: u64,
    /// Txid of the withdrawal once broadcast
    pub withdrawal_txid: Option<String>,
    /// Sats spent on the withdrawal fee
    pub fee_paid: Option<u64>,
    /// When the quote moved to PAID, Unix seconds
    pub paid_at: Option<u64>,
}

impl MeltQuote {
    /// Create an UNPAID quote with a fresh id and a 1 h expiry.
    pub fn new(
        amount: Amount,
        unit: CurrencyUnit,
        asset_id: AssetId,
        destination: String,
    ) -> Self {
        Self {
            id: random_quote_id(),
            amount,
            fee_reserve: Amount::ZERO,
            unit,
            asset_id,
            request: destination,
            state: MeltQuoteState::Unpaid,
            expiry: unix_time() + MELT_QUOTE_TTL_SECS,
            created_at: unix_time_ms(),
            withdrawal_txid: None,
            fee_paid: None,
            paid_at: None,
        }
    }
}

/// The wire shape of a melt quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeltQuoteResponse {
    /// Quote id
    pub quote: String,
    /// Amount to withdraw
    pub amount: Amount,
    /// Fee reserve
    pub fee_reserve: Amount,
    /// Quote state
    pub state: MeltQuoteState,
    /// Expiry, Unix seconds
    pub expiry: u64,
    /// Destination address
    pub request: String,
    /// Unit
    pub unit: CurrencyUnit,
}

impl From<&MeltQuote> for MeltQuoteResponse {
    fn from(quote: &MeltQuote) -> Self {
        Self {
            quote: quote.id.clone(),
            amount: quote.amount,
            fee_reserve: quote.fee_reserve,
            state: quote.state,
            expiry: quote.expiry,
            request: quote.request.clone(),
            unit: quote.unit.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ids_are_64_hex() {
        let id = random_quote_id();
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, random_quote_id());
    }

    #[test]
    fn fresh_quotes_start_unpaid() {
        let quote = MintQuote::new(
            Amount::from(500),
            CurrencyUnit::Custom("UNIT".into()),
            "840000:1".parse().unwrap(),
            "tb1p...".into(),
        );
        assert_eq!(quote.state, MintQuoteState::Unpaid);
        assert!(quote.expiry > unix_time());
        assert!(quote.paid_at.is_none());

        let melt = MeltQuote::new(
            Amount::from(500),
            CurrencyUnit::Custom("UNIT".into()),
            "840000:1".parse().unwrap(),
            "tb1q...".into(),
        );
        assert_eq!(melt.state, MeltQuoteState::Unpaid);
        assert_eq!(melt.fee_reserve, Amount::ZERO);
        assert!(melt.expiry < quote.expiry);
    }
}
