//! The mint (deposit -> issue) state machine.

use runemint_common::chain::DepositAddressProvider;
use runemint_common::quote::{random_quote_id, MINT_QUOTE_TTL_SECS};
use runemint_common::{Error, MintQuote, MintQuoteResponse};
use runemint_protocol::util::{unix_time, unix_time_ms};
use runemint_protocol::{Amount, MintQuoteState, MintRequest, MintResponse};

use crate::Mint;

impl Mint {
    /// Create a deposit quote.
    ///
    /// Validates the amount range, makes sure an active keyset exists for
    /// the configured asset (generating one on first use), obtains a
    /// deposit address and records the quote UNPAID with a 24 h expiry.
    #[tracing::instrument(skip(self))]
    pub async fn create_mint_quote(&self, amount: Amount) -> Result<MintQuoteResponse, Error> {
        let limits = &self.config.limits;
        if amount < limits.min_mint || amount > limits.max_mint {
            return Err(Error::AmountOutOfRange {
                amount: amount.to_u64(),
                min: limits.min_mint.to_u64(),
                max: limits.max_mint.to_u64(),
            });
        }

        self.ensure_active_keyset().await?;

        let quote_id = random_quote_id();
        let deposit_address = self
            .wallet
            .create_deposit_address(&quote_id, amount, &self.config.asset_id)
            .await
            .map_err(|e| Error::ChainView(e.to_string()))?;

        let quote = MintQuote {
            id: quote_id,
            amount,
            unit: self.config.unit.clone(),
            asset_id: self.config.asset_id,
            request: deposit_address,
            state: MintQuoteState::Unpaid,
            expiry: unix_time() + MINT_QUOTE_TTL_SECS,
            created_at: unix_time_ms(),
            deposit_txid: None,
            deposit_vout: None,
            paid_at: None,
        };
        self.localstore.add_mint_quote(quote.clone()).await?;

        tracing::info!("mint quote {} created for {} {}", quote.id, amount, self.unit());
        Ok(MintQuoteResponse::from(&quote))
    }

    /// Look up a mint quote, opportunistically checking for its deposit.
    ///
    /// For UNPAID quotes the chain view is consulted; a confirmed deposit of
    /// the exact amount promotes the quote to PAID. Chain-view failures are
    /// logged and swallowed, the stored state is still returned.
    #[tracing::instrument(skip(self))]
    pub async fn get_mint_quote(&self, quote_id: &str) -> Result<MintQuoteResponse, Error> {
        let quote = self
            .localstore
            .get_mint_quote(quote_id)
            .await?
            .ok_or_else(|| Error::QuoteNotFound(quote_id.to_string()))?;

        if quote.state == MintQuoteState::Unpaid {
            match self.find_quote_deposit(&quote).await {
                Ok(Some(deposit)) if self.deposit_satisfies(&quote, &deposit) => {
                    if let Err(e) = self.mark_quote_paid(&quote, &deposit).await {
                        tracing::warn!("promoting quote {quote_id} failed: {e}");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("deposit check for quote {quote_id} failed: {e}");
                }
            }
        }

        let quote = self
            .localstore
            .get_mint_quote(quote_id)
            .await?
            .ok_or_else(|| Error::QuoteNotFound(quote_id.to_string()))?;
        Ok(MintQuoteResponse::from(&quote))
    }

    /// Issue blind signatures against a paid quote.
    ///
    /// The deposit is re-verified on-chain regardless of stored state; this
    /// is what protects issuance against stored-state corruption, reorgs
    /// and races with the deposit monitor. Output amounts must sum to the
    /// quote amount exactly; the quote is ISSUED once signatures exist.
    #[tracing::instrument(skip(self, request), fields(quote_id = %request.quote))]
    pub async fn mint_tokens(&self, request: MintRequest) -> Result<MintResponse, Error> {
        let quote = self
            .localstore
            .get_mint_quote(&request.quote)
            .await?
            .ok_or_else(|| Error::QuoteNotFound(request.quote.clone()))?;

        if quote.state == MintQuoteState::Issued {
            return Err(Error::AlreadyIssued(quote.id.clone()));
        }

        // Non-negotiable on-chain re-verification.
        let deposit = self
            .find_quote_deposit(&quote)
            .await?
            .ok_or_else(|| Error::QuoteNotPaid(quote.id.clone()))?;
        if !deposit.confirmed || deposit.confirmations < self.config.mint_confirmations {
            return Err(Error::InsufficientConfirmations {
                have: deposit.confirmations,
                need: self.config.mint_confirmations,
            });
        }
        if deposit.rune_amount != u128::from(quote.amount) {
            tracing::warn!(
                "issuance refused for quote {}: deposit {}:{} carries {} not {}",
                quote.id,
                deposit.txid,
                deposit.vout,
                deposit.rune_amount,
                quote.amount
            );
            return Err(Error::AmountMismatch {
                expected: quote.amount.to_u64(),
                actual: u128::min(deposit.rune_amount, u64::MAX as u128) as u64,
            });
        }

        if quote.state == MintQuoteState::Unpaid {
            // Every quote shares one deposit address, so the same deposit is
            // a candidate for every quote of this amount. The reserve insert
            // is the claim; losing it means another quote owns the deposit.
            if !self.mark_quote_paid(&quote, &deposit).await? {
                return Err(Error::QuoteNotPaid(quote.id));
            }
        }

        if request.outputs.is_empty() {
            return Err(Error::AmountMismatch {
                expected: quote.amount.to_u64(),
                actual: 0,
            });
        }
        let output_total = request.total_amount()?;
        if output_total != quote.amount {
            return Err(Error::AmountMismatch {
                expected: quote.amount.to_u64(),
                actual: output_total.to_u64(),
            });
        }

        self.check_output_unit(&request.outputs).await?;
        self.check_outputs_unsigned(&request.outputs).await?;

        let signatures = self
            .signatory
            .blind_sign_batch(request.outputs.clone())
            .await?;

        let blinded_secrets: Vec<_> = request
            .outputs
            .iter()
            .map(|output| output.blinded_secret)
            .collect();
        self.localstore
            .add_blind_signatures(&blinded_secrets, &signatures, Some(&quote.id))
            .await
            .map_err(|e| match e {
                runemint_common::database::Error::Duplicate => {
                    Error::OutputAlreadySigned(quote.id.clone())
                }
                other => other.into(),
            })?;

        self.localstore
            .update_mint_quote_state(&quote.id, MintQuoteState::Issued)
            .await?;

        tracing::info!("mint quote {} issued {} signatures", quote.id, signatures.len());
        Ok(MintResponse { signatures })
    }
}
