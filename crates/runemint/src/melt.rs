//! The melt (spend proofs -> on-chain withdrawal) state machine.
//!
//! The safety pillar: proofs are tentatively spent before the withdrawal is
//! attempted, and any failure between that spend and a verified broadcast
//! restores the proofs and the quote. There is no third state.

use runemint_chain::validate_destination;
use runemint_common::{Error, MeltQuote, MeltQuoteResponse};
use runemint_protocol::util::unix_time;
use runemint_protocol::{Amount, MeltQuoteState, MeltRequest, MeltResponse};

use crate::Mint;

impl Mint {
    /// Create a withdrawal quote.
    ///
    /// Validates the amount range and the destination address syntax
    /// (bech32 segwit or taproot on the mint's network); fee reserve is
    /// zero, the mint absorbs the on-chain fee. Expires after one hour.
    #[tracing::instrument(skip(self))]
    pub async fn create_melt_quote(
        &self,
        amount: Amount,
        destination: String,
    ) -> Result<MeltQuoteResponse, Error> {
        let limits = &self.config.limits;
        if amount < limits.min_melt || amount > limits.max_melt {
            return Err(Error::AmountOutOfRange {
                amount: amount.to_u64(),
                min: limits.min_melt.to_u64(),
                max: limits.max_melt.to_u64(),
            });
        }
        validate_destination(&destination, self.config.network)?;

        let quote = MeltQuote::new(
            amount,
            self.config.unit.clone(),
            self.config.asset_id,
            destination,
        );
        self.localstore.add_melt_quote(quote.clone()).await?;

        tracing::info!("melt quote {} created for {} {}", quote.id, amount, self.unit());
        Ok(MeltQuoteResponse::from(&quote))
    }

    /// Look up a melt quote.
    pub async fn get_melt_quote(&self, quote_id: &str) -> Result<MeltQuoteResponse, Error> {
        let quote = self
            .localstore
            .get_melt_quote(quote_id)
            .await?
            .ok_or_else(|| Error::QuoteNotFound(quote_id.to_string()))?;
        Ok(MeltQuoteResponse::from(&quote))
    }

    /// Redeem proofs against a melt quote: verify, tentatively spend, move
    /// the quote to PENDING, withdraw on-chain, and either settle to PAID
    /// or revert everything.
    #[tracing::instrument(skip_all, fields(quote_id = %request.quote, inputs = request.inputs.len()))]
    pub async fn melt_tokens(&self, request: MeltRequest) -> Result<MeltResponse, Error> {
        let quote = self
            .localstore
            .get_melt_quote(&request.quote)
            .await?
            .ok_or_else(|| Error::QuoteNotFound(request.quote.clone()))?;

        match quote.state {
            MeltQuoteState::Pending => {
                return Err(Error::QuotePending(quote.id));
            }
            MeltQuoteState::Paid => {
                // Already settled; report the stored outcome.
                return Ok(MeltResponse {
                    state: MeltQuoteState::Paid,
                    paid: true,
                    payment_preimage: quote.withdrawal_txid,
                });
            }
            MeltQuoteState::Unpaid => {}
        }

        if unix_time() > quote.expiry {
            return Err(Error::QuoteExpired(quote.id));
        }

        let input_total = request.inputs_amount()?;
        if input_total < quote.amount {
            return Err(Error::AmountMismatch {
                expected: quote.amount.to_u64(),
                actual: input_total.to_u64(),
            });
        }

        let recipient = validate_destination(&quote.request, self.config.network)?;
        let ys = self.verify_inputs(&request.inputs).await?;

        // Tentatively consume the inputs.
        let transaction_id = format!("melt_{}", quote.id);
        self.localstore
            .add_spent_proofs(&request.inputs, &ys, &transaction_id)
            .await
            .map_err(|e| match e {
                runemint_common::database::Error::ProofAlreadySpent { y } => {
                    Error::ProofAlreadySpent { y }
                }
                other => other.into(),
            })?;
        self.localstore
            .update_melt_quote_state(&quote.id, MeltQuoteState::Pending)
            .await?;

        let excluded = self.reserve.spent_keys().await?;
        let withdrawal = self
            .wallet
            .withdraw(
                self.chain.as_ref(),
                self.config.asset_id,
                u128::from(quote.amount),
                &recipient,
                &excluded,
            )
            .await;

        match withdrawal {
            Ok(receipt) => {
                for (txid, vout) in &receipt.spent_outpoints {
                    self.reserve.mark_spent(txid, *vout, &receipt.txid).await?;
                }
                self.localstore
                    .set_melt_quote_withdrawal(&quote.id, &receipt.txid, receipt.fee_paid)
                    .await?;
                self.localstore
                    .update_melt_quote_state(&quote.id, MeltQuoteState::Paid)
                    .await?;

                tracing::info!(
                    "melt quote {} settled by {} ({} inputs)",
                    quote.id,
                    receipt.txid,
                    request.inputs.len()
                );
                Ok(MeltResponse {
                    state: MeltQuoteState::Paid,
                    paid: true,
                    payment_preimage: Some(receipt.txid),
                })
            }
            Err(e) => {
                // The revert: proofs restored, quote back to UNPAID. Any
                // path that leaves proofs spent without a broadcast txid is
                // a bug.
                let restored = self
                    .localstore
                    .remove_proofs_by_transaction_id(&transaction_id)
                    .await?;
                self.localstore
                    .update_melt_quote_state(&quote.id, MeltQuoteState::Unpaid)
                    .await?;
                tracing::warn!(
                    "melt quote {} withdrawal failed, restored {restored} proofs: {e}",
                    quote.id
                );
                Err(Error::WithdrawalFailed(e.to_string()))
            }
        }
    }
}
