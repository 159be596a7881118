//! Deposit detection and the deposit monitor.
//!
//! One detection routine serves three callers: quote polling
//! (`get_mint_quote`), the issuance re-verification in `mint_tokens`, and
//! the periodic monitor. A deposit is "new" when its outpoint is not yet in
//! the reserve tracker; promoting a quote to PAID claims the outpoint by
//! inserting it, so one deposit can never satisfy two quotes.

use std::sync::Arc;

use tokio::sync::Notify;

use runemint_common::chain::with_retry;
use runemint_common::{Error, MintQuote, ReserveUtxo};
use runemint_protocol::util::{unix_time, unix_time_ms};
use runemint_protocol::MintQuoteState;

use crate::Mint;

/// A rune deposit observed at a quote's address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DepositCandidate {
    pub txid: String,
    pub vout: u32,
    pub rune_amount: u128,
    pub value_sats: u64,
    pub confirmed: bool,
    pub confirmations: u64,
}

impl Mint {
    /// Inspect one outpoint for a deposit of the configured asset.
    async fn inspect_outpoint(
        &self,
        txid: &str,
        vout: u32,
    ) -> Result<Option<DepositCandidate>, Error> {
        let chain = &self.chain;
        let details = with_retry("output_details", || chain.output_details(txid, vout))
            .await
            .map_err(|e| Error::ChainView(e.to_string()))?;

        let Some(rune) = details
            .runes
            .values()
            .find(|rune| rune.id == self.config.asset_id)
        else {
            return Ok(None);
        };

        let info = with_retry("transaction", || chain.transaction(txid))
            .await
            .map_err(|e| Error::ChainView(e.to_string()))?;

        let confirmations = match (info.status.confirmed, info.status.block_height) {
            (true, Some(height)) => {
                let tip = with_retry("block_height", || chain.block_height())
                    .await
                    .map_err(|e| Error::ChainView(e.to_string()))?;
                tip.saturating_sub(height) + 1
            }
            _ => 0,
        };

        Ok(Some(DepositCandidate {
            txid: txid.to_string(),
            vout,
            rune_amount: rune.amount,
            value_sats: details.value_sats,
            confirmed: info.status.confirmed,
            confirmations,
        }))
    }

    /// Find the deposit backing a quote.
    ///
    /// A quote that already recorded its deposit outpoint is re-inspected
    /// directly (issuance re-verifies on-chain even for PAID quotes).
    /// Otherwise the deposit address is scanned for outpoints the reserve
    /// tracker does not know yet; a candidate whose amount matches the quote
    /// wins, else the first new deposit is reported so callers can flag the
    /// mismatch.
    pub(crate) async fn find_quote_deposit(
        &self,
        quote: &MintQuote,
    ) -> Result<Option<DepositCandidate>, Error> {
        if let (Some(txid), Some(vout)) = (&quote.deposit_txid, quote.deposit_vout) {
            return self.inspect_outpoint(txid, vout).await;
        }

        let chain = &self.chain;
        let address = quote.request.clone();
        let outputs = with_retry("address_outputs", || chain.address_outputs(&address))
            .await
            .map_err(|e| Error::ChainView(e.to_string()))?;

        let mut fallback = None;
        for outpoint in &outputs.outputs {
            let Some((txid, vout)) = runemint_chain::select::parse_outpoint(outpoint) else {
                continue;
            };
            if self.reserve.is_tracked(&txid, vout).await? {
                continue;
            }
            let Some(candidate) = self.inspect_outpoint(&txid, vout).await? else {
                continue;
            };
            if candidate.rune_amount == u128::from(quote.amount) {
                return Ok(Some(candidate));
            }
            fallback.get_or_insert(candidate);
        }

        Ok(fallback)
    }

    /// Claim a deposit for a quote and move it UNPAID -> PAID.
    ///
    /// Claiming inserts the deposit into the reserve tracker; if the insert
    /// collides with a row this quote does not own, another quote claimed
    /// the deposit first and the promotion is abandoned.
    pub(crate) async fn mark_quote_paid(
        &self,
        quote: &MintQuote,
        deposit: &DepositCandidate,
    ) -> Result<bool, Error> {
        let added = self
            .reserve
            .add_utxo(ReserveUtxo {
                txid: deposit.txid.clone(),
                vout: deposit.vout,
                asset_id: self.config.asset_id,
                amount: deposit.rune_amount,
                address: quote.request.clone(),
                value_sats: deposit.value_sats,
                spent: false,
                spent_in_txid: None,
                created_at: unix_time(),
            })
            .await?;

        if !added && quote.deposit_txid.as_deref() != Some(deposit.txid.as_str()) {
            tracing::debug!(
                "deposit {}:{} already claimed, quote {} stays unpaid",
                deposit.txid,
                deposit.vout,
                quote.id
            );
            return Ok(false);
        }

        self.localstore
            .set_mint_quote_deposit(&quote.id, &deposit.txid, deposit.vout)
            .await?;
        self.localstore
            .update_mint_quote_state(&quote.id, MintQuoteState::Paid)
            .await?;
        tracing::info!(
            "mint quote {} paid by {}:{} ({} {})",
            quote.id,
            deposit.txid,
            deposit.vout,
            deposit.rune_amount,
            self.config.asset_id
        );
        Ok(true)
    }

    /// Whether a candidate satisfies a quote: exact amount, confirmed deep
    /// enough. Logs the security warning for amount mismatches.
    pub(crate) fn deposit_satisfies(&self, quote: &MintQuote, deposit: &DepositCandidate) -> bool {
        if deposit.rune_amount != u128::from(quote.amount) {
            tracing::warn!(
                "deposit {}:{} amount {} does not match quote {} amount {}; leaving unpaid",
                deposit.txid,
                deposit.vout,
                deposit.rune_amount,
                quote.id,
                quote.amount
            );
            return false;
        }
        deposit.confirmed && deposit.confirmations >= self.config.mint_confirmations
    }

    /// Run the deposit monitor until `shutdown` fires.
    ///
    /// Every poll interval, up to `batch_size` UNPAID quotes that are
    /// neither expired nor older than `max_age_ms` are checked for a new
    /// confirmed deposit. Per-quote failures are logged and never abort the
    /// cycle; an in-flight cycle completes before shutdown.
    pub async fn wait_for_paid_deposits(&self, shutdown: Arc<Notify>) -> Result<(), Error> {
        let mut interval = tokio::time::interval(self.config.deposit_monitor.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so a fresh mint does not
        // scan before anything can have happened.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    tracing::info!("deposit monitor stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.poll_unpaid_quotes().await {
                        tracing::warn!("deposit monitor cycle failed: {e}");
                    }
                }
            }
        }
        Ok(())
    }

    /// One monitor cycle.
    pub async fn poll_unpaid_quotes(&self) -> Result<(), Error> {
        let now_sec = unix_time();
        let now_ms = unix_time_ms();
        let monitor = &self.config.deposit_monitor;

        let quotes = self
            .localstore
            .get_mint_quotes_by_state(MintQuoteState::Unpaid, monitor.batch_size)
            .await?;

        for quote in quotes {
            if quote.expiry < now_sec {
                continue;
            }
            if quote.created_at < now_ms.saturating_sub(monitor.max_age_ms) {
                continue;
            }

            match self.find_quote_deposit(&quote).await {
                Ok(Some(deposit)) if self.deposit_satisfies(&quote, &deposit) => {
                    if let Err(e) = self.mark_quote_paid(&quote, &deposit).await {
                        tracing::warn!("promoting quote {} failed: {e}", quote.id);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("deposit check for quote {} failed: {e}", quote.id);
                }
            }
        }
        Ok(())
    }
}
