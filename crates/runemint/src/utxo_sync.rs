//! Periodic reconciliation of the reserve tracker with the chain.

use std::sync::Arc;

use tokio::sync::Notify;

use runemint_common::chain::with_retry;
use runemint_common::{Error, ReserveUtxo};
use runemint_protocol::util::unix_time;

use crate::Mint;

impl Mint {
    /// One reconciliation pass: every output at the mint's taproot address
    /// carrying the configured asset is offered to the tracker,
    /// insert-if-absent. Returns how many rows were added.
    pub async fn sync_reserve_once(&self) -> Result<usize, Error> {
        let address = self.wallet.taproot_address().to_string();
        let chain = &self.chain;

        let outputs = with_retry("address_outputs", || chain.address_outputs(&address))
            .await
            .map_err(|e| Error::ChainView(e.to_string()))?;

        let mut discovered = Vec::new();
        for outpoint in &outputs.outputs {
            let Some((txid, vout)) = runemint_chain::select::parse_outpoint(outpoint) else {
                continue;
            };
            if self.reserve.is_tracked(&txid, vout).await? {
                continue;
            }
            let details = with_retry("output_details", || chain.output_details(&txid, vout))
                .await
                .map_err(|e| Error::ChainView(e.to_string()))?;
            let Some(rune) = details
                .runes
                .values()
                .find(|rune| rune.id == self.config.asset_id)
            else {
                continue;
            };
            discovered.push(ReserveUtxo {
                txid,
                vout,
                asset_id: self.config.asset_id,
                amount: rune.amount,
                address: address.clone(),
                value_sats: details.value_sats,
                spent: false,
                spent_in_txid: None,
                created_at: unix_time(),
            });
        }

        let added = self.reserve.sync_from_chain(discovered).await?;
        if added > 0 {
            tracing::info!("reserve sync added {added} utxos");
        }
        Ok(added)
    }

    /// Run the reserve sync until `shutdown` fires. Errors are logged and
    /// the next interval proceeds.
    pub async fn sync_reserve(&self, shutdown: Arc<Notify>) -> Result<(), Error> {
        let mut interval = tokio::time::interval(self.config.utxo_sync_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    tracing::info!("reserve sync stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.sync_reserve_once().await {
                        tracing::warn!("reserve sync failed: {e}");
                    }
                }
            }
        }
        Ok(())
    }
}
