//! UTXO selection for withdrawals.

use std::collections::HashSet;

use runemint_common::chain::{with_retry, ChainView};
use runemint_common::Error;
use runemint_protocol::AssetId;

use crate::psbt::MIN_FEE_INPUT_SATS;

/// A rune-bearing output chosen to fund a withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedRuneUtxo {
    /// Transaction id
    pub txid: String,
    /// Output index
    pub vout: u32,
    /// Rune amount carried
    pub rune_amount: u128,
    /// Bitcoin value
    pub value_sats: u64,
}

/// A plain output chosen to pay the miner fee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeUtxo {
    /// Transaction id
    pub txid: String,
    /// Output index
    pub vout: u32,
    /// Bitcoin value
    pub value_sats: u64,
}

/// Split a `txid:vout` outpoint string.
pub fn parse_outpoint(outpoint: &str) -> Option<(String, u32)> {
    let (txid, vout) = outpoint.split_once(':')?;
    Some((txid.to_string(), vout.parse().ok()?))
}

/// Accumulate rune outputs at `address` until `target` is covered.
///
/// Outputs already in `excluded` (the tracker's spent set) or already spent
/// on-chain are skipped. Outputs are taken in the chain view's natural
/// order; exhaustion without reaching the target is `InsufficientFunds`.
pub async fn select_rune_utxos(
    chain: &dyn ChainView,
    address: &str,
    asset_id: &AssetId,
    target: u128,
    excluded: &HashSet<String>,
) -> Result<Vec<SelectedRuneUtxo>, Error> {
    let outputs = with_retry("address_outputs", || chain.address_outputs(address))
        .await
        .map_err(|e| Error::ChainView(e.to_string()))?;

    let mut selected = Vec::new();
    let mut accumulated: u128 = 0;

    for outpoint in &outputs.outputs {
        if accumulated >= target {
            break;
        }
        if excluded.contains(outpoint) {
            continue;
        }
        let Some((txid, vout)) = parse_outpoint(outpoint) else {
            tracing::warn!("chain view returned malformed outpoint: {outpoint}");
            continue;
        };

        let outspend = with_retry("outspend", || chain.outspend(&txid, vout))
            .await
            .map_err(|e| Error::ChainView(e.to_string()))?;
        if outspend.spent {
            continue;
        }

        let details = with_retry("output_details", || chain.output_details(&txid, vout))
            .await
            .map_err(|e| Error::ChainView(e.to_string()))?;
        let Some(rune) = details.runes.values().find(|rune| rune.id == *asset_id) else {
            continue;
        };

        accumulated += rune.amount;
        selected.push(SelectedRuneUtxo {
            txid,
            vout,
            rune_amount: rune.amount,
            value_sats: details.value_sats,
        });
    }

    if accumulated < target {
        tracing::warn!(
            "rune selection exhausted at {accumulated} of {target} for {asset_id} at {address}"
        );
        return Err(Error::InsufficientFunds);
    }

    Ok(selected)
}

/// Pick one confirmed, rune-free output at the fee address worth at least
/// [`MIN_FEE_INPUT_SATS`].
pub async fn select_fee_utxo(chain: &dyn ChainView, address: &str) -> Result<FeeUtxo, Error> {
    let outputs = with_retry("address_outputs", || chain.address_outputs(address))
        .await
        .map_err(|e| Error::ChainView(e.to_string()))?;

    for outpoint in &outputs.outputs {
        let Some((txid, vout)) = parse_outpoint(outpoint) else {
            continue;
        };

        let outspend = with_retry("outspend", || chain.outspend(&txid, vout))
            .await
            .map_err(|e| Error::ChainView(e.to_string()))?;
        if outspend.spent {
            continue;
        }

        let details = with_retry("output_details", || chain.output_details(&txid, vout))
            .await
            .map_err(|e| Error::ChainView(e.to_string()))?;
        // Never burn reserve runes as miner fees.
        if details.value_sats < MIN_FEE_INPUT_SATS || !details.runes.is_empty() {
            continue;
        }

        let info = with_retry("transaction", || chain.transaction(&txid))
            .await
            .map_err(|e| Error::ChainView(e.to_string()))?;
        if !info.status.confirmed {
            continue;
        }

        return Ok(FeeUtxo {
            txid,
            vout,
            value_sats: details.value_sats,
        });
    }

    tracing::warn!("no spendable fee input at {address}");
    Err(Error::InsufficientFunds)
}
