//! A programmable chain backend for tests.
//!
//! Deposits, fee outputs, confirmations and broadcast behavior are all
//! scripted by the test; the mint under test sees a normal
//! [`ChainView`]. Broadcasts decode the submitted transaction and return
//! its real txid unless a failure or a txid mutation has been injected.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bitcoin::consensus::encode::deserialize;
use bitcoin::Transaction;

use runemint_common::chain::{
    AddressOutputs, ChainView, Error, OutputDetails, Outspend, RuneAmount, RuneBalance,
    TransactionInfo, TxStatus,
};
use runemint_common::outpoint_key;
use runemint_protocol::AssetId;

#[derive(Debug, Default)]
struct ChainState {
    /// address -> outpoint keys
    address_outputs: HashMap<String, Vec<String>>,
    /// outpoint key -> details
    outputs: HashMap<String, OutputDetails>,
    /// txid -> status
    transactions: HashMap<String, TxStatus>,
    /// outpoint key -> outspend
    outspends: HashMap<String, Outspend>,
    /// raw tx hex of every txid the fake knows
    raw_txs: HashMap<String, String>,
    height: u64,
    /// raw tx hex of every accepted broadcast, in order
    broadcasts: Vec<String>,
    fail_broadcasts: bool,
    tamper_broadcast_txid: bool,
    /// transient failures to inject before the next call succeeds
    transient_failures: u32,
}

/// The programmable chain view.
#[derive(Debug, Default)]
pub struct FakeChainView {
    state: Mutex<ChainState>,
}

impl FakeChainView {
    /// An empty chain at height zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tip height.
    pub fn set_block_height(&self, height: u64) {
        self.lock().height = height;
    }

    /// Script a confirmed rune deposit at an address.
    #[allow(clippy::too_many_arguments)]
    pub fn add_rune_output(
        &self,
        address: &str,
        txid: &str,
        vout: u32,
        rune_name: &str,
        asset_id: AssetId,
        rune_amount: u128,
        value_sats: u64,
        confirmed_height: Option<u64>,
    ) {
        let key = outpoint_key(txid, vout);
        let mut state = self.lock();
        state
            .address_outputs
            .entry(address.to_string())
            .or_default()
            .push(key.clone());
        state.outputs.insert(
            key.clone(),
            OutputDetails {
                value_sats,
                runes: HashMap::from([(
                    rune_name.to_string(),
                    RuneAmount {
                        amount: rune_amount,
                        id: asset_id,
                    },
                )]),
            },
        );
        state.transactions.insert(
            txid.to_string(),
            TxStatus {
                confirmed: confirmed_height.is_some(),
                block_height: confirmed_height,
            },
        );
        state.outspends.insert(key, Outspend::default());
    }

    /// Script a confirmed plain (fee) output at an address.
    pub fn add_plain_output(
        &self,
        address: &str,
        txid: &str,
        vout: u32,
        value_sats: u64,
        confirmed_height: Option<u64>,
    ) {
        let key = outpoint_key(txid, vout);
        let mut state = self.lock();
        state
            .address_outputs
            .entry(address.to_string())
            .or_default()
            .push(key.clone());
        state.outputs.insert(
            key.clone(),
            OutputDetails {
                value_sats,
                runes: HashMap::new(),
            },
        );
        state.transactions.insert(
            txid.to_string(),
            TxStatus {
                confirmed: confirmed_height.is_some(),
                block_height: confirmed_height,
            },
        );
        state.outspends.insert(key, Outspend::default());
    }

    /// Mark an outpoint as spent on-chain.
    pub fn set_outspent(&self, txid: &str, vout: u32, spending_txid: &str) {
        self.lock().outspends.insert(
            outpoint_key(txid, vout),
            Outspend {
                spent: true,
                txid: Some(spending_txid.to_string()),
            },
        );
    }

    /// Make every subsequent broadcast fail.
    pub fn fail_broadcasts(&self, fail: bool) {
        self.lock().fail_broadcasts = fail;
    }

    /// Make the next broadcast return a mutated txid.
    pub fn tamper_broadcast_txid(&self, tamper: bool) {
        self.lock().tamper_broadcast_txid = tamper;
    }

    /// Inject transient failures into the next `count` calls.
    pub fn inject_transient_failures(&self, count: u32) {
        self.lock().transient_failures = count;
    }

    /// Raw hex of every accepted broadcast, in order.
    pub fn broadcast_log(&self) -> Vec<String> {
        self.lock().broadcasts.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChainState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn maybe_fail_transiently(&self) -> Result<(), Error> {
        let mut state = self.lock();
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(Error::Transient("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainView for FakeChainView {
    async fn address_outputs(&self, address: &str) -> Result<AddressOutputs, Error> {
        self.maybe_fail_transiently()?;
        let state = self.lock();
        let outputs = state
            .address_outputs
            .get(address)
            .cloned()
            .unwrap_or_default();

        // Aggregate balances the way an indexer would.
        let mut totals: HashMap<String, u128> = HashMap::new();
        for key in &outputs {
            if let Some(details) = state.outputs.get(key) {
                for (name, rune) in &details.runes {
                    *totals.entry(name.clone()).or_default() += rune.amount;
                }
            }
        }
        Ok(AddressOutputs {
            outputs,
            rune_balances: totals
                .into_iter()
                .map(|(name, amount)| RuneBalance {
                    name,
                    amount: amount.to_string(),
                    symbol: None,
                })
                .collect(),
        })
    }

    async fn output_details(&self, txid: &str, vout: u32) -> Result<OutputDetails, Error> {
        self.maybe_fail_transiently()?;
        self.lock()
            .outputs
            .get(&outpoint_key(txid, vout))
            .cloned()
            .ok_or_else(|| Error::Permanent(format!("unknown output {txid}:{vout}")))
    }

    async fn transaction(&self, txid: &str) -> Result<TransactionInfo, Error> {
        self.maybe_fail_transiently()?;
        self.lock()
            .transactions
            .get(txid)
            .map(|status| TransactionInfo { status: *status })
            .ok_or_else(|| Error::Permanent(format!("unknown transaction {txid}")))
    }

    async fn outspend(&self, txid: &str, vout: u32) -> Result<Outspend, Error> {
        self.maybe_fail_transiently()?;
        Ok(self
            .lock()
            .outspends
            .get(&outpoint_key(txid, vout))
            .cloned()
            .unwrap_or_default())
    }

    async fn block_height(&self) -> Result<u64, Error> {
        self.maybe_fail_transiently()?;
        Ok(self.lock().height)
    }

    async fn broadcast(&self, raw_tx_hex: &str) -> Result<String, Error> {
        self.maybe_fail_transiently()?;
        let mut state = self.lock();
        if state.fail_broadcasts {
            return Err(Error::Permanent("broadcast rejected".to_string()));
        }

        let bytes =
            hex::decode(raw_tx_hex).map_err(|e| Error::Permanent(format!("bad tx hex: {e}")))?;
        let tx: Transaction =
            deserialize(&bytes).map_err(|e| Error::Permanent(format!("bad tx: {e}")))?;
        let mut txid = tx.compute_txid().to_string();

        if state.tamper_broadcast_txid {
            state.tamper_broadcast_txid = false;
            txid = format!("{:0>64}", "f");
        }

        state.broadcasts.push(raw_tx_hex.to_string());
        state.raw_txs.insert(txid.clone(), raw_tx_hex.to_string());
        tracing::debug!("fake chain accepted broadcast {txid}");
        Ok(txid)
    }

    async fn tx_hex(&self, txid: &str) -> Result<String, Error> {
        self.maybe_fail_transiently()?;
        self.lock()
            .raw_txs
            .get(txid)
            .cloned()
            .ok_or_else(|| Error::Permanent(format!("unknown transaction {txid}")))
    }
}
