//! Withdrawal transaction assembly and signing.
//!
//! The withdrawal PSBT has a fixed shape: input 0 pays the miner fee from a
//! P2WPKH output, inputs 1..N carry reserve runes from P2TR outputs. Output
//! order is fixed: rune return, recipient, optional fee change, OP_RETURN
//! runestone last. The runestone edicts the *requested* amount to output 1;
//! unallocated runes fall to output 0 by the protocol default.

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::key::TapTweak;
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::{Keypair, Message, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType};
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount as SatAmount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
};

use runemint_common::Error;
use runemint_protocol::{AssetId, SECP256K1};

use crate::runestone::{encode_runestone, Edict};
use crate::select::{FeeUtxo, SelectedRuneUtxo};

/// Fixed miner fee per withdrawal.
pub const WITHDRAWAL_FEE_SATS: u64 = 1000;
/// Sats carried by the recipient output.
pub const RECIPIENT_OUTPUT_SATS: u64 = 10_000;
/// Sats carried by the rune-return output.
pub const RUNE_RETURN_OUTPUT_SATS: u64 = 10_000;
/// Smallest acceptable fee input.
pub const MIN_FEE_INPUT_SATS: u64 = 12_000;
/// Below this, change is left to the miner.
pub const DUST_LIMIT_SATS: u64 = 546;

/// Everything needed to assemble one withdrawal.
#[derive(Debug)]
pub struct WithdrawalParams<'a> {
    /// Fee-paying input, always index 0
    pub fee_utxo: &'a FeeUtxo,
    /// Rune-bearing inputs, indices 1..
    pub rune_utxos: &'a [SelectedRuneUtxo],
    /// The asset being withdrawn
    pub asset_id: AssetId,
    /// The requested rune amount; excess input runes return to output 0
    pub amount: u128,
    /// Destination
    pub recipient: &'a Address,
    /// The mint's taproot address collecting returned runes
    pub rune_return: &'a Address,
    /// The mint's segwit address receiving fee change
    pub fee_change: &'a Address,
}

fn parse_txid(txid: &str) -> Result<bitcoin::Txid, Error> {
    txid.parse()
        .map_err(|_| Error::Internal(format!("invalid txid from chain view: {txid}")))
}

fn tx_input(txid: &str, vout: u32) -> Result<TxIn, Error> {
    Ok(TxIn {
        previous_output: OutPoint {
            txid: parse_txid(txid)?,
            vout,
        },
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::new(),
    })
}

/// Assemble the unsigned withdrawal PSBT.
///
/// Fails with `InsufficientFunds` when the fee input cannot cover the fixed
/// outputs plus the miner fee.
pub fn build_withdrawal_psbt(params: &WithdrawalParams<'_>) -> Result<Psbt, Error> {
    let mut inputs = vec![tx_input(&params.fee_utxo.txid, params.fee_utxo.vout)?];
    for utxo in params.rune_utxos {
        inputs.push(tx_input(&utxo.txid, utxo.vout)?);
    }

    let total_in: u64 = params.fee_utxo.value_sats
        + params
            .rune_utxos
            .iter()
            .map(|utxo| utxo.value_sats)
            .sum::<u64>();
    let change = total_in
        .checked_sub(RUNE_RETURN_OUTPUT_SATS + RECIPIENT_OUTPUT_SATS + WITHDRAWAL_FEE_SATS)
        .ok_or(Error::InsufficientFunds)?;

    let mut outputs = vec![
        TxOut {
            value: SatAmount::from_sat(RUNE_RETURN_OUTPUT_SATS),
            script_pubkey: params.rune_return.script_pubkey(),
        },
        TxOut {
            value: SatAmount::from_sat(RECIPIENT_OUTPUT_SATS),
            script_pubkey: params.recipient.script_pubkey(),
        },
    ];
    if change >= DUST_LIMIT_SATS {
        outputs.push(TxOut {
            value: SatAmount::from_sat(change),
            script_pubkey: params.fee_change.script_pubkey(),
        });
    }

    let runestone = encode_runestone(&[Edict {
        id: params.asset_id,
        amount: params.amount,
        output: 1,
    }]);
    outputs.push(TxOut {
        value: SatAmount::ZERO,
        script_pubkey: ScriptBuf::from_bytes(runestone),
    });

    let unsigned_tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs,
        output: outputs,
    };

    let mut psbt = Psbt::from_unsigned_tx(unsigned_tx)
        .map_err(|e| Error::Internal(format!("psbt assembly: {e}")))?;

    psbt.inputs[0].witness_utxo = Some(TxOut {
        value: SatAmount::from_sat(params.fee_utxo.value_sats),
        script_pubkey: params.fee_change.script_pubkey(),
    });
    for (i, utxo) in params.rune_utxos.iter().enumerate() {
        psbt.inputs[i + 1].witness_utxo = Some(TxOut {
            value: SatAmount::from_sat(utxo.value_sats),
            script_pubkey: params.rune_return.script_pubkey(),
        });
    }

    Ok(psbt)
}

/// Sign and finalize every input, returning the extracted transaction.
///
/// Input 0 is signed with ECDSA under the segwit key; every rune input is
/// signed with BIP-340 Schnorr under the taproot key tweaked with
/// `taggedHash("TapTweak", x_only_pubkey)`.
pub fn sign_withdrawal_psbt(
    mut psbt: Psbt,
    segwit_key: &SecretKey,
    taproot_keypair: &Keypair,
) -> Result<Transaction, Error> {
    let unsigned_tx = psbt.unsigned_tx.clone();
    let prevouts: Vec<TxOut> = psbt
        .inputs
        .iter()
        .map(|input| {
            input
                .witness_utxo
                .clone()
                .ok_or_else(|| Error::Internal("psbt input missing witness_utxo".to_string()))
        })
        .collect::<Result<_, _>>()?;

    let mut sighash_cache = SighashCache::new(&unsigned_tx);

    // Fee input: P2WPKH, ECDSA.
    let segwit_pubkey = segwit_key.public_key(&SECP256K1);
    let sighash = sighash_cache
        .p2wpkh_signature_hash(
            0,
            &prevouts[0].script_pubkey,
            prevouts[0].value,
            EcdsaSighashType::All,
        )
        .map_err(|e| Error::Internal(format!("segwit sighash: {e}")))?;
    let message = Message::from_digest(sighash.to_byte_array());
    let signature = SECP256K1.sign_ecdsa(&message, segwit_key);
    let signature = bitcoin::ecdsa::Signature::sighash_all(signature);
    psbt.inputs[0].final_script_witness = Some(Witness::p2wpkh(&signature, &segwit_pubkey));

    // Rune inputs: P2TR key spend, Schnorr under the tweaked key.
    let tweaked = taproot_keypair.tap_tweak(&SECP256K1, None);
    for index in 1..psbt.inputs.len() {
        let sighash = sighash_cache
            .taproot_key_spend_signature_hash(
                index,
                &Prevouts::All(&prevouts),
                TapSighashType::Default,
            )
            .map_err(|e| Error::Internal(format!("taproot sighash: {e}")))?;
        let message = Message::from_digest(sighash.to_byte_array());
        let signature = SECP256K1.sign_schnorr(&message, &tweaked.to_inner());
        let signature = bitcoin::taproot::Signature {
            signature,
            sighash_type: TapSighashType::Default,
        };

        let mut witness = Witness::new();
        witness.push(signature.to_vec());
        psbt.inputs[index].final_script_witness = Some(witness);
    }

    let tx = psbt
        .extract_tx()
        .map_err(|e| Error::Internal(format!("psbt extraction: {e}")))?;

    // The runestone must have survived assembly; a withdrawal without it
    // would strand the runes in output 0.
    let has_runestone = tx.output.iter().any(|output| {
        let bytes = output.script_pubkey.as_bytes();
        bytes.len() >= 2 && bytes[0] == 0x6a && bytes[1] == 0x5d
    });
    if !has_runestone {
        tracing::warn!(
            "withdrawal {} serialized without an OP_RETURN runestone",
            tx.compute_txid()
        );
    }

    Ok(tx)
}
