//! Runestone codec.
//!
//! Encodes rune transfers into the OP_RETURN payload the Runes protocol
//! reads: `OP_RETURN OP_13 <len> <LEB128 payload>`, where the payload is
//! tag 0 followed by four varints per edict. Block and tx are delta-encoded
//! against the previous edict's cumulative values; tx is *not* reset at
//! block boundaries, matching the deployed encoder.

use runemint_protocol::AssetId;

const OP_RETURN: u8 = 0x6a;
const OP_13: u8 = 0x5d;
const TAG_BODY: u128 = 0;

/// One transfer instruction: move `amount` of `id` to output `output`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edict {
    /// The rune being moved
    pub id: AssetId,
    /// Amount in the smallest rune unit
    pub amount: u128,
    /// Index of the receiving output
    pub output: u32,
}

/// Append an unsigned LEB128 varint.
pub fn encode_varint(mut value: u128, buf: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Read an unsigned LEB128 varint, advancing `pos`. `None` on truncation or
/// a value wider than 128 bits.
pub fn decode_varint(bytes: &[u8], pos: &mut usize) -> Option<u128> {
    let mut value: u128 = 0;
    let mut shift: u32 = 0;
    loop {
        let byte = *bytes.get(*pos)?;
        *pos += 1;
        if shift >= 128 {
            return None;
        }
        value |= ((byte & 0x7f) as u128) << shift;
        if byte & 0x80 == 0 {
            return Some(value);
        }
        shift += 7;
    }
}

/// Encode edicts into a complete OP_RETURN script.
///
/// Callers order edicts by id; the mint emits a single edict per
/// withdrawal. An empty list encodes to exactly `6a 5d 00`.
pub fn encode_runestone(edicts: &[Edict]) -> Vec<u8> {
    let mut payload = Vec::new();

    if !edicts.is_empty() {
        encode_varint(TAG_BODY, &mut payload);
        let mut prev_block: u64 = 0;
        let mut prev_tx: u32 = 0;
        for edict in edicts {
            encode_varint(edict.id.block.saturating_sub(prev_block) as u128, &mut payload);
            encode_varint(edict.id.tx.saturating_sub(prev_tx) as u128, &mut payload);
            encode_varint(edict.amount, &mut payload);
            encode_varint(edict.output as u128, &mut payload);
            prev_block = edict.id.block;
            prev_tx = edict.id.tx;
        }
    }

    let mut script = Vec::with_capacity(payload.len() + 3);
    script.push(OP_RETURN);
    script.push(OP_13);
    script.push(payload.len() as u8);
    script.extend_from_slice(&payload);
    script
}

/// Decode an OP_RETURN script back into edicts.
///
/// Returns `None` when the script is not a runestone or is truncated;
/// a runestone whose leading tag is not the edict body decodes to an empty
/// list. Never panics on hostile input.
pub fn decode_runestone(script: &[u8]) -> Option<Vec<Edict>> {
    if script.len() < 3 || script[0] != OP_RETURN || script[1] != OP_13 {
        return None;
    }
    let len = script[2] as usize;
    let payload = script.get(3..3 + len)?;

    if payload.is_empty() {
        return Some(Vec::new());
    }

    let mut pos = 0;
    let tag = decode_varint(payload, &mut pos)?;
    if tag != TAG_BODY {
        return Some(Vec::new());
    }

    let mut edicts = Vec::new();
    let mut prev_block: u64 = 0;
    let mut prev_tx: u32 = 0;
    while pos < payload.len() {
        let block_delta = decode_varint(payload, &mut pos)?;
        let tx_delta = decode_varint(payload, &mut pos)?;
        let amount = decode_varint(payload, &mut pos)?;
        let output = decode_varint(payload, &mut pos)?;

        let block = prev_block.checked_add(u64::try_from(block_delta).ok()?)?;
        let tx = prev_tx.checked_add(u32::try_from(tx_delta).ok()?)?;

        edicts.push(Edict {
            id: AssetId::new(block, tx),
            amount,
            output: u32::try_from(output).ok()?,
        });

        prev_block = block;
        prev_tx = tx;
    }

    Some(edicts)
}
