//! Transaction wire-format encoding.

use super::varint::{encode_varint, varint_serialized_size};
use crate::types::Transaction;

/// Serialize a transaction to wire format.
///
/// Layout:
/// - version (4 bytes, little-endian, signed)
/// - input count (varint), then per input:
///   previous outpoint hash (32) + index (4), script length (varint),
///   script bytes, sequence (4)
/// - output count (varint), then per output:
///   value (8, little-endian), script length (varint), script bytes
/// - lock time (4 bytes, little-endian)
pub fn serialize_transaction(tx: &Transaction) -> Vec<u8> {
    let mut out = Vec::with_capacity(transaction_serialized_size(tx) as usize);

    out.extend_from_slice(&tx.version.to_le_bytes());

    out.extend_from_slice(&encode_varint(tx.inputs.len() as u64));
    for input in &tx.inputs {
        out.extend_from_slice(&input.previous_outpoint.hash.0);
        out.extend_from_slice(&input.previous_outpoint.index.to_le_bytes());
        out.extend_from_slice(&encode_varint(input.signature_script.len() as u64));
        out.extend_from_slice(&input.signature_script);
        out.extend_from_slice(&input.sequence.to_le_bytes());
    }

    out.extend_from_slice(&encode_varint(tx.outputs.len() as u64));
    for output in &tx.outputs {
        out.extend_from_slice(&output.value.to_le_bytes());
        out.extend_from_slice(&encode_varint(output.pk_script.len() as u64));
        out.extend_from_slice(&output.pk_script);
    }

    out.extend_from_slice(&tx.lock_time.to_le_bytes());

    out
}

/// Size of a transaction in wire format, without materializing the bytes.
pub fn transaction_serialized_size(tx: &Transaction) -> u64 {
    // version + lock_time
    let mut size = 8u64;

    size += varint_serialized_size(tx.inputs.len() as u64);
    for input in &tx.inputs {
        let script_len = input.signature_script.len() as u64;
        // outpoint (36) + sequence (4)
        size += 40 + varint_serialized_size(script_len) + script_len;
    }

    size += varint_serialized_size(tx.outputs.len() as u64);
    for output in &tx.outputs {
        let script_len = output.pk_script.len() as u64;
        // value (8)
        size += 8 + varint_serialized_size(script_len) + script_len;
    }

    size
}
