//! Block and header wire-format encoding.

use super::transaction::{serialize_transaction, transaction_serialized_size};
use super::varint::{encode_varint, varint_serialized_size};
use crate::types::{Block, BlockHeader};

/// Serialized size of a block header.
pub const HEADER_SIZE: u64 = 80;

/// Serialize a block header to its 80-byte wire format.
///
/// The timestamp is truncated to whole seconds on the wire; the one-second
/// precision rule in the sanity checks rejects headers that would lose
/// information here.
pub fn serialize_header(header: &BlockHeader) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_SIZE as usize);
    out.extend_from_slice(&header.version.to_le_bytes());
    out.extend_from_slice(&header.prev_block.0);
    out.extend_from_slice(&header.merkle_root);
    out.extend_from_slice(&(header.timestamp.timestamp() as u32).to_le_bytes());
    out.extend_from_slice(&header.bits.to_le_bytes());
    out.extend_from_slice(&header.nonce.to_le_bytes());
    out
}

/// Serialize a block to wire format: header, transaction count, transactions.
pub fn serialize_block(block: &Block) -> Vec<u8> {
    let mut out = Vec::with_capacity(block_serialized_size(block) as usize);
    out.extend_from_slice(&serialize_header(&block.header));
    out.extend_from_slice(&encode_varint(block.transactions.len() as u64));
    for tx in &block.transactions {
        out.extend_from_slice(&serialize_transaction(tx));
    }
    out
}

/// Size of a block in wire format, without materializing the bytes.
pub fn block_serialized_size(block: &Block) -> u64 {
    HEADER_SIZE
        + varint_serialized_size(block.transactions.len() as u64)
        + block
            .transactions
            .iter()
            .map(transaction_serialized_size)
            .sum::<u64>()
}
