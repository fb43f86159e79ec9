//! Wire-format serialization and serialized-size accounting.
//!
//! Consensus rules bound transactions and blocks by their serialized size,
//! and hashes are computed over the serialized forms, so the encoding here
//! must match the network wire format exactly.

pub mod block;
pub mod transaction;
pub mod varint;

pub use block::{block_serialized_size, serialize_block, serialize_header};
pub use transaction::{serialize_transaction, transaction_serialized_size};
pub use varint::{encode_varint, varint_serialized_size};

use sha2::{Digest, Sha256};

use crate::types::Hash;

/// Double SHA-256, the hash used for txids, block hashes and merkle nodes.
pub fn double_sha256(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}
