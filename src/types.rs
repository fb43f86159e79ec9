//! Core data types shared across the validation pipeline.
//!
//! Blocks and transactions are immutable inputs to the rule checks; nothing
//! in this module mutates them after construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::serialization;

/// A 256-bit hash.
pub type Hash = [u8; 32];

/// The all-zero hash, used by the null outpoint.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Parse a hash from its big-endian display form into internal byte order.
fn hash_from_hex(s: &str) -> Option<Hash> {
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(s, &mut bytes).ok()?;
    bytes.reverse();
    Some(bytes)
}

fn hash_to_hex(hash: &Hash) -> String {
    let mut reversed = *hash;
    reversed.reverse();
    hex::encode(reversed)
}

/// A block hash in internal (little-endian) byte order.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHash(pub Hash);

impl BlockHash {
    /// Parse from the conventional big-endian display form.
    pub fn from_hex(s: &str) -> Option<Self> {
        hash_from_hex(s).map(BlockHash)
    }

    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }
}

impl std::fmt::Display for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hash_to_hex(&self.0))
    }
}

/// A transaction id in internal (little-endian) byte order.
///
/// The derived ordering compares raw bytes, which is the ordering the
/// canonical transaction order rule is defined over.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Txid(pub Hash);

impl Txid {
    /// Parse from the conventional big-endian display form.
    pub fn from_hex(s: &str) -> Option<Self> {
        hash_from_hex(s).map(Txid)
    }

    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }
}

impl std::fmt::Display for Txid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hash_to_hex(&self.0))
    }
}

/// A reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Txid,
    pub index: u32,
}

impl OutPoint {
    pub fn new(hash: Txid, index: u32) -> Self {
        OutPoint { hash, index }
    }

    /// The null outpoint referenced by the sole input of a coinbase.
    pub const fn null() -> Self {
        OutPoint {
            hash: Txid(ZERO_HASH),
            index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.index == u32::MAX && self.hash.0 == ZERO_HASH
    }
}

/// A transaction input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub previous_outpoint: OutPoint,
    pub signature_script: Vec<u8>,
    pub sequence: u32,
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: i64,
    pub pk_script: Vec<u8>,
}

/// A transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
}

impl Transaction {
    /// The transaction id: double SHA-256 of the serialized transaction.
    pub fn txid(&self) -> Txid {
        Txid(serialization::double_sha256(
            &serialization::serialize_transaction(self),
        ))
    }

    /// Size of the transaction in serialized wire format.
    pub fn serialized_size(&self) -> u64 {
        serialization::transaction_serialized_size(self)
    }
}

/// A block header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: BlockHash,
    pub merkle_root: Hash,
    pub timestamp: DateTime<Utc>,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// The block hash: double SHA-256 of the 80-byte serialized header.
    pub fn block_hash(&self) -> BlockHash {
        BlockHash(serialization::double_sha256(
            &serialization::serialize_header(self),
        ))
    }
}

/// A block: header plus ordered transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn block_hash(&self) -> BlockHash {
        self.header.block_hash()
    }

    /// Size of the block in serialized wire format.
    pub fn serialized_size(&self) -> u64 {
        serialization::block_serialized_size(self)
    }
}
