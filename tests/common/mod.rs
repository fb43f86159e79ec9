//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use bch_consensus::activation::FixedBlockSize;
use bch_consensus::config::ValidationConfig;
use bch_consensus::index::BlockNode;
use bch_consensus::mediantime::MedianTimeSource;
use bch_consensus::merkle::merkle_root;
use bch_consensus::params::ChainParams;
use bch_consensus::pow::{compact_to_target, hash_to_uint256, DifficultyOracle};
use bch_consensus::script::{ScriptCheckContext, ScriptVerifier};
use bch_consensus::types::{
    Block, BlockHash, BlockHeader, OutPoint, Transaction, TxInput, TxOutput, Txid, ZERO_HASH,
};
use bch_consensus::utxo::MemoryUtxoStore;
use bch_consensus::{BlockChain, ScriptError};
use chrono::{DateTime, TimeZone, Utc};

/// The all-permissive difficulty bits used by the regression test network.
pub const REGTEST_BITS: u32 = 0x207fffff;

/// A fixed "wall clock" so the future-timestamp ceiling is deterministic.
pub const NOW: i64 = 1_600_000_000;

pub struct FixedTime(pub DateTime<Utc>);

impl MedianTimeSource for FixedTime {
    fn adjusted_time(&self) -> DateTime<Utc> {
        self.0
    }
}

pub struct FixedBits(pub u32);

impl DifficultyOracle for FixedBits {
    fn next_required_bits(
        &self,
        _parent: &BlockNode,
        _timestamp: DateTime<Utc>,
    ) -> bch_consensus::Result<u32> {
        Ok(self.0)
    }
}

/// A script interpreter that accepts every input and reports one signature
/// check per input.
pub struct AcceptAllScripts;

impl ScriptVerifier for AcceptAllScripts {
    fn verify_input(&self, _ctx: &ScriptCheckContext<'_>) -> Result<u32, ScriptError> {
        Ok(1)
    }
}

pub fn chain_with(params: ChainParams, store: MemoryUtxoStore) -> BlockChain {
    BlockChain::new(
        params,
        ValidationConfig::default(),
        Box::new(FixedTime(Utc.timestamp_opt(NOW, 0).unwrap())),
        Box::new(FixedBits(REGTEST_BITS)),
        Box::new(FixedBlockSize(32_000_000)),
        Box::new(store),
        Box::new(AcceptAllScripts),
    )
}

/// Grind the nonce until the header hash meets its own target.
pub fn solve(header: &mut BlockHeader) {
    let target = compact_to_target(header.bits).value;
    while hash_to_uint256(&header.block_hash().0) > target {
        header.nonce += 1;
    }
}

/// Minimal BIP34 height encoding for a coinbase signature script.
pub fn encoded_height(height: u32) -> Vec<u8> {
    if height == 0 {
        return vec![0x00, 0x00];
    }
    if height <= 16 {
        return vec![0x50 + height as u8, 0x00];
    }
    let mut le = height.to_le_bytes().to_vec();
    while le.last() == Some(&0) {
        le.pop();
    }
    let mut script = vec![le.len() as u8];
    script.extend_from_slice(&le);
    script
}

/// A coinbase claiming `value`, embedding `height`, padded past the
/// MagneticAnomaly minimum transaction size.
pub fn coinbase_at(height: u32, value: i64) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxInput {
            previous_outpoint: OutPoint::null(),
            signature_script: encoded_height(height),
            sequence: 0xffff_ffff,
        }],
        outputs: vec![TxOutput {
            value,
            pk_script: vec![0x51; 45],
        }],
        lock_time: 0,
    }
}

/// A non-coinbase spend of the given outpoints, padded past the
/// MagneticAnomaly minimum transaction size.
pub fn spend_of(outpoints: &[OutPoint], value: i64) -> Transaction {
    Transaction {
        version: 1,
        inputs: outpoints
            .iter()
            .map(|op| TxInput {
                previous_outpoint: *op,
                signature_script: vec![0u8; 48],
                sequence: 0xffff_ffff,
            })
            .collect(),
        outputs: vec![TxOutput {
            value,
            pk_script: vec![0x51; 20],
        }],
        lock_time: 0,
    }
}

/// Assemble and solve a block extending `parent`.
pub fn build_block(parent: &BlockNode, transactions: Vec<Transaction>, timestamp: i64) -> Block {
    let txids: Vec<Txid> = transactions.iter().map(|tx| tx.txid()).collect();
    let mut header = BlockHeader {
        version: 4,
        prev_block: parent.hash,
        merkle_root: merkle_root(&txids),
        timestamp: Utc.timestamp_opt(timestamp, 0).unwrap(),
        bits: REGTEST_BITS,
        nonce: 0,
    };
    solve(&mut header);
    Block {
        header,
        transactions,
    }
}

/// A synthetic chain of `len` index nodes with evenly spaced timestamps.
pub fn node_chain(len: u32, start: i64, spacing: i64) -> Arc<BlockNode> {
    let mut tip: Option<Arc<BlockNode>> = None;
    for i in 0..len {
        let header = BlockHeader {
            version: 4,
            prev_block: tip.as_ref().map_or(BlockHash(ZERO_HASH), |t| t.hash),
            merkle_root: ZERO_HASH,
            timestamp: Utc
                .timestamp_opt(start + spacing * i64::from(i), 0)
                .unwrap(),
            bits: REGTEST_BITS,
            nonce: i,
        };
        tip = Some(Arc::new(BlockNode::new(&header, tip)));
    }
    tip.unwrap()
}

/// The index node a block would occupy above `parent`.
pub fn node_for(block: &Block, parent: &Arc<BlockNode>) -> BlockNode {
    BlockNode::new(&block.header, Some(Arc::clone(parent)))
}
