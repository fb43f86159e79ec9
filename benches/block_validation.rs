//! Block validation benchmarks.

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
use bch_consensus::utxo::{MemoryUtxoStore, UtxoEntry, UtxoViewpoint};
use bch_consensus::{BlockChain, ScriptError};
use chrono::{DateTime, TimeZone, Utc};
use criterion::{criterion_group, criterion_main, Criterion};

const REGTEST_BITS: u32 = 0x207fffff;
const NOW: i64 = 1_600_000_000;

struct FixedTime(DateTime<Utc>);

impl MedianTimeSource for FixedTime {
    fn adjusted_time(&self) -> DateTime<Utc> {
        self.0
    }
}

struct FixedBits(u32);

impl DifficultyOracle for FixedBits {
    fn next_required_bits(
        &self,
        _parent: &BlockNode,
        _timestamp: DateTime<Utc>,
    ) -> bch_consensus::Result<u32> {
        Ok(self.0)
    }
}

struct AcceptAllScripts;

impl ScriptVerifier for AcceptAllScripts {
    fn verify_input(&self, _ctx: &ScriptCheckContext<'_>) -> Result<u32, ScriptError> {
        Ok(1)
    }
}

fn coinbase(height: u32, value: i64) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxInput {
            previous_outpoint: OutPoint::null(),
            signature_script: vec![0x53, 0x00],
            sequence: 0xffff_ffff,
        }],
        outputs: vec![TxOutput {
            value,
            pk_script: vec![0x51; 45],
        }],
        lock_time: 0,
    }
}

fn spend(outpoint: OutPoint, value: i64) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxInput {
            previous_outpoint: outpoint,
            signature_script: vec![0u8; 48],
            sequence: 0xffff_ffff,
        }],
        outputs: vec![TxOutput {
            value,
            pk_script: vec![0x51; 20],
        }],
        lock_time: 0,
    }
}

fn build_fixture(num_spends: usize) -> (BlockChain, Arc<BlockNode>, Block) {
    let mut store = MemoryUtxoStore::new();
    let mut spends = Vec::with_capacity(num_spends);
    for i in 0..num_spends {
        let outpoint = OutPoint::new(Txid([(i % 251) as u8 + 1; 32]), i as u32);
        store.insert(outpoint, UtxoEntry::new(10_000, vec![0x51], 1, false));
        spends.push(spend(outpoint, 10_000));
    }
    // Canonical transaction order.
    spends.sort_by_key(|tx| tx.txid());
    let mut transactions = vec![coinbase(3, 5_000_000_000)];
    transactions.extend(spends);

    let chain = BlockChain::new(
        ChainParams::regtest(),
        ValidationConfig::default(),
        Box::new(FixedTime(Utc.timestamp_opt(NOW, 0).unwrap())),
        Box::new(FixedBits(REGTEST_BITS)),
        Box::new(FixedBlockSize(32_000_000)),
        Box::new(store),
        Box::new(AcceptAllScripts),
    );

    let mut tip: Option<Arc<BlockNode>> = None;
    for i in 0..3u32 {
        let header = BlockHeader {
            version: 4,
            prev_block: tip.as_ref().map_or(BlockHash(ZERO_HASH), |t| t.hash),
            merkle_root: ZERO_HASH,
            timestamp: Utc.timestamp_opt(NOW - 1_000 + i64::from(i) * 100, 0).unwrap(),
            bits: REGTEST_BITS,
            nonce: i,
        };
        tip = Some(Arc::new(BlockNode::new(&header, tip)));
    }
    let tip = tip.unwrap();

    let txids: Vec<Txid> = transactions.iter().map(|tx| tx.txid()).collect();
    let mut header = BlockHeader {
        version: 4,
        prev_block: tip.hash,
        merkle_root: merkle_root(&txids),
        timestamp: Utc.timestamp_opt(NOW - 100, 0).unwrap(),
        bits: REGTEST_BITS,
        nonce: 0,
    };
    let target = compact_to_target(header.bits).value;
    while hash_to_uint256(&header.block_hash().0) > target {
        header.nonce += 1;
    }

    let block = Block {
        header,
        transactions,
    };
    (chain, tip, block)
}

fn bench_block_sanity(c: &mut Criterion) {
    let (chain, _tip, block) = build_fixture(200);
    c.bench_function("check_block_sanity_200_spends", |b| {
        b.iter(|| chain.check_block_sanity(&block, true, true).unwrap())
    });
}

fn bench_connect_block(c: &mut Criterion) {
    let (chain, tip, block) = build_fixture(200);
    c.bench_function("check_connect_block_200_spends", |b| {
        b.iter(|| {
            let node = BlockNode::new(&block.header, Some(Arc::clone(&tip)));
            let mut view = UtxoViewpoint::new();
            chain
                .check_connect_block(&node, &block, &mut view, None)
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_block_sanity, bench_connect_block);
criterion_main!(benches);
