//! Block-level consensus checks and the connect orchestrator.
//!
//! The checks are layered the way they run: context-free sanity first, then
//! contextual header and block checks against the parent node, and finally
//! the connect pass that applies the block to a UTXO viewpoint. Every check
//! for a given block runs under the caller's chain lock; the only
//! parallelism is the script-verification fan-out at the very end.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use crate::activation::{ActivationSet, BehaviorFlags, BlockSizeOracle};
use crate::config::ValidationConfig;
use crate::constants::{
    BLOCK_MAX_BYTES_MAX_SIG_CHECKS_RATIO, LEGACY_MAX_BLOCK_SIZE, MAX_TIME_OFFSET_SECONDS,
    SERIALIZED_HEIGHT_VERSION,
};
use crate::economic::calc_block_subsidy;
use crate::error::{rule_error, ConsensusError, Result, RuleErrorCode};
use crate::index::BlockNode;
use crate::mediantime::MedianTimeSource;
use crate::merkle::merkle_root;
use crate::params::{ChainParams, Network};
use crate::pow::{check_proof_of_work_with_flags, DifficultyOracle};
use crate::script::{check_block_scripts, ScriptFlags, ScriptVerifier};
use crate::sequence_locks::{calc_sequence_lock, sequence_lock_active};
use crate::transaction::{
    check_serialized_height, check_transaction_inputs, check_transaction_sanity, is_coinbase,
    is_finalized_transaction,
};
use crate::types::{Block, BlockHash, BlockHeader, OutPoint, Txid};
use crate::utxo::{SpentTxOut, UtxoStore, UtxoViewpoint};

/// Whether a block of this version must embed the serialized block height
/// in its coinbase signature script (BIP34). Version 2 and above.
pub fn should_have_serialized_block_height(header: &BlockHeader) -> bool {
    header.version >= SERIALIZED_HEIGHT_VERSION
}

/// The two historical blocks that violate the duplicate-transaction
/// overwrite rule and are grandfathered past it.
fn bip30_exceptions() -> &'static [(u32, BlockHash); 2] {
    static EXCEPTIONS: OnceLock<[(u32, BlockHash); 2]> = OnceLock::new();
    EXCEPTIONS.get_or_init(|| {
        [
            (
                91_842,
                BlockHash::from_hex(
                    "00000000000a4d0a398161ffc163c503763b1f4360639393e0e4c8e300e0caec",
                )
                .expect("static exception hash"),
            ),
            (
                91_880,
                BlockHash::from_hex(
                    "00000000000743f190a18c5577a3c2d2a1f610ae9601ac046a38084ccb7cd721",
                )
                .expect("static exception hash"),
            ),
        ]
    })
}

/// Whether `node` is one of the two blocks exempt from the BIP30 overwrite
/// check.
pub fn is_bip30_node(node: &BlockNode) -> bool {
    bip30_exceptions()
        .iter()
        .any(|(height, hash)| node.height == *height && node.hash == *hash)
}

/// The validation core, holding the chain parameters and the external
/// collaborators the rule checks consult.
///
/// The struct itself carries no chain state: the block index, the UTXO
/// store, the difficulty calculator and the script interpreter all live
/// behind their seams, and the current tip is passed in where a check
/// needs one.
pub struct BlockChain {
    params: ChainParams,
    config: ValidationConfig,
    time_source: Box<dyn MedianTimeSource>,
    difficulty: Box<dyn DifficultyOracle>,
    block_size: Box<dyn BlockSizeOracle>,
    store: Box<dyn UtxoStore>,
    script_verifier: Box<dyn ScriptVerifier>,
}

impl BlockChain {
    pub fn new(
        params: ChainParams,
        config: ValidationConfig,
        time_source: Box<dyn MedianTimeSource>,
        difficulty: Box<dyn DifficultyOracle>,
        block_size: Box<dyn BlockSizeOracle>,
        store: Box<dyn UtxoStore>,
        script_verifier: Box<dyn ScriptVerifier>,
    ) -> Self {
        BlockChain {
            params,
            config,
            time_source,
            difficulty,
            block_size,
            store,
            script_verifier,
        }
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// The maximum number of bytes allowed in a block under the given
    /// activation state: the legacy limit before UAHF, the configured
    /// excessive block size up to ABLA, and the adaptive limit after.
    pub fn max_block_size(&self, uahf_active: bool, abla_active: bool) -> u64 {
        if !uahf_active {
            return LEGACY_MAX_BLOCK_SIZE;
        }
        if !abla_active {
            return self.config.excessive_block_size;
        }
        self.block_size.block_size_limit()
    }

    /// Whether the CSV deployment is active for the block extending
    /// `parent`.
    pub fn is_csv_active(&self, parent: &BlockNode) -> bool {
        parent.height + 1 >= self.params.csv_height
    }

    /// Context-free header checks: proof of work, timestamp precision, and
    /// the future-timestamp ceiling.
    fn check_block_header_sanity(&self, header: &BlockHeader, flags: BehaviorFlags) -> Result<()> {
        check_proof_of_work_with_flags(header, &self.params.pow_limit, flags)?;

        // The consensus rules operate at one-second precision.
        if header.timestamp.timestamp_subsec_nanos() != 0 {
            return Err(rule_error(
                RuleErrorCode::InvalidTime,
                format!(
                    "block timestamp of {} has a higher precision than one second",
                    header.timestamp
                ),
            ));
        }

        let max_timestamp = self.time_source.adjusted_time()
            + chrono::Duration::seconds(MAX_TIME_OFFSET_SECONDS);
        if header.timestamp > max_timestamp {
            return Err(rule_error(
                RuleErrorCode::TimeTooNew,
                format!("block timestamp of {} is too far in the future", header.timestamp),
            ));
        }

        Ok(())
    }

    fn check_block_sanity_internal(&self, block: &Block, flags: BehaviorFlags) -> Result<()> {
        self.check_block_header_sanity(&block.header, flags)?;

        if block.transactions.is_empty() {
            return Err(rule_error(
                RuleErrorCode::NoTransactions,
                "block does not contain any transactions",
            ));
        }

        if !is_coinbase(&block.transactions[0]) {
            return Err(rule_error(
                RuleErrorCode::FirstTxNotCoinbase,
                "first transaction in block is not a coinbase",
            ));
        }

        for (index, tx) in block.transactions.iter().enumerate().skip(1) {
            if is_coinbase(tx) {
                return Err(rule_error(
                    RuleErrorCode::MultipleCoinbases,
                    format!("block contains second coinbase at index {index}"),
                ));
            }
        }

        let magnetic_anomaly = flags.has(BehaviorFlags::MAGNETIC_ANOMALY);
        let upgrade9 = flags.has(BehaviorFlags::UPGRADE9);

        let mut script_flags = ScriptFlags::empty();
        if magnetic_anomaly {
            script_flags |= ScriptFlags::SIG_PUSH_ONLY
                | ScriptFlags::CLEAN_STACK
                | ScriptFlags::CHECK_DATA_SIG;
        }

        // Computing the txids once also serves the merkle and duplicate
        // checks below.
        let txids: Vec<Txid> = block.transactions.iter().map(|tx| tx.txid()).collect();

        for (index, tx) in block.transactions.iter().enumerate() {
            // The canonical order rule covers everything after the
            // coinbase. Equal neighbors fall through to the duplicate
            // check.
            if magnetic_anomaly && index >= 2 && txids[index] < txids[index - 1] {
                return Err(rule_error(
                    RuleErrorCode::InvalidTxOrder,
                    "transactions are not in lexicographical order",
                ));
            }
            check_transaction_sanity(tx, magnetic_anomaly, upgrade9, script_flags)?;
        }

        let calculated_merkle_root = merkle_root(&txids);
        if block.header.merkle_root != calculated_merkle_root {
            return Err(rule_error(
                RuleErrorCode::BadMerkleRoot,
                format!(
                    "block merkle root is invalid - block header indicates {}, but calculated \
                     value is {}",
                    hex::encode(block.header.merkle_root),
                    hex::encode(calculated_merkle_root),
                ),
            ));
        }

        let mut existing_txids = HashSet::with_capacity(txids.len());
        for txid in &txids {
            if !existing_txids.insert(txid) {
                return Err(rule_error(
                    RuleErrorCode::DuplicateTx,
                    format!("block contains duplicate transaction {txid}"),
                ));
            }
        }

        Ok(())
    }

    /// Context-free block checks: header sanity, coinbase placement,
    /// canonical transaction order, per-transaction sanity, merkle root,
    /// and duplicate transactions.
    pub fn check_block_sanity(
        &self,
        block: &Block,
        magnetic_anomaly_active: bool,
        upgrade9_active: bool,
    ) -> Result<()> {
        let mut flags = BehaviorFlags::NONE;
        if magnetic_anomaly_active {
            flags |= BehaviorFlags::MAGNETIC_ANOMALY;
        }
        if upgrade9_active {
            flags |= BehaviorFlags::UPGRADE9;
        }
        self.check_block_sanity_internal(block, flags)
    }

    /// Contextual header checks against the parent node: difficulty
    /// agreement, median-time ordering, checkpoints, and version gating.
    pub fn check_block_header_context(
        &self,
        header: &BlockHeader,
        prev_node: &BlockNode,
        flags: BehaviorFlags,
    ) -> Result<()> {
        let block_height = prev_node.height + 1;

        if !flags.has(BehaviorFlags::FAST_ADD) {
            let expected_difficulty = self
                .difficulty
                .next_required_bits(prev_node, header.timestamp)?;
            if header.bits != expected_difficulty {
                return Err(rule_error(
                    RuleErrorCode::UnexpectedDifficulty,
                    format!(
                        "block difficulty of {:#010x} is not the expected value of {:#010x}",
                        header.bits, expected_difficulty
                    ),
                ));
            }

            let median_time = prev_node.calc_past_median_time();
            if header.timestamp <= median_time {
                return Err(rule_error(
                    RuleErrorCode::TimeTooOld,
                    format!(
                        "block timestamp of {} is not after expected {median_time}",
                        header.timestamp
                    ),
                ));
            }
        }

        let block_hash = header.block_hash();
        if let Some(checkpoint) = self.params.checkpoint_at(block_height) {
            if checkpoint.hash != block_hash {
                return Err(rule_error(
                    RuleErrorCode::BadCheckpoint,
                    format!("block at height {block_height} does not match checkpoint hash"),
                ));
            }
        }
        if let Some(latest) = self.params.latest_checkpoint() {
            if block_height < latest.height {
                return Err(rule_error(
                    RuleErrorCode::ForkTooOld,
                    format!(
                        "block at height {block_height} forks the main chain before the previous \
                         checkpoint at height {}",
                        latest.height
                    ),
                ));
            }
        }

        // Outdated versions are rejected once the matching soft fork
        // reached its activation height.
        if (header.version < 2 && block_height >= self.params.bip34_height)
            || (header.version < 3 && block_height >= self.params.bip66_height)
            || (header.version < 4 && block_height >= self.params.bip65_height)
        {
            return Err(rule_error(
                RuleErrorCode::BlockVersionTooOld,
                format!("new blocks with version {} are no longer valid", header.version),
            ));
        }

        Ok(())
    }

    /// Header sanity plus contextual header checks against the given tip.
    pub fn check_block_header(&self, header: &BlockHeader, tip: &BlockNode) -> Result<()> {
        self.check_block_header_sanity(header, BehaviorFlags::NONE)?;
        self.check_block_header_context(header, tip, BehaviorFlags::NONE)
    }

    /// Contextual block checks against the parent node: size limits under
    /// the active rule epoch, the first-UAHF-block size floor, transaction
    /// finality under the epoch's time basis, and the BIP34 height
    /// embedding.
    pub fn check_block_context(
        &self,
        block: &Block,
        prev_node: &BlockNode,
        flags: BehaviorFlags,
    ) -> Result<()> {
        let header = &block.header;
        self.check_block_header_context(header, prev_node, flags)?;

        let block_height = prev_node.height + 1;
        let uahf_active = block_height > self.params.uahf_fork_height;
        let abla_active = block_height > self.params.abla_fork_height;

        // The size limit is contextual from UAHF onward, so both bounds
        // live here rather than in the sanity checks.
        let max_block_size = self.max_block_size(uahf_active, abla_active);
        let num_tx = block.transactions.len() as u64;
        if num_tx > max_block_size {
            return Err(rule_error(
                RuleErrorCode::BlockTooBig,
                format!("block contains too many transactions - got {num_tx}, max {max_block_size}"),
            ));
        }

        // The first block after the UAHF fork must be larger than the
        // legacy limit on the public networks.
        if matches!(self.params.network, Network::Mainnet | Network::Testnet3)
            && block_height == self.params.uahf_fork_height + 1
            && block.serialized_size() <= LEGACY_MAX_BLOCK_SIZE
        {
            return Err(rule_error(
                RuleErrorCode::BlockTooSmall,
                "the first block after uahf fork block is not greater than 1MB",
            ));
        }

        let serialized_size = block.serialized_size();
        if serialized_size > max_block_size {
            return Err(rule_error(
                RuleErrorCode::BlockTooBig,
                format!("serialized block is too big - got {serialized_size}, max {max_block_size}"),
            ));
        }

        if !flags.has(BehaviorFlags::FAST_ADD) {
            // Once CSV is active, lock-time checks run against the
            // parent's median time past instead of the header timestamp.
            let block_time = if self.is_csv_active(prev_node) {
                prev_node.calc_past_median_time()
            } else {
                header.timestamp
            };

            for tx in &block.transactions {
                if !is_finalized_transaction(tx, block_height, block_time) {
                    return Err(rule_error(
                        RuleErrorCode::UnfinalizedTx,
                        format!("block contains unfinalized transaction {}", tx.txid()),
                    ));
                }
            }

            if should_have_serialized_block_height(header)
                && block_height >= self.params.bip34_height
            {
                if let Some(coinbase_tx) = block.transactions.first() {
                    check_serialized_height(coinbase_tx, block_height)?;
                }
            }
        }

        Ok(())
    }

    /// The BIP30 overwrite check: no output position created by this block
    /// may shadow a still-unspent entry.
    fn check_bip30(&self, block: &Block, view: &UtxoViewpoint) -> Result<()> {
        for tx in &block.transactions {
            let txid = tx.txid();
            for output_index in 0..tx.outputs.len() {
                let outpoint = OutPoint::new(txid, output_index as u32);
                let unspent = match view.lookup_entry(&outpoint) {
                    Some(entry) => !entry.is_spent(),
                    None => match self.store.fetch_entry(&outpoint)? {
                        Some(entry) => !entry.is_spent(),
                        None => false,
                    },
                };
                if unspent {
                    return Err(rule_error(
                        RuleErrorCode::OverwriteTx,
                        format!("tried to overwrite transaction {txid} that is not fully spent"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Verify that connecting `block` at `node` to the chain state
    /// represented by `view` violates no rules, updating the view to spend
    /// the referenced outputs and stage the created ones.
    ///
    /// `stxos`, when provided, receives one entry per spent output in
    /// spend order, sufficient to roll the view back exactly.
    ///
    /// The block must already have passed the sanity and contextual
    /// checks.
    pub fn check_connect_block(
        &self,
        node: &BlockNode,
        block: &Block,
        view: &mut UtxoViewpoint,
        mut stxos: Option<&mut Vec<SpentTxOut>>,
    ) -> Result<()> {
        // The genesis coinbase is unspendable.
        if node.hash == self.params.genesis_hash {
            return Err(rule_error(
                RuleErrorCode::MissingTxOut,
                "the coinbase for the genesis block is not spendable",
            ));
        }

        let parent = node.parent.as_deref().ok_or_else(|| {
            ConsensusError::Store("block node has no parent in the index".to_string())
        })?;
        let activation = ActivationSet::from_parent(parent, &self.params);

        // From BIP34 onward the embedded height makes overwrites
        // impossible, so the expensive scan is limited to the historical
        // range, minus the two grandfathered blocks.
        if !is_bip30_node(node) && node.height < self.params.bip34_height {
            self.check_bip30(block, view)?;
        }

        view.fetch_input_utxos(
            self.store.as_ref(),
            block,
            node.height,
            activation.magnetic_anomaly,
        )?;

        let csv_active = self.is_csv_active(parent);
        let script_flags =
            activation.script_flags(&block.header, node.height, csv_active, &self.params);

        let mut total_fees: i64 = 0;
        for tx in &block.transactions {
            let tx_fee = check_transaction_inputs(tx, node.height, view, &self.params)?;

            total_fees = total_fees.checked_add(tx_fee).ok_or_else(|| {
                rule_error(
                    RuleErrorCode::BadFees,
                    "total fees for block overflows accumulator",
                )
            })?;

            // Without canonical ordering each transaction connects as it
            // is checked, which is what enforces topological order: a
            // spend of a later transaction's output finds nothing staged.
            if !activation.magnetic_anomaly {
                view.connect_transaction(tx, node.height, stxos.as_deref_mut(), false)?;
            }
        }

        // Canonical ordering admits outputs-then-inputs connection for the
        // whole block at once.
        if activation.magnetic_anomaly {
            view.connect_transactions(block, node.height, stxos.as_deref_mut(), false)?;
        }

        let coinbase_tx = block.transactions.first().ok_or_else(|| {
            rule_error(RuleErrorCode::NoTransactions, "block does not contain any transactions")
        })?;
        let total_coinbase_out: i64 = coinbase_tx.outputs.iter().map(|output| output.value).sum();
        let expected_coinbase_out = calc_block_subsidy(node.height, &self.params) + total_fees;
        if total_coinbase_out > expected_coinbase_out {
            return Err(rule_error(
                RuleErrorCode::BadCoinbaseValue,
                format!(
                    "coinbase transaction for block pays {total_coinbase_out} which is more than \
                     expected value of {expected_coinbase_out}"
                ),
            ));
        }

        // Blocks at or below the latest checkpoint are covered by the
        // checkpoint hash, so the expensive script work is skipped.
        let run_scripts = self
            .params
            .latest_checkpoint()
            .map_or(true, |checkpoint| node.height > checkpoint.height);

        if csv_active {
            let median_time = parent.calc_past_median_time();
            for tx in &block.transactions {
                let lock = calc_sequence_lock(node, tx, view, true)?;
                if !sequence_lock_active(&lock, node.height, median_time) {
                    return Err(rule_error(
                        RuleErrorCode::UnfinalizedTx,
                        "block contains transaction whose input sequence locks are not met",
                    ));
                }
            }
        }

        if run_scripts {
            let max_sig_checks =
                self.block_size.block_size_limit() / BLOCK_MAX_BYTES_MAX_SIG_CHECKS_RATIO;
            check_block_scripts(
                block,
                view,
                script_flags,
                self.script_verifier.as_ref(),
                max_sig_checks,
                self.config.parallel_script_validation,
            )?;
        }

        Ok(())
    }

    /// Fully validate that `block` could connect to the current tip,
    /// without the proof-of-work hash comparison. Used for mining
    /// templates; runs against an empty view and discards all staging.
    pub fn check_connect_block_template(&self, block: &Block, tip: &Arc<BlockNode>) -> Result<()> {
        let mut flags = BehaviorFlags::NO_POW_CHECK;

        let header = &block.header;
        if tip.hash != header.prev_block {
            return Err(rule_error(
                RuleErrorCode::PrevBlockNotBest,
                format!(
                    "previous block must be the current chain tip {}, instead got {}",
                    tip.hash, header.prev_block
                ),
            ));
        }

        let block_height = tip.height + 1;
        if block_height > self.params.magnetic_anomaly_fork_height {
            flags |= BehaviorFlags::MAGNETIC_ANOMALY;
        }

        self.check_block_sanity_internal(block, flags)?;
        self.check_block_context(block, tip, flags)?;

        let node = BlockNode::new(header, Some(Arc::clone(tip)));
        let mut view = UtxoViewpoint::new();
        self.check_connect_block(&node, block, &mut view, None)
    }
}
