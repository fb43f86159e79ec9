//! Unspent transaction outputs and the transactional viewpoint.
//!
//! A [`UtxoViewpoint`] is a staging layer over the backing store: block
//! connection mutates only the view, which the caller either commits on
//! success or drops on failure. Nothing here touches the store beyond
//! read-only fetches.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{rule_error, ConsensusError, Result, RuleErrorCode};
use crate::script::is_unspendable;
use crate::transaction::is_coinbase;
use crate::types::{Block, OutPoint, Transaction};

/// Failure of the backing UTXO store. Distinct from rule violations;
/// callers treat these as fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StoreError(pub String);

impl From<StoreError> for ConsensusError {
    fn from(err: StoreError) -> Self {
        ConsensusError::Store(err.0)
    }
}

/// One unspent (or freshly spent) transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    amount: i64,
    pk_script: Vec<u8>,
    block_height: u32,
    is_coinbase: bool,
    spent: bool,
}

impl UtxoEntry {
    pub fn new(amount: i64, pk_script: Vec<u8>, block_height: u32, is_coinbase: bool) -> Self {
        UtxoEntry {
            amount,
            pk_script,
            block_height,
            is_coinbase,
            spent: false,
        }
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn pk_script(&self) -> &[u8] {
        &self.pk_script
    }

    /// Height of the block that created this output.
    pub fn block_height(&self) -> u32 {
        self.block_height
    }

    pub fn is_coinbase(&self) -> bool {
        self.is_coinbase
    }

    pub fn is_spent(&self) -> bool {
        self.spent
    }

    fn spend(&mut self) {
        self.spent = true;
    }
}

/// Read access to the backing UTXO store.
pub trait UtxoStore: Send + Sync {
    /// Fetch the unspent entry for an outpoint, or `None` when no such
    /// output exists or it is already spent.
    fn fetch_entry(&self, outpoint: &OutPoint) -> std::result::Result<Option<UtxoEntry>, StoreError>;
}

/// A HashMap-backed store, used in tests and by callers that keep the whole
/// set in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryUtxoStore {
    entries: HashMap<OutPoint, UtxoEntry>,
}

impl MemoryUtxoStore {
    pub fn new() -> Self {
        MemoryUtxoStore::default()
    }

    pub fn insert(&mut self, outpoint: OutPoint, entry: UtxoEntry) {
        self.entries.insert(outpoint, entry);
    }
}

impl UtxoStore for MemoryUtxoStore {
    fn fetch_entry(&self, outpoint: &OutPoint) -> std::result::Result<Option<UtxoEntry>, StoreError> {
        Ok(self.entries.get(outpoint).cloned())
    }
}

/// A spent output, recorded in the order it was consumed so a connected
/// block can be rolled back exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpentTxOut {
    pub amount: i64,
    pub pk_script: Vec<u8>,
    pub height: u32,
    pub is_coinbase: bool,
}

/// Staging layer over the UTXO store for one validation call.
#[derive(Debug, Clone, Default)]
pub struct UtxoViewpoint {
    entries: HashMap<OutPoint, UtxoEntry>,
}

impl UtxoViewpoint {
    pub fn new() -> Self {
        UtxoViewpoint::default()
    }

    /// The entry for an outpoint, spent or not, if the view holds one.
    pub fn lookup_entry(&self, outpoint: &OutPoint) -> Option<&UtxoEntry> {
        self.entries.get(outpoint)
    }

    /// Stage an entry directly. Used when populating a view from known
    /// state rather than from the store.
    pub fn add_entry(&mut self, outpoint: OutPoint, entry: UtxoEntry) {
        self.entries.insert(outpoint, entry);
    }

    /// All staged entries, for committing back to the store after a
    /// successful connect.
    pub fn entries(&self) -> &HashMap<OutPoint, UtxoEntry> {
        &self.entries
    }

    /// Add all spendable outputs of `tx`, created at `height`, to the view.
    pub fn add_tx_outs(&mut self, tx: &Transaction, height: u32) {
        let txid = tx.txid();
        let coinbase = is_coinbase(tx);
        for (index, output) in tx.outputs.iter().enumerate() {
            if is_unspendable(&output.pk_script) {
                continue;
            }
            self.entries.insert(
                OutPoint::new(txid, index as u32),
                UtxoEntry::new(output.value, output.pk_script.clone(), height, coinbase),
            );
        }
    }

    /// Stage every output referenced by the block's inputs: in-block
    /// references are satisfied from the block itself, everything else is
    /// fetched from the store.
    ///
    /// An input may reference the output of another transaction in the
    /// same block only if that transaction comes earlier, or if the
    /// canonical-order rule set is active, in which case any in-block
    /// reference is acceptable. A reference left unstaged surfaces later
    /// as a missing output.
    pub fn fetch_input_utxos(
        &mut self,
        store: &dyn UtxoStore,
        block: &Block,
        height: u32,
        magnetic_anomaly_active: bool,
    ) -> Result<()> {
        let mut in_block = HashMap::with_capacity(block.transactions.len());
        for (position, tx) in block.transactions.iter().enumerate() {
            in_block.insert(tx.txid(), position);
        }

        for (position, tx) in block.transactions.iter().enumerate().skip(1) {
            for input in &tx.inputs {
                let outpoint = &input.previous_outpoint;
                if let Some(&origin) = in_block.get(&outpoint.hash) {
                    if magnetic_anomaly_active || origin < position {
                        self.add_tx_outs(&block.transactions[origin], height);
                        continue;
                    }
                }
                if self.entries.contains_key(outpoint) {
                    continue;
                }
                if let Some(entry) = store.fetch_entry(outpoint)? {
                    self.entries.insert(*outpoint, entry);
                }
            }
        }
        Ok(())
    }

    fn spend_input(
        &mut self,
        outpoint: &OutPoint,
        stxos: &mut Option<&mut Vec<SpentTxOut>>,
        is_populated: bool,
    ) -> Result<()> {
        let entry = match self.entries.get_mut(outpoint) {
            Some(entry) if !entry.is_spent() => entry,
            Some(_) => {
                return Err(if is_populated {
                    ConsensusError::Store(format!(
                        "populated view entry {}:{} already spent",
                        outpoint.hash, outpoint.index
                    ))
                } else {
                    rule_error(
                        RuleErrorCode::SpentTxOut,
                        format!(
                            "output {}:{} has already been spent",
                            outpoint.hash, outpoint.index
                        ),
                    )
                });
            }
            None => {
                return Err(if is_populated {
                    ConsensusError::Store(format!(
                        "populated view missing entry {}:{}",
                        outpoint.hash, outpoint.index
                    ))
                } else {
                    rule_error(
                        RuleErrorCode::MissingTxOut,
                        format!("output {}:{} does not exist", outpoint.hash, outpoint.index),
                    )
                });
            }
        };

        if let Some(stxos) = stxos.as_deref_mut() {
            stxos.push(SpentTxOut {
                amount: entry.amount,
                pk_script: entry.pk_script.clone(),
                height: entry.block_height,
                is_coinbase: entry.is_coinbase,
            });
        }
        entry.spend();
        Ok(())
    }

    /// Spend the inputs of `tx` and add its outputs, recording spent
    /// outputs into `stxos` when provided.
    ///
    /// With `is_populated` the caller asserts every referenced entry is
    /// already staged, so a missing or spent entry is a store-consistency
    /// failure rather than a rule violation.
    pub fn connect_transaction(
        &mut self,
        tx: &Transaction,
        height: u32,
        mut stxos: Option<&mut Vec<SpentTxOut>>,
        is_populated: bool,
    ) -> Result<()> {
        if !is_coinbase(tx) {
            for input in &tx.inputs {
                self.spend_input(&input.previous_outpoint, &mut stxos, is_populated)?;
            }
        }
        self.add_tx_outs(tx, height);
        Ok(())
    }

    /// Connect an entire block in outputs-then-inputs order: every output
    /// of every transaction is added before any input is spent, so the
    /// canonical transaction order needs no topological constraint.
    pub fn connect_transactions(
        &mut self,
        block: &Block,
        height: u32,
        mut stxos: Option<&mut Vec<SpentTxOut>>,
        is_populated: bool,
    ) -> Result<()> {
        for tx in &block.transactions {
            self.add_tx_outs(tx, height);
        }
        for tx in &block.transactions {
            if is_coinbase(tx) {
                continue;
            }
            for input in &tx.inputs {
                self.spend_input(&input.previous_outpoint, &mut stxos, is_populated)?;
            }
        }
        Ok(())
    }

    /// Undo a connected block: remove its created outputs and restore the
    /// spent ones from the log, returning the view to its pre-block state.
    pub fn disconnect_transactions(
        &mut self,
        block: &Block,
        stxos: &[SpentTxOut],
    ) -> Result<()> {
        let spent_count: usize = block
            .transactions
            .iter()
            .filter(|tx| !is_coinbase(tx))
            .map(|tx| tx.inputs.len())
            .sum();
        if stxos.len() != spent_count {
            return Err(ConsensusError::Store(format!(
                "spent txout log has {} entries, block spends {}",
                stxos.len(),
                spent_count
            )));
        }

        let mut index = stxos.len();
        for tx in block.transactions.iter().rev() {
            let txid = tx.txid();
            for output_index in 0..tx.outputs.len() {
                self.entries
                    .remove(&OutPoint::new(txid, output_index as u32));
            }
            if is_coinbase(tx) {
                continue;
            }
            for input in tx.inputs.iter().rev() {
                index -= 1;
                let stxo = &stxos[index];
                self.entries.insert(
                    input.previous_outpoint,
                    UtxoEntry::new(
                        stxo.amount,
                        stxo.pk_script.clone(),
                        stxo.height,
                        stxo.is_coinbase,
                    ),
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockHash, BlockHeader, TxInput, TxOutput, Txid, ZERO_HASH};
    use chrono::{TimeZone, Utc};

    fn outpoint(tag: u8) -> OutPoint {
        OutPoint::new(Txid([tag; 32]), 0)
    }

    fn spend_of(outpoints: &[OutPoint], value: i64) -> Transaction {
        Transaction {
            version: 1,
            inputs: outpoints
                .iter()
                .map(|op| TxInput {
                    previous_outpoint: *op,
                    signature_script: vec![],
                    sequence: 0xffff_ffff,
                })
                .collect(),
            outputs: vec![TxOutput {
                value,
                pk_script: vec![0x51],
            }],
            lock_time: 0,
        }
    }

    fn coinbase() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput {
                previous_outpoint: OutPoint::null(),
                signature_script: vec![0x01, 0x02],
                sequence: 0xffff_ffff,
            }],
            outputs: vec![TxOutput {
                value: 5_000_000_000,
                pk_script: vec![0x51],
            }],
            lock_time: 0,
        }
    }

    fn block_of(transactions: Vec<Transaction>) -> Block {
        Block {
            header: BlockHeader {
                version: 2,
                prev_block: BlockHash(ZERO_HASH),
                merkle_root: ZERO_HASH,
                timestamp: Utc.timestamp_opt(1_600_000_000, 0).unwrap(),
                bits: 0x207fffff,
                nonce: 0,
            },
            transactions,
        }
    }

    #[test]
    fn connect_spends_and_creates() {
        let mut view = UtxoViewpoint::new();
        view.add_entry(outpoint(1), UtxoEntry::new(1000, vec![0x51], 5, false));

        let tx = spend_of(&[outpoint(1)], 900);
        let mut stxos = Vec::new();
        view.connect_transaction(&tx, 10, Some(&mut stxos), false)
            .unwrap();

        assert!(view.lookup_entry(&outpoint(1)).unwrap().is_spent());
        let created = OutPoint::new(tx.txid(), 0);
        let entry = view.lookup_entry(&created).unwrap();
        assert_eq!(entry.amount(), 900);
        assert_eq!(entry.block_height(), 10);
        assert_eq!(stxos.len(), 1);
        assert_eq!(stxos[0].amount, 1000);
    }

    #[test]
    fn double_spend_is_a_rule_error() {
        let mut view = UtxoViewpoint::new();
        view.add_entry(outpoint(1), UtxoEntry::new(1000, vec![0x51], 5, false));

        let first = spend_of(&[outpoint(1)], 900);
        let second = spend_of(&[outpoint(1)], 800);
        view.connect_transaction(&first, 10, None, false).unwrap();
        let err = view
            .connect_transaction(&second, 10, None, false)
            .unwrap_err();
        assert!(err.is_rule_code(RuleErrorCode::SpentTxOut));
    }

    #[test]
    fn missing_entry_is_a_rule_error_unless_populated() {
        let mut view = UtxoViewpoint::new();
        let tx = spend_of(&[outpoint(9)], 100);
        let err = view.connect_transaction(&tx, 10, None, false).unwrap_err();
        assert!(err.is_rule_code(RuleErrorCode::MissingTxOut));

        let err = view.connect_transaction(&tx, 10, None, true).unwrap_err();
        assert!(matches!(err, ConsensusError::Store(_)));
    }

    #[test]
    fn unspendable_outputs_are_not_staged() {
        let mut view = UtxoViewpoint::new();
        let mut tx = coinbase();
        tx.outputs.push(TxOutput {
            value: 0,
            pk_script: vec![crate::script::OP_RETURN, 0x01, 0xaa],
        });
        view.connect_transaction(&tx, 1, None, false).unwrap();
        assert!(view.lookup_entry(&OutPoint::new(tx.txid(), 0)).is_some());
        assert!(view.lookup_entry(&OutPoint::new(tx.txid(), 1)).is_none());
    }

    #[test]
    fn oti_connect_is_order_independent() {
        // tx_b spends tx_a's output but sits before it in the block; the
        // outputs-then-inputs pass connects it anyway.
        let mut view = UtxoViewpoint::new();
        view.add_entry(outpoint(1), UtxoEntry::new(1000, vec![0x51], 5, false));

        let tx_a = spend_of(&[outpoint(1)], 900);
        let tx_b = spend_of(&[OutPoint::new(tx_a.txid(), 0)], 800);
        let block = block_of(vec![coinbase(), tx_b.clone(), tx_a.clone()]);

        view.connect_transactions(&block, 10, None, false).unwrap();
        assert!(view
            .lookup_entry(&OutPoint::new(tx_a.txid(), 0))
            .unwrap()
            .is_spent());
        assert!(view
            .lookup_entry(&OutPoint::new(tx_b.txid(), 0))
            .is_some());
    }

    #[test]
    fn connect_then_disconnect_restores_view() {
        let mut view = UtxoViewpoint::new();
        view.add_entry(outpoint(1), UtxoEntry::new(1000, vec![0x51], 5, false));
        view.add_entry(outpoint(2), UtxoEntry::new(2000, vec![0x52], 6, true));
        let before = view.clone();

        let cb = coinbase();
        let spend = spend_of(&[outpoint(1), outpoint(2)], 2500);
        let block = block_of(vec![cb.clone(), spend.clone()]);

        let mut stxos = Vec::new();
        view.connect_transaction(&cb, 10, Some(&mut stxos), false)
            .unwrap();
        view.connect_transaction(&spend, 10, Some(&mut stxos), false)
            .unwrap();

        view.disconnect_transactions(&block, &stxos).unwrap();
        assert_eq!(view.entries(), before.entries());
    }

    #[test]
    fn disconnect_rejects_wrong_log_length() {
        let mut view = UtxoViewpoint::new();
        let block = block_of(vec![coinbase(), spend_of(&[outpoint(1)], 100)]);
        let err = view.disconnect_transactions(&block, &[]).unwrap_err();
        assert!(matches!(err, ConsensusError::Store(_)));
    }

    #[test]
    fn fetch_stages_any_in_block_reference_under_canonical_order() {
        let store = {
            let mut store = MemoryUtxoStore::new();
            store.insert(outpoint(1), UtxoEntry::new(1000, vec![0x51], 5, false));
            store
        };
        // tx_b spends tx_a's output but comes first in the block.
        let tx_a = spend_of(&[outpoint(1)], 900);
        let tx_b = spend_of(&[OutPoint::new(tx_a.txid(), 0)], 800);
        let block = block_of(vec![coinbase(), tx_b.clone(), tx_a.clone()]);

        let mut view = UtxoViewpoint::new();
        view.fetch_input_utxos(&store, &block, 10, true).unwrap();
        // Both the store-backed outpoint and the forward in-block
        // reference are staged, the latter at the connecting height.
        assert!(view.lookup_entry(&outpoint(1)).is_some());
        let staged = view.lookup_entry(&OutPoint::new(tx_a.txid(), 0)).unwrap();
        assert_eq!(staged.block_height(), 10);
    }

    #[test]
    fn fetch_stages_only_backward_references_under_topological_order() {
        let store = MemoryUtxoStore::new();
        let tx_a = spend_of(&[outpoint(1)], 900);
        let tx_b = spend_of(&[OutPoint::new(tx_a.txid(), 0)], 800);

        // Reference to a later transaction is not satisfied from the
        // block; with nothing in the store it stays absent and the input
        // checks will reject it.
        let block = block_of(vec![coinbase(), tx_b.clone(), tx_a.clone()]);
        let mut view = UtxoViewpoint::new();
        view.fetch_input_utxos(&store, &block, 10, false).unwrap();
        assert!(view
            .lookup_entry(&OutPoint::new(tx_a.txid(), 0))
            .is_none());

        // With the origin earlier in the block the reference is staged.
        let block = block_of(vec![coinbase(), tx_a.clone(), tx_b.clone()]);
        let mut view = UtxoViewpoint::new();
        view.fetch_input_utxos(&store, &block, 10, false).unwrap();
        assert!(view
            .lookup_entry(&OutPoint::new(tx_a.txid(), 0))
            .is_some());
    }
}
