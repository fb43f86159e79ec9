//! Relative lock-time (sequence lock) computation, per BIP68.
//!
//! A sequence lock is the point, as a height and as a time, before which
//! a transaction cannot be included in a block, derived from the relative
//! lock encoded in each input's sequence number and the age of the output
//! it spends.

use chrono::{DateTime, Utc};

use crate::error::{ConsensusError, Result};
use crate::index::BlockNode;
use crate::transaction::is_coinbase;
use crate::types::Transaction;
use crate::utxo::UtxoViewpoint;

/// Bit 31: relative lock-time is disabled for this input.
pub const SEQUENCE_LOCK_TIME_DISABLED: u32 = 1 << 31;
/// Bit 22: the relative lock-time is time-based rather than height-based.
pub const SEQUENCE_LOCK_TIME_IS_SECONDS: u32 = 1 << 22;
/// Mask extracting the 16-bit relative lock-time value.
pub const SEQUENCE_LOCK_TIME_MASK: u32 = 0x0000_ffff;
/// Time-based relative locks tick in units of 2^9 = 512 seconds.
pub const SEQUENCE_LOCK_TIME_GRANULARITY: u32 = 9;

/// The earliest height and time a transaction's relative locks allow.
///
/// A value of -1 on either axis means no constraint on that axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceLock {
    pub seconds: i64,
    pub block_height: i32,
}

impl SequenceLock {
    /// A lock that permits inclusion at any height or time.
    pub fn unrestricted() -> Self {
        SequenceLock {
            seconds: -1,
            block_height: -1,
        }
    }
}

/// Whether a computed sequence lock has matured at the given height and
/// median time past: both axes must lie strictly in the past.
pub fn sequence_lock_active(
    lock: &SequenceLock,
    block_height: u32,
    median_time_past: DateTime<Utc>,
) -> bool {
    lock.seconds < median_time_past.timestamp() && lock.block_height < block_height as i32
}

/// Compute the sequence lock for `tx` as a candidate for the block at
/// `node`, against a view holding all of the transaction's inputs.
///
/// Sequence locks only constrain version 2+ transactions while the CSV
/// deployment is active; everything else gets the unrestricted lock.
pub fn calc_sequence_lock(
    node: &BlockNode,
    tx: &Transaction,
    view: &UtxoViewpoint,
    csv_active: bool,
) -> Result<SequenceLock> {
    let mut lock = SequenceLock::unrestricted();
    if !csv_active || tx.version < 2 || is_coinbase(tx) {
        return Ok(lock);
    }

    for (input_index, input) in tx.inputs.iter().enumerate() {
        let outpoint = &input.previous_outpoint;
        let entry = view.lookup_entry(outpoint).ok_or_else(|| {
            ConsensusError::Store(format!(
                "output {}:{} referenced from transaction input {input_index} is missing from \
                 the view during sequence lock calculation",
                outpoint.hash, outpoint.index
            ))
        })?;
        let input_height = entry.block_height();

        let sequence = input.sequence;
        if sequence & SEQUENCE_LOCK_TIME_DISABLED != 0 {
            continue;
        }
        let relative_lock = i64::from(sequence & SEQUENCE_LOCK_TIME_MASK);

        if sequence & SEQUENCE_LOCK_TIME_IS_SECONDS != 0 {
            // Time-based locks count from the median time of the block
            // preceding the one that created the output.
            let prev_input_height = input_height.saturating_sub(1);
            let ancestor = node.ancestor(prev_input_height).ok_or_else(|| {
                ConsensusError::Store(format!(
                    "ancestor at height {prev_input_height} is missing during sequence lock \
                     calculation"
                ))
            })?;
            let median_time = ancestor.calc_past_median_time().timestamp();
            let time_lock = median_time + (relative_lock << SEQUENCE_LOCK_TIME_GRANULARITY) - 1;
            lock.seconds = lock.seconds.max(time_lock);
        } else {
            let height_lock = input_height as i32 + relative_lock as i32 - 1;
            lock.block_height = lock.block_height.max(height_lock);
        }
    }

    Ok(lock)
}
