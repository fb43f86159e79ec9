//! Transaction-level consensus checks.
//!
//! The predicates and the context-free sanity checks here depend only on
//! the transaction itself plus the active rule epoch; the input checks also
//! consult the UTXO view.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::constants::{
    LOCK_TIME_THRESHOLD, MAGNETIC_ANOMALY_MIN_TRANSACTION_SIZE, MAX_COINBASE_SCRIPT_LEN,
    MAX_SATOSHI, MAX_TRANSACTION_SIZE, MIN_COINBASE_SCRIPT_LEN, MIN_TRANSACTION_SIZE,
    SEQUENCE_FINAL,
};
use crate::error::{rule_error, Result, RuleErrorCode};
use crate::params::ChainParams;
use crate::script::{ScriptFlags, OP_0, OP_1, OP_16};
use crate::types::Transaction;
use crate::utxo::UtxoViewpoint;

/// Whether a transaction is a coinbase: a single input referencing the
/// null outpoint.
pub fn is_coinbase(tx: &Transaction) -> bool {
    tx.inputs.len() == 1 && tx.inputs[0].previous_outpoint.is_null()
}

/// Whether a transaction is finalized with respect to a block at `height`
/// whose lock-time basis is `block_time`.
///
/// A lock time of zero is always final. Otherwise the lock time is compared
/// against the height or the time basis depending on which side of the
/// lock-time threshold it falls, and a transaction whose lock time has not
/// passed is still final if every input opts out with a final sequence.
pub fn is_finalized_transaction(tx: &Transaction, height: u32, block_time: DateTime<Utc>) -> bool {
    let lock_time = tx.lock_time;
    if lock_time == 0 {
        return true;
    }

    let block_time_or_height: i64 = if lock_time < LOCK_TIME_THRESHOLD {
        i64::from(height)
    } else {
        block_time.timestamp()
    };
    if i64::from(lock_time) < block_time_or_height {
        return true;
    }

    tx.inputs.iter().all(|input| input.sequence == SEQUENCE_FINAL)
}

/// Extract the serialized block height from a coinbase signature script
/// (BIP34).
///
/// Small heights use the single-opcode encodings; otherwise the first byte
/// is the length of a little-endian integer that follows, of which at most
/// eight bytes participate.
pub fn extract_coinbase_height(coinbase_tx: &Transaction) -> Result<u32> {
    let sig_script = &coinbase_tx.inputs[0].signature_script;
    if sig_script.is_empty() {
        return Err(rule_error(
            RuleErrorCode::MissingCoinbaseHeight,
            "the coinbase signature script must start with the length of the serialized block \
             height",
        ));
    }

    let opcode = sig_script[0];
    if opcode == OP_0 {
        return Ok(0);
    }
    if (OP_1..=OP_16).contains(&opcode) {
        return Ok(u32::from(opcode - (OP_1 - 1)));
    }

    let serialized_len = opcode as usize;
    if sig_script.len() - 1 < serialized_len {
        return Err(rule_error(
            RuleErrorCode::MissingCoinbaseHeight,
            "the coinbase signature script must start with the serialized block height",
        ));
    }

    let mut le_bytes = [0u8; 8];
    let used = serialized_len.min(8);
    le_bytes[..used].copy_from_slice(&sig_script[1..1 + used]);
    Ok(u64::from_le_bytes(le_bytes) as u32)
}

/// Ensure the coinbase signature script starts with the serialized height
/// `want_height`.
pub(crate) fn check_serialized_height(coinbase_tx: &Transaction, want_height: u32) -> Result<()> {
    let serialized_height = extract_coinbase_height(coinbase_tx)?;
    if serialized_height != want_height {
        return Err(rule_error(
            RuleErrorCode::BadCoinbaseHeight,
            format!(
                "the coinbase signature script serialized block height is {serialized_height} \
                 when {want_height} was expected"
            ),
        ));
    }
    Ok(())
}

/// Context-free transaction sanity checks.
///
/// Structural rules that hold regardless of chain state: input and output
/// presence, serialized size bounds for the active rule epoch, output value
/// ranges with overflow-checked sums, distinct inputs, and the coinbase
/// script length / null-outpoint constraints.
pub fn check_transaction_sanity(
    tx: &Transaction,
    magnetic_anomaly_active: bool,
    upgrade9_active: bool,
    _script_flags: ScriptFlags,
) -> Result<()> {
    if tx.inputs.is_empty() {
        return Err(rule_error(
            RuleErrorCode::NoTxInputs,
            "transaction has no inputs",
        ));
    }
    if tx.outputs.is_empty() {
        return Err(rule_error(
            RuleErrorCode::NoTxOutputs,
            "transaction has no outputs",
        ));
    }

    let serialized_size = tx.serialized_size();
    if serialized_size > MAX_TRANSACTION_SIZE {
        return Err(rule_error(
            RuleErrorCode::TxTooBig,
            format!(
                "serialized transaction is too big - got {serialized_size}, max \
                 {MAX_TRANSACTION_SIZE}"
            ),
        ));
    }

    if magnetic_anomaly_active || upgrade9_active {
        let min_tx_size = if upgrade9_active {
            MIN_TRANSACTION_SIZE
        } else {
            MAGNETIC_ANOMALY_MIN_TRANSACTION_SIZE
        };
        if serialized_size < min_tx_size {
            return Err(rule_error(
                RuleErrorCode::TxTooSmall,
                format!(
                    "serialized transaction is too small - got {serialized_size}, min \
                     {min_tx_size}"
                ),
            ));
        }
    }

    let mut total_satoshi: i64 = 0;
    for output in &tx.outputs {
        let satoshi = output.value;
        if satoshi < 0 {
            return Err(rule_error(
                RuleErrorCode::BadTxOutValue,
                format!("transaction output has negative value of {satoshi}"),
            ));
        }
        if satoshi > MAX_SATOSHI {
            return Err(rule_error(
                RuleErrorCode::BadTxOutValue,
                format!(
                    "transaction output value of {satoshi} is higher than max allowed value of \
                     {MAX_SATOSHI}"
                ),
            ));
        }

        total_satoshi = total_satoshi.checked_add(satoshi).ok_or_else(|| {
            rule_error(
                RuleErrorCode::BadTxOutValue,
                format!(
                    "total value of all transaction outputs exceeds max allowed value of \
                     {MAX_SATOSHI}"
                ),
            )
        })?;
        if total_satoshi > MAX_SATOSHI {
            return Err(rule_error(
                RuleErrorCode::BadTxOutValue,
                format!(
                    "total value of all transaction outputs is {total_satoshi} which is higher \
                     than max allowed value of {MAX_SATOSHI}"
                ),
            ));
        }
    }

    let mut existing_outpoints = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !existing_outpoints.insert(input.previous_outpoint) {
            return Err(rule_error(
                RuleErrorCode::DuplicateTxInputs,
                "transaction contains duplicate inputs",
            ));
        }
    }

    if is_coinbase(tx) {
        let script_len = tx.inputs[0].signature_script.len();
        if !(MIN_COINBASE_SCRIPT_LEN..=MAX_COINBASE_SCRIPT_LEN).contains(&script_len) {
            return Err(rule_error(
                RuleErrorCode::BadCoinbaseScriptLen,
                format!(
                    "coinbase transaction script length of {script_len} is out of range (min: \
                     {MIN_COINBASE_SCRIPT_LEN}, max: {MAX_COINBASE_SCRIPT_LEN})"
                ),
            ));
        }
    } else {
        for input in &tx.inputs {
            if input.previous_outpoint.is_null() {
                return Err(rule_error(
                    RuleErrorCode::BadTxInput,
                    "transaction input refers to previous output that is null",
                ));
            }
        }
    }

    Ok(())
}

/// Check a transaction's inputs against the UTXO view and return its fee.
///
/// Verifies every referenced output exists and is unspent, enforces
/// coinbase maturity, bounds each input value and the overflow-checked
/// input sum, and requires the inputs to cover the outputs.
///
/// The transaction must already have passed [`check_transaction_sanity`].
pub fn check_transaction_inputs(
    tx: &Transaction,
    tx_height: u32,
    view: &UtxoViewpoint,
    params: &ChainParams,
) -> Result<i64> {
    if is_coinbase(tx) {
        return Ok(0);
    }

    let txid = tx.txid();
    let mut total_satoshi_in: i64 = 0;
    for (input_index, input) in tx.inputs.iter().enumerate() {
        let outpoint = &input.previous_outpoint;
        let entry = match view.lookup_entry(outpoint) {
            None => {
                return Err(rule_error(
                    RuleErrorCode::MissingTxOut,
                    format!(
                        "output {}:{} referenced from transaction {txid}:{input_index} does not \
                         exist",
                        outpoint.hash, outpoint.index
                    ),
                ));
            }
            Some(entry) if entry.is_spent() => {
                return Err(rule_error(
                    RuleErrorCode::SpentTxOut,
                    format!(
                        "output {}:{} referenced from transaction {txid}:{input_index} has \
                         already been spent",
                        outpoint.hash, outpoint.index
                    ),
                ));
            }
            Some(entry) => entry,
        };

        if entry.is_coinbase() {
            let origin_height = entry.block_height();
            let blocks_since_prev = i64::from(tx_height) - i64::from(origin_height);
            let coinbase_maturity = i64::from(params.coinbase_maturity);
            if blocks_since_prev < coinbase_maturity {
                return Err(rule_error(
                    RuleErrorCode::ImmatureSpend,
                    format!(
                        "tried to spend coinbase transaction output {}:{} from height \
                         {origin_height} at height {tx_height} before required maturity of \
                         {coinbase_maturity} blocks",
                        outpoint.hash, outpoint.index
                    ),
                ));
            }
        }

        let origin_satoshi = entry.amount();
        if origin_satoshi < 0 {
            return Err(rule_error(
                RuleErrorCode::BadTxOutValue,
                format!("transaction output has negative value of {origin_satoshi}"),
            ));
        }
        if origin_satoshi > MAX_SATOSHI {
            return Err(rule_error(
                RuleErrorCode::BadTxOutValue,
                format!(
                    "transaction output value of {origin_satoshi} is higher than max allowed \
                     value of {MAX_SATOSHI}"
                ),
            ));
        }

        total_satoshi_in = total_satoshi_in
            .checked_add(origin_satoshi)
            .filter(|&total| total <= MAX_SATOSHI)
            .ok_or_else(|| {
                rule_error(
                    RuleErrorCode::BadTxOutValue,
                    format!(
                        "total value of all transaction inputs is higher than max allowed value \
                         of {MAX_SATOSHI}"
                    ),
                )
            })?;
    }

    // Output sums were range-checked by the sanity pass.
    let total_satoshi_out: i64 = tx.outputs.iter().map(|output| output.value).sum();

    if total_satoshi_in < total_satoshi_out {
        return Err(rule_error(
            RuleErrorCode::SpendTooHigh,
            format!(
                "total value of all transaction inputs for transaction {txid} is \
                 {total_satoshi_in} which is less than the amount spent of {total_satoshi_out}"
            ),
        ));
    }

    Ok(total_satoshi_in - total_satoshi_out)
}
