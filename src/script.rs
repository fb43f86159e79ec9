//! Script interpreter boundary.
//!
//! The interpreter itself is an external collaborator. This module defines
//! the wire contract with it: verification flags, the opcode constants the
//! consensus rules reference, and the [`ScriptVerifier`] seam, plus the
//! parallel per-input fan-out used during block connection.

use std::ops::{BitOr, BitOrAssign};

use rayon::prelude::*;

use crate::constants::MAX_TRANSACTION_SIG_CHECKS;
use crate::error::{ConsensusError, Result, ScriptError, ScriptErrorCode};
use crate::transaction::is_coinbase;
use crate::types::{Block, Transaction};
use crate::utxo::UtxoViewpoint;

/// Push an empty array onto the stack.
pub const OP_0: u8 = 0x00;
/// Push the number 1 onto the stack.
pub const OP_1: u8 = 0x51;
/// Push the number 16 onto the stack.
pub const OP_16: u8 = 0x60;
/// Mark the output as unspendable.
pub const OP_RETURN: u8 = 0x6a;

/// Script verification flags.
///
/// The bit assignments are part of the contract with the interpreter; each
/// flag corresponds to a rule epoch or soft fork described in the
/// activation matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScriptFlags(u32);

impl ScriptFlags {
    pub const BIP16: ScriptFlags = ScriptFlags(1 << 0);
    pub const STRICT_ENCODING: ScriptFlags = ScriptFlags(1 << 1);
    pub const DER_SIGNATURES: ScriptFlags = ScriptFlags(1 << 2);
    pub const LOW_S: ScriptFlags = ScriptFlags(1 << 3);
    pub const NULL_FAIL: ScriptFlags = ScriptFlags(1 << 4);
    pub const SIG_PUSH_ONLY: ScriptFlags = ScriptFlags(1 << 5);
    pub const CLEAN_STACK: ScriptFlags = ScriptFlags(1 << 6);
    pub const CHECK_DATA_SIG: ScriptFlags = ScriptFlags(1 << 7);
    pub const CHECK_LOCK_TIME_VERIFY: ScriptFlags = ScriptFlags(1 << 8);
    pub const CHECK_SEQUENCE_VERIFY: ScriptFlags = ScriptFlags(1 << 9);
    pub const BIP143_SIG_HASH: ScriptFlags = ScriptFlags(1 << 10);
    pub const SCHNORR: ScriptFlags = ScriptFlags(1 << 11);
    pub const ALLOW_SEGWIT_RECOVERY: ScriptFlags = ScriptFlags(1 << 12);
    pub const MINIMAL_DATA: ScriptFlags = ScriptFlags(1 << 13);
    pub const SCHNORR_MULTISIG: ScriptFlags = ScriptFlags(1 << 14);
    pub const REPORT_SIG_CHECKS: ScriptFlags = ScriptFlags(1 << 15);
    pub const REVERSE_BYTES: ScriptFlags = ScriptFlags(1 << 16);
    pub const INTEGERS_64_BIT: ScriptFlags = ScriptFlags(1 << 17);
    pub const NATIVE_INTROSPECTION: ScriptFlags = ScriptFlags(1 << 18);
    pub const ALLOW_CASH_TOKENS: ScriptFlags = ScriptFlags(1 << 19);
    pub const ALLOW_MAY2025: ScriptFlags = ScriptFlags(1 << 20);

    pub fn empty() -> ScriptFlags {
        ScriptFlags(0)
    }

    pub fn contains(self, flags: ScriptFlags) -> bool {
        self.0 & flags.0 == flags.0
    }
}

impl BitOr for ScriptFlags {
    type Output = ScriptFlags;

    fn bitor(self, rhs: ScriptFlags) -> ScriptFlags {
        ScriptFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ScriptFlags {
    fn bitor_assign(&mut self, rhs: ScriptFlags) {
        self.0 |= rhs.0;
    }
}

/// Whether a public key script is provably unspendable, meaning no input
/// can ever satisfy it. Such outputs are never added to the UTXO view.
pub fn is_unspendable(pk_script: &[u8]) -> bool {
    !pk_script.is_empty() && pk_script[0] == OP_RETURN
}

/// Everything the interpreter needs to verify one input.
#[derive(Debug)]
pub struct ScriptCheckContext<'a> {
    pub signature_script: &'a [u8],
    pub pk_script: &'a [u8],
    pub tx: &'a Transaction,
    pub input_index: usize,
    pub amount: i64,
    pub flags: ScriptFlags,
}

/// The external script interpreter.
///
/// Implementations own their signature and sighash caches; the concurrency
/// contract for those caches lies with the implementation, which must
/// tolerate concurrent calls from the verification worker pool.
pub trait ScriptVerifier: Send + Sync {
    /// Verify one input. Returns the number of executed signature checks,
    /// or the script error that failed the input.
    fn verify_input(&self, ctx: &ScriptCheckContext<'_>) -> std::result::Result<u32, ScriptError>;
}

struct InputJob<'a> {
    tx: &'a Transaction,
    tx_index: usize,
    input_index: usize,
    pk_script: &'a [u8],
    amount: i64,
}

/// Run the script interpreter over every non-coinbase input of the block.
///
/// Inputs are dispatched across the worker pool and joined before
/// returning; the first failure aborts the remaining work best-effort.
/// When the interpreter reports signature check counts, the per-transaction
/// and per-block budgets are enforced after the join.
pub(crate) fn check_block_scripts(
    block: &Block,
    view: &UtxoViewpoint,
    flags: ScriptFlags,
    verifier: &dyn ScriptVerifier,
    max_sig_checks: u64,
    parallel: bool,
) -> Result<()> {
    let mut jobs = Vec::new();
    for (tx_index, tx) in block.transactions.iter().enumerate() {
        if is_coinbase(tx) {
            continue;
        }
        for (input_index, input) in tx.inputs.iter().enumerate() {
            let entry = view.lookup_entry(&input.previous_outpoint).ok_or_else(|| {
                ConsensusError::Store(format!(
                    "utxo {}:{} referenced by transaction {} input {} vanished during script \
                     validation",
                    input.previous_outpoint.hash,
                    input.previous_outpoint.index,
                    tx.txid(),
                    input_index,
                ))
            })?;
            jobs.push(InputJob {
                tx,
                tx_index,
                input_index,
                pk_script: entry.pk_script(),
                amount: entry.amount(),
            });
        }
    }

    let run = |job: &InputJob<'_>| -> Result<(usize, u64)> {
        let ctx = ScriptCheckContext {
            signature_script: &job.tx.inputs[job.input_index].signature_script,
            pk_script: job.pk_script,
            tx: job.tx,
            input_index: job.input_index,
            amount: job.amount,
            flags,
        };
        let sig_checks = verifier.verify_input(&ctx)?;
        Ok((job.tx_index, u64::from(sig_checks)))
    };

    let counts: Vec<(usize, u64)> = if parallel {
        jobs.par_iter().map(run).collect::<Result<Vec<_>>>()?
    } else {
        jobs.iter().map(run).collect::<Result<Vec<_>>>()?
    };

    if flags.contains(ScriptFlags::REPORT_SIG_CHECKS) {
        let mut per_tx = vec![0u64; block.transactions.len()];
        let mut total = 0u64;
        for (tx_index, sig_checks) in counts {
            per_tx[tx_index] += sig_checks;
            total += sig_checks;
        }
        if let Some(tx_index) = per_tx
            .iter()
            .position(|&checks| checks > MAX_TRANSACTION_SIG_CHECKS)
        {
            return Err(ScriptError::new(
                ScriptErrorCode::InputSigChecks,
                format!(
                    "transaction at index {tx_index} used {} signature checks, max {}",
                    per_tx[tx_index], MAX_TRANSACTION_SIG_CHECKS
                ),
            )
            .into());
        }
        if total > max_sig_checks {
            return Err(ScriptError::new(
                ScriptErrorCode::InputSigChecks,
                format!("block used {total} signature checks, max {max_sig_checks}"),
            )
            .into());
        }
    }

    Ok(())
}
