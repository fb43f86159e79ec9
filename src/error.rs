//! Error types for consensus validation.
//!
//! Two orthogonal families: [`RuleError`] for consensus rule violations and
//! [`ScriptError`] for failures reported by the script interpreter. Both
//! carry a closed code enum plus a human-readable description. Callers match
//! on the code; descriptions are diagnostic only and never parsed.

use thiserror::Error;

/// Identifies a kind of consensus rule violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleErrorCode {
    /// A transaction has no inputs.
    NoTxInputs,
    /// A transaction has no outputs.
    NoTxOutputs,
    /// A transaction exceeds the maximum serialized size.
    TxTooBig,
    /// A transaction is below the minimum serialized size for the active
    /// rule set.
    TxTooSmall,
    /// A transaction output value is out of range, or a value sum overflowed.
    BadTxOutValue,
    /// A transaction references the same outpoint from more than one input.
    DuplicateTxInputs,
    /// A coinbase signature script is outside the allowed length range.
    BadCoinbaseScriptLen,
    /// A non-coinbase input references the null outpoint.
    BadTxInput,
    /// The header difficulty bits do not match the expected value, or the
    /// decoded target is out of range.
    UnexpectedDifficulty,
    /// The block hash is higher than the target difficulty.
    HighHash,
    /// The block timestamp has a precision greater than one second.
    InvalidTime,
    /// The block timestamp is too far in the future.
    TimeTooNew,
    /// The block timestamp is not after the median time of the previous
    /// blocks.
    TimeTooOld,
    /// A block contains no transactions.
    NoTransactions,
    /// The first transaction in a block is not a coinbase.
    FirstTxNotCoinbase,
    /// A block contains more than one coinbase.
    MultipleCoinbases,
    /// Non-coinbase transactions are not in canonical (ascending txid)
    /// order.
    InvalidTxOrder,
    /// The computed merkle root does not match the header.
    BadMerkleRoot,
    /// A block contains the same transaction more than once.
    DuplicateTx,
    /// A block exceeds the maximum allowed size for the active rule set.
    BlockTooBig,
    /// The first block after the UAHF fork does not exceed the legacy size
    /// limit.
    BlockTooSmall,
    /// A block contains a transaction that is not finalized, or whose
    /// sequence locks are not satisfied.
    UnfinalizedTx,
    /// The coinbase signature script does not start with a well-formed
    /// serialized block height.
    MissingCoinbaseHeight,
    /// The serialized block height in the coinbase does not match the actual
    /// height.
    BadCoinbaseHeight,
    /// The block hash does not match the checkpoint for its height.
    BadCheckpoint,
    /// The block forks the chain before the most recent checkpoint.
    ForkTooOld,
    /// The block version is no longer accepted at this height.
    BlockVersionTooOld,
    /// A transaction would overwrite an older transaction that is not fully
    /// spent (BIP30).
    OverwriteTx,
    /// A referenced transaction output does not exist.
    MissingTxOut,
    /// A referenced transaction output has already been spent.
    SpentTxOut,
    /// A coinbase output is spent before reaching the required maturity.
    ImmatureSpend,
    /// A transaction spends more than the total of its inputs.
    SpendTooHigh,
    /// Total block fees overflowed the accumulator.
    BadFees,
    /// The coinbase pays more than the subsidy plus the total fees.
    BadCoinbaseValue,
    /// A block template does not extend the current chain tip.
    PrevBlockNotBest,
}

/// A consensus rule violation.
///
/// Equality is derived over both fields, but callers should compare codes
/// via [`RuleError::code`] or [`ConsensusError::rule_code`]; descriptions
/// exist for humans.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{description}")]
pub struct RuleError {
    pub code: RuleErrorCode,
    pub description: String,
}

impl RuleError {
    pub fn new(code: RuleErrorCode, description: impl Into<String>) -> Self {
        RuleError {
            code,
            description: description.into(),
        }
    }

    pub fn code(&self) -> RuleErrorCode {
        self.code
    }
}

/// Convenience constructor used throughout the rule checks.
pub(crate) fn rule_error(code: RuleErrorCode, description: impl Into<String>) -> ConsensusError {
    ConsensusError::Rule(RuleError::new(code, description))
}

/// Identifies a kind of script error reported by the interpreter.
///
/// The full code list is part of the wire contract between the validation
/// core and the script interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptErrorCode {
    /// Internal consistency failure in the engine; never a rule violation.
    Internal,
    /// The flags passed to the engine contain an invalid combination.
    InvalidFlags,
    /// An out-of-bounds index was passed to the engine.
    InvalidIndex,
    /// An address type unsupported by the engine was encountered.
    UnsupportedAddress,
    /// The provided script is not a multisig script.
    NotMultisigScript,
    /// More required signatures than provided public keys.
    TooManyRequiredSigs,
    /// Data carrier output exceeds the maximum payload.
    TooMuchNullData,
    /// OP_RETURN was executed in the script.
    EarlyReturn,
    /// The script finished with an empty stack.
    EmptyStack,
    /// The script finished with a false top stack element.
    EvalFalse,
    /// The error condition was checked before the script finished.
    ScriptUnfinished,
    /// An opcode was executed past the end of the script.
    InvalidProgramCounter,
    /// The script exceeds the maximum script size.
    ScriptTooBig,
    /// A pushed element exceeds the maximum element size.
    ElementTooBig,
    /// The script contains too many non-push operations.
    TooManyOperations,
    /// Combined stack and altstack depth is over the limit.
    StackOverflow,
    /// Invalid number of public keys for a multisig.
    InvalidPubKeyCount,
    /// Invalid number of signatures for a multisig.
    InvalidSignatureCount,
    /// A numeric argument is larger than allowed.
    NumberTooBig,
    /// A numeric argument is smaller than allowed.
    NumberTooSmall,
    /// The VM operation cost limit was exceeded.
    OpCost,
    /// The hash iteration limit was exceeded.
    TooManyHashIters,
    /// The conditional stack depth limit was exceeded.
    ConditionalStackDepth,
    /// OP_VERIFY failed.
    Verify,
    /// OP_EQUALVERIFY failed.
    EqualVerify,
    /// OP_NUMEQUALVERIFY failed.
    NumEqualVerify,
    /// OP_CHECKSIGVERIFY failed.
    CheckSigVerify,
    /// OP_CHECKMULTISIGVERIFY failed.
    CheckMultiSigVerify,
    /// OP_CHECKDATASIGVERIFY failed.
    CheckDataSigVerify,
    /// A disabled opcode was encountered.
    DisabledOpcode,
    /// A reserved opcode was encountered.
    ReservedOpcode,
    /// A data push opcode tries to push past the end of the script.
    MalformedPush,
    /// A stack operation was attempted with an invalid depth.
    InvalidStackOperation,
    /// Unbalanced OP_IF/OP_ELSE/OP_ENDIF nesting.
    UnbalancedConditional,
    /// An opcode input has the wrong length.
    InvalidInputLength,
    /// A push does not use the minimal encoding.
    MinimalData,
    /// An if/notif argument does not use the minimal encoding.
    MinimalIf,
    /// An unsupported signature hash type.
    InvalidSigHashType,
    /// A DER signature is too short.
    SigTooShort,
    /// A DER signature is too long.
    SigTooLong,
    /// A DER signature has an unexpected ASN.1 sequence ID.
    SigInvalidSeqID,
    /// A DER signature declares the wrong number of remaining bytes.
    SigInvalidDataLen,
    /// A DER signature is missing the ASN.1 type ID for S.
    SigMissingSTypeID,
    /// A DER signature is missing the length of S.
    SigMissingSLen,
    /// A DER signature declares the wrong number of bytes for S.
    SigInvalidSLen,
    /// A DER signature has an unexpected ASN.1 integer ID for R.
    SigInvalidRIntID,
    /// A DER signature has an R length of zero.
    SigZeroRLen,
    /// A DER signature has a negative R value.
    SigNegativeR,
    /// A DER signature has too much padding for R.
    SigTooMuchRPadding,
    /// A DER signature has an unexpected ASN.1 integer ID for S.
    SigInvalidSIntID,
    /// A DER signature has an S length of zero.
    SigZeroSLen,
    /// A DER signature has a negative S value.
    SigNegativeS,
    /// A DER signature has too much padding for S.
    SigTooMuchSPadding,
    /// A signature S value is above the half order while low-S is enforced.
    SigHighS,
    /// A script required to be push-only performs other operations.
    NotPushOnly,
    /// A multisig dummy argument is not null.
    SigNullDummy,
    /// An invalid public key while strict encoding is enforced.
    PubKeyType,
    /// The stack is not clean after evaluation.
    CleanStack,
    /// A failed signature check left a non-empty signature.
    NullFail,
    /// An upgradable NOP was encountered while discouraged.
    DiscourageUpgradableNOPs,
    /// A lock-time opcode interpreted a negative lock time.
    NegativeLockTime,
    /// A lock-time opcode's required lock time has not been reached.
    UnsatisfiedLockTime,
    /// A schnorr multisig dummy element is not encoded correctly.
    InvalidDummy,
    /// A schnorr multisig dummy element has the wrong bit count.
    InvalidBitCount,
    /// The executed signature check density limit was exceeded.
    InputSigChecks,
    /// A stack operation overflowed a 64-bit integer.
    IntegerOverflow,
}

/// A script-related error returned across the interpreter boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{description}")]
pub struct ScriptError {
    pub code: ScriptErrorCode,
    pub description: String,
}

impl ScriptError {
    pub fn new(code: ScriptErrorCode, description: impl Into<String>) -> Self {
        ScriptError {
            code,
            description: description.into(),
        }
    }

    pub fn code(&self) -> ScriptErrorCode {
        self.code
    }
}

/// Top-level error type returned by the validation core.
///
/// Rule and script violations are deterministic consequences of the input;
/// store failures indicate an inconsistency in the backing UTXO state and
/// should be treated as fatal by callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("utxo store failure: {0}")]
    Store(String),
}

impl ConsensusError {
    /// The rule error code, if this is a rule violation.
    pub fn rule_code(&self) -> Option<RuleErrorCode> {
        match self {
            ConsensusError::Rule(e) => Some(e.code),
            _ => None,
        }
    }

    /// The script error code, if this is a script failure.
    pub fn script_code(&self) -> Option<ScriptErrorCode> {
        match self {
            ConsensusError::Script(e) => Some(e.code),
            _ => None,
        }
    }

    /// Whether this error is the given rule violation.
    pub fn is_rule_code(&self, code: RuleErrorCode) -> bool {
        self.rule_code() == Some(code)
    }
}

pub type Result<T> = std::result::Result<T, ConsensusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_error_matches_on_code() {
        let err = rule_error(RuleErrorCode::HighHash, "hash above target");
        assert!(err.is_rule_code(RuleErrorCode::HighHash));
        assert!(!err.is_rule_code(RuleErrorCode::BadMerkleRoot));
        assert_eq!(err.script_code(), None);
    }

    #[test]
    fn descriptions_are_diagnostic_only() {
        let a = RuleError::new(RuleErrorCode::TxTooBig, "one wording");
        let b = RuleError::new(RuleErrorCode::TxTooBig, "another wording");
        assert_eq!(a.code(), b.code());
        assert_eq!(a.to_string(), "one wording");
    }

    #[test]
    fn store_errors_are_not_rule_errors() {
        let err = ConsensusError::Store("entry vanished".to_string());
        assert_eq!(err.rule_code(), None);
    }
}
