//! # bch-consensus
//!
//! Consensus validation core for a Bitcoin Cash full node: the rules that
//! decide whether a candidate block may be appended to the best chain.
//!
//! The crate answers two questions deterministically and identically on
//! every node: whether a transaction is structurally sane in isolation, and
//! whether a block, in the context of a parent node and an unspent-output
//! view, satisfies every consensus rule: size, subsidy, input
//! availability, maturity, lock times, value conservation, fork-activation
//! script flags, and duplicate-transaction prevention.
//!
//! ## Architecture
//!
//! Checks are layered the way they run:
//! - context-free transaction sanity ([`transaction`])
//! - context-free block sanity ([`block`], [`merkle`], [`pow`])
//! - fork-activation resolution from the parent node ([`activation`])
//! - contextual header and block checks ([`block`], [`index`])
//! - block connection over a staged UTXO view ([`block`], [`utxo`])
//!
//! External collaborators (the script interpreter, the UTXO store, the
//! difficulty calculator, the adaptive block size controller, and the
//! network time source) sit behind traits ([`script::ScriptVerifier`],
//! [`utxo::UtxoStore`], [`pow::DifficultyOracle`],
//! [`activation::BlockSizeOracle`], [`mediantime::MedianTimeSource`]).
//!
//! Validation is single-threaded per candidate block; the only parallel
//! region is the per-input script verification fan-out, which joins before
//! the connect call returns.
//!
//! ## Usage
//!
//! ```rust
//! use bch_consensus::script::ScriptFlags;
//! use bch_consensus::transaction::check_transaction_sanity;
//! use bch_consensus::types::{OutPoint, Transaction, TxInput, TxOutput, Txid};
//!
//! let tx = Transaction {
//!     version: 1,
//!     inputs: vec![TxInput {
//!         previous_outpoint: OutPoint::new(Txid([1; 32]), 0),
//!         signature_script: vec![],
//!         sequence: 0xffff_ffff,
//!     }],
//!     outputs: vec![TxOutput {
//!         value: 1_000,
//!         pk_script: vec![0x51],
//!     }],
//!     lock_time: 0,
//! };
//! check_transaction_sanity(&tx, false, false, ScriptFlags::empty()).unwrap();
//! ```

pub mod activation;
pub mod block;
pub mod config;
pub mod constants;
pub mod economic;
pub mod error;
pub mod index;
pub mod mediantime;
pub mod merkle;
pub mod params;
pub mod pow;
pub mod script;
pub mod sequence_locks;
pub mod serialization;
pub mod transaction;
pub mod types;
pub mod utxo;

pub use activation::{ActivationSet, BehaviorFlags};
pub use block::BlockChain;
pub use config::ValidationConfig;
pub use error::{ConsensusError, Result, RuleError, RuleErrorCode, ScriptError, ScriptErrorCode};
pub use index::BlockNode;
pub use params::{ChainParams, Network};
pub use types::{Block, BlockHeader, OutPoint, Transaction, TxInput, TxOutput, Txid};
pub use utxo::{SpentTxOut, UtxoEntry, UtxoViewpoint};
