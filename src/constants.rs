//! Bitcoin Cash consensus constants.

/// Satoshis per whole coin.
pub const SATOSHI_PER_BITCOIN: i64 = 100_000_000;

/// Maximum amount of satoshi allowed in a single output or output sum.
pub const MAX_SATOSHI: i64 = 21_000_000 * SATOSHI_PER_BITCOIN;

const ONE_MEGABYTE: u64 = 1_000_000;

/// Maximum number of bytes allowed in a block prior to the August 1st, 2017
/// UAHF hard fork.
pub const LEGACY_MAX_BLOCK_SIZE: u64 = ONE_MEGABYTE;

/// Maximum allowable size of a serialized transaction.
pub const MAX_TRANSACTION_SIZE: u64 = ONE_MEGABYTE;

/// Minimum transaction size enforced between the MagneticAnomaly and
/// Upgrade9 hard forks.
pub const MAGNETIC_ANOMALY_MIN_TRANSACTION_SIZE: u64 = 100;

/// Minimum transaction size enforced from the Upgrade9 hard fork onward.
pub const MIN_TRANSACTION_SIZE: u64 = 65;

/// Ratio between the maximum allowable block size and the maximum allowable
/// number of executed signature checks in the block (network rule).
pub const BLOCK_MAX_BYTES_MAX_SIG_CHECKS_RATIO: u64 = 141;

/// Maximum number of executed signature checks per transaction.
pub const MAX_TRANSACTION_SIG_CHECKS: u64 = 3000;

/// Minimum length of a coinbase signature script.
pub const MIN_COINBASE_SCRIPT_LEN: usize = 2;

/// Maximum length of a coinbase signature script.
pub const MAX_COINBASE_SCRIPT_LEN: usize = 100;

/// Maximum number of seconds a block timestamp is allowed to be ahead of the
/// adjusted network time. Currently 2 hours.
pub const MAX_TIME_OFFSET_SECONDS: i64 = 2 * 60 * 60;

/// Number of previous blocks used to calculate the median time past.
pub const MEDIAN_TIME_BLOCKS: usize = 11;

/// Block version from which coinbases must start with the serialized block
/// height (BIP34).
pub const SERIALIZED_HEIGHT_VERSION: i32 = 2;

/// Starting subsidy for mined blocks, halved every subsidy reduction
/// interval.
pub const BASE_SUBSIDY: i64 = 50 * SATOSHI_PER_BITCOIN;

/// Lock-time values below this threshold are interpreted as block heights,
/// values at or above it as unix timestamps.
pub const LOCK_TIME_THRESHOLD: u32 = 500_000_000;

/// Sequence number that disables lock-time enforcement for an input.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Unix timestamp of the BIP16 (pay-to-script-hash) activation:
/// April 1st, 2012 00:00:00 UTC.
pub const BIP16_ACTIVATION_UNIX: i64 = 1_333_238_400;
