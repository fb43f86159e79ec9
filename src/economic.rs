//! Block subsidy schedule.

use crate::constants::BASE_SUBSIDY;
use crate::params::ChainParams;

/// The subsidy a block at the given height awards its miner.
///
/// The subsidy starts at the base value and halves every subsidy reduction
/// interval; an interval of zero disables reduction entirely. After 64
/// halvings the shifted value is zero.
pub fn calc_block_subsidy(height: u32, params: &ChainParams) -> i64 {
    if params.subsidy_reduction_interval == 0 {
        return BASE_SUBSIDY;
    }

    let halvings = height / params.subsidy_reduction_interval;
    if halvings >= 64 {
        return 0;
    }
    BASE_SUBSIDY >> halvings
}
