//! Hard-fork activation resolution.
//!
//! Bitcoin Cash consensus rules change at a sequence of hard forks, gated
//! either by height or by the parent block's median time past. The
//! [`ActivationSet`] captures the complete rule epoch for one candidate
//! block; it is resolved once from the parent node and passed down, so leaf
//! checks never re-derive activation state.

use std::ops::{BitOr, BitOrAssign};

use crate::constants::BIP16_ACTIVATION_UNIX;
use crate::index::BlockNode;
use crate::params::ChainParams;
use crate::script::ScriptFlags;
use crate::types::BlockHeader;

/// Flags that alter the behavior of the validation entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BehaviorFlags(u32);

impl BehaviorFlags {
    /// No modification to the usual checks.
    pub const NONE: BehaviorFlags = BehaviorFlags(0);
    /// Skip the checks that are redundant for blocks known to be good.
    pub const FAST_ADD: BehaviorFlags = BehaviorFlags(1 << 0);
    /// Skip the hash-below-target proof-of-work comparison.
    pub const NO_POW_CHECK: BehaviorFlags = BehaviorFlags(1 << 1);
    /// Apply the MagneticAnomaly rule set during context-free checks.
    pub const MAGNETIC_ANOMALY: BehaviorFlags = BehaviorFlags(1 << 2);
    /// Apply the Upgrade9 rule set during context-free checks.
    pub const UPGRADE9: BehaviorFlags = BehaviorFlags(1 << 3);

    pub fn has(self, flag: BehaviorFlags) -> bool {
        self.0 & flag.0 == flag.0
    }
}

impl BitOr for BehaviorFlags {
    type Output = BehaviorFlags;

    fn bitor(self, rhs: BehaviorFlags) -> BehaviorFlags {
        BehaviorFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for BehaviorFlags {
    fn bitor_assign(&mut self, rhs: BehaviorFlags) {
        self.0 |= rhs.0;
    }
}

/// The hard forks active for one candidate block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivationSet {
    pub uahf: bool,
    pub daa: bool,
    pub magnetic_anomaly: bool,
    pub great_wall: bool,
    pub graviton: bool,
    pub phonon: bool,
    pub upgrade9: bool,
    pub abla: bool,
    pub cosmic_inflation: bool,
    pub upgrade11: bool,
}

impl ActivationSet {
    /// Resolve the rule epoch for the block that extends `parent`.
    ///
    /// Height-gated forks activate once the candidate height exceeds the
    /// fork height; time-gated forks once the parent's median time past
    /// reaches the activation time. The candidate's own timestamp never
    /// participates.
    pub fn from_parent(parent: &BlockNode, params: &ChainParams) -> ActivationSet {
        let height = parent.height + 1;
        let parent_mtp = parent.calc_past_median_time().timestamp();

        ActivationSet {
            uahf: height > params.uahf_fork_height,
            daa: height > params.daa_fork_height,
            magnetic_anomaly: height > params.magnetic_anomaly_fork_height,
            great_wall: height > params.great_wall_fork_height,
            graviton: height > params.graviton_fork_height,
            phonon: height > params.phonon_fork_height,
            upgrade9: height > params.upgrade9_fork_height,
            abla: height > params.abla_fork_height,
            cosmic_inflation: parent_mtp >= params.cosmic_inflation_activation_time,
            upgrade11: parent_mtp >= params.upgrade11_activation_time,
        }
    }

    /// The script verification flags for a block under this rule epoch.
    ///
    /// BIP16, BIP65 and BIP66 are additionally gated on the header itself
    /// (timestamp and version), which is why the header is needed here.
    pub fn script_flags(
        &self,
        header: &BlockHeader,
        height: u32,
        csv_active: bool,
        params: &ChainParams,
    ) -> ScriptFlags {
        let mut flags = ScriptFlags::empty();

        if header.timestamp.timestamp() >= BIP16_ACTIVATION_UNIX {
            flags |= ScriptFlags::BIP16;
        }
        if header.version >= 3 && height >= params.bip66_height {
            flags |= ScriptFlags::DER_SIGNATURES;
        }
        if header.version >= 4 && height >= params.bip65_height {
            flags |= ScriptFlags::CHECK_LOCK_TIME_VERIFY;
        }
        if self.uahf {
            flags |= ScriptFlags::STRICT_ENCODING | ScriptFlags::BIP143_SIG_HASH;
        }
        if self.daa {
            flags |= ScriptFlags::LOW_S | ScriptFlags::NULL_FAIL;
        }
        if self.magnetic_anomaly {
            flags |= ScriptFlags::SIG_PUSH_ONLY
                | ScriptFlags::CLEAN_STACK
                | ScriptFlags::CHECK_DATA_SIG;
        }
        if self.great_wall {
            flags |= ScriptFlags::SCHNORR | ScriptFlags::ALLOW_SEGWIT_RECOVERY;
        }
        if self.graviton {
            flags |= ScriptFlags::MINIMAL_DATA | ScriptFlags::SCHNORR_MULTISIG;
        }
        if self.phonon {
            flags |= ScriptFlags::REPORT_SIG_CHECKS | ScriptFlags::REVERSE_BYTES;
        }
        if self.cosmic_inflation {
            flags |= ScriptFlags::INTEGERS_64_BIT | ScriptFlags::NATIVE_INTROSPECTION;
        }
        if self.upgrade9 {
            flags |= ScriptFlags::ALLOW_CASH_TOKENS;
        }
        if self.upgrade11 {
            flags |= ScriptFlags::ALLOW_MAY2025;
        }
        if csv_active {
            flags |= ScriptFlags::CHECK_SEQUENCE_VERIFY;
        }

        flags
    }
}

/// Source of the adaptive block size limit.
///
/// From the ABLA fork onward the maximum block size comes from an adaptive
/// controller that tracks recent block sizes; the controller itself is
/// external to the rule engine.
pub trait BlockSizeOracle: Send + Sync {
    /// The current block size limit in bytes.
    fn block_size_limit(&self) -> u64;
}

/// A fixed block size limit, for networks or tests without an adaptive
/// controller.
#[derive(Debug, Clone, Copy)]
pub struct FixedBlockSize(pub u64);

impl BlockSizeOracle for FixedBlockSize {
    fn block_size_limit(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockHash, ZERO_HASH};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn node_at(height: u32, unix: i64) -> BlockNode {
        // A synthetic node with no ancestors: its own timestamp is the MTP.
        BlockNode {
            hash: BlockHash([1; 32]),
            height,
            version: 4,
            bits: 0x1d00ffff,
            timestamp: Utc.timestamp_opt(unix, 0).unwrap(),
            parent: None,
        }
    }

    fn header_at(version: i32, unix: i64) -> BlockHeader {
        BlockHeader {
            version,
            prev_block: BlockHash(ZERO_HASH),
            merkle_root: ZERO_HASH,
            timestamp: Utc.timestamp_opt(unix, 0).unwrap(),
            bits: 0x1d00ffff,
            nonce: 0,
        }
    }

    #[test]
    fn fork_activates_at_height_after_threshold() {
        let params = ChainParams::mainnet();
        // Candidate at uahf_fork_height: parent one below, not yet active.
        let parent = node_at(params.uahf_fork_height - 1, 1_501_000_000);
        assert!(!ActivationSet::from_parent(&parent, &params).uahf);
        // Candidate at uahf_fork_height + 1 is the first UAHF block.
        let parent = node_at(params.uahf_fork_height, 1_501_000_000);
        assert!(ActivationSet::from_parent(&parent, &params).uahf);
    }

    #[test]
    fn time_gated_forks_use_parent_median_time() {
        let params = ChainParams::mainnet();
        let before = node_at(800_000, params.cosmic_inflation_activation_time - 1);
        assert!(!ActivationSet::from_parent(&before, &params).cosmic_inflation);
        let at = node_at(800_000, params.cosmic_inflation_activation_time);
        assert!(ActivationSet::from_parent(&at, &params).cosmic_inflation);
    }

    #[test]
    fn time_gated_forks_ignore_candidate_timestamp() {
        let params = ChainParams::mainnet();
        // Parent chain entirely before activation; a late candidate
        // timestamp must not activate the fork.
        let mut parent = node_at(800_000, params.upgrade11_activation_time - 1000);
        parent.parent = Some(Arc::new(node_at(
            799_999,
            params.upgrade11_activation_time - 2000,
        )));
        assert!(!ActivationSet::from_parent(&parent, &params).upgrade11);
    }

    #[test]
    fn script_flags_accumulate_across_epochs() {
        let params = ChainParams::mainnet();
        let parent = node_at(params.phonon_fork_height, 1_600_000_000);
        let set = ActivationSet::from_parent(&parent, &params);
        let flags = set.script_flags(
            &header_at(4, 1_600_000_000),
            parent.height + 1,
            true,
            &params,
        );

        for expected in [
            ScriptFlags::BIP16,
            ScriptFlags::DER_SIGNATURES,
            ScriptFlags::CHECK_LOCK_TIME_VERIFY,
            ScriptFlags::STRICT_ENCODING,
            ScriptFlags::BIP143_SIG_HASH,
            ScriptFlags::LOW_S,
            ScriptFlags::NULL_FAIL,
            ScriptFlags::SIG_PUSH_ONLY,
            ScriptFlags::CLEAN_STACK,
            ScriptFlags::CHECK_DATA_SIG,
            ScriptFlags::SCHNORR,
            ScriptFlags::ALLOW_SEGWIT_RECOVERY,
            ScriptFlags::MINIMAL_DATA,
            ScriptFlags::SCHNORR_MULTISIG,
            ScriptFlags::REPORT_SIG_CHECKS,
            ScriptFlags::REVERSE_BYTES,
            ScriptFlags::CHECK_SEQUENCE_VERIFY,
        ] {
            assert!(flags.contains(expected), "missing {expected:?}");
        }
        assert!(!flags.contains(ScriptFlags::ALLOW_CASH_TOKENS));
        assert!(!flags.contains(ScriptFlags::ALLOW_MAY2025));
    }

    #[test]
    fn old_version_headers_skip_der_and_cltv_flags() {
        let params = ChainParams::mainnet();
        let parent = node_at(params.uahf_fork_height, 1_501_000_000);
        let set = ActivationSet::from_parent(&parent, &params);
        let flags = set.script_flags(
            &header_at(2, 1_501_000_000),
            parent.height + 1,
            false,
            &params,
        );
        assert!(!flags.contains(ScriptFlags::DER_SIGNATURES));
        assert!(!flags.contains(ScriptFlags::CHECK_LOCK_TIME_VERIFY));
        assert!(flags.contains(ScriptFlags::STRICT_ENCODING));
    }

    #[test]
    fn behavior_flags_compose() {
        let flags = BehaviorFlags::FAST_ADD | BehaviorFlags::NO_POW_CHECK;
        assert!(flags.has(BehaviorFlags::FAST_ADD));
        assert!(flags.has(BehaviorFlags::NO_POW_CHECK));
        assert!(!flags.has(BehaviorFlags::MAGNETIC_ANOMALY));
        assert!(BehaviorFlags::NONE.has(BehaviorFlags::NONE));
    }
}
