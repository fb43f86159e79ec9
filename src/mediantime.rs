//! Network-adjusted time source.
//!
//! The timestamp ceiling check compares block times against an adjusted
//! clock; nodes typically offset their local clock by the median of their
//! peers' reported times. The adjustment itself lives with the caller.

use chrono::{DateTime, SubsecRound, Utc};

/// Source of the network-adjusted current time.
pub trait MedianTimeSource: Send + Sync {
    /// Current time adjusted by the median peer offset, at one-second
    /// precision.
    fn adjusted_time(&self) -> DateTime<Utc>;
}

/// A time source backed by the local system clock with no peer adjustment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl MedianTimeSource for SystemTimeSource {
    fn adjusted_time(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(0)
    }
}
