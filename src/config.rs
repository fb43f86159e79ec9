//! Operational configuration for the validator.
//!
//! These are node-operator knobs, not consensus constants; they can be
//! loaded from a config file or passed programmatically.

use serde::{Deserialize, Serialize};

/// Validation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Maximum accepted block size between the UAHF and ABLA forks, in
    /// bytes. Default: 32 MB.
    #[serde(default = "default_excessive_block_size")]
    pub excessive_block_size: u64,

    /// Run per-input script verification on the worker pool.
    #[serde(default = "default_true")]
    pub parallel_script_validation: bool,
}

fn default_excessive_block_size() -> u64 {
    32_000_000
}

fn default_true() -> bool {
    true
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            excessive_block_size: default_excessive_block_size(),
            parallel_script_validation: true,
        }
    }
}
