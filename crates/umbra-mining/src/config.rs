//! Miner configuration.

use serde::{Deserialize, Serialize};
use umbra_consensus::ChainParams;

/// Default cap on the serialized size of a created block.
pub const DEFAULT_BLOCK_MAX_SIZE: u64 = 750_000;

/// Default share of the block reserved for high-priority transactions
/// included regardless of fee.
pub const DEFAULT_BLOCK_PRIORITY_SIZE: u64 = 50_000;

/// Default minimum block size to fill with free transactions.
pub const DEFAULT_BLOCK_MIN_SIZE: u64 = 0;

/// Network consensus cap on block size.
pub const MAX_BLOCK_SIZE: u64 = 2_000_000;

/// Miner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Block version override, honored on regtest only.
    #[serde(default)]
    pub block_version: Option<i32>,
    /// Largest block the miner is willing to create.
    #[serde(default = "default_block_max_size")]
    pub block_max_size: u64,
    /// Share of the block dedicated to high-priority transactions.
    #[serde(default = "default_block_priority_size")]
    pub block_priority_size: u64,
    /// Minimum block size to reach with free transactions.
    #[serde(default = "default_block_min_size")]
    pub block_min_size: u64,
    /// Log each selected transaction's priority and fee rate.
    #[serde(default)]
    pub print_priority: bool,
    /// Number of miner threads; negative means auto-detect.
    #[serde(default = "default_threads")]
    pub threads: i32,
}

fn default_block_max_size() -> u64 {
    DEFAULT_BLOCK_MAX_SIZE
}

fn default_block_priority_size() -> u64 {
    DEFAULT_BLOCK_PRIORITY_SIZE
}

fn default_block_min_size() -> u64 {
    DEFAULT_BLOCK_MIN_SIZE
}

fn default_threads() -> i32 {
    -1
}

impl Default for MinerConfig {
    fn default() -> Self {
        MinerConfig {
            block_version: None,
            block_max_size: DEFAULT_BLOCK_MAX_SIZE,
            block_priority_size: DEFAULT_BLOCK_PRIORITY_SIZE,
            block_min_size: DEFAULT_BLOCK_MIN_SIZE,
            print_priority: false,
            threads: -1,
        }
    }
}

impl MinerConfig {
    /// Block size cap clamped to sane bounds.
    pub fn clamped_max_size(&self) -> u64 {
        self.block_max_size.clamp(1000, MAX_BLOCK_SIZE - 1000)
    }

    /// Priority budget, never above the size cap.
    pub fn clamped_priority_size(&self) -> u64 {
        self.block_priority_size.min(self.clamped_max_size())
    }

    /// Minimum size, never above the size cap.
    pub fn clamped_min_size(&self) -> u64 {
        self.block_min_size.min(self.clamped_max_size())
    }

    /// Resolve the worker count for `requested` threads: negative
    /// falls back to the network's fixed default, then to hardware
    /// concurrency.
    pub fn effective_threads(requested: i32, params: &ChainParams) -> usize {
        if requested < 0 {
            params
                .default_miner_threads
                .unwrap_or_else(|| num_cpus::get().max(1))
        } else {
            requested as usize
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_size_clamped_to_network_bounds() {
        let mut config = MinerConfig::default();
        config.block_max_size = 10;
        assert_eq!(config.clamped_max_size(), 1000);
        config.block_max_size = MAX_BLOCK_SIZE * 2;
        assert_eq!(config.clamped_max_size(), MAX_BLOCK_SIZE - 1000);
    }

    #[test]
    fn test_priority_and_min_never_exceed_max() {
        let config = MinerConfig {
            block_max_size: 2000,
            block_priority_size: 100_000,
            block_min_size: 100_000,
            ..Default::default()
        };
        assert_eq!(config.clamped_priority_size(), 2000);
        assert_eq!(config.clamped_min_size(), 2000);
    }

    #[test]
    fn test_effective_threads() {
        let mut params = ChainParams::regtest();
        assert_eq!(MinerConfig::effective_threads(-1, &params), 1);
        assert_eq!(MinerConfig::effective_threads(4, &params), 4);
        params.default_miner_threads = None;
        assert!(MinerConfig::effective_threads(-1, &params) >= 1);
    }
}
