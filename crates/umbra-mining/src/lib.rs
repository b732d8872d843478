//! # umbra-mining
//!
//! Block template construction and the miner worker pool.
//!
//! This crate provides:
//! - Transaction selection and block assembly for the three block
//!   flavors (proof-of-work, proof-of-stake, proof-of-audit)
//! - The mode-switchable transaction priority queue
//! - The proof-of-audit window selector
//! - Extra-nonce coinbase stamping with merkle recomputation
//! - Long-lived mining / staking / audit worker threads with
//!   cooperative cancellation

mod audit;
mod config;
mod context;
mod error;
mod extra_nonce;
mod priority;
mod stats;
mod template;
mod worker;

pub use audit::list_of_pos_info;
pub use config::{
    MinerConfig, DEFAULT_BLOCK_MAX_SIZE, DEFAULT_BLOCK_MIN_SIZE, DEFAULT_BLOCK_PRIORITY_SIZE,
    MAX_BLOCK_SIZE,
};
pub use context::{BlockSink, MasternodePayments, MinerContext, PeerNetwork};
pub use error::{MiningError, MiningResult};
pub use extra_nonce::ExtraNonce;
pub use priority::{allow_free, SortMode, TxPriority, TxPriorityQueue};
pub use stats::{MinerStats, MinerStatsSnapshot};
pub use template::{update_time, BlockTemplate, TemplateBuilder};
pub use worker::{process_block_found, CancelToken, MinerController, StakeThrottle, WorkerPool};

use umbra_consensus::Amount;

/// Relay fee floor in atomic units per kilobyte. Once a block is past
/// its minimum size, fee-phase selection drops transactions paying
/// below this rate.
pub const MIN_RELAY_TX_FEE_PER_KB: Amount = 5000;
