//! # umbra-mempool
//!
//! Transaction memory pool.
//!
//! This crate provides:
//! - Pooled entries carrying per-input key images and aging priority
//! - Fee-rate arithmetic shared with the miner
//! - Priority / fee deltas (`prioritise_transaction`)
//! - A monotone update counter the miner uses to detect churn
//! - Locked snapshots for template building

mod entry;
mod error;
mod fee_rate;
mod pool;

pub use entry::MempoolEntry;
pub use error::{MempoolError, MempoolResult};
pub use fee_rate::FeeRate;
pub use pool::{Mempool, MempoolConfig};

/// Default cap on pooled transactions.
pub const DEFAULT_MAX_TXS: usize = 50_000;
