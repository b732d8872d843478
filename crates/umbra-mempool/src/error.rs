//! Mempool error types.

use thiserror::Error;

/// Mempool errors.
#[derive(Error, Debug)]
pub enum MempoolError {
    /// Transaction already in the pool.
    #[error("Transaction {0} already in mempool")]
    AlreadyExists(String),

    /// A key image is already used by a pooled transaction.
    #[error("Key image {0} conflicts with a pooled transaction")]
    KeyImageConflict(String),

    /// Pool is at capacity.
    #[error("Mempool full ({0} transactions)")]
    Full(usize),

    /// Coinbase/coinstake transactions are never pooled.
    #[error("Reward transactions are not accepted into the mempool")]
    RewardTransaction,
}

/// Result type for mempool operations.
pub type MempoolResult<T> = Result<T, MempoolError>;
