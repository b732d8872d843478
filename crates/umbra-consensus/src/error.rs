//! Consensus error types.

use thiserror::Error;

/// Consensus errors.
#[derive(Error, Debug)]
pub enum ConsensusError {
    /// No block at the requested height.
    #[error("No block at height {0}")]
    BlockNotFound(u32),

    /// A block body could not be read from storage.
    #[error("Can't read block from disk: {0}")]
    BlockReadFailed(String),

    /// The chain has no tip yet.
    #[error("Chain has no tip")]
    NoTip,

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;
