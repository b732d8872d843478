//! Mining error types.

use thiserror::Error;

/// Mining errors.
///
/// Per-transaction failures during selection never surface here; they
/// drop the transaction and continue. A template-level error fails
/// one build, and the worker loop logs it and retries.
#[derive(Error, Debug)]
pub enum MiningError {
    /// Cooperative cancellation was requested.
    #[error("Miner interrupted")]
    Interrupted,

    /// Chain has no tip yet.
    #[error("Chain has no tip")]
    NoTip,

    /// No stake kernel was found in the search window.
    #[error("Stake not found")]
    StakeNotFound,

    /// The proof-of-work era has ended; no further PoW templates.
    #[error("Proof-of-work phase is over")]
    PowPhaseOver,

    /// Audit blocks are not allowed before the audit era.
    #[error("Height {0} is before the audit era")]
    BeforeAuditStart(u32),

    /// No proof-of-stake blocks are awaiting audit.
    #[error("No proof-of-stake blocks to audit")]
    EmptyAuditWindow,

    /// The previous audit block carries no audited entries.
    #[error("Previous audit block has an empty audit list")]
    CorruptAuditChain,

    /// The block's parent is no longer the best block.
    #[error("Generated block is stale")]
    StaleBlock,

    /// Submission-side validation rejected the block.
    #[error("Block not accepted")]
    BlockRejected,

    /// The coinstake's Schnorr key image failed verification.
    #[error("Schnorr key image verification failed")]
    SchnorrVerification,

    /// Consensus error.
    #[error("Consensus error: {0}")]
    Consensus(#[from] umbra_consensus::ConsensusError),

    /// Wallet error.
    #[error("Wallet error: {0}")]
    Wallet(#[from] umbra_wallet::WalletError),
}

/// Result type for mining operations.
pub type MiningResult<T> = Result<T, MiningError>;
