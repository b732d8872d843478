//! Wallet error types.

use thiserror::Error;

/// Wallet errors.
#[derive(Error, Debug)]
pub enum WalletError {
    /// Wallet is locked.
    #[error("Wallet is locked")]
    Locked,

    /// Address generation failed.
    #[error("Address generation failed: {0}")]
    AddressGeneration(String),

    /// Commitment creation failed.
    #[error("Unable to create commitment: {0}")]
    Commitment(String),

    /// Signing failed.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Key pool exhausted.
    #[error("Key pool exhausted")]
    KeyPoolExhausted,

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type for wallet operations.
pub type WalletResult<T> = Result<T, WalletError>;
