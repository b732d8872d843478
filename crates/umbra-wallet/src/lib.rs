//! # umbra-wallet
//!
//! The wallet surface the miner depends on.
//!
//! The full wallet (key management, output scanning, ring-member
//! selection) lives in its own process-level component; the miner only
//! needs the operations in [`MinerWallet`]: reward address generation,
//! coinstake synthesis, stealth-amount encoding, commitments, Schnorr
//! signing, block signing, and key-pool reservation.

mod error;
mod wallet;

pub use error::{WalletError, WalletResult};
pub use wallet::{CoinStake, MinerAddress, MinerWallet, ReservedKeyId};
