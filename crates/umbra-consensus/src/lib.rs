//! # umbra-consensus
//!
//! Consensus primitives for the Umbra blockchain.
//!
//! This crate provides:
//! - Block, header and transaction types for the three block flavors
//!   (proof-of-work, proof-of-stake, proof-of-audit)
//! - Script building and legacy sig-op counting
//! - Merkle tree construction
//! - Compact difficulty encoding
//! - Chain parameters per network
//! - The read-only chain / coin-view / validation interfaces consumed by
//!   the miner and the mempool

mod amount;
mod block;
mod chain;
mod chain_params;
mod difficulty;
mod error;
mod hashing;
mod merkle;
mod script;
mod transaction;
mod validation;

pub use amount::{Amount, COIN};
pub use block::{Block, BlockHeader, PoSBlockSummary, POA_BLOCK_VERSION, POW_POS_BLOCK_VERSION};
pub use chain::{BlockIndex, ChainView, CoinView};
pub use chain_params::ChainParams;
pub use difficulty::{bits_to_target, hash_meets_target};
pub use error::{ConsensusError, ConsensusResult};
pub use hashing::{double_sha256, Hash256};
pub use merkle::{block_merkle_root, merkle_root_from_hashes, poa_merkle_root};
pub use script::{coinbase_flags, opcodes, Script, MAX_COINBASE_SCRIPT_SIG_SIZE};
pub use transaction::{is_final_tx, KeyImage, OutPoint, Transaction, TxIn, TxOut, TxType};
pub use validation::{get_legacy_sig_op_count, TxValidator, MANDATORY_SCRIPT_VERIFY_FLAGS};

/// Block hashes and transaction hashes share the same digest type.
pub type BlockHash = Hash256;
/// Transaction identifier.
pub type TxHash = Hash256;

/// Lock times at or above this threshold are interpreted as unix
/// timestamps rather than block heights.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;
