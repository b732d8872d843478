//! Read-only chain and coin-view interfaces.
//!
//! The miner core never owns chain storage; it is handed these
//! interfaces and borrows them for the duration of a single template
//! build or worker iteration.

use crate::block::{Block, BlockHeader};
use crate::error::ConsensusResult;
use crate::transaction::{OutPoint, Transaction};
use crate::{Amount, BlockHash};

/// Lightweight index entry for a block on the active chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockIndex {
    /// Block hash.
    pub hash: BlockHash,
    /// Height on the active chain.
    pub height: u32,
    /// Header time.
    pub time: u32,
    /// Compact difficulty of the block.
    pub bits: u32,
    /// Header version.
    pub version: i32,
    /// Median time of the past window ending at this block.
    pub median_time_past: u32,
}

/// Read-only view of the active chain plus the queries the miner
/// needs. Implementations are internally synchronized; every call is
/// individually consistent.
pub trait ChainView: Send + Sync {
    /// Current tip, or `None` before genesis.
    fn tip(&self) -> Option<BlockIndex>;

    /// Index entry at a height on the active chain.
    fn at_height(&self, height: u32) -> Option<BlockIndex>;

    /// Read a full block body from storage.
    fn read_block(&self, index: &BlockIndex) -> ConsensusResult<Block>;

    /// Difficulty required for a block extending `prev` with the
    /// given draft header.
    fn next_work_required(&self, prev: &BlockIndex, header: &BlockHeader) -> u32;

    /// Subsidy for the block after `prev_height`.
    fn block_subsidy(&self, prev_height: u32) -> Amount;

    /// Whether a key image is already spent on disk.
    fn is_spent_key_image(&self, key_image_hex: &str) -> bool;

    /// Whether an outpoint is on the invalid-inputs list.
    fn is_invalid_outpoint(&self, outpoint: &OutPoint) -> bool;

    /// Network-adjusted wall clock.
    fn adjusted_time(&self) -> u32;

    /// Best-block hash as seen by the submission fence. Read under
    /// the best-block lock, separately from `tip()`.
    fn best_block(&self) -> BlockHash;

    /// A fresh coin-view cache layered over the tip.
    fn coin_view(&self) -> Box<dyn CoinView>;
}

/// Mutable cache over the UTXO set used during transaction selection.
pub trait CoinView {
    /// Whether every input of `tx` is available in this view.
    fn have_inputs(&self, tx: &Transaction) -> bool;

    /// Apply the spends and outputs of `tx` at `height` to this view
    /// only; the underlying chain state is untouched.
    fn apply(&mut self, tx: &Transaction, height: u32);
}
