//! External hooks and the injected context bundle.
//!
//! The miner never owns the chain, wallet, network or masternode
//! subsystems; it borrows them through these interfaces for the
//! duration of a build or a worker iteration.

use crate::{MinerConfig, MinerStats};
use std::sync::Arc;
use umbra_consensus::{Amount, Block, BlockHash, ChainParams, ChainView, Transaction, TxValidator};
use umbra_mempool::Mempool;
use umbra_wallet::MinerWallet;

/// Peer-network queries and block announcement.
pub trait PeerNetwork: Send + Sync {
    /// Number of connected peers.
    fn peer_count(&self) -> usize;

    /// Push a block inventory announcement to all peers.
    fn relay_inventory(&self, hash: &BlockHash);
}

/// Masternode subsystem hooks.
pub trait MasternodePayments: Send + Sync {
    /// Whether the masternode list is synced enough to stake.
    fn is_synced(&self) -> bool;

    /// Insert the masternode/budget payout into a coinbase. May leave
    /// the coinbase untouched when no payment is due.
    fn fill_block_payee(&self, coinbase: &mut Transaction, fees: Amount, proof_of_stake: bool);
}

/// Submission side: validation signals and block processing.
pub trait BlockSink: Send + Sync {
    /// Announce that a block was found (wallet bookkeeping and main
    /// signals), before validation.
    fn block_found(&self, hash: &BlockHash);

    /// Validate and connect a locally produced block, the same path a
    /// peer-received block takes. Returns acceptance.
    fn process_new_block(&self, block: &Block) -> bool;
}

/// Everything a template build or worker iteration needs, bundled for
/// injection.
#[derive(Clone)]
pub struct MinerContext {
    /// Active chain, read-only.
    pub chain: Arc<dyn ChainView>,
    /// Transaction/block validation hooks.
    pub validator: Arc<dyn TxValidator>,
    /// Shared mempool.
    pub mempool: Arc<Mempool>,
    /// Wallet operations.
    pub wallet: Arc<dyn MinerWallet>,
    /// Peer network.
    pub network: Arc<dyn PeerNetwork>,
    /// Masternode subsystem.
    pub masternodes: Arc<dyn MasternodePayments>,
    /// Block submission.
    pub sink: Arc<dyn BlockSink>,
    /// Network consensus parameters.
    pub params: ChainParams,
    /// Miner configuration.
    pub config: MinerConfig,
    /// Shared miner state.
    pub stats: Arc<MinerStats>,
}
