//! Test harness: an in-memory chain and stub collaborators wired
//! into a `MinerContext`.

use crate::generators::pow_block;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use umbra_consensus::{
    Amount, Block, BlockHash, BlockHeader, BlockIndex, ChainParams, ChainView, CoinView,
    ConsensusError, ConsensusResult, Hash256, OutPoint, Script, Transaction, TxHash, TxOut,
    TxValidator, COIN,
};
use umbra_mempool::Mempool;
use umbra_mining::{BlockSink, MasternodePayments, MinerConfig, MinerContext, MinerStats, PeerNetwork};
use umbra_wallet::{CoinStake, MinerAddress, MinerWallet, ReservedKeyId, WalletError, WalletResult};

/// Base timestamp for harness chains.
pub const BASE_TIME: u32 = 1_690_000_000;

/// In-memory active chain.
pub struct MemoryChain {
    blocks: RwLock<Vec<Block>>,
    indexes: RwLock<Vec<BlockIndex>>,
    spent_key_images: RwLock<HashSet<String>>,
    invalid_outpoints: RwLock<HashSet<OutPoint>>,
    missing_inputs: RwLock<HashSet<TxHash>>,
    unreadable_heights: RwLock<HashSet<u32>>,
    adjusted_time: AtomicU32,
    next_bits: AtomicU32,
}

impl MemoryChain {
    /// An empty chain.
    pub fn new() -> Self {
        MemoryChain {
            blocks: RwLock::new(Vec::new()),
            indexes: RwLock::new(Vec::new()),
            spent_key_images: RwLock::new(HashSet::new()),
            invalid_outpoints: RwLock::new(HashSet::new()),
            missing_inputs: RwLock::new(HashSet::new()),
            unreadable_heights: RwLock::new(HashSet::new()),
            adjusted_time: AtomicU32::new(BASE_TIME),
            next_bits: AtomicU32::new(0x207f_ffff),
        }
    }

    /// A chain of `length` proof-of-work blocks starting at genesis.
    pub fn with_pow_chain(length: u32) -> Self {
        let chain = MemoryChain::new();
        let mut prev = Hash256::ZERO;
        for height in 0..length {
            let block = pow_block(prev, BASE_TIME + height * 60, height as u8);
            prev = block.hash();
            chain.push_block(block);
        }
        chain
    }

    /// Append a block, deriving its index entry.
    pub fn push_block(&self, block: Block) {
        let mut indexes = self.indexes.write();
        let height = indexes.len() as u32;
        let median_time_past = indexes
            .last()
            .map_or(block.header.time, |prev: &BlockIndex| prev.time);
        indexes.push(BlockIndex {
            hash: block.hash(),
            height,
            time: block.header.time,
            bits: block.header.bits,
            version: block.header.version,
            median_time_past,
        });
        self.blocks.write().push(block);
    }

    /// Mark a key image as spent on disk.
    pub fn mark_key_image_spent(&self, hex: String) {
        self.spent_key_images.write().insert(hex);
    }

    /// Put an outpoint on the invalid-inputs list.
    pub fn mark_invalid_outpoint(&self, outpoint: OutPoint) {
        self.invalid_outpoints.write().insert(outpoint);
    }

    /// Make every input referencing `hash` unavailable in coin views.
    pub fn mark_input_missing(&self, hash: TxHash) {
        self.missing_inputs.write().insert(hash);
    }

    /// Make `read_block` fail for a height.
    pub fn mark_unreadable(&self, height: u32) {
        self.unreadable_heights.write().insert(height);
    }

    /// Move the adjusted clock.
    pub fn set_adjusted_time(&self, time: u32) {
        self.adjusted_time.store(time, Ordering::SeqCst);
    }
}

impl Default for MemoryChain {
    fn default() -> Self {
        MemoryChain::new()
    }
}

struct MemoryCoinView {
    missing: HashSet<TxHash>,
    applied: HashSet<TxHash>,
}

impl CoinView for MemoryCoinView {
    fn have_inputs(&self, tx: &Transaction) -> bool {
        tx.vin.iter().all(|input| {
            !self.missing.contains(&input.prevout.hash)
                || self.applied.contains(&input.prevout.hash)
        })
    }

    fn apply(&mut self, tx: &Transaction, _height: u32) {
        self.applied.insert(tx.hash());
    }
}

impl ChainView for MemoryChain {
    fn tip(&self) -> Option<BlockIndex> {
        self.indexes.read().last().cloned()
    }

    fn at_height(&self, height: u32) -> Option<BlockIndex> {
        self.indexes.read().get(height as usize).cloned()
    }

    fn read_block(&self, index: &BlockIndex) -> ConsensusResult<Block> {
        if self.unreadable_heights.read().contains(&index.height) {
            return Err(ConsensusError::BlockReadFailed(format!(
                "height {}",
                index.height
            )));
        }
        self.blocks
            .read()
            .get(index.height as usize)
            .cloned()
            .ok_or(ConsensusError::BlockNotFound(index.height))
    }

    fn next_work_required(&self, _prev: &BlockIndex, _header: &BlockHeader) -> u32 {
        self.next_bits.load(Ordering::SeqCst)
    }

    fn block_subsidy(&self, _prev_height: u32) -> Amount {
        50 * COIN
    }

    fn is_spent_key_image(&self, key_image_hex: &str) -> bool {
        self.spent_key_images.read().contains(key_image_hex)
    }

    fn is_invalid_outpoint(&self, outpoint: &OutPoint) -> bool {
        self.invalid_outpoints.read().contains(outpoint)
    }

    fn adjusted_time(&self) -> u32 {
        self.adjusted_time.load(Ordering::SeqCst)
    }

    fn best_block(&self) -> BlockHash {
        self.indexes
            .read()
            .last()
            .map_or(Hash256::ZERO, |index| index.hash)
    }

    fn coin_view(&self) -> Box<dyn CoinView> {
        Box::new(MemoryCoinView {
            missing: self.missing_inputs.read().clone(),
            applied: HashSet::new(),
        })
    }
}

/// Validator stub with switchable outcomes.
pub struct StubValidator {
    rejected_txs: RwLock<HashSet<TxHash>>,
    failing_reverify_heights: RwLock<HashSet<u32>>,
    schnorr_ok: AtomicBool,
}

impl StubValidator {
    pub fn new() -> Self {
        StubValidator {
            rejected_txs: RwLock::new(HashSet::new()),
            failing_reverify_heights: RwLock::new(HashSet::new()),
            schnorr_ok: AtomicBool::new(true),
        }
    }

    /// Make `check_inputs` fail for one transaction.
    pub fn reject_tx(&self, hash: TxHash) {
        self.rejected_txs.write().insert(hash);
    }

    /// Make proof-of-stake re-verification fail at a height.
    pub fn fail_reverify_at(&self, height: u32) {
        self.failing_reverify_heights.write().insert(height);
    }

    /// Control Schnorr verification.
    pub fn set_schnorr_ok(&self, ok: bool) {
        self.schnorr_ok.store(ok, Ordering::SeqCst);
    }
}

impl Default for StubValidator {
    fn default() -> Self {
        StubValidator::new()
    }
}

impl TxValidator for StubValidator {
    fn check_inputs(&self, tx: &Transaction, _view: &dyn CoinView, _flags: u32) -> bool {
        !self.rejected_txs.read().contains(&tx.hash())
    }

    fn re_verify_pos_block(&self, index: &BlockIndex) -> bool {
        !self.failing_reverify_heights.read().contains(&index.height)
    }

    fn verify_schnorr_key_image(&self, tx: &Transaction) -> bool {
        self.schnorr_ok.load(Ordering::SeqCst)
            && !tx.vin.is_empty()
            && tx.vin[0].script_sig.as_bytes().ends_with(b"schnorr")
    }
}

/// Wallet stub producing deterministic keys and a configurable
/// coinstake.
pub struct StubWallet {
    coinstake: Mutex<Option<CoinStake>>,
    fail_commitment: AtomicBool,
    fail_block_signing: AtomicBool,
    fail_schnorr: AtomicBool,
    locked: AtomicBool,
    mintable: AtomicBool,
    balance: AtomicI64,
    reserve: AtomicI64,
    hash_interval: AtomicU64,
    next_key: AtomicU64,
    kept_keys: Mutex<Vec<ReservedKeyId>>,
    returned_keys: Mutex<Vec<ReservedKeyId>>,
    computed_keys: Mutex<Vec<TxOut>>,
    for_me: Mutex<Vec<TxHash>>,
}

impl StubWallet {
    pub fn new() -> Self {
        StubWallet {
            coinstake: Mutex::new(None),
            fail_commitment: AtomicBool::new(false),
            fail_block_signing: AtomicBool::new(false),
            fail_schnorr: AtomicBool::new(false),
            locked: AtomicBool::new(false),
            mintable: AtomicBool::new(true),
            balance: AtomicI64::new(1000 * COIN),
            reserve: AtomicI64::new(0),
            hash_interval: AtomicU64::new(22),
            next_key: AtomicU64::new(1),
            kept_keys: Mutex::new(Vec::new()),
            returned_keys: Mutex::new(Vec::new()),
            computed_keys: Mutex::new(Vec::new()),
            for_me: Mutex::new(Vec::new()),
        }
    }

    /// What the next `create_coinstake` returns.
    pub fn set_coinstake(&self, coinstake: Option<CoinStake>) {
        *self.coinstake.lock() = coinstake;
    }

    pub fn set_fail_commitment(&self, fail: bool) {
        self.fail_commitment.store(fail, Ordering::SeqCst);
    }

    /// Block signing fails until `add_computed_private_key` runs.
    pub fn set_fail_block_signing(&self, fail: bool) {
        self.fail_block_signing.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_schnorr(&self, fail: bool) {
        self.fail_schnorr.store(fail, Ordering::SeqCst);
    }

    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }

    pub fn set_mintable(&self, mintable: bool) {
        self.mintable.store(mintable, Ordering::SeqCst);
    }

    pub fn kept_keys(&self) -> Vec<ReservedKeyId> {
        self.kept_keys.lock().clone()
    }

    pub fn returned_keys(&self) -> Vec<ReservedKeyId> {
        self.returned_keys.lock().clone()
    }

    pub fn computed_key_count(&self) -> usize {
        self.computed_keys.lock().len()
    }

    /// Transactions the wallet was asked to register as its own.
    pub fn registered_txs(&self) -> Vec<TxHash> {
        self.for_me.lock().clone()
    }
}

impl Default for StubWallet {
    fn default() -> Self {
        StubWallet::new()
    }
}

impl MinerWallet for StubWallet {
    fn generate_address(&self) -> WalletResult<MinerAddress> {
        Ok(MinerAddress {
            pubkey: vec![0x02; 33],
            tx_pub: vec![0x03; 33],
            tx_priv: vec![0x04; 32],
        })
    }

    fn create_coinstake(
        &self,
        _bits: u32,
        _search_interval: i64,
    ) -> WalletResult<Option<CoinStake>> {
        Ok(self.coinstake.lock().clone())
    }

    fn encode_tx_out_amount(&self, out: &mut TxOut, amount: Amount, shared_secret: &[u8]) {
        let mut masked = amount.to_le_bytes().to_vec();
        for (i, byte) in masked.iter_mut().enumerate() {
            *byte ^= shared_secret.get(i % shared_secret.len().max(1)).copied().unwrap_or(0);
        }
        out.masked_amount = masked;
    }

    fn create_commitment(&self, blind: &[u8; 32], value: Amount) -> WalletResult<Vec<u8>> {
        if self.fail_commitment.load(Ordering::SeqCst) {
            return Err(WalletError::Commitment("stub failure".into()));
        }
        let mut commitment = blind.to_vec();
        commitment.extend_from_slice(&value.to_le_bytes());
        Ok(commitment)
    }

    fn make_schnorr_signature(&self, tx: &mut Transaction) -> WalletResult<()> {
        if self.fail_schnorr.load(Ordering::SeqCst) {
            return Err(WalletError::Signing("schnorr stub failure".into()));
        }
        if let Some(input) = tx.vin.first_mut() {
            input.script_sig = Script::new().push_slice(b"schnorr");
        }
        Ok(())
    }

    fn sign_block(&self, block: &mut Block) -> WalletResult<()> {
        if self.fail_block_signing.load(Ordering::SeqCst) {
            return Err(WalletError::Signing("block stub failure".into()));
        }
        block.block_sig = b"stub-block-sig".to_vec();
        Ok(())
    }

    fn add_computed_private_key(&self, out: &TxOut) {
        self.computed_keys.lock().push(out.clone());
        // The recovered key unblocks block signing.
        self.fail_block_signing.store(false, Ordering::SeqCst);
    }

    fn is_transaction_for_me(&self, tx: &Transaction) -> bool {
        self.for_me.lock().push(tx.hash());
        true
    }

    fn mintable_coins(&self) -> bool {
        self.mintable.load(Ordering::SeqCst)
    }

    fn balance(&self) -> Amount {
        self.balance.load(Ordering::SeqCst)
    }

    fn reserve_balance(&self) -> Amount {
        self.reserve.load(Ordering::SeqCst)
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    fn hash_interval(&self) -> u64 {
        self.hash_interval.load(Ordering::SeqCst)
    }

    fn reserve_key(&self) -> WalletResult<ReservedKeyId> {
        Ok(self.next_key.fetch_add(1, Ordering::SeqCst))
    }

    fn keep_key(&self, id: ReservedKeyId) {
        self.kept_keys.lock().push(id);
    }

    fn return_key(&self, id: ReservedKeyId) {
        self.returned_keys.lock().push(id);
    }
}

/// Peer network stub.
pub struct StubNetwork {
    peers: AtomicUsize,
    relayed: Mutex<Vec<BlockHash>>,
}

impl StubNetwork {
    pub fn new(peers: usize) -> Self {
        StubNetwork {
            peers: AtomicUsize::new(peers),
            relayed: Mutex::new(Vec::new()),
        }
    }

    pub fn set_peers(&self, peers: usize) {
        self.peers.store(peers, Ordering::SeqCst);
    }

    pub fn relayed(&self) -> Vec<BlockHash> {
        self.relayed.lock().clone()
    }
}

impl PeerNetwork for StubNetwork {
    fn peer_count(&self) -> usize {
        self.peers.load(Ordering::SeqCst)
    }

    fn relay_inventory(&self, hash: &BlockHash) {
        self.relayed.lock().push(*hash);
    }
}

/// Masternode stub; optionally inserts a payee output.
pub struct StubMasternodes {
    synced: AtomicBool,
    payee: Mutex<Option<(Script, Amount)>>,
}

impl StubMasternodes {
    pub fn new() -> Self {
        StubMasternodes {
            synced: AtomicBool::new(true),
            payee: Mutex::new(None),
        }
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::SeqCst);
    }

    /// Pay `value` to `script` out of future coinbases.
    pub fn set_payee(&self, script: Script, value: Amount) {
        *self.payee.lock() = Some((script, value));
    }
}

impl Default for StubMasternodes {
    fn default() -> Self {
        StubMasternodes::new()
    }
}

impl MasternodePayments for StubMasternodes {
    fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    fn fill_block_payee(&self, coinbase: &mut Transaction, _fees: Amount, proof_of_stake: bool) {
        if proof_of_stake {
            return;
        }
        if let Some((script, value)) = self.payee.lock().clone() {
            coinbase.vout.push(TxOut::new(value, script));
        }
    }
}

/// Submission recorder.
pub struct RecordingSink {
    accept: AtomicBool,
    found: Mutex<Vec<BlockHash>>,
    accepted: Mutex<Vec<Block>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        RecordingSink {
            accept: AtomicBool::new(true),
            found: Mutex::new(Vec::new()),
            accepted: Mutex::new(Vec::new()),
        }
    }

    /// Make `process_new_block` reject everything.
    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }

    pub fn found(&self) -> Vec<BlockHash> {
        self.found.lock().clone()
    }

    pub fn accepted(&self) -> Vec<Block> {
        self.accepted.lock().clone()
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.lock().len()
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        RecordingSink::new()
    }
}

impl BlockSink for RecordingSink {
    fn block_found(&self, hash: &BlockHash) {
        self.found.lock().push(*hash);
    }

    fn process_new_block(&self, block: &Block) -> bool {
        if !self.accept.load(Ordering::SeqCst) {
            return false;
        }
        self.accepted.lock().push(block.clone());
        true
    }
}

/// All stubs wired together.
pub struct TestEnv {
    pub chain: Arc<MemoryChain>,
    pub validator: Arc<StubValidator>,
    pub mempool: Arc<Mempool>,
    pub wallet: Arc<StubWallet>,
    pub network: Arc<StubNetwork>,
    pub masternodes: Arc<StubMasternodes>,
    pub sink: Arc<RecordingSink>,
    pub stats: Arc<MinerStats>,
    pub params: ChainParams,
    pub config: MinerConfig,
}

impl TestEnv {
    /// A fresh environment over `chain` with the given parameters.
    pub fn new(chain: MemoryChain, params: ChainParams, config: MinerConfig) -> Self {
        TestEnv {
            chain: Arc::new(chain),
            validator: Arc::new(StubValidator::new()),
            mempool: Arc::new(Mempool::with_defaults()),
            wallet: Arc::new(StubWallet::new()),
            network: Arc::new(StubNetwork::new(1)),
            masternodes: Arc::new(StubMasternodes::new()),
            sink: Arc::new(RecordingSink::new()),
            stats: Arc::new(MinerStats::new()),
            params,
            config,
        }
    }

    /// Bundle the stubs into a miner context.
    pub fn context(&self) -> MinerContext {
        MinerContext {
            chain: self.chain.clone(),
            validator: self.validator.clone(),
            mempool: self.mempool.clone(),
            wallet: self.wallet.clone(),
            network: self.network.clone(),
            masternodes: self.masternodes.clone(),
            sink: self.sink.clone(),
            params: self.params.clone(),
            config: self.config.clone(),
            stats: self.stats.clone(),
        }
    }
}
