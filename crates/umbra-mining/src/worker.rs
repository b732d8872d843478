//! Miner worker threads.
//!
//! Three worker kinds run on OS threads: the proof-of-work hashing
//! loop, the proof-of-stake staking loop (one loop body handles both,
//! switching to staking when the chain passes the last PoW height),
//! and the periodic audit-block emitter. All of them respond to
//! cooperative cancellation through [`CancelToken`] checks placed at
//! loop heads, before sleeps and inside the hashing inner loop.

use crate::template::{update_time, TemplateBuilder};
use crate::{MinerContext, MinerStatsSnapshot, MiningError, MiningResult};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use umbra_consensus::{bits_to_target, hash_meets_target, Block};
use umbra_wallet::MinerWallet;

/// Pause between staking attempts while any gating condition holds.
const STAKE_WAIT: Duration = Duration::from_secs(5);

/// Period of the audit-block emitter.
const AUDIT_PERIOD: Duration = Duration::from_secs(180);

/// Mintable-coin recheck window, and the tighter window used while
/// the wallet reports nothing mintable.
const MINTABLE_CHECK_SECS: u64 = 5 * 60;
const MINTABLE_RETRY_SECS: u64 = 60;

/// Nonce ceiling forcing a template refresh.
const NONCE_REFRESH_LIMIT: u32 = 0xffff_0000;

/// Hashing batch between refresh checks.
const HASH_BATCH_MASK: u32 = 0xff;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Cooperative cancellation token shared by a worker pool.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    flag: AtomicBool,
    lock: Mutex<()>,
    condvar: Condvar,
}

impl CancelToken {
    /// A fresh, uncancelled token.
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Request cancellation and wake all sleepers.
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        // Notify under the lock so a sleeper between its flag check
        // and its wait cannot miss the wakeup.
        let _guard = self.inner.lock.lock();
        self.inner.condvar.notify_all();
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Interruption point: error out if cancellation was requested.
    pub fn check(&self) -> MiningResult<()> {
        if self.is_cancelled() {
            Err(MiningError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Sleep up to `duration`, waking early on cancellation.
    pub fn sleep(&self, duration: Duration) -> MiningResult<()> {
        let deadline = Instant::now() + duration;
        let mut guard = self.inner.lock.lock();
        while !self.is_cancelled() && Instant::now() < deadline {
            self.inner.condvar.wait_until(&mut guard, deadline);
        }
        drop(guard);
        self.check()
    }
}

/// Shared staking state: mintable-coin cache and the per-height
/// attempt throttle.
#[derive(Default)]
pub struct StakeThrottle {
    mintable: AtomicBool,
    last_mintable_check: AtomicU64,
    attempts: Mutex<HashMap<u32, u64>>,
}

impl StakeThrottle {
    /// Fresh state; nothing mintable until the first refresh.
    pub fn new() -> Self {
        StakeThrottle::default()
    }

    /// Cached mintable flag.
    pub fn mintable(&self) -> bool {
        self.mintable.load(Ordering::SeqCst)
    }

    /// Re-query the wallet when `window_secs` have passed since the
    /// last check.
    pub fn refresh_mintable(&self, wallet: &dyn MinerWallet, window_secs: u64) {
        let now = unix_now();
        let last = self.last_mintable_check.load(Ordering::SeqCst);
        if now.saturating_sub(last) > window_secs {
            self.last_mintable_check.store(now, Ordering::SeqCst);
            self.mintable.store(wallet.mintable_coins(), Ordering::SeqCst);
        }
    }

    /// Record a stake attempt against the given tip height.
    pub fn note_attempt(&self, height: u32) {
        self.attempts.lock().insert(height, unix_now());
    }

    /// When the given tip height was last attempted.
    pub fn last_attempt(&self, height: u32) -> Option<u64> {
        self.attempts.lock().get(&height).copied()
    }
}

/// Submit a locally produced block: staleness fence, found signal,
/// validation, then inventory relay.
pub fn process_block_found(ctx: &MinerContext, block: &Block) -> MiningResult<()> {
    let hash = block.hash();
    debug!(block = %hash, txs = block.vtx.len(), "submitting found block");

    // Reorgs between template build and submission land here.
    if block.header.prev_hash != ctx.chain.best_block() {
        return Err(MiningError::StaleBlock);
    }

    ctx.sink.block_found(&hash);

    if !ctx.sink.process_new_block(block) {
        return Err(MiningError::BlockRejected);
    }

    ctx.network.relay_inventory(&hash);
    Ok(())
}

/// The combined proof-of-work / proof-of-stake loop, one instance per
/// worker thread. Switches permanently to staking once the chain
/// passes the last proof-of-work height.
fn miner_loop(
    ctx: &MinerContext,
    builder: &TemplateBuilder,
    throttle: &StakeThrottle,
    cancel: &CancelToken,
) -> MiningResult<()> {
    info!("miner worker started");
    let params = &ctx.params;
    let mut proof_of_stake = ctx
        .chain
        .tip()
        .map_or(false, |tip| tip.height >= params.last_pow_block);
    let mut last_loop_orphan = false;

    loop {
        cancel.check()?;
        let tip = match ctx.chain.tip() {
            Some(tip) => tip,
            None => {
                cancel.sleep(STAKE_WAIT)?;
                continue;
            }
        };
        if tip.height >= params.last_pow_block {
            proof_of_stake = true;
        }

        if proof_of_stake {
            throttle.refresh_mintable(ctx.wallet.as_ref(), MINTABLE_CHECK_SECS);

            while ctx.network.peer_count() == 0
                || ctx.wallet.is_locked()
                || !throttle.mintable()
                || ctx.wallet.reserve_balance() >= ctx.wallet.balance()
                || !ctx.masternodes.is_synced()
            {
                ctx.stats.set_last_coinstake_search_interval(0);
                cancel.sleep(STAKE_WAIT)?;
                if !throttle.mintable() {
                    throttle.refresh_mintable(ctx.wallet.as_ref(), MINTABLE_RETRY_SECS);
                }
            }

            // Skip tips we hashed very recently, unless the previous
            // round lost an orphan race.
            if let Some(last) = throttle.last_attempt(tip.height) {
                let interval = ctx.wallet.hash_interval().max(1);
                if !last_loop_orphan && unix_now().saturating_sub(last) < interval {
                    cancel.sleep(STAKE_WAIT)?;
                    continue;
                }
            }
        } else if (tip.height as i64) - 6 > params.last_pow_block as i64 {
            // Stay alive a little past the boundary in case the chain
            // rewinds, then exit the proof-of-work thread for good.
            info!(
                height = tip.height,
                "exiting proof-of-work mining thread"
            );
            return Ok(());
        }

        let transactions_updated_last = ctx.mempool.get_transactions_updated();

        let template = match builder.create_new_block_with_key(proof_of_stake, cancel) {
            Ok(template) => template,
            Err(MiningError::Interrupted) => return Err(MiningError::Interrupted),
            Err(MiningError::PowPhaseOver) => {
                // Half a block interval so this does not spin.
                cancel.sleep(Duration::from_millis(params.target_spacing * 1000 / 2))?;
                continue;
            }
            Err(err) => {
                if proof_of_stake {
                    throttle.note_attempt(tip.height);
                }
                debug!("template build failed: {err}");
                continue;
            }
        };
        let mut block = template.block;
        let mut reserved_key = template.reserved_key;

        if proof_of_stake {
            throttle.note_attempt(tip.height);
            // The builder already stamped and signed the block;
            // stamping again here would invalidate the signature.
            match process_block_found(ctx, &block) {
                Ok(()) => {
                    if let Some(id) = reserved_key.take() {
                        ctx.wallet.keep_key(id);
                    }
                    info!(block = %block.hash(), "proof-of-stake block accepted");
                }
                Err(MiningError::Interrupted) => return Err(MiningError::Interrupted),
                Err(err) => {
                    if let Some(id) = reserved_key.take() {
                        ctx.wallet.return_key(id);
                    }
                    debug!("proof-of-stake submission failed: {err}");
                }
            }
            continue;
        }

        // Proof-of-work search.
        ctx.stats.stamp_extra_nonce(&mut block, tip.height + 1);
        debug!(
            txs = block.vtx.len(),
            bytes = block.serialized_size(),
            "running miner"
        );

        let search_started = unix_now();
        let mut target = bits_to_target(block.header.bits);

        'search: loop {
            let mut hashes_done: u64 = 0;
            loop {
                let hash = block.hash();
                if target
                    .as_ref()
                    .map_or(false, |t| hash_meets_target(&hash, t))
                {
                    info!(block = %hash, "proof-of-work found");
                    match process_block_found(ctx, &block) {
                        Ok(()) => {
                            if let Some(id) = reserved_key.take() {
                                ctx.wallet.keep_key(id);
                            }
                            last_loop_orphan = false;
                            if params.mine_blocks_on_demand {
                                // One block per request in regtest.
                                return Err(MiningError::Interrupted);
                            }
                        }
                        Err(MiningError::Interrupted) => return Err(MiningError::Interrupted),
                        Err(err) => {
                            if let Some(id) = reserved_key.take() {
                                ctx.wallet.return_key(id);
                            }
                            debug!("proof-of-work submission failed: {err}");
                            last_loop_orphan = true;
                        }
                    }
                    break 'search;
                }
                block.header.nonce = block.header.nonce.wrapping_add(1);
                hashes_done += 1;
                if block.header.nonce & HASH_BATCH_MASK == 0 {
                    break;
                }
            }

            ctx.stats.note_hashes(hashes_done);

            cancel.check()?;
            if ctx.network.peer_count() == 0 && params.mining_requires_peers {
                break 'search;
            }
            if block.header.nonce >= NONCE_REFRESH_LIMIT {
                break 'search;
            }
            if ctx.mempool.get_transactions_updated() != transactions_updated_last
                && unix_now().saturating_sub(search_started) > 60
            {
                break 'search;
            }
            if ctx.chain.tip().map(|t| t.hash) != Some(tip.hash) {
                break 'search;
            }

            update_time(&mut block.header, &tip, ctx.chain.as_ref(), params);
            if params.allow_min_difficulty_blocks {
                // The time change can move the work requirement.
                target = bits_to_target(block.header.bits);
            }
        }

        if let Some(id) = reserved_key.take() {
            // Drop any reservation still pending after an abandoned
            // search.
            ctx.wallet.return_key(id);
        }
    }
}

/// The periodic audit-block emitter.
fn audit_loop(
    ctx: &MinerContext,
    builder: &TemplateBuilder,
    cancel: &CancelToken,
) -> MiningResult<()> {
    info!("audit worker started");
    loop {
        cancel.sleep(AUDIT_PERIOD)?;
        match builder.create_new_poa_block_with_key(cancel) {
            Ok(template) => {
                let block = template.block;
                match process_block_found(ctx, &block) {
                    Ok(()) => {
                        if let Some(id) = template.reserved_key {
                            ctx.wallet.keep_key(id);
                        }
                        info!(block = %block.hash(), audited = block.pos_blocks_audited.len(),
                            "audit block accepted");
                    }
                    Err(MiningError::Interrupted) => return Err(MiningError::Interrupted),
                    Err(err) => {
                        if let Some(id) = template.reserved_key {
                            ctx.wallet.return_key(id);
                        }
                        debug!("audit submission failed: {err}");
                    }
                }
            }
            Err(MiningError::Interrupted) => return Err(MiningError::Interrupted),
            Err(err) => debug!("audit build skipped: {err}"),
        }
    }
}

/// Worker thread kinds.
enum WorkerKind {
    Miner,
    Audit,
}

/// One worker thread plus its control handle.
struct Worker {
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(
        id: usize,
        kind: WorkerKind,
        ctx: MinerContext,
        builder: Arc<TemplateBuilder>,
        throttle: Arc<StakeThrottle>,
        cancel: CancelToken,
    ) -> Self {
        let name = match kind {
            WorkerKind::Miner => format!("umbra-miner-{id}"),
            WorkerKind::Audit => "umbra-audit".to_string(),
        };
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || {
                let result = match kind {
                    WorkerKind::Miner => miner_loop(&ctx, &builder, &throttle, &cancel),
                    WorkerKind::Audit => audit_loop(&ctx, &builder, &cancel),
                };
                match result {
                    Ok(()) | Err(MiningError::Interrupted) => {}
                    Err(err) => warn!("miner worker error: {err}"),
                }
                info!("miner worker exiting");
            })
            .expect("failed to spawn miner worker thread");
        Worker {
            handle: Some(handle),
        }
    }

    fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A pool of worker threads sharing one cancellation token.
pub struct WorkerPool {
    workers: Vec<Worker>,
    cancel: CancelToken,
}

impl WorkerPool {
    fn new(cancel: CancelToken) -> Self {
        WorkerPool {
            workers: Vec::new(),
            cancel,
        }
    }

    /// Number of worker threads.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Interrupt and join every worker.
    pub fn shutdown(self) {
        self.cancel.cancel();
        for worker in self.workers {
            worker.join();
        }
        debug!("worker pool shutdown complete");
    }
}

/// Owns the miner and audit worker pools. `generate_coins` and
/// `generate_audit_blocks` are the only places pools are replaced;
/// call them from a single controller thread.
pub struct MinerController {
    ctx: MinerContext,
    builder: Arc<TemplateBuilder>,
    throttle: Arc<StakeThrottle>,
    miners: Option<WorkerPool>,
    audit: Option<WorkerPool>,
}

impl MinerController {
    /// Create a controller over the given context.
    pub fn new(ctx: MinerContext) -> Self {
        let builder = Arc::new(TemplateBuilder::new(ctx.clone()));
        MinerController {
            ctx,
            builder,
            throttle: Arc::new(StakeThrottle::new()),
            miners: None,
            audit: None,
        }
    }

    /// The template builder the workers use.
    pub fn builder(&self) -> &Arc<TemplateBuilder> {
        &self.builder
    }

    /// Start or stop coin generation. The previous pool is always
    /// interrupted and joined first. Negative `n_threads` resolves to
    /// the network default or hardware concurrency; zero threads or
    /// `enable == false` leaves no workers.
    pub fn generate_coins(&mut self, enable: bool, n_threads: i32) {
        if let Some(pool) = self.miners.take() {
            pool.shutdown();
        }

        let threads = crate::MinerConfig::effective_threads(n_threads, &self.ctx.params);
        if !enable || threads == 0 {
            info!("coin generation disabled");
            return;
        }

        let cancel = CancelToken::new();
        let mut pool = WorkerPool::new(cancel.clone());
        for id in 0..threads {
            pool.workers.push(Worker::spawn(
                id,
                WorkerKind::Miner,
                self.ctx.clone(),
                Arc::clone(&self.builder),
                Arc::clone(&self.throttle),
                cancel.clone(),
            ));
        }
        info!(threads, "coin generation started");
        self.miners = Some(pool);
    }

    /// Start or stop the periodic audit-block worker.
    pub fn generate_audit_blocks(&mut self, enable: bool) {
        if let Some(pool) = self.audit.take() {
            pool.shutdown();
        }
        if !enable {
            info!("audit generation disabled");
            return;
        }

        let cancel = CancelToken::new();
        let mut pool = WorkerPool::new(cancel.clone());
        pool.workers.push(Worker::spawn(
            0,
            WorkerKind::Audit,
            self.ctx.clone(),
            Arc::clone(&self.builder),
            Arc::clone(&self.throttle),
            cancel,
        ));
        info!("audit generation started");
        self.audit = Some(pool);
    }

    /// Number of active miner workers.
    pub fn miner_threads(&self) -> usize {
        self.miners.as_ref().map_or(0, WorkerPool::num_workers)
    }

    /// Whether the audit worker is running.
    pub fn audit_running(&self) -> bool {
        self.audit.is_some()
    }

    /// Read-only miner statistics.
    pub fn stats(&self) -> MinerStatsSnapshot {
        self.ctx.stats.snapshot()
    }
}

impl Drop for MinerController {
    fn drop(&mut self) {
        if let Some(pool) = self.miners.take() {
            pool.shutdown();
        }
        if let Some(pool) = self.audit.take() {
            pool.shutdown();
        }
    }
}
