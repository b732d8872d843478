//! Block template construction.
//!
//! `TemplateBuilder` assembles candidate blocks for the three block
//! flavors. Transaction selection is identical for proof-of-work and
//! proof-of-stake templates; the two diverge at reward finalization.
//! Audit templates skip the mempool entirely and certify a window of
//! earlier proof-of-stake blocks instead.

use crate::audit::list_of_pos_info;
use crate::priority::{allow_free, SortMode, TxPriority, TxPriorityQueue};
use crate::worker::CancelToken;
use crate::{MinerContext, MiningError, MiningResult, MIN_RELAY_TX_FEE_PER_KB};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use umbra_consensus::{
    block_merkle_root, coinbase_flags, get_legacy_sig_op_count, is_final_tx, opcodes, Amount,
    Block, BlockHeader, BlockIndex, ChainParams, ChainView, Hash256, KeyImage, Script,
    Transaction, TxHash, TxIn, TxOut, TxType, COIN, MANDATORY_SCRIPT_VERIFY_FLAGS,
    MAX_COINBASE_SCRIPT_SIG_SIZE, POA_BLOCK_VERSION, POW_POS_BLOCK_VERSION,
};
use umbra_mempool::FeeRate;
use umbra_wallet::ReservedKeyId;

/// Blinding factor used on reward outputs: commitments to a publicly
/// revealed amount use zero blinding.
const ZERO_BLIND: [u8; 32] = [0u8; 32];

/// A candidate block plus per-transaction bookkeeping.
///
/// `tx_fees` and `tx_sig_ops` run parallel to `block.vtx`; index zero
/// is the coinbase, and entries stay at the `-1` placeholder until
/// finalization fills them.
#[derive(Debug)]
pub struct BlockTemplate {
    /// The block under construction; exclusively owned until
    /// published.
    pub block: Block,
    /// Fee per transaction.
    pub tx_fees: Vec<Amount>,
    /// Legacy sig-op count per transaction.
    pub tx_sig_ops: Vec<i64>,
    /// Key reserved from the wallet pool for this template, if any.
    pub reserved_key: Option<ReservedKeyId>,
}

impl BlockTemplate {
    fn new() -> Self {
        BlockTemplate {
            block: Block::default(),
            tx_fees: Vec::new(),
            tx_sig_ops: Vec::new(),
            reserved_key: None,
        }
    }
}

/// A mempool transaction waiting on other pool transactions to enter
/// the block first. Records live in an arena and are addressed by
/// index; `dependers` maps a blocking hash to the records waiting on
/// it.
struct Orphan {
    item: TxPriority,
    depends_on: HashSet<TxHash>,
}

#[derive(Default)]
struct OrphanPool {
    arena: Vec<Orphan>,
    dependers: HashMap<TxHash, Vec<usize>>,
}

impl OrphanPool {
    fn insert(&mut self, item: TxPriority, depends_on: HashSet<TxHash>) {
        let idx = self.arena.len();
        for dep in &depends_on {
            self.dependers.entry(*dep).or_default().push(idx);
        }
        self.arena.push(Orphan { item, depends_on });
    }

    /// Mark `hash` as included and return the orphans that became
    /// ready.
    fn resolve(&mut self, hash: &TxHash) -> Vec<TxPriority> {
        let mut ready = Vec::new();
        if let Some(waiting) = self.dependers.remove(hash) {
            for idx in waiting {
                let orphan = &mut self.arena[idx];
                orphan.depends_on.remove(hash);
                if orphan.depends_on.is_empty() {
                    ready.push(orphan.item.clone());
                }
            }
        }
        ready
    }
}

/// Update a draft header's time against the parent's median time and
/// the adjusted clock. On networks that allow minimum-difficulty
/// blocks the time change also moves the work requirement.
pub fn update_time(
    header: &mut BlockHeader,
    prev: &BlockIndex,
    chain: &dyn ChainView,
    params: &ChainParams,
) {
    header.time = std::cmp::max(prev.median_time_past + 1, chain.adjusted_time());
    if params.allow_min_difficulty_blocks {
        header.bits = chain.next_work_required(prev, header);
    }
}

/// Builds candidate blocks from the injected context.
pub struct TemplateBuilder {
    ctx: MinerContext,
    /// End of the previous coinstake search window. Initialized to
    /// the adjusted time at construction.
    last_coinstake_search_time: Mutex<i64>,
}

impl TemplateBuilder {
    /// Create a builder over the given context.
    pub fn new(ctx: MinerContext) -> Self {
        let now = ctx.chain.adjusted_time() as i64;
        TemplateBuilder {
            ctx,
            last_coinstake_search_time: Mutex::new(now),
        }
    }

    /// The context this builder operates on.
    pub fn context(&self) -> &MinerContext {
        &self.ctx
    }

    /// Generate a fresh reward address and build a template for the
    /// requested mode. Refuses to build proof-of-work templates once
    /// the proof-of-stake era has begun.
    pub fn create_new_block_with_key(
        &self,
        proof_of_stake: bool,
        cancel: &CancelToken,
    ) -> MiningResult<BlockTemplate> {
        let address = self.ctx.wallet.generate_address()?;
        let next_height = self
            .ctx
            .chain
            .tip()
            .ok_or(MiningError::NoTip)?
            .height
            .saturating_add(1);
        if next_height > self.ctx.params.last_pow_block && !proof_of_stake {
            info!("aborting proof-of-work block creation during proof-of-stake phase");
            return Err(MiningError::PowPhaseOver);
        }

        let script_pubkey = Script::new()
            .push_slice(&address.pubkey)
            .push_opcode(opcodes::OP_CHECKSIG);
        let reserved = self.ctx.wallet.reserve_key()?;
        match self.create_new_block(
            script_pubkey,
            &address.tx_pub,
            &address.tx_priv,
            proof_of_stake,
            cancel,
        ) {
            Ok(mut template) => {
                template.reserved_key = Some(reserved);
                Ok(template)
            }
            Err(err) => {
                self.ctx.wallet.return_key(reserved);
                Err(err)
            }
        }
    }

    /// Generate a fresh reward address and build an audit template.
    pub fn create_new_poa_block_with_key(
        &self,
        cancel: &CancelToken,
    ) -> MiningResult<BlockTemplate> {
        let address = self.ctx.wallet.generate_address()?;
        let script_pubkey = Script::new()
            .push_slice(&address.pubkey)
            .push_opcode(opcodes::OP_CHECKSIG);
        let reserved = self.ctx.wallet.reserve_key()?;
        match self.create_new_poa_block(script_pubkey, &address.tx_pub, &address.tx_priv, cancel) {
            Ok(mut template) => {
                template.reserved_key = Some(reserved);
                Ok(template)
            }
            Err(err) => {
                self.ctx.wallet.return_key(reserved);
                Err(err)
            }
        }
    }

    /// Assemble a proof-of-work or proof-of-stake template paying
    /// `script_pubkey`, with the ephemeral keypair stamped onto the
    /// reward output.
    pub fn create_new_block(
        &self,
        script_pubkey: Script,
        tx_pub: &[u8],
        tx_priv: &[u8],
        proof_of_stake: bool,
        cancel: &CancelToken,
    ) -> MiningResult<BlockTemplate> {
        let chain = &self.ctx.chain;
        let wallet = &self.ctx.wallet;
        let params = &self.ctx.params;

        let mut template = BlockTemplate::new();

        let tip = chain.tip().ok_or(MiningError::NoTip)?;
        let height = tip.height + 1;

        template.block.header.version = POW_POS_BLOCK_VERSION;
        if params.mine_blocks_on_demand {
            if let Some(version) = self.ctx.config.block_version {
                template.block.header.version = version;
            }
        }

        // Coinbase skeleton: one null input, one reward output with
        // the ephemeral keypair attached.
        let mut coinbase = Transaction {
            vin: vec![TxIn::null()],
            vout: vec![TxOut::new(chain.block_subsidy(tip.height), script_pubkey)],
            ..Default::default()
        };
        coinbase.vout[0].tx_pub = tx_pub.to_vec();
        coinbase.vout[0].tx_priv = tx_priv.to_vec();
        template.block.vtx.push(coinbase);
        template.tx_fees.push(-1); // updated at end
        template.tx_sig_ops.push(-1); // updated at end

        if proof_of_stake {
            cancel.check()?;
            template.block.header.time = chain.adjusted_time();
            template.block.header.bits = chain.next_work_required(&tip, &template.block.header);

            let search_time = template.block.header.time as i64;
            let mut stake_found = false;
            {
                let mut last_search_time = self.last_coinstake_search_time.lock();
                if search_time >= *last_search_time {
                    let interval = search_time - *last_search_time;
                    if let Some(coinstake) =
                        wallet.create_coinstake(template.block.header.bits, interval)?
                    {
                        template.block.header.time = coinstake.time;
                        template.block.vtx[0].vout[0].set_empty();
                        template.block.vtx.push(coinstake.tx);
                        stake_found = true;
                    }
                    self.ctx.stats.set_last_coinstake_search_interval(interval);
                    *last_search_time = search_time;
                }
            }
            if !stake_found {
                debug!("stake not found");
                return Err(MiningError::StakeNotFound);
            }
        }

        // Size envelope.
        let block_max_size = self.ctx.config.clamped_max_size();
        let block_priority_size = self.ctx.config.clamped_priority_size();
        let block_min_size = self.ctx.config.clamped_min_size();

        let mut total_fees: Amount = 0;

        // Mempool scan and selection run against one tip snapshot,
        // one coin view and one mempool snapshot so the three stay
        // mutually consistent.
        let mut view = chain.coin_view();
        let snapshot = self.ctx.mempool.snapshot();

        let mut orphans = OrphanPool::default();
        let mut candidates: Vec<TxPriority> = Vec::with_capacity(snapshot.len());

        for (hash, entry) in &snapshot {
            let tx = &entry.tx;
            if tx.is_coinbase() || tx.is_coinstake() || !is_final_tx(tx, height, 0) {
                continue;
            }

            // Key images must not be spent on disk, and inputs must
            // not sit on the invalid-outpoint list.
            let mut rejected = false;
            for input in &tx.vin {
                if chain.is_spent_key_image(&input.key_image.to_hex()) {
                    rejected = true;
                    break;
                }
                if chain.is_invalid_outpoint(&input.prevout) {
                    warn!(tx = %hash, outpoint = ?input.prevout, "found invalid input in tx");
                    rejected = true;
                    break;
                }
            }
            if rejected {
                continue;
            }

            let mut priority = entry.priority_at(tip.height);
            let mut fee_scratch: Amount = 0;
            self.ctx
                .mempool
                .apply_deltas(hash, &mut priority, &mut fee_scratch);

            let item = TxPriority {
                priority,
                fee_rate: FeeRate::new(entry.fee, entry.size),
                fee: entry.fee,
                size: entry.size,
                hash: *hash,
                tx: Arc::clone(tx),
            };

            if !view.have_inputs(tx) {
                // Inputs referencing other pool transactions make
                // this a temporary orphan; anything else is simply
                // missing and the tx is skipped.
                let depends_on: HashSet<TxHash> = tx
                    .vin
                    .iter()
                    .map(|input| input.prevout.hash)
                    .filter(|dep| self.ctx.mempool.contains(dep))
                    .collect();
                if !depends_on.is_empty() {
                    orphans.insert(item, depends_on);
                }
                continue;
            }

            candidates.push(item);
        }

        debug!(
            candidates = candidates.len(),
            "selecting transactions from mempool"
        );

        let mut block_size: u64 = 1000;
        let mut block_tx: u64 = 0;
        let mut block_sig_ops: i64 = 100;
        let mut sorted_by_fee = block_priority_size == 0;
        let min_relay = FeeRate::from_per_kb(MIN_RELAY_TX_FEE_PER_KB);
        let mut seen_key_images: HashSet<KeyImage> = HashSet::new();

        let mut queue = TxPriorityQueue::from_vec(
            candidates,
            if sorted_by_fee {
                SortMode::Fee
            } else {
                SortMode::Priority
            },
        );

        while let Some(top) = queue.pop() {
            cancel.check()?;
            let tx_size = top.size as u64;

            // Size limits.
            if block_size + tx_size >= block_max_size {
                continue;
            }

            // Skip free transactions once past the minimum block size.
            if sorted_by_fee && top.fee_rate < min_relay && block_size + tx_size >= block_min_size
            {
                continue;
            }

            // Prioritise by fee once past the priority budget or out
            // of high-priority transactions. The flip re-orders the
            // rest of the queue; the popped transaction still gets
            // its inclusion checks below.
            if !sorted_by_fee
                && (block_size + tx_size >= block_priority_size || !allow_free(top.priority))
            {
                sorted_by_fee = true;
                queue.rebuild(SortMode::Fee);
            }

            if !view.have_inputs(&top.tx) {
                continue;
            }
            if !self.ctx.validator.check_inputs(
                &top.tx,
                view.as_ref(),
                MANDATORY_SCRIPT_VERIFY_FLAGS,
            ) {
                continue;
            }

            // One key image per block, first committed wins.
            if top
                .tx
                .key_images()
                .any(|image| seen_key_images.contains(image))
            {
                continue;
            }
            seen_key_images.extend(top.tx.key_images().copied());

            if top.tx.is_coinstake() {
                view.apply(&top.tx, height);
            }

            template.block.vtx.push((*top.tx).clone());
            template.tx_fees.push(top.fee);
            template.tx_sig_ops.push(0);
            block_size += tx_size;
            block_tx += 1;
            block_sig_ops += get_legacy_sig_op_count(&top.tx) as i64;
            total_fees += top.fee;

            if self.ctx.config.print_priority {
                debug!(
                    priority = format!("{:.1}", top.priority),
                    fee_rate = %top.fee_rate,
                    tx = %top.hash,
                    "selected transaction"
                );
            }

            // Wake any orphans that were waiting on this transaction.
            for ready in orphans.resolve(&top.hash) {
                queue.push(ready);
            }
        }

        if !proof_of_stake {
            // Masternode and general budget payments.
            let mut coinbase = template.block.vtx[0].clone();
            self.ctx
                .masternodes
                .fill_block_payee(&mut coinbase, total_fees, false);
            if coinbase.vout.len() > 1 {
                template.block.payee = coinbase.vout[1].script_pubkey.clone();
                template.block.vtx[0] = coinbase;
            } else {
                coinbase.vout[0].value = total_fees + chain.block_subsidy(tip.height);
                coinbase.vin[0].script_sig = Script::new()
                    .push_int(height as i64)
                    .push_opcode(opcodes::OP_0);
                template.block.vtx[0] = coinbase;
            }
        }

        self.ctx.stats.set_last_block(block_tx, block_size);
        debug!(
            txs = block_tx,
            size = block_size,
            sig_ops = block_sig_ops,
            fees = total_fees,
            "total block size"
        );

        // Final coinbase form.
        template.block.vtx[0].vin[0].script_sig = Script::new()
            .push_int(height as i64)
            .push_opcode(opcodes::OP_0);
        template.block.vtx[0].tx_type = TxType::RevealAmount;
        template.tx_fees[0] = total_fees;
        if proof_of_stake {
            // Fees ride in the coinstake's reward slot.
            template.block.vtx[1].vout[2].value += total_fees;
        }

        if !proof_of_stake {
            let value = template.block.vtx[0].vout[0].value;
            wallet.encode_tx_out_amount(&mut template.block.vtx[0].vout[0], value, tx_pub);
            let value = template.block.vtx[0].vout[0].value;
            template.block.vtx[0].vout[0].commitment =
                wallet.create_commitment(&ZERO_BLIND, value)?;
        } else {
            // Consolidate the reward slot into the stake return, then
            // re-derive the stealth envelope from the coinstake's own
            // ephemeral key.
            let coinstake = &mut template.block.vtx[1];
            coinstake.vout[1].value += coinstake.vout[2].value;
            coinstake.vout[2].set_empty();
            let shared_secret = coinstake.vout[1].tx_pub.clone();
            let value = coinstake.vout[1].value;
            wallet.encode_tx_out_amount(&mut coinstake.vout[1], value, &shared_secret);
            coinstake.vout[1].commitment.clear();
            coinstake.vout[1].commitment = wallet.create_commitment(&ZERO_BLIND, value)?;

            if let Err(err) = wallet.make_schnorr_signature(coinstake) {
                warn!("failed to make Schnorr signature: {err}");
                return Err(err.into());
            }
            if !self
                .ctx
                .validator
                .verify_schnorr_key_image(&template.block.vtx[1])
            {
                warn!("failed to verify Schnorr key image");
                return Err(MiningError::SchnorrVerification);
            }
            wallet.is_transaction_for_me(&template.block.vtx[1]);
        }

        // Header.
        template.block.header.prev_hash = tip.hash;
        if !proof_of_stake {
            update_time(&mut template.block.header, &tip, chain.as_ref(), params);
        }
        template.block.header.bits = chain.next_work_required(&tip, &template.block.header);
        template.block.header.nonce = 0;
        template.block.header.accumulator_checkpoint = Hash256::ZERO;
        template.tx_sig_ops[0] = get_legacy_sig_op_count(&template.block.vtx[0]) as i64;

        if proof_of_stake {
            self.ctx.stats.stamp_extra_nonce(&mut template.block, height);
            info!(
                block = %template.block.hash(),
                "proof-of-stake block found"
            );
            if wallet.sign_block(&mut template.block).is_err() {
                warn!("signing new block failed, computing private key");
                if template.block.vtx.len() > 1 && template.block.vtx[1].vout.len() > 1 {
                    wallet.add_computed_private_key(&template.block.vtx[1].vout[1]);
                }
                if let Err(err) = wallet.sign_block(&mut template.block) {
                    warn!("signing new block with output key failed");
                    return Err(err.into());
                }
            }
        }

        Ok(template)
    }

    /// Assemble an audit (proof-of-audit) template: a single reward
    /// transaction plus the audited proof-of-stake window.
    pub fn create_new_poa_block(
        &self,
        script_pubkey: Script,
        tx_pub: &[u8],
        tx_priv: &[u8],
        cancel: &CancelToken,
    ) -> MiningResult<BlockTemplate> {
        let chain = &self.ctx.chain;
        let wallet = &self.ctx.wallet;
        let params = &self.ctx.params;

        let tip = chain.tip().ok_or(MiningError::NoTip)?;
        if tip.height < params.start_poa_block {
            return Err(MiningError::BeforeAuditStart(tip.height));
        }

        let mut template = BlockTemplate::new();

        // Reward transaction; its value follows from the audit count.
        let mut reward_tx = Transaction {
            vin: vec![TxIn::null()],
            vout: vec![TxOut::new(0, script_pubkey)],
            ..Default::default()
        };
        reward_tx.vout[0].tx_pub = tx_pub.to_vec();
        reward_tx.vout[0].tx_priv = tx_priv.to_vec();
        template.block.vtx.push(reward_tx);
        template.tx_fees.push(-1); // updated at end
        template.tx_sig_ops.push(-1); // updated at end

        cancel.check()?;
        template.block.header.time = chain.adjusted_time();
        template.block.header.bits = chain.next_work_required(&tip, &template.block.header);

        let (prev_poa_height, audits) =
            list_of_pos_info(chain.as_ref(), self.ctx.validator.as_ref(), params, tip.height)?;
        if audits.is_empty() {
            return Err(MiningError::EmptyAuditWindow);
        }
        template.block.pos_blocks_audited = audits;

        // Version tag separates audit blocks from stake blocks.
        template.block.header.version = POA_BLOCK_VERSION;
        template.block.header.time = chain.adjusted_time();

        let audited = template.block.pos_blocks_audited.len() as Amount;
        let reward = if tip.height >= params.hard_fork_height {
            audited * COIN / 4
        } else {
            audited * COIN / 2
        };
        template.block.vtx[0].vout[0].value = reward;
        template.block.vtx[0].tx_type = TxType::RevealAmount;

        wallet.encode_tx_out_amount(&mut template.block.vtx[0].vout[0], reward, tx_pub);
        match wallet.create_commitment(&ZERO_BLIND, template.block.vtx[0].vout[0].value) {
            Ok(commitment) => template.block.vtx[0].vout[0].commitment = commitment,
            Err(err) => {
                warn!("unable to create commitment to 0: {err}");
                return Err(err.into());
            }
        }
        let value = template.block.vtx[0].vout[0].value;
        wallet.encode_tx_out_amount(&mut template.block.vtx[0].vout[0], value, tx_pub);

        let height = tip.height + 1;

        // Header and audit linkage.
        template.block.header.prev_hash = tip.hash;
        if prev_poa_height >= params.start_poa_block {
            let prev_poa = chain
                .at_height(prev_poa_height)
                .ok_or(umbra_consensus::ConsensusError::BlockNotFound(prev_poa_height))?;
            template.block.prev_poa_hash = prev_poa.hash;
        } else {
            template.block.prev_poa_hash = Hash256::ZERO;
        }

        template.block.header.bits = chain.next_work_required(&tip, &template.block.header);
        template.block.header.nonce = 0;
        template.tx_sig_ops[0] = get_legacy_sig_op_count(&template.block.vtx[0]) as i64;

        let script_sig = Script::new()
            .push_int(height as i64)
            .push_scriptnum(1)
            .extend(&coinbase_flags());
        assert!(script_sig.len() <= MAX_COINBASE_SCRIPT_SIG_SIZE);
        template.block.vtx[0].vin[0].script_sig = script_sig;

        template.block.header.merkle_root = block_merkle_root(&template.block);
        template.block.poa_merkle_root = template.block.compute_poa_merkle_root();
        template.block.mined_hash = template.block.compute_mined_hash();

        Ok(template)
    }
}
