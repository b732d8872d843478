//! Audit-window selection and audit-template tests.

use crate::generators::*;
use crate::harness::*;
use umbra_consensus::{
    ChainParams, ChainView, Hash256, PoSBlockSummary, COIN, POA_BLOCK_VERSION,
};
use umbra_mining::{list_of_pos_info, CancelToken, MinerConfig, MiningError, TemplateBuilder};

/// Parameters with a short proof-of-work era for audit tests.
fn audit_params() -> ChainParams {
    ChainParams {
        last_pow_block: 100,
        start_poa_block: 160,
        max_num_pos_blocks_audited: 59,
        hard_fork_height: 1_000_000,
        ..ChainParams::mainnet()
    }
}

/// Environment whose chain covers the first audit window: heights
/// 0..=160 as plain blocks.
fn first_window_env() -> TestEnv {
    TestEnv::new(
        MemoryChain::with_pow_chain(161),
        audit_params(),
        MinerConfig::default(),
    )
}

/// Environment with a previous audit block at height 161 covering up
/// to `last_audited`, followed by proof-of-stake blocks up to height
/// 170.
fn subsequent_env(last_audited: u32, params: ChainParams) -> TestEnv {
    let chain = MemoryChain::with_pow_chain(161);
    let audits = vec![PoSBlockSummary {
        hash: Hash256::ZERO,
        height: last_audited,
        time: BASE_TIME,
    }];
    let tip = chain.tip().unwrap();
    chain.push_block(poa_block(tip.hash, BASE_TIME + 10_000, audits));
    for height in 162..=170u32 {
        let tip = chain.tip().unwrap();
        chain.push_block(pos_block(tip.hash, BASE_TIME + height * 60, height as u8));
    }
    TestEnv::new(chain, params, MinerConfig::default())
}

// ============================================================================
// Window selection
// ============================================================================

#[test]
fn test_first_audit_window_covers_fixed_range() {
    let env = first_window_env();
    let (prev_poa, audits) = list_of_pos_info(
        env.chain.as_ref(),
        env.validator.as_ref(),
        &env.params,
        160,
    )
    .unwrap();

    // No audit block exists yet: the walk fell below the start height
    // and the window is exactly the 59 heights after the last
    // proof-of-work block.
    assert!(prev_poa < env.params.start_poa_block);
    assert_eq!(audits.len(), 59);
    assert_eq!(audits.first().unwrap().height, 101);
    assert_eq!(audits.last().unwrap().height, 159);
    for summary in &audits {
        assert_eq!(summary.time, env.chain.at_height(summary.height).unwrap().time);
        assert_eq!(summary.hash, env.chain.at_height(summary.height).unwrap().hash);
    }
}

#[test]
fn test_reverification_failure_zeroes_time_but_keeps_entry() {
    let env = first_window_env();
    env.validator.fail_reverify_at(105);

    let (_, audits) = list_of_pos_info(
        env.chain.as_ref(),
        env.validator.as_ref(),
        &env.params,
        160,
    )
    .unwrap();

    assert_eq!(audits.len(), 59);
    let failed = audits.iter().find(|summary| summary.height == 105).unwrap();
    assert_eq!(failed.time, 0);
    let healthy = audits.iter().find(|summary| summary.height == 106).unwrap();
    assert_ne!(healthy.time, 0);
}

#[test]
fn test_subsequent_window_resumes_after_last_audit() {
    let env = subsequent_env(130, audit_params());
    let current = env.chain.tip().unwrap().height;
    let (prev_poa, audits) = list_of_pos_info(
        env.chain.as_ref(),
        env.validator.as_ref(),
        &env.params,
        current,
    )
    .unwrap();

    // The walk found the audit block at 161 and the window resumes
    // with the stake blocks above the last audited height.
    assert_eq!(prev_poa, 161);
    assert_eq!(
        audits.iter().map(|s| s.height).collect::<Vec<_>>(),
        (162..=170).collect::<Vec<_>>()
    );
}

#[test]
fn test_window_is_capped() {
    let mut params = audit_params();
    params.max_num_pos_blocks_audited = 5;
    let env = subsequent_env(130, params);
    let current = env.chain.tip().unwrap().height;

    let (_, audits) = list_of_pos_info(
        env.chain.as_ref(),
        env.validator.as_ref(),
        &env.params,
        current,
    )
    .unwrap();

    assert_eq!(audits.len(), 5);
    assert_eq!(audits.last().unwrap().height, 166);
}

#[test]
fn test_unreadable_block_is_fatal() {
    let env = subsequent_env(130, audit_params());
    env.chain.mark_unreadable(165);
    let current = env.chain.tip().unwrap().height;

    let result = list_of_pos_info(
        env.chain.as_ref(),
        env.validator.as_ref(),
        &env.params,
        current,
    );
    assert!(matches!(result, Err(MiningError::Consensus(_))));
}

// ============================================================================
// Audit templates
// ============================================================================

#[test]
fn test_first_audit_template() {
    let env = first_window_env();
    let builder = TemplateBuilder::new(env.context());
    let template = builder
        .create_new_poa_block_with_key(&CancelToken::new())
        .unwrap();
    let block = &template.block;

    assert_eq!(block.header.version, POA_BLOCK_VERSION);
    assert!(block.is_proof_of_audit());
    assert_eq!(block.vtx.len(), 1);
    assert_eq!(block.pos_blocks_audited.len(), 59);

    // Before the hard fork each audited block is worth half a coin.
    assert_eq!(block.vtx[0].vout[0].value, 59 * COIN / 2);

    // No earlier audit block: the linkage hash is null.
    assert!(block.prev_poa_hash.is_zero());
    assert_eq!(block.poa_merkle_root, block.compute_poa_merkle_root());
    assert_eq!(block.mined_hash, block.compute_mined_hash());
    assert!(!block.header.merkle_root.is_zero());
    assert!(block.vtx[0].vin[0].script_sig.len() <= 100);
}

#[test]
fn test_audit_reward_after_hard_fork() {
    let mut params = audit_params();
    params.hard_fork_height = 50;
    let env = TestEnv::new(MemoryChain::with_pow_chain(161), params, MinerConfig::default());

    let builder = TemplateBuilder::new(env.context());
    let template = builder
        .create_new_poa_block_with_key(&CancelToken::new())
        .unwrap();

    assert_eq!(template.block.vtx[0].vout[0].value, 59 * COIN / 4);
}

#[test]
fn test_audit_template_links_previous_audit_block() {
    let env = subsequent_env(130, audit_params());
    let prev_poa_hash = env.chain.at_height(161).unwrap().hash;

    let builder = TemplateBuilder::new(env.context());
    let template = builder
        .create_new_poa_block_with_key(&CancelToken::new())
        .unwrap();

    assert_eq!(template.block.prev_poa_hash, prev_poa_hash);
    assert_eq!(template.block.pos_blocks_audited.len(), 9);
    // Reward follows the audited count, not the cap.
    assert_eq!(template.block.vtx[0].vout[0].value, 9 * COIN / 2);
}

#[test]
fn test_audit_refused_before_start_height() {
    let env = TestEnv::new(
        MemoryChain::with_pow_chain(100),
        audit_params(),
        MinerConfig::default(),
    );
    let builder = TemplateBuilder::new(env.context());
    let result = builder.create_new_poa_block_with_key(&CancelToken::new());
    assert!(matches!(result, Err(MiningError::BeforeAuditStart(_))));
}

#[test]
fn test_audit_refused_when_window_empty() {
    // The previous audit block already covers everything below the
    // tip, and nothing above it is a stake block.
    let chain = MemoryChain::with_pow_chain(161);
    let audits = vec![PoSBlockSummary {
        hash: Hash256::ZERO,
        height: 161,
        time: BASE_TIME,
    }];
    let tip = chain.tip().unwrap();
    chain.push_block(poa_block(tip.hash, BASE_TIME + 10_000, audits));
    let env = TestEnv::new(chain, audit_params(), MinerConfig::default());

    let builder = TemplateBuilder::new(env.context());
    let result = builder.create_new_poa_block_with_key(&CancelToken::new());
    assert!(matches!(result, Err(MiningError::EmptyAuditWindow)));
}
