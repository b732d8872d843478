//! Proof-of-audit window selection.

use crate::{MiningError, MiningResult};
use tracing::debug;
use umbra_consensus::{
    ChainParams, ChainView, ConsensusError, PoSBlockSummary, TxValidator, POA_BLOCK_VERSION,
};

/// Compute the ordered window of proof-of-stake blocks the next audit
/// block must certify, walking back from `current_height` to the most
/// recent audit block.
///
/// Returns the height the backward walk stopped at (the previous
/// audit block when one exists) and the audited summaries. Entries
/// whose re-verification fails are carried with `time == 0`; failing
/// block reads are fatal to the whole selection.
pub fn list_of_pos_info(
    chain: &dyn ChainView,
    validator: &dyn TxValidator,
    params: &ChainParams,
    current_height: u32,
) -> MiningResult<(u32, Vec<PoSBlockSummary>)> {
    // Find the previous audit block.
    let mut walk = current_height;
    while walk >= params.start_poa_block {
        let index = chain
            .at_height(walk)
            .ok_or(ConsensusError::BlockNotFound(walk))?;
        if index.version == POA_BLOCK_VERSION {
            break;
        }
        walk -= 1;
    }

    let mut audits = Vec::new();
    if walk <= params.start_poa_block {
        // First audit block: the fixed window right after the last
        // proof-of-work block.
        let first = params.last_pow_block + 1;
        let last = params.last_pow_block + params.max_num_pos_blocks_audited as u32;
        for height in first..=last {
            let index = chain
                .at_height(height)
                .ok_or(ConsensusError::BlockNotFound(height))?;
            let time = if validator.re_verify_pos_block(&index) {
                index.time
            } else {
                0
            };
            audits.push(PoSBlockSummary {
                hash: index.hash,
                height,
                time,
            });
        }
    } else {
        // Resume after the last entry the previous audit block covered.
        let prev_index = chain
            .at_height(walk)
            .ok_or(ConsensusError::BlockNotFound(walk))?;
        let prev_block = chain.read_block(&prev_index)?;
        let last_audited = prev_block
            .pos_blocks_audited
            .last()
            .ok_or(MiningError::CorruptAuditChain)?;

        let mut next = last_audited.height + 1;
        while next <= current_height {
            let index = chain
                .at_height(next)
                .ok_or(ConsensusError::BlockNotFound(next))?;
            let body = chain.read_block(&index)?;
            if body.is_proof_of_stake() {
                let time = if validator.re_verify_pos_block(&index) {
                    index.time
                } else {
                    0
                };
                audits.push(PoSBlockSummary {
                    hash: index.hash,
                    height: next,
                    time,
                });
            }
            if audits.len() == params.max_num_pos_blocks_audited {
                break;
            }
            next += 1;
        }
    }

    debug!(
        prev_poa_height = walk,
        audited = audits.len(),
        "selected audit window"
    );
    Ok((walk, audits))
}
