//! Miner statistics and shared miner state.
//!
//! Builder and workers share one `MinerStats`: the last-built-block
//! figures, the coinstake search interval, the hash-rate meter, and
//! the extra-nonce stamper slot. Everything is exported read-only
//! through [`MinerStats::snapshot`].

use crate::ExtraNonce;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::info;
use umbra_consensus::Block;

/// Window over which the hash rate is recomputed.
const METER_WINDOW: Duration = Duration::from_secs(4);

/// Minimum spacing between hash-rate log lines.
const METER_LOG_INTERVAL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Default)]
struct BuilderFigures {
    last_block_tx: u64,
    last_block_size: u64,
    last_coinstake_search_interval: i64,
}

#[derive(Debug, Default)]
struct HashMeter {
    window_start: Option<Instant>,
    counter: u64,
    hashes_per_sec: f64,
    last_log: Option<Instant>,
}

impl HashMeter {
    fn record(&mut self, hashes_done: u64) {
        match self.window_start {
            None => {
                self.window_start = Some(Instant::now());
                self.counter = 0;
            }
            Some(start) => {
                self.counter += hashes_done;
                let elapsed = start.elapsed();
                if elapsed > METER_WINDOW {
                    self.hashes_per_sec =
                        1000.0 * self.counter as f64 / elapsed.as_millis().max(1) as f64;
                    self.window_start = Some(Instant::now());
                    self.counter = 0;
                    let due = self
                        .last_log
                        .map_or(true, |at| at.elapsed() > METER_LOG_INTERVAL);
                    if due {
                        self.last_log = Some(Instant::now());
                        info!("hashmeter {:6.0} khash/s", self.hashes_per_sec / 1000.0);
                    }
                }
            }
        }
    }
}

/// Read-only view of the miner state, for RPC and metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MinerStatsSnapshot {
    /// Transactions selected into the last built block.
    pub last_block_tx: u64,
    /// Serialized size accumulated for the last built block.
    pub last_block_size: u64,
    /// Width of the last coinstake search window, seconds.
    pub last_coinstake_search_interval: i64,
    /// Measured proof-of-work hash rate.
    pub hashes_per_sec: f64,
}

/// Shared miner state.
#[derive(Default)]
pub struct MinerStats {
    figures: Mutex<BuilderFigures>,
    meter: Mutex<HashMeter>,
    extra_nonce: Mutex<ExtraNonce>,
}

impl MinerStats {
    /// Fresh state.
    pub fn new() -> Self {
        MinerStats::default()
    }

    /// Record the figures of a finished template build.
    pub fn set_last_block(&self, tx_count: u64, size: u64) {
        let mut figures = self.figures.lock();
        figures.last_block_tx = tx_count;
        figures.last_block_size = size;
    }

    /// Record the width of the last coinstake search window.
    pub fn set_last_coinstake_search_interval(&self, interval: i64) {
        self.figures.lock().last_coinstake_search_interval = interval;
    }

    /// Feed hashes into the rate meter.
    pub fn note_hashes(&self, hashes_done: u64) {
        self.meter.lock().record(hashes_done);
    }

    /// Stamp a block's coinbase through the shared extra-nonce slot.
    pub fn stamp_extra_nonce(&self, block: &mut Block, height: u32) -> u32 {
        self.extra_nonce.lock().stamp(block, height)
    }

    /// Read-only snapshot.
    pub fn snapshot(&self) -> MinerStatsSnapshot {
        let figures = self.figures.lock();
        let meter = self.meter.lock();
        MinerStatsSnapshot {
            last_block_tx: figures.last_block_tx,
            last_block_size: figures.last_block_size,
            last_coinstake_search_interval: figures.last_coinstake_search_interval,
            hashes_per_sec: meter.hashes_per_sec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_builder_figures() {
        let stats = MinerStats::new();
        stats.set_last_block(12, 34_000);
        stats.set_last_coinstake_search_interval(7);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.last_block_tx, 12);
        assert_eq!(snapshot.last_block_size, 34_000);
        assert_eq!(snapshot.last_coinstake_search_interval, 7);
    }

    #[test]
    fn test_meter_starts_cold() {
        let stats = MinerStats::new();
        stats.note_hashes(1_000_000);
        // First call only opens the window; no rate yet.
        assert_eq!(stats.snapshot().hashes_per_sec, 0.0);
    }
}
