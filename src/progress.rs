//! # Progress — Atomic Run Progress Counters
//!
//! Observability only: workers bump these counters after finishing a chunk,
//! and a background thread logs them periodically. Nothing here feeds the
//! report or the digest; those come exclusively from per-chunk results merged
//! by the aggregator.
//!
//! ## Background Reporter
//!
//! A dedicated thread logs chunks done, numbers checked, rate, and ETA every
//! `interval`. It polls the `shutdown` flag in short ticks so `stop()` +
//! `join()` returns promptly at the end of a run.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

use crate::chunk::ChunkResult;

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

pub struct Progress {
    pub numbers_checked: AtomicU64,
    pub chunks_done: AtomicU64,
    pub violations: AtomicU64,
    total_chunks: AtomicU64,
    start: Instant,
    shutdown: AtomicBool,
}

impl Progress {
    pub fn new() -> Arc<Self> {
        Arc::new(Progress {
            numbers_checked: AtomicU64::new(0),
            chunks_done: AtomicU64::new(0),
            violations: AtomicU64::new(0),
            total_chunks: AtomicU64::new(0),
            start: Instant::now(),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn set_total_chunks(&self, total: u64) {
        self.total_chunks.store(total, Ordering::Relaxed);
    }

    pub fn total_chunks(&self) -> u64 {
        self.total_chunks.load(Ordering::Relaxed)
    }

    /// Count a finished chunk.
    pub fn record_chunk(&self, result: &ChunkResult) {
        self.numbers_checked
            .fetch_add(result.total_numbers, Ordering::Relaxed);
        self.violations
            .fetch_add(result.violations.len() as u64, Ordering::Relaxed);
        self.chunks_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn start_reporter(self: &Arc<Self>, interval: Duration) -> thread::JoinHandle<()> {
        let progress = Arc::clone(self);
        thread::spawn(move || {
            let mut since_report = Duration::ZERO;
            while !progress.shutdown.load(Ordering::Relaxed) {
                thread::sleep(SHUTDOWN_POLL);
                since_report += SHUTDOWN_POLL;
                if since_report >= interval {
                    since_report = Duration::ZERO;
                    progress.print_status();
                }
            }
        })
    }

    /// Estimated seconds remaining, from the mean chunk rate so far.
    pub fn eta_secs(&self) -> Option<u64> {
        let done = self.chunks_done.load(Ordering::Relaxed);
        let total = self.total_chunks();
        if done == 0 || total < done {
            return None;
        }
        let per_chunk = self.start.elapsed().as_secs_f64() / done as f64;
        Some((per_chunk * (total - done) as f64).round() as u64)
    }

    /// Numbers checked per second; 0 until a full second has passed.
    pub fn rate(&self) -> f64 {
        let elapsed = self.start.elapsed();
        if elapsed.as_secs() > 0 {
            self.numbers_checked.load(Ordering::Relaxed) as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn print_status(&self) {
        let elapsed = self.start.elapsed();
        let checked = self.numbers_checked.load(Ordering::Relaxed);
        let done = self.chunks_done.load(Ordering::Relaxed);
        let rate = self.rate();
        info!(
            chunks = format_args!("{}/{}", done, self.total_chunks()),
            checked,
            rate = format_args!("{:.0}/s", rate),
            violations = self.violations.load(Ordering::Relaxed),
            elapsed = %hms(elapsed.as_secs()),
            eta = %self.eta_secs().map(hms).unwrap_or_else(|| "-".to_string()),
            "verification progress"
        );
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

fn hms(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
