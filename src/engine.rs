//! # Engine — One Verification Run, End to End
//!
//! Wires the pieces together in a fixed order:
//!
//! 1. validate the [`VerifyConfig`]
//! 2. build the small-prime pool once (shared read-only by every worker)
//! 3. partition the range into indexed chunks
//! 4. run every chunk on the [`Scheduler`]
//! 5. fold the results with [`aggregate`] into a [`FinalReport`]
//!
//! The engine holds no state across runs; `run` can be called repeatedly and
//! always yields the same statistics and digest for the same configuration.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::aggregate::{aggregate, FinalReport};
use crate::chunk::{partition, SearchSettings};
use crate::config::VerifyConfig;
use crate::error::VerifyError;
use crate::progress::Progress;
use crate::scheduler::Scheduler;
use crate::sieve::SmallPrimes;

pub struct Engine {
    config: VerifyConfig,
    primes: Arc<SmallPrimes>,
    scheduler: Scheduler,
}

impl Engine {
    pub fn new(config: VerifyConfig) -> Result<Self, VerifyError> {
        Self::with_qos(config, false)
    }

    /// Like [`Engine::new`], optionally with macOS QoS on worker threads.
    pub fn with_qos(config: VerifyConfig, qos: bool) -> Result<Self, VerifyError> {
        config.validate()?;
        let started = Instant::now();
        let primes = SmallPrimes::new(config.small_prime_ceiling);
        info!(
            ceiling = config.small_prime_ceiling,
            count = primes.len(),
            largest = primes.largest().unwrap_or(0),
            secs = format_args!("{:.3}", started.elapsed().as_secs_f64()),
            "small-prime pool ready"
        );
        Self::build(config, primes, qos)
    }

    /// Run against a caller-supplied pool instead of the generated one.
    ///
    /// The pool's ceiling must equal the configured `small_prime_ceiling`,
    /// since it also fixes the width of the buffer sieved below each chunk.
    pub fn with_primes(config: VerifyConfig, primes: SmallPrimes) -> Result<Self, VerifyError> {
        config.validate()?;
        if primes.ceiling() != config.small_prime_ceiling {
            return Err(VerifyError::config(format!(
                "prime pool ceiling {} does not match configured ceiling {}",
                primes.ceiling(),
                config.small_prime_ceiling
            )));
        }
        Self::build(config, primes, false)
    }

    fn build(config: VerifyConfig, primes: SmallPrimes, qos: bool) -> Result<Self, VerifyError> {
        let scheduler = Scheduler::new(config.resolved_workers(), qos)?;
        Ok(Engine {
            config,
            primes: Arc::new(primes),
            scheduler,
        })
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    pub fn primes(&self) -> &SmallPrimes {
        &self.primes
    }

    pub fn workers(&self) -> usize {
        self.scheduler.workers()
    }

    /// Verify the configured range.
    pub fn run(&self, progress: Option<&Progress>) -> Result<FinalReport, VerifyError> {
        let started_at = Utc::now();
        let wall = Instant::now();
        let c = &self.config;

        let chunks = partition(c.range_start, c.range_end, c.chunk_size);
        info!(
            start = c.range_start,
            end = c.range_end,
            chunks = chunks.len(),
            chunk_size = c.chunk_size,
            workers = self.workers(),
            policy = %c.violation_policy,
            "starting verification"
        );
        if let Some(p) = progress {
            p.set_total_chunks(chunks.len() as u64);
        }

        let settings = SearchSettings::from(c);
        let results = self.scheduler.run(&chunks, &self.primes, &settings, progress)?;
        let totals = aggregate(results, chunks.len())?;

        let mut config = c.clone();
        config.workers = Some(self.workers());
        let report = FinalReport {
            config,
            workers: self.workers(),
            small_primes: self.primes.len(),
            started_at,
            wall_time: wall.elapsed(),
            totals,
        };
        info!(
            numbers = report.totals.total_numbers,
            violations = report.totals.violations.len(),
            digest = %report.digest_hex(),
            secs = format_args!("{:.3}", report.wall_time.as_secs_f64()),
            "verification finished"
        );
        Ok(report)
    }
}

/// Verify `config` with a fresh engine and no progress reporting.
pub fn verify(config: &VerifyConfig) -> Result<FinalReport, VerifyError> {
    Engine::new(config.clone())?.run(None)
}
