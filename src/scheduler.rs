//! # Scheduler — Bounded Worker Pool over Chunk Descriptors
//!
//! Runs the chunk processor for every chunk on a dedicated rayon pool of
//! exactly `workers` threads. Rayon's work-stealing deques act as the shared
//! work queue: every chunk is enqueued up front as its own job (`with_max_len(1)`),
//! and no chunk is ever handed to two workers.
//!
//! Results are sent back over a channel in completion order, so the returned
//! `Vec` is in no particular order; callers restore chunk order through
//! `ChunkResult::index`. The only things workers share are read-only: the
//! small-prime pool and the search settings.
//!
//! Failure policy: the first error (violation under `abort`, invariant
//! failure, or a caught panic) stops the remaining work and is returned.
//! There is no timeout, retry, or partial result.

use rayon::prelude::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use tracing::{info, warn};

use crate::chunk::{process_chunk, Chunk, ChunkResult, SearchSettings};
use crate::error::VerifyError;
use crate::progress::Progress;
use crate::sieve::SmallPrimes;

pub struct Scheduler {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl Scheduler {
    /// Build a pool of `workers` threads. With `qos` on macOS, worker threads
    /// request the user-initiated QoS class (P-core scheduling).
    pub fn new(workers: usize, qos: bool) -> Result<Self, VerifyError> {
        if workers == 0 {
            return Err(VerifyError::config("worker count must be positive"));
        }
        Ok(Scheduler {
            pool: build_pool(workers, qos)?,
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Verify every chunk against the shared pool.
    pub fn run(
        &self,
        chunks: &[Chunk],
        primes: &SmallPrimes,
        settings: &SearchSettings,
        progress: Option<&Progress>,
    ) -> Result<Vec<ChunkResult>, VerifyError> {
        self.run_with(chunks, progress, |chunk| {
            process_chunk(chunk, primes, settings)
        })
    }

    /// Run an arbitrary per-chunk job with the same queueing, panic capture
    /// and progress reporting as [`Scheduler::run`].
    pub fn run_with<F>(
        &self,
        chunks: &[Chunk],
        progress: Option<&Progress>,
        job: F,
    ) -> Result<Vec<ChunkResult>, VerifyError>
    where
        F: Fn(&Chunk) -> Result<ChunkResult, VerifyError> + Sync,
    {
        let total = chunks.len();
        let (tx, rx) = mpsc::channel();

        let outcome = self.pool.install(|| {
            chunks
                .par_iter()
                .with_max_len(1)
                .try_for_each_with(tx, |tx, chunk| {
                    let result = guarded(chunk, &job)?;
                    if let Some(p) = progress {
                        p.record_chunk(&result);
                    }
                    info!(
                        chunk = chunk.index,
                        of = total,
                        start = chunk.start,
                        max_tries = result.max_tries,
                        max_tries_n = result.max_tries_n,
                        avg = format_args!("{:.2}", result.average_tries()),
                        pairs = result.pair_count(),
                        records = result.records.len(),
                        secs = format_args!("{:.3}", result.elapsed.as_secs_f64()),
                        "chunk verified"
                    );
                    tx.send(result).map_err(|_| VerifyError::WorkerFailure {
                        chunk: chunk.index,
                        reason: "result channel closed".to_string(),
                    })
                })
        });

        if let Err(e) = &outcome {
            warn!(error = %e, "verification aborted");
        }
        outcome?;

        // Every sender clone is gone once the parallel loop returns.
        Ok(rx.try_iter().collect())
    }
}

/// Run `job` for one chunk, turning a panic into a `WorkerFailure`.
fn guarded<F>(chunk: &Chunk, job: &F) -> Result<ChunkResult, VerifyError>
where
    F: Fn(&Chunk) -> Result<ChunkResult, VerifyError>,
{
    panic::catch_unwind(AssertUnwindSafe(|| job(chunk))).unwrap_or_else(|payload| {
        Err(VerifyError::WorkerFailure {
            chunk: chunk.index,
            reason: format!("panicked: {}", panic_message(payload.as_ref())),
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn pool_error(e: rayon::ThreadPoolBuildError) -> VerifyError {
    VerifyError::ThreadPool {
        reason: e.to_string(),
    }
}

/// Build the worker pool, optionally with macOS QoS on every thread.
fn build_pool(workers: usize, qos: bool) -> Result<rayon::ThreadPool, VerifyError> {
    let builder = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("goldbach-worker-{}", i));

    #[cfg(target_os = "macos")]
    if qos {
        let pool = builder
            .spawn_handler(|thread| {
                let mut b = std::thread::Builder::new();
                if let Some(name) = thread.name() {
                    b = b.name(name.to_owned());
                }
                b.spawn(move || {
                    // SAFETY: pthread_set_qos_class_self_np is a well-defined macOS API
                    // that sets the QoS class for the current thread. No memory safety concerns.
                    unsafe {
                        libc::pthread_set_qos_class_self_np(
                            libc::qos_class_t::QOS_CLASS_USER_INITIATED,
                            0,
                        );
                    }
                    thread.run();
                })?;
                Ok(())
            })
            .build()
            .map_err(pool_error)?;
        info!(workers, "worker threads configured with macOS QoS: user-initiated");
        return Ok(pool);
    }

    #[cfg(not(target_os = "macos"))]
    if qos {
        warn!("--qos flag is only effective on macOS, ignoring");
    }

    builder.build().map_err(pool_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::partition;
    use crate::config::ViolationPolicy;
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;

    fn settings() -> SearchSettings {
        SearchSettings {
            record_threshold: 20,
            violation_policy: ViolationPolicy::Abort,
            fallback_limit: 0,
        }
    }

    #[test]
    fn every_chunk_processed_exactly_once() {
        let primes = SmallPrimes::new(1000);
        let chunks = partition(4, 20_004, 500);
        let scheduler = Scheduler::new(4, false).unwrap();
        let results = scheduler.run(&chunks, &primes, &settings(), None).unwrap();
        assert_eq!(results.len(), chunks.len());
        let seen: HashSet<usize> = results.iter().map(|r| r.index()).collect();
        assert_eq!(seen.len(), chunks.len());
    }

    #[test]
    fn pool_never_exceeds_worker_count() {
        let scheduler = Scheduler::new(3, false).unwrap();
        let chunks = partition(0, 300, 10);
        let seen = std::sync::Mutex::new(HashSet::new());
        scheduler
            .run_with(&chunks, None, |chunk| {
                seen.lock().unwrap().insert(rayon::current_thread_index());
                let primes = SmallPrimes::new(50);
                process_chunk(chunk, &primes, &settings())
            })
            .unwrap();
        let seen = seen.into_inner().unwrap();
        assert!(seen.len() <= 3, "{:?}", seen);
        assert!(seen.iter().all(|i| i.is_some_and(|i| i < 3)));
    }

    #[test]
    fn progress_counts_completed_chunks() {
        let primes = SmallPrimes::new(100);
        let chunks = partition(4, 1004, 100);
        let progress = Progress::new();
        let scheduler = Scheduler::new(2, false).unwrap();
        scheduler
            .run(&chunks, &primes, &settings(), Some(&*progress))
            .unwrap();
        assert_eq!(progress.chunks_done.load(Ordering::Relaxed), 10);
        assert_eq!(progress.numbers_checked.load(Ordering::Relaxed), 500);
    }

    #[test]
    fn violation_stops_the_run() {
        let mut without_two = crate::sieve::primes_below(50);
        without_two.retain(|&p| p != 2);
        let primes = SmallPrimes::from_primes(50, without_two);
        let chunks = partition(4, 44, 10);
        let scheduler = Scheduler::new(2, false).unwrap();
        let err = scheduler.run(&chunks, &primes, &settings(), None).unwrap_err();
        assert_eq!(err, VerifyError::ConjectureViolation { chunk: 0, n: 4 });
    }

    #[test]
    fn panic_in_worker_becomes_worker_failure() {
        let chunks = partition(0, 100, 10);
        let scheduler = Scheduler::new(2, false).unwrap();
        let err = scheduler
            .run_with(&chunks, None, |chunk| {
                if chunk.index == 5 {
                    panic!("invariant broken in chunk five");
                }
                let primes = SmallPrimes::new(50);
                process_chunk(chunk, &primes, &settings())
            })
            .unwrap_err();
        match err {
            VerifyError::WorkerFailure { chunk, reason } => {
                assert_eq!(chunk, 5);
                assert!(reason.contains("invariant broken"), "{}", reason);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn zero_workers_rejected() {
        assert!(matches!(
            Scheduler::new(0, false),
            Err(VerifyError::Configuration { .. })
        ));
    }
}
