//! # Chunk — Partitioning and the Per-Chunk Complement Search
//!
//! The range `[range_start, range_end)` is cut once into index-carrying
//! [`Chunk`] descriptors. Each chunk is verified independently by
//! [`process_chunk`], which owns everything it allocates: its segmented
//! window, its hasher, and its statistics.
//!
//! ## Search Order
//!
//! For every even n > 2 in the chunk, candidates p are taken from the
//! small-prime pool in ascending order while `p <= n / 2`. Each candidate is
//! one try. The first p with `n - p` prime is the witness; because the order
//! is fixed, the witness is a pure function of n and the pool.
//!
//! ## Window Layout
//!
//! The window sieved for a chunk `[start, end]` is `[start - C, end]`
//! (clamped at 0), where C is the pool ceiling. Every pool prime is below C,
//! so every complement `n - p` is either below C (answered by the pool's
//! presence table) or inside the window.
//!
//! ## Content Hash
//!
//! SHA-256 over `n.to_be_bytes() ‖ p.to_be_bytes()` for every witness pair in
//! ascending n. Violating numbers contribute nothing to the hash.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::{VerifyConfig, ViolationPolicy};
use crate::error::VerifyError;
use crate::primality::is_prime_u64;
use crate::sieve::{PrimeWindow, SmallPrimes};

/// A contiguous, inclusive slice `[start, end]` of the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl Chunk {
    /// Number of integers covered.
    pub fn width(&self) -> u64 {
        self.end - self.start + 1
    }

    /// First even number > 2 at or after `start`.
    pub fn first_even(&self) -> u64 {
        let n = self.start + (self.start & 1);
        n.max(4)
    }

    /// Even numbers > 2 this chunk verifies.
    pub fn even_count(&self) -> u64 {
        let first = self.first_even();
        if first > self.end {
            0
        } else {
            (self.end - first) / 2 + 1
        }
    }
}

/// Cut `[range_start, range_end)` into chunks of `chunk_size` integers.
///
/// Chunks are disjoint, ascending, indexed from 0, and cover the range
/// exactly; only the last one may be shorter. Returns no chunks for an empty
/// range or a zero chunk size.
pub fn partition(range_start: u64, range_end: u64, chunk_size: u64) -> Vec<Chunk> {
    if range_start >= range_end || chunk_size == 0 {
        return Vec::new();
    }
    let count = (range_end - range_start).div_ceil(chunk_size) as usize;
    let mut chunks = Vec::with_capacity(count);
    let mut start = range_start;
    while start < range_end {
        let end = start.saturating_add(chunk_size).min(range_end) - 1;
        chunks.push(Chunk {
            index: chunks.len(),
            start,
            end,
        });
        start = end + 1;
    }
    chunks
}

/// `(n, p)` with p the first prime under ascending iteration such that
/// `n - p` is prime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WitnessPair {
    pub n: u64,
    pub p: u64,
}

/// A witness pair whose prime exceeds the record threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordCandidate {
    pub n: u64,
    pub min_p: u64,
}

/// Read-only per-run search settings shared by every chunk.
#[derive(Debug, Clone, Copy)]
pub struct SearchSettings {
    pub record_threshold: u64,
    pub violation_policy: ViolationPolicy,
    pub fallback_limit: u64,
}

impl From<&VerifyConfig> for SearchSettings {
    fn from(config: &VerifyConfig) -> Self {
        SearchSettings {
            record_threshold: config.record_threshold,
            violation_policy: config.violation_policy,
            fallback_limit: config.fallback_limit,
        }
    }
}

/// Everything one chunk contributes to the final report.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkResult {
    pub chunk: Chunk,
    pub total_numbers: u64,
    pub total_tries: u64,
    pub max_tries: u64,
    pub max_tries_n: u64,
    /// Pair with the largest witness prime (smallest n on ties).
    pub max_witness: Option<WitnessPair>,
    /// Witnesses found only by the Miller–Rabin fallback.
    pub fallback_hits: u64,
    pub records: Vec<RecordCandidate>,
    /// Numbers with no witness (only populated under `ViolationPolicy::Report`).
    pub violations: Vec<u64>,
    pub elapsed: Duration,
    #[serde(serialize_with = "serialize_hex")]
    pub hash: [u8; 32],
}

impl ChunkResult {
    fn empty(chunk: Chunk) -> Self {
        ChunkResult {
            chunk,
            total_numbers: 0,
            total_tries: 0,
            max_tries: 0,
            max_tries_n: 0,
            max_witness: None,
            fallback_hits: 0,
            records: Vec::new(),
            violations: Vec::new(),
            elapsed: Duration::ZERO,
            hash: [0; 32],
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.chunk.index
    }

    pub fn average_tries(&self) -> f64 {
        if self.total_numbers == 0 {
            0.0
        } else {
            self.total_tries as f64 / self.total_numbers as f64
        }
    }

    /// Number of witness pairs hashed.
    pub fn pair_count(&self) -> u64 {
        self.total_numbers - self.violations.len() as u64
    }
}

/// Streaming hasher over the fixed 16-byte pair serialization.
pub struct PairHasher {
    inner: Sha256,
}

impl PairHasher {
    pub fn new() -> Self {
        PairHasher {
            inner: Sha256::new(),
        }
    }

    #[inline]
    pub fn push(&mut self, pair: WitnessPair) {
        self.inner.update(pair.n.to_be_bytes());
        self.inner.update(pair.p.to_be_bytes());
    }

    pub fn finish(self) -> [u8; 32] {
        self.inner.finalize().into()
    }
}

impl Default for PairHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase hex of a digest.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn serialize_hex<S: serde::Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&to_hex(bytes))
}

/// Verify one chunk.
pub fn process_chunk(
    chunk: &Chunk,
    pool: &SmallPrimes,
    settings: &SearchSettings,
) -> Result<ChunkResult, VerifyError> {
    process_chunk_with(chunk, pool, settings, |_| {})
}

/// Verify one chunk, handing every witness pair to `on_pair` in ascending n.
pub fn process_chunk_with<F>(
    chunk: &Chunk,
    pool: &SmallPrimes,
    settings: &SearchSettings,
    mut on_pair: F,
) -> Result<ChunkResult, VerifyError>
where
    F: FnMut(WitnessPair),
{
    let started = Instant::now();
    let lo = chunk.start.saturating_sub(pool.ceiling());
    debug!(
        chunk = chunk.index,
        start = chunk.start,
        end = chunk.end,
        window_lo = lo,
        "sieving chunk window"
    );
    let window = PrimeWindow::sieve(lo, chunk.end, Some(pool));

    let mut result = ChunkResult::empty(*chunk);
    let mut hasher = PairHasher::new();

    let mut n = chunk.first_even();
    while n <= chunk.end {
        result.total_numbers += 1;
        let search = find_witness(n, pool, &window, settings.fallback_limit).map_err(|reason| {
            VerifyError::WorkerFailure {
                chunk: chunk.index,
                reason,
            }
        })?;

        result.total_tries += search.tries;
        if search.tries > result.max_tries || result.total_numbers == 1 {
            result.max_tries = search.tries;
            result.max_tries_n = n;
        }

        match search.witness {
            Some(p) => {
                let pair = WitnessPair { n, p };
                hasher.push(pair);
                on_pair(pair);
                if search.via_fallback {
                    result.fallback_hits += 1;
                }
                if p > settings.record_threshold {
                    result.records.push(RecordCandidate { n, min_p: p });
                }
                if result.max_witness.is_none_or(|w| p > w.p) {
                    result.max_witness = Some(pair);
                }
            }
            None => {
                warn!(chunk = chunk.index, n, tries = search.tries, "no witness prime found");
                match settings.violation_policy {
                    ViolationPolicy::Abort => {
                        return Err(VerifyError::ConjectureViolation {
                            chunk: chunk.index,
                            n,
                        })
                    }
                    ViolationPolicy::Report => result.violations.push(n),
                }
            }
        }
        n += 2;
    }

    result.hash = hasher.finish();
    result.elapsed = started.elapsed();
    Ok(result)
}

struct WitnessSearch {
    witness: Option<u64>,
    tries: u64,
    via_fallback: bool,
}

/// Primality of a complement from the pool table or the chunk's window.
#[inline]
fn resolve(x: u64, pool: &SmallPrimes, window: &PrimeWindow) -> Option<bool> {
    if x < pool.ceiling() {
        Some(pool.contains(x))
    } else {
        window.lookup(x)
    }
}

fn find_witness(
    n: u64,
    pool: &SmallPrimes,
    window: &PrimeWindow,
    fallback_limit: u64,
) -> Result<WitnessSearch, String> {
    let half = n / 2;
    let mut tries = 0;

    for &p in pool.primes() {
        if p > half {
            break;
        }
        tries += 1;
        let complement = n - p;
        let is_prime = resolve(complement, pool, window).ok_or_else(|| {
            format!(
                "complement {} of n={} is outside the sieve window [{}, {}]",
                complement,
                n,
                window.lo(),
                window.hi()
            )
        })?;
        if is_prime {
            return Ok(WitnessSearch {
                witness: Some(p),
                tries,
                via_fallback: false,
            });
        }
    }

    // Odd candidates past the pool, bounded by the configured budget.
    let mut budget = fallback_limit;
    let mut p = pool.ceiling() | 1;
    while budget > 0 && p <= half {
        budget -= 1;
        tries += 1;
        let complement = n - p;
        if is_prime_u64(p)
            && resolve(complement, pool, window).unwrap_or_else(|| is_prime_u64(complement))
        {
            return Ok(WitnessSearch {
                witness: Some(p),
                tries,
                via_fallback: true,
            });
        }
        p += 2;
    }

    Ok(WitnessSearch {
        witness: None,
        tries,
        via_fallback: false,
    })
}
