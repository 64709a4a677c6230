//! # Aggregate — Index-Ordered Fold of Chunk Results
//!
//! The single merge point of a run. Results arrive in completion order; they
//! are sorted by chunk index, checked to form the complete partition, and
//! folded into [`Totals`]. Nothing in here depends on how many workers ran or
//! in which order chunks finished.
//!
//! ## Final Digest
//!
//! A binary Merkle tree over the per-chunk SHA-256 hashes in chunk order:
//!
//! - leaf  = SHA-256(0x00 ‖ chunk_hash)
//! - node  = SHA-256(0x01 ‖ left ‖ right)
//! - a trailing odd node is promoted to the next level unchanged
//!
//! The root is the final digest. The tags keep a leaf from ever colliding with
//! an inner node. Two runs with the same range, chunk size, pool ceiling and
//! fallback budget reproduce the same root.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::chunk::{to_hex, ChunkResult, RecordCandidate, WitnessPair};
use crate::config::VerifyConfig;
use crate::error::VerifyError;

const LEAF_TAG: u8 = 0x00;
const NODE_TAG: u8 = 0x01;

/// A number with no witness, attributed to its chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub chunk: usize,
    pub n: u64,
}

/// Statistics and digest folded from every chunk of a run.
#[derive(Debug, Clone, Serialize)]
pub struct Totals {
    pub chunks: usize,
    pub total_numbers: u64,
    pub total_tries: u64,
    pub max_tries: u64,
    pub max_tries_n: u64,
    pub max_witness: Option<WitnessPair>,
    pub fallback_hits: u64,
    /// Every record candidate, ascending n.
    pub records: Vec<RecordCandidate>,
    pub violations: Vec<Violation>,
    /// Sum of per-chunk processing times.
    #[serde(serialize_with = "serialize_secs")]
    pub processing_time: Duration,
    #[serde(serialize_with = "serialize_digest")]
    pub digest: [u8; 32],
}

impl Totals {
    pub fn average_tries(&self) -> f64 {
        if self.total_numbers == 0 {
            0.0
        } else {
            self.total_tries as f64 / self.total_numbers as f64
        }
    }

    /// The record candidate with the largest n.
    pub fn last_record(&self) -> Option<RecordCandidate> {
        self.records.last().copied()
    }

    /// The record candidate with the largest witness (smallest n on ties).
    pub fn max_record(&self) -> Option<RecordCandidate> {
        self.records
            .iter()
            .copied()
            .fold(None, |best: Option<RecordCandidate>, r| match best {
                Some(b) if b.min_p >= r.min_p => Some(b),
                _ => Some(r),
            })
    }

    pub fn digest_hex(&self) -> String {
        to_hex(&self.digest)
    }
}

/// Fold results from every chunk of a `expected_chunks`-chunk partition.
///
/// Fails with `WorkerFailure` when a chunk is missing or reported twice.
pub fn aggregate(
    mut results: Vec<ChunkResult>,
    expected_chunks: usize,
) -> Result<Totals, VerifyError> {
    results.sort_by_key(|r| r.index());
    for (position, r) in results.iter().enumerate() {
        if r.index() != position {
            let (chunk, reason) = if r.index() < position {
                (r.index(), "result reported twice")
            } else {
                (position, "no result produced")
            };
            return Err(VerifyError::WorkerFailure {
                chunk,
                reason: reason.to_string(),
            });
        }
    }
    if results.len() != expected_chunks {
        let chunk = results.len().min(expected_chunks);
        return Err(VerifyError::WorkerFailure {
            chunk,
            reason: format!(
                "expected {} chunk results, got {}",
                expected_chunks,
                results.len()
            ),
        });
    }

    let mut totals = Totals {
        chunks: results.len(),
        total_numbers: 0,
        total_tries: 0,
        max_tries: 0,
        max_tries_n: 0,
        max_witness: None,
        fallback_hits: 0,
        records: Vec::new(),
        violations: Vec::new(),
        processing_time: Duration::ZERO,
        digest: [0; 32],
    };
    let mut seen_numbers = false;

    for r in &results {
        totals.total_numbers += r.total_numbers;
        totals.total_tries += r.total_tries;
        totals.fallback_hits += r.fallback_hits;
        totals.processing_time += r.elapsed;

        // Chunks ascend in n, so strict comparisons keep the smallest n on ties.
        if r.total_numbers > 0 && (!seen_numbers || r.max_tries > totals.max_tries) {
            totals.max_tries = r.max_tries;
            totals.max_tries_n = r.max_tries_n;
            seen_numbers = true;
        }
        if let Some(w) = r.max_witness {
            if totals.max_witness.is_none_or(|best| w.p > best.p) {
                totals.max_witness = Some(w);
            }
        }

        totals.records.extend_from_slice(&r.records);
        totals
            .violations
            .extend(r.violations.iter().map(|&n| Violation { chunk: r.index(), n }));
    }

    let leaves: Vec<[u8; 32]> = results.iter().map(|r| r.hash).collect();
    totals.digest = merkle_root(&leaves);
    Ok(totals)
}

/// Merkle root of ordered 32-byte leaves. An empty list hashes to
/// SHA-256 of the empty string.
pub fn merkle_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"").into();
    }
    let mut level: Vec<[u8; 32]> = leaves.iter().map(|h| tagged(LEAF_TAG, &[h])).collect();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => tagged(NODE_TAG, &[left, right]),
                [odd] => *odd,
                _ => unreachable!("chunks(2) yields one or two items"),
            })
            .collect();
    }
    level[0]
}

fn tagged(tag: u8, parts: &[&[u8; 32]]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update([tag]);
    for part in parts {
        h.update(part.as_slice());
    }
    h.finalize().into()
}

fn serialize_digest<S: Serializer>(digest: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&to_hex(digest))
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// The outcome of a complete run.
#[derive(Debug, Clone, Serialize)]
pub struct FinalReport {
    pub config: VerifyConfig,
    pub workers: usize,
    pub small_primes: usize,
    pub started_at: DateTime<Utc>,
    #[serde(serialize_with = "serialize_secs")]
    pub wall_time: Duration,
    #[serde(flatten)]
    pub totals: Totals,
}

impl FinalReport {
    /// True when every even number in the range had a witness.
    pub fn is_verified(&self) -> bool {
        self.totals.violations.is_empty()
    }

    pub fn digest_hex(&self) -> String {
        self.totals.digest_hex()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl std::fmt::Display for FinalReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = &self.totals;
        writeln!(f, "Results:")?;
        writeln!(
            f,
            "Range: [{}, {}) in {} chunks of {} ({} workers, {} small primes below {})",
            self.config.range_start,
            self.config.range_end,
            t.chunks,
            self.config.chunk_size,
            self.workers,
            self.small_primes,
            self.config.small_prime_ceiling
        )?;
        writeln!(f, "Total even numbers checked: {}", t.total_numbers)?;
        writeln!(f, "Total tries: {}", t.total_tries)?;
        writeln!(f, "Average tries per number: {:.2}", t.average_tries())?;
        writeln!(f, "Maximum tries: {} (for n={})", t.max_tries, t.max_tries_n)?;
        if let Some(w) = t.max_witness {
            writeln!(f, "Largest witness prime: {} (for n={})", w.p, w.n)?;
        }
        write!(
            f,
            "Record candidates (witness > {}): {}",
            self.config.record_threshold,
            t.records.len()
        )?;
        match (t.max_record(), t.last_record()) {
            (Some(max), Some(last)) => writeln!(
                f,
                ", largest witness {} (n={}), last at n={} (p={})",
                max.min_p, max.n, last.n, last.min_p
            )?,
            _ => writeln!(f)?,
        }
        if t.fallback_hits > 0 {
            writeln!(f, "Witnesses found by fallback search: {}", t.fallback_hits)?;
        }
        if t.violations.is_empty() {
            writeln!(f, "Conjecture violations: none")?;
        } else {
            writeln!(f, "CONJECTURE VIOLATIONS: {}", t.violations.len())?;
            for v in &t.violations {
                writeln!(f, "  n={} (chunk {})", v.n, v.chunk)?;
            }
        }
        writeln!(f, "Total processing time: {:.4}s", t.processing_time.as_secs_f64())?;
        writeln!(f, "Total elapsed time: {:.4}s", self.wall_time.as_secs_f64())?;
        write!(f, "Verification hash: {}", t.digest_hex())
    }
}
