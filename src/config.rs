//! # Config — Verification Run Parameters
//!
//! A run is fully described by [`VerifyConfig`]. Values come from three
//! layers, later layers winning: built-in defaults, an optional TOML file,
//! and explicit command-line flags (or their `GOLDBACH_*` env fallbacks).
//!
//! ```toml
//! range_start = 1_000_000_000
//! range_end = 2_000_000_000
//! chunk_size = 10_000_000
//! small_prime_ceiling = 1_000_000
//! record_threshold = 8419
//! workers = 8
//! violation_policy = "abort"
//! fallback_limit = 0
//! ```
//!
//! `validate` runs before any chunk is scheduled; every rejection is a
//! [`VerifyError::Configuration`].

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::VerifyError;

/// Window arithmetic (`n - p`, `j += i`) stays far from u64 overflow below this.
pub const MAX_RANGE_END: u64 = 1 << 62;

/// Presence table for the pool is one bit per integer below the ceiling.
pub const MAX_SMALL_PRIME_CEILING: u64 = 1 << 32;

/// Largest chunk a single worker will sieve in one window.
pub const MAX_CHUNK_SIZE: u64 = 1 << 33;

/// What the engine does when an even number has no witness in the pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationPolicy {
    /// Fail the run at the first violating number.
    #[default]
    Abort,
    /// Finish the run and list every violating number in the report.
    Report,
}

impl std::fmt::Display for ViolationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationPolicy::Abort => write!(f, "abort"),
            ViolationPolicy::Report => write!(f, "report"),
        }
    }
}

impl std::str::FromStr for ViolationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(ViolationPolicy::Abort),
            "report" => Ok(ViolationPolicy::Report),
            other => Err(format!(
                "unknown violation policy '{}' (expected 'abort' or 'report')",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerifyConfig {
    /// Inclusive lower bound of the range.
    pub range_start: u64,
    /// Exclusive upper bound of the range.
    pub range_end: u64,
    /// Integers per chunk (the final chunk may be shorter).
    pub chunk_size: u64,
    /// Exclusive ceiling of the small-prime pool. Also the width of the
    /// buffer sieved below every chunk.
    pub small_prime_ceiling: u64,
    /// Witness primes strictly above this are recorded as record candidates.
    pub record_threshold: u64,
    /// Worker threads; `None` means one per physical core.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    pub violation_policy: ViolationPolicy,
    /// Extra candidates tried past the pool with Miller–Rabin before a number
    /// is declared a violation. 0 disables the fallback.
    pub fallback_limit: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        VerifyConfig {
            range_start: 1_000_000_000,
            range_end: 2_000_000_000,
            chunk_size: 10_000_000,
            small_prime_ceiling: 1_000_000,
            record_threshold: 8419,
            workers: None,
            violation_policy: ViolationPolicy::Abort,
            fallback_limit: 0,
        }
    }
}

impl VerifyConfig {
    /// Parse a configuration from a TOML string. Missing keys take defaults.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Parse a configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configurations the engine cannot run. Called before scheduling.
    pub fn validate(&self) -> Result<(), VerifyError> {
        if self.range_start >= self.range_end {
            return Err(VerifyError::config(format!(
                "range start {} must be below range end {}",
                self.range_start, self.range_end
            )));
        }
        if self.range_end > MAX_RANGE_END {
            return Err(VerifyError::config(format!(
                "range end {} exceeds the supported maximum {}",
                self.range_end, MAX_RANGE_END
            )));
        }
        if self.chunk_size == 0 {
            return Err(VerifyError::config("chunk size must be positive"));
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(VerifyError::config(format!(
                "chunk size {} exceeds the supported maximum {}",
                self.chunk_size, MAX_CHUNK_SIZE
            )));
        }
        if self.small_prime_ceiling < 3 {
            return Err(VerifyError::config(
                "small-prime ceiling must be at least 3 so the pool contains 2",
            ));
        }
        if self.small_prime_ceiling > MAX_SMALL_PRIME_CEILING {
            return Err(VerifyError::config(format!(
                "small-prime ceiling {} exceeds the supported maximum {}",
                self.small_prime_ceiling, MAX_SMALL_PRIME_CEILING
            )));
        }
        if self.workers == Some(0) {
            return Err(VerifyError::config("worker count must be positive"));
        }
        Ok(())
    }

    /// Effective worker count.
    pub fn resolved_workers(&self) -> usize {
        self.workers.unwrap_or_else(default_workers)
    }

    /// Number of chunks the range partitions into.
    pub fn chunk_count(&self) -> u64 {
        (self.range_end - self.range_start).div_ceil(self.chunk_size)
    }
}

/// One worker per physical core, falling back to rayon's logical count when
/// the platform does not report physical cores.
pub fn default_workers() -> usize {
    sysinfo::System::physical_core_count()
        .filter(|&n| n > 0)
        .unwrap_or_else(rayon::current_num_threads)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> VerifyConfig {
        VerifyConfig {
            range_start: 4,
            range_end: 100,
            chunk_size: 20,
            small_prime_ceiling: 50,
            record_threshold: 10,
            workers: Some(2),
            ..VerifyConfig::default()
        }
    }

    #[test]
    fn defaults_are_valid() {
        let c = VerifyConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.chunk_count(), 100);
        assert_eq!(c.record_threshold, 8419);
    }

    #[test]
    fn rejects_empty_or_inverted_range() {
        let mut c = small();
        c.range_end = c.range_start;
        assert!(matches!(c.validate(), Err(VerifyError::Configuration { .. })));
        c.range_end = 1;
        assert!(matches!(c.validate(), Err(VerifyError::Configuration { .. })));
    }

    #[test]
    fn rejects_zero_chunk_size_and_workers() {
        let mut c = small();
        c.chunk_size = 0;
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("chunk size"));

        let mut c = small();
        c.workers = Some(0);
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("worker count"));
    }

    #[test]
    fn rejects_pool_without_two() {
        let mut c = small();
        c.small_prime_ceiling = 2;
        assert!(c.validate().is_err());
        c.small_prime_ceiling = 3;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn rejects_oversized_values() {
        let mut c = small();
        c.range_end = MAX_RANGE_END + 1;
        assert!(c.validate().is_err());

        let mut c = small();
        c.small_prime_ceiling = MAX_SMALL_PRIME_CEILING + 1;
        assert!(c.validate().is_err());
    }

    #[test]
    fn chunk_count_rounds_up() {
        let mut c = small();
        assert_eq!(c.chunk_count(), 5); // 96 / 20
        c.range_end = 104;
        assert_eq!(c.chunk_count(), 5); // exactly 100
        c.range_end = 105;
        assert_eq!(c.chunk_count(), 6);
    }

    #[test]
    fn toml_partial_file_keeps_defaults() {
        let c = VerifyConfig::from_toml_str(
            r#"
            range_start = 4
            range_end = 1_000
            violation_policy = "report"
            "#,
        )
        .unwrap();
        assert_eq!(c.range_start, 4);
        assert_eq!(c.range_end, 1000);
        assert_eq!(c.violation_policy, ViolationPolicy::Report);
        assert_eq!(c.chunk_size, VerifyConfig::default().chunk_size);
        assert_eq!(c.workers, None);
    }

    #[test]
    fn toml_rejects_unknown_keys() {
        assert!(VerifyConfig::from_toml_str("chunk = 10").is_err());
    }

    #[test]
    fn toml_roundtrip() {
        let c = small();
        let text = c.to_toml().unwrap();
        assert!(text.contains("small_prime_ceiling = 50"));
        assert_eq!(VerifyConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn violation_policy_parses_case_insensitively() {
        assert_eq!("Report".parse::<ViolationPolicy>(), Ok(ViolationPolicy::Report));
        assert_eq!("abort".parse::<ViolationPolicy>(), Ok(ViolationPolicy::Abort));
        assert!("ignore".parse::<ViolationPolicy>().is_err());
    }

    #[test]
    fn default_workers_is_positive() {
        assert!(default_workers() >= 1);
    }
}
