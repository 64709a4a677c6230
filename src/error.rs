//! # Error — Failure Taxonomy of a Verification Run
//!
//! Every way a run can end without a complete [`FinalReport`] maps to one
//! variant here. Configuration errors are raised before any chunk is
//! scheduled; the other variants are fatal to the whole run, because the
//! final digest is only meaningful over a complete, successful partition.
//!
//! [`FinalReport`]: crate::aggregate::FinalReport

/// Errors surfaced by the verification engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Invalid range, chunk size, worker count, or prime-pool ceiling.
    Configuration { reason: String },
    /// An even number for which no witness prime was found in the available
    /// prime pools. Falsifies the assumption the run is testing.
    ConjectureViolation { chunk: usize, n: u64 },
    /// Internal invariant violation or panic inside a single worker.
    WorkerFailure { chunk: usize, reason: String },
    /// The worker thread pool could not be created.
    ThreadPool { reason: String },
}

impl VerifyError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        VerifyError::Configuration {
            reason: reason.into(),
        }
    }

    /// The chunk index this failure is attributed to, if any.
    pub fn chunk(&self) -> Option<usize> {
        match self {
            VerifyError::ConjectureViolation { chunk, .. }
            | VerifyError::WorkerFailure { chunk, .. } => Some(*chunk),
            _ => None,
        }
    }
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::Configuration { reason } => {
                write!(f, "invalid configuration: {}", reason)
            }
            VerifyError::ConjectureViolation { chunk, n } => write!(
                f,
                "CONJECTURE VIOLATION: no witness prime found for n={} (chunk {})",
                n, chunk
            ),
            VerifyError::WorkerFailure { chunk, reason } => {
                write!(f, "worker failed on chunk {}: {}", chunk, reason)
            }
            VerifyError::ThreadPool { reason } => {
                write!(f, "could not build worker pool: {}", reason)
            }
        }
    }
}

impl std::error::Error for VerifyError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_message_names_number_and_chunk() {
        let e = VerifyError::ConjectureViolation { chunk: 3, n: 1_000_004 };
        let msg = e.to_string();
        assert!(msg.contains("CONJECTURE VIOLATION"));
        assert!(msg.contains("n=1000004"));
        assert!(msg.contains("chunk 3"));
    }

    #[test]
    fn chunk_attribution() {
        assert_eq!(VerifyError::config("x").chunk(), None);
        assert_eq!(
            VerifyError::WorkerFailure {
                chunk: 7,
                reason: "boom".into()
            }
            .chunk(),
            Some(7)
        );
        assert_eq!(
            VerifyError::ConjectureViolation { chunk: 2, n: 4 }.chunk(),
            Some(2)
        );
    }

    #[test]
    fn converts_into_anyhow() {
        let e: anyhow::Error = VerifyError::config("start must be below end").into();
        assert!(e.to_string().contains("start must be below end"));
    }
}
