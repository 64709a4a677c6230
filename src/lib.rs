//! Chunked verification of the Strong Goldbach conjecture.
//!
//! A range of even numbers is cut into fixed-size chunks. Each chunk is
//! segment-sieved and searched independently on a bounded worker pool, and the
//! per-chunk results are folded in chunk order into a [`FinalReport`] carrying
//! a Merkle digest that is identical for every worker count.
//!
//! ```no_run
//! use goldbach::{verify, VerifyConfig};
//!
//! let config = VerifyConfig {
//!     range_start: 4,
//!     range_end: 1_000_000,
//!     chunk_size: 100_000,
//!     small_prime_ceiling: 10_000,
//!     ..VerifyConfig::default()
//! };
//! let report = verify(&config)?;
//! println!("{}", report);
//! # Ok::<(), goldbach::VerifyError>(())
//! ```

pub mod aggregate;
pub mod chunk;
pub mod config;
pub mod engine;
pub mod error;
pub mod primality;
pub mod progress;
pub mod scheduler;
pub mod sieve;

pub use aggregate::{FinalReport, Totals};
pub use chunk::{Chunk, ChunkResult, RecordCandidate, WitnessPair};
pub use config::{VerifyConfig, ViolationPolicy};
pub use engine::{verify, Engine};
pub use error::VerifyError;
pub use sieve::{PrimeWindow, SmallPrimes};
