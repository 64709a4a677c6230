//! # Main — CLI Entry Point
//!
//! Parses the command line, initializes logging, and routes subcommands to
//! the runners in `cli.rs`.
//!
//! ## Subcommands
//!
//! - `verify`: run the chunked verification and print the final report.
//! - `sieve`: print the primes of an inclusive window (diagnostic).
//! - `config`: print the effective configuration as TOML.
//!
//! ## Global Options
//!
//! - `--config` / `GOLDBACH_CONFIG`: TOML file layered under explicit flags.
//! - `--qos`: macOS QoS P-core scheduling via `pthread_set_qos_class_self_np`.
//! - `--report-interval`: seconds between progress log lines (0 disables).
//!
//! `LOG_FORMAT=json` switches logs to JSON; `RUST_LOG` filters them.

mod cli;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use goldbach::ViolationPolicy;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(
    name = "goldbach",
    version,
    about = "Verify the strong Goldbach conjecture over a range, chunk by chunk"
)]
struct Cli {
    /// TOML configuration file; explicit flags override its values
    #[arg(long, global = true, env = "GOLDBACH_CONFIG")]
    config: Option<PathBuf>,

    /// Set macOS QoS class to user-initiated for worker threads (P-core scheduling on Apple Silicon)
    #[arg(long, global = true)]
    qos: bool,

    /// Seconds between progress reports while verifying (0 disables them)
    #[arg(long, global = true, default_value_t = 30)]
    report_interval: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify every even number in [start, end)
    Verify {
        #[command(flatten)]
        run: RunArgs,
        /// Print the final report as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Print the primes in the inclusive window [lo, hi]
    Sieve {
        /// Window lower bound
        #[arg(long)]
        lo: u64,
        /// Window upper bound (inclusive)
        #[arg(long)]
        hi: u64,
    },
    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        run: RunArgs,
    },
}

/// Run parameters. Unset flags fall through to the config file, then defaults.
#[derive(Args, Default)]
struct RunArgs {
    /// Start of range (inclusive)
    #[arg(long, env = "GOLDBACH_START")]
    start: Option<u64>,
    /// End of range (exclusive)
    #[arg(long, env = "GOLDBACH_END")]
    end: Option<u64>,
    /// Integers per chunk
    #[arg(long, env = "GOLDBACH_CHUNK_SIZE")]
    chunk_size: Option<u64>,
    /// Exclusive ceiling of the small-prime pool
    #[arg(long, env = "GOLDBACH_SMALL_PRIME_CEILING")]
    small_prime_ceiling: Option<u64>,
    /// Witness primes above this are reported as record candidates
    #[arg(long, env = "GOLDBACH_RECORD_THRESHOLD")]
    record_threshold: Option<u64>,
    /// Worker threads (defaults to physical cores)
    #[arg(long, env = "GOLDBACH_WORKERS")]
    workers: Option<usize>,
    /// What to do with a number that has no witness: abort | report
    #[arg(long, env = "GOLDBACH_VIOLATION_POLICY")]
    violation_policy: Option<ViolationPolicy>,
    /// Odd candidates to try past the pool with Miller-Rabin (0 disables)
    #[arg(long, env = "GOLDBACH_FALLBACK_LIMIT")]
    fallback_limit: Option<u64>,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize structured logging: LOG_FORMAT=json for log shippers, human-readable otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::Verify { run, json } => cli::run_verify(&cli, run, *json),
        Commands::Sieve { lo, hi } => cli::run_sieve(*lo, *hi),
        Commands::Config { run } => cli::run_config(&cli, run),
    }
}
