//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim. Resolves the
//! layered configuration and runs each subcommand.

use anyhow::{bail, Context, Result};
use goldbach::config::{MAX_CHUNK_SIZE, MAX_RANGE_END};
use goldbach::{progress::Progress, Engine, PrimeWindow, VerifyConfig};
use std::time::Duration;
use tracing::{error, info};

use super::{Cli, RunArgs};

/// Defaults, then the `--config` file, then explicit flags.
pub fn effective_config(cli: &Cli, args: &RunArgs) -> Result<VerifyConfig> {
    let mut config = match &cli.config {
        Some(path) => VerifyConfig::from_toml_file(path)
            .with_context(|| format!("reading config file {}", path.display()))?,
        None => VerifyConfig::default(),
    };
    apply_overrides(&mut config, args);
    Ok(config)
}

fn apply_overrides(config: &mut VerifyConfig, args: &RunArgs) {
    if let Some(v) = args.start {
        config.range_start = v;
    }
    if let Some(v) = args.end {
        config.range_end = v;
    }
    if let Some(v) = args.chunk_size {
        config.chunk_size = v;
    }
    if let Some(v) = args.small_prime_ceiling {
        config.small_prime_ceiling = v;
    }
    if let Some(v) = args.record_threshold {
        config.record_threshold = v;
    }
    if args.workers.is_some() {
        config.workers = args.workers;
    }
    if let Some(v) = args.violation_policy {
        config.violation_policy = v;
    }
    if let Some(v) = args.fallback_limit {
        config.fallback_limit = v;
    }
}

// ── Verify ──────────────────────────────────────────────────────

/// Run a verification, print the report, and fail on any violation.
pub fn run_verify(cli: &Cli, args: &RunArgs, json: bool) -> Result<()> {
    let config = effective_config(cli, args)?;
    let engine = Engine::with_qos(config, cli.qos)?;

    let progress = Progress::new();
    let reporter = (cli.report_interval > 0)
        .then(|| progress.start_reporter(Duration::from_secs(cli.report_interval)));

    let outcome = engine.run(Some(&*progress));

    progress.stop();
    if let Some(handle) = reporter {
        let _ = handle.join();
    }

    let report = outcome?;
    if json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report);
    }

    if !report.is_verified() {
        error!(
            violations = report.totals.violations.len(),
            "conjecture violations found"
        );
        bail!(
            "CONJECTURE VIOLATION: {} even number(s) without a witness prime",
            report.totals.violations.len()
        );
    }
    info!("verification complete");
    Ok(())
}

// ── Sieve ───────────────────────────────────────────────────────

pub fn run_sieve(lo: u64, hi: u64) -> Result<()> {
    if lo > hi {
        bail!("empty window: lo {} is above hi {}", lo, hi);
    }
    if hi > MAX_RANGE_END {
        bail!("window end {} exceeds the supported maximum {}", hi, MAX_RANGE_END);
    }
    if hi - lo >= MAX_CHUNK_SIZE {
        bail!(
            "window width {} exceeds the supported maximum {}",
            hi - lo + 1,
            MAX_CHUNK_SIZE
        );
    }
    let window = PrimeWindow::sieve(lo, hi, None);
    for p in window.iter_primes() {
        println!("{}", p);
    }
    info!(lo, hi, count = window.count(), "window sieved");
    Ok(())
}

// ── Config ──────────────────────────────────────────────────────

pub fn run_config(cli: &Cli, args: &RunArgs) -> Result<()> {
    let config = effective_config(cli, args)?;
    config.validate()?;
    print!("{}", config.to_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use goldbach::ViolationPolicy;
    use std::io::Write;

    #[test]
    fn flags_override_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "range_start = 100\nrange_end = 200\nchunk_size = 7").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let cli = Cli::parse_from([
            "goldbach",
            "--config",
            path.as_str(),
            "verify",
            "--end",
            "500",
            "--violation-policy",
            "report",
        ]);
        let crate::Commands::Verify { run, .. } = &cli.command else {
            panic!("expected verify");
        };
        let config = effective_config(&cli, run).unwrap();
        assert_eq!(config.range_start, 100);
        assert_eq!(config.range_end, 500);
        assert_eq!(config.chunk_size, 7);
        assert_eq!(config.violation_policy, ViolationPolicy::Report);
        assert_eq!(config.small_prime_ceiling, VerifyConfig::default().small_prime_ceiling);
    }

    #[test]
    fn sieve_rejects_unsupported_windows() {
        let err = run_sieve(u64::MAX - 1, u64::MAX).unwrap_err();
        assert!(err.to_string().contains("window end"), "{}", err);
        let err = run_sieve(0, MAX_CHUNK_SIZE).unwrap_err();
        assert!(err.to_string().contains("window width"), "{}", err);
        assert!(run_sieve(90, 110).is_ok());
    }

    #[test]
    fn no_flags_means_defaults() {
        let config = effective_config(
            &Cli::parse_from(["goldbach", "config"]),
            &RunArgs::default(),
        )
        .unwrap();
        assert_eq!(config, VerifyConfig::default());
    }
}
