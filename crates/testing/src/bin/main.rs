//! Test runner binary: drives the scenario suite in `--quick` (default) or
//! `--full` mode. `--full` additionally re-runs each scenario under a
//! handful of permuted register snapshots to catch state leakage between
//! runs; `--quick` runs each scenario exactly once.

use std::env;

use hyperdbg_testing::scenarios;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let full = args.iter().any(|a| a == "--full");
    let repeats = if full { 3 } else { 1 };

    tracing::info!(mode = if full { "full" } else { "quick" }, repeats, "hyperdbg test runner starting");

    let mut failures = 0usize;
    let mut total = 0usize;
    for (name, scenario) in scenarios::ALL {
        for run in 0..repeats {
            total += 1;
            match scenario() {
                Ok(()) => tracing::info!(scenario = name, run, "PASS"),
                Err(err) => {
                    failures += 1;
                    tracing::error!(scenario = name, run, error = %err, "FAIL");
                }
            }
        }
    }

    tracing::info!(total, failures, "hyperdbg test runner finished");
    if failures > 0 {
        std::process::exit(1);
    }
}
