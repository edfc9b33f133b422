//! Polar Loopback Application
//!
//! Encodes random payloads, passes them through an AWGN channel and decodes
//! them with both the SCL and the fixed-point decoder, reporting the block
//! error rate per Eb/N0 point.

mod config;
mod sim;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use config::LoopbackConfig;
use sim::{run_scenario, PointResult};

/// NR polar decoder loopback
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML or YAML)
    #[arg(short, long, default_value = "loopback.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Print results as JSON lines instead of log records
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting polar loopback");
    info!("Configuration file: {}", args.config);

    let config = LoopbackConfig::from_file(&args.config)?;
    let results = run_all(config).await?;

    for result in &results {
        if args.json {
            println!("{}", serde_json::to_string(result)?);
        } else {
            report(result);
        }
    }

    info!("Loopback complete");
    Ok(())
}

/// Run every scenario on its own blocking worker
async fn run_all(config: LoopbackConfig) -> Result<Vec<PointResult>> {
    let handles: Vec<_> = config
        .scenarios
        .into_iter()
        .map(|scenario| {
            info!(
                "Scenario {}: {:?} A={} AL={} L={} trials={}",
                scenario.name,
                scenario.message_type,
                scenario.payload_bits,
                scenario.aggregation_level,
                scenario.list_size,
                scenario.trials
            );
            tokio::task::spawn_blocking(move || {
                let results = run_scenario(&scenario);
                if let Err(e) = &results {
                    error!("Scenario {} failed: {}", scenario.name, e);
                }
                results
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.extend(handle.await??);
    }
    Ok(results)
}

fn report(result: &PointResult) {
    match result.scl_bler() {
        Some(scl_bler) => info!(
            "{}: Eb/N0 {:5.1} dB  SCL BLER {:.4}  fixed-point BLER {:.4}  ({} blocks)",
            result.scenario,
            result.ebn0_db,
            scl_bler,
            result.fixed_point_bler(),
            result.trials
        ),
        None => info!(
            "{}: Eb/N0 {:5.1} dB  fixed-point BLER {:.4}  ({} blocks)",
            result.scenario,
            result.ebn0_db,
            result.fixed_point_bler(),
            result.trials
        ),
    }
}
