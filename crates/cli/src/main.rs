//! rvoip-phone-sim
//!
//! Runs a softphone scenario against the call-control coordinator. The
//! telephony core and the audio platform are simulated in-process, UI events
//! are printed as JSON lines and the final snapshot is printed when the
//! scenario ends.

use anyhow::{Context, Result};
use clap::Parser;
use rvoip_call_control::config::CoordinatorConfig;
use rvoip_infra_common::{LoggingConfig, log_welcome, parse_log_level, setup_logging};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

mod loopback;
mod scenario;

use scenario::{RunOptions, Scenario};

/// Drive the call-control coordinator from a JSON scenario
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario file to run
    #[arg(short, long)]
    scenario: PathBuf,

    /// Coordinator configuration (JSON), replaces the scenario's own
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Extra log directive, e.g. `rvoip_call_control::audio=debug`
    #[arg(long = "log")]
    log_directives: Vec<String>,

    /// Pause between steps in milliseconds
    #[arg(long, default_value = "50")]
    step_delay_ms: u64,

    /// Do not print UI events and snapshots
    #[arg(short, long)]
    quiet: bool,
}

fn load_config(path: &Path) -> Result<CoordinatorConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: CoordinatorConfig = serde_json::from_str(&text)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut logging = LoggingConfig::new(parse_log_level(&args.log_level)?, "rvoip-phone-sim");
    if args.json_logs {
        logging = logging.with_json();
    }
    for directive in &args.log_directives {
        logging = logging.with_directive(directive.as_str());
    }
    setup_logging(logging)?;
    log_welcome("rvoip-phone-sim", env!("CARGO_PKG_VERSION"));

    let mut scenario = Scenario::load(&args.scenario)?;
    if let Some(path) = &args.config {
        scenario.config = load_config(path)?;
    }

    let options = RunOptions {
        step_delay: Duration::from_millis(args.step_delay_ms),
        print: !args.quiet,
    };
    let report = scenario::run(scenario, options).await?;

    info!(
        steps = report.steps,
        rejected = report.rejected,
        "Scenario finished"
    );
    if !args.quiet {
        println!("{}", serde_json::to_string_pretty(&report.snapshot)?);
    }
    Ok(())
}
