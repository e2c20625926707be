//! Campaign optimizer CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: load `optimizer.toml` (or `--config`) and
//!    validate it before anything touches the network.
//! 2. **Wire observability**: `tracing-subscriber` with plain or JSON output,
//!    plus an OpenTelemetry OTLP exporter when `telemetry.otlp_endpoint` is
//!    set. All spans and events emitted by the workspace crates flow through
//!    this subscriber.
//! 3. **Construct infrastructure**: `HttpMetricsSource`, `HttpPlatform` (or
//!    `DryRunPlatform` with `--dry-run`), `SystemClock`, and the notifiers,
//!    injected into the [`pipeline::Optimizer`].
//! 4. **Report**: deliver the summary and map its termination to the exit
//!    code.
//!
//! | Exit code | Meaning |
//! |-----------|---------|
//! | 0 | Completed, or stopped cleanly at the budget ceiling |
//! | 1 | Configuration or infrastructure error; no run took place |
//! | 2 | Run aborted by a fetch failure or an invalid record |

mod config;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, warn};

use pipeline::{Notifier, Optimizer, Platform, RunId, RunSummary};
use platform::{
    DryRunPlatform, HttpEndpoint, HttpMetricsSource, HttpPlatform, JsonFileNotifier,
    LogNotifier, SystemClock, WebhookNotifier,
};

use crate::config::{CliConfig, DEFAULT_CONFIG_PATH};

/// Pauses and throttles under-performing advertising entities within a fixed
/// time budget.
#[derive(Parser, Debug)]
#[command(name = "campaign-optimizer", version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Classify and log intended mutations without sending them
    #[arg(long)]
    dry_run: bool,

    /// Also write the run summary as JSON to this path
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

const EXIT_SUCCESS: u8 = 0;
const EXIT_NOT_RUN: u8 = 1;
const EXIT_ABORTED: u8 = 2;

/// Maps the outcome of [`execute`] to the process exit status.
fn exit_status(outcome: &anyhow::Result<RunSummary>) -> u8 {
    match outcome {
        Ok(summary) if summary.termination.is_success() => EXIT_SUCCESS,
        Ok(_) => EXIT_ABORTED,
        Err(_) => EXIT_NOT_RUN,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match CliConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_NOT_RUN);
        }
    };
    let telemetry = match telemetry::init(&config.telemetry) {
        Ok(telemetry) => telemetry,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(EXIT_NOT_RUN);
        }
    };

    let outcome = execute(&args, &config).await;
    if let Err(e) = &outcome {
        error!("Optimizer did not run: {e:#}");
    }
    let status = exit_status(&outcome);

    telemetry.shutdown();
    ExitCode::from(status)
}

async fn execute(args: &Args, config: &CliConfig) -> anyhow::Result<RunSummary> {
    let today = chrono::Utc::now().date_naive();
    let settings = config
        .optimizer
        .validate(today, &config.reporting.schema)?;

    let source = HttpMetricsSource::new(
        &config.reporting.endpoint(),
        config.reporting.schema.clone(),
    )?;
    let platform: Box<dyn Platform> = if args.dry_run {
        Box::new(DryRunPlatform)
    } else {
        Box::new(HttpPlatform::new(&config.platform)?)
    };
    let notifiers = notifiers(args, config)?;

    let summary = Optimizer::new(&source, platform.as_ref(), &SystemClock, settings)
        .run(RunId::new_random())
        .await?;

    for notifier in &notifiers {
        if let Err(e) = notifier.notify(&summary).await {
            warn!(error = %e, "Summary delivery failed");
        }
    }
    Ok(summary)
}

fn notifiers(args: &Args, config: &CliConfig) -> anyhow::Result<Vec<Box<dyn Notifier>>> {
    let mut notifiers: Vec<Box<dyn Notifier>> = vec![Box::new(LogNotifier)];
    if let Some(path) = &args.summary_out {
        notifiers.push(Box::new(JsonFileNotifier::new(path)));
    }
    if let Some(url) = &config.notifier.webhook_url {
        notifiers.push(Box::new(WebhookNotifier::new(&HttpEndpoint::new(
            url.clone(),
        ))?));
    }
    Ok(notifiers)
}
