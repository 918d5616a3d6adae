//! tally — bundle attribution and reward accounting for leader slots.
//!
//! Fetches each given slot's block, attributes its non-vote transactions to
//! bundles through the bundle explorer API, and reports per-block and
//! per-turn rewards.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use tally_attribution::HttpTransport;
use tally_core::traits::ReportSink;
use tally_engine::sink::format_sol;
use tally_engine::{Engine, JsonLinesSink, LogSink, RunSummary};
use tally_rpc::RpcBlockSource;

mod settings;

use settings::{OutputFormat, Settings};

#[derive(Parser, Debug)]
#[command(name = "tally", version, about = "Bundle attribution and reward tally for leader slots")]
struct Args {
    /// Slots to tally, in order
    #[arg(required = true)]
    slots: Vec<u64>,

    /// Consecutive slots per turn
    #[arg(long)]
    turn_size: Option<usize>,

    /// Turn labels (comma-separated), e.g. previous,ours,next
    #[arg(long, value_delimiter = ',')]
    labels: Vec<String>,

    /// Attribution requests per budget window
    #[arg(long)]
    rps: Option<u32>,

    /// JSON-RPC endpoint for block data
    #[arg(long)]
    rpc_url: Option<String>,

    /// Bundle explorer API base URL
    #[arg(long)]
    bundles_url: Option<String>,

    /// Report output
    #[arg(long, value_enum)]
    output: Option<OutputFormat>,

    /// Write JSON reports to this file instead of stdout
    #[arg(long)]
    out_file: Option<PathBuf>,

    /// Settings file (default: <config_dir>/tally/tally.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long)]
    log_format: Option<String>,
}

impl Args {
    /// Overlay command-line flags on loaded settings.
    fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(n) = self.turn_size {
            settings.turn_size = n;
        }
        if !self.labels.is_empty() {
            settings.labels = self.labels.clone();
        }
        if let Some(n) = self.rps {
            settings.requests_per_window = n;
        }
        if let Some(url) = &self.rpc_url {
            settings.rpc_url = url.clone();
        }
        if let Some(url) = &self.bundles_url {
            settings.bundles_url = url.clone();
        }
        if let Some(out) = self.output {
            settings.output = out;
        }
        if let Some(path) = &self.out_file {
            settings.out_file = Some(path.clone());
            settings.output = OutputFormat::Json;
        }
        if let Some(level) = &self.log_level {
            settings.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            settings.log_format = format.clone();
        }
        settings
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = args.apply(Settings::load(args.config.as_deref())?);

    init_logging(&settings.log_level, &settings.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        rpc = %settings.rpc_url,
        bundles = %settings.bundles_url,
        slots = args.slots.len(),
        turn_size = settings.turn_size,
        requests_per_window = settings.requests_per_window,
        "starting tally"
    );

    let attribution = settings.attribution_config();
    let source = RpcBlockSource::new(settings.rpc_config())
        .with_context(|| format!("failed to create RPC client for {}", settings.rpc_url))?;
    let transport = HttpTransport::new(&attribution.base_url, attribution.timeout)
        .context("failed to create bundle explorer client")?;
    let engine = Engine::new(Arc::new(source), Arc::new(transport), settings.engine_config());

    let mut sink: Box<dyn ReportSink> = match (settings.output, &settings.out_file) {
        (OutputFormat::Text, _) => Box::new(LogSink),
        (OutputFormat::Json, Some(path)) => Box::new(
            JsonLinesSink::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        (OutputFormat::Json, None) => Box::new(JsonLinesSink::stdout()),
    };

    let summary = engine.run(&args.slots, sink.as_mut()).await?;
    let line = summary_fields(&summary);
    info!(
        turns = line.turns,
        slots = line.slots,
        failed_slots = line.failed_slots,
        bundles = line.bundles,
        bundle_txns = line.bundle_txns,
        bundle_fees = %format_sol(line.bundle_fees),
        net_bundle_fee = %format_sol(line.net_bundle_fee),
        "run complete"
    );
    Ok(())
}

/// Fields of the final summary line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SummaryLine {
    turns: usize,
    slots: u64,
    failed_slots: usize,
    bundles: u64,
    bundle_txns: u64,
    /// Gross fees paid by bundle transactions.
    bundle_fees: i64,
    /// Bundle fees net of the per-signature cost.
    net_bundle_fee: i64,
}

fn summary_fields(summary: &RunSummary) -> SummaryLine {
    let t = &summary.totals;
    SummaryLine {
        turns: summary.turns,
        slots: t.blocks,
        failed_slots: summary.failed_slots,
        bundles: t.bundle_count,
        bundle_txns: t.attributed_txn_count,
        bundle_fees: i64::try_from(t.attributed_fee_lamports).unwrap_or(i64::MAX),
        net_bundle_fee: t.net_bundle_fee_lamports,
    }
}

/// Initialize tracing with the given level and output format.
///
/// `RUST_LOG` takes precedence over `level_str`. Logs go to stderr so JSON
/// reports on stdout stay clean.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}
