use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use loadwatch::{serve_tcp, spawn_reader, spawn_summary_logger, Daemon, Settings, SourceStats};
use loadwatch_core::Output;

#[derive(Parser, Debug)]
#[command(name = "loadwatch")]
#[command(about = "Aggregate node load samples and publish fleet health snapshots")]
#[command(version)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Register a node (repeatable; added to the configured nodes)
    #[arg(short, long = "node")]
    nodes: Vec<String>,

    /// Read NDJSON samples from a file, or "-" for stdin
    #[arg(short, long)]
    input: Option<String>,

    /// Accept NDJSON samples from TCP peers on this address
    #[arg(short, long)]
    listen: Option<String>,

    /// Write each snapshot to this JSON file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Publication interval in milliseconds
    #[arg(long)]
    interval: Option<u64>,

    /// Read the input to EOF, print one snapshot to stdout and exit
    #[arg(long, requires = "input", conflicts_with = "listen")]
    once: bool,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        settings.nodes.extend(self.nodes.iter().cloned());
        if let Some(path) = &self.output {
            settings.publish.output_file = Some(path.clone());
        }
        if let Some(ms) = self.interval {
            settings.publish.interval_ms = ms;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref())?;
    args.apply(&mut settings);
    if settings.publish.interval_ms == 0 {
        anyhow::bail!("--interval must be greater than zero");
    }

    let stats = Arc::new(SourceStats::default());

    if args.once {
        let daemon = Daemon::from_settings(&settings, Vec::new())?;
        log_start(&daemon, &settings);
        let input = args.input.as_deref().unwrap_or("-");
        let snapshot = if input == "-" {
            daemon.run_once(tokio::io::stdin(), "stdin", stats.clone()).await?
        } else {
            let file = tokio::fs::File::open(input)
                .await
                .with_context(|| format!("failed to open {input}"))?;
            daemon.run_once(file, input, stats.clone()).await?
        };
        println!("{}", serde_json::to_string_pretty(&*snapshot)?);
        log_totals(&daemon, &stats);
        return Ok(());
    }

    let (summary_output, summary_rx) = Output::channel(16);
    let daemon = Daemon::from_settings(&settings, vec![summary_output])?;
    let _summaries = spawn_summary_logger(summary_rx);
    log_start(&daemon, &settings);

    let emission = daemon.publisher.start();

    let _reader = match &args.input {
        Some(input) => Some(read_input(input, &daemon, &stats).await?),
        None => None,
    };
    if let Some(addr) = &args.listen {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to listen on {addr}"))?;
        info!(addr = %addr, "accepting samples over tcp");
        let _server = serve_tcp(listener, daemon.gateway.clone(), stats.clone());
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for ctrl-c")?;
    info!("shutting down");

    emission.stop();
    daemon.publisher.emit_now().await;
    log_totals(&daemon, &stats);
    Ok(())
}

async fn read_input(
    input: &str,
    daemon: &Daemon,
    stats: &Arc<SourceStats>,
) -> Result<tokio::task::JoinHandle<loadwatch::SourceTotals>> {
    let gateway = daemon.gateway.clone();
    let handle = if input == "-" {
        spawn_reader(tokio::io::stdin(), "stdin", gateway, stats.clone())
    } else {
        let file = tokio::fs::File::open(input)
            .await
            .with_context(|| format!("failed to open {input}"))?;
        spawn_reader(file, input, gateway, stats.clone())
    };
    Ok(handle)
}

fn log_start(daemon: &Daemon, settings: &Settings) {
    info!(
        nodes = daemon.registry.len(),
        window = ?settings.window(),
        interval_ms = settings.publish.interval_ms,
        "loadwatch starting"
    );
}

fn log_totals(daemon: &Daemon, stats: &SourceStats) {
    let totals = stats.totals();
    let ingest = daemon.gateway.stats();
    info!(
        lines = totals.lines,
        malformed = totals.malformed,
        accepted = ingest.accepted,
        rejected = ingest.rejected,
        "ingest totals"
    );
    for event in daemon.events.recent(10).iter().rev() {
        if event.severity == loadwatch_core::Severity::Info {
            info!("{event}");
        } else {
            warn!("{event}");
        }
    }
}
