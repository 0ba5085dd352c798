//! Wiring of the core components from [`Settings`].

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use loadwatch_core::{
    AggregationEngine, EventLog, FleetSummary, IngestGateway, NodeRegistry, Output, Snapshot,
    SnapshotPublisher,
};

use crate::settings::Settings;
use crate::source::{spawn_reader, SourceStats};

/// Registry, gateway and publisher sharing one event log.
#[derive(Debug)]
pub struct Daemon {
    pub registry: Arc<NodeRegistry>,
    pub gateway: IngestGateway,
    pub publisher: SnapshotPublisher,
    pub events: Arc<EventLog>,
}

impl Daemon {
    /// Build the pipeline and register the configured nodes.
    ///
    /// `outputs` are added after the file/TCP outputs named in `settings`.
    pub fn from_settings(settings: &Settings, outputs: Vec<Output>) -> Result<Self> {
        let events = Arc::new(EventLog::new(settings.publish.event_capacity));
        let registry = Arc::new(
            NodeRegistry::new(settings.buffer.capacity)
                .context("invalid buffer capacity")?
                .with_event_log(events.clone()),
        );
        for node in &settings.nodes {
            registry.register(node.as_str());
        }

        let gateway = IngestGateway::new(registry.clone()).with_clock_skew(settings.clock_skew());
        let engine = AggregationEngine::new(
            registry.clone(),
            settings.window(),
            settings.thresholds(),
        )
        .context("invalid aggregation settings")?;

        let mut builder = SnapshotPublisher::builder(engine)
            .interval(settings.interval())
            .event_log(events.clone());
        if let Some(path) = &settings.publish.output_file {
            builder = builder.output(Output::file(path));
        }
        if let Some(addr) = &settings.publish.output_tcp {
            builder = builder.output(Output::tcp(addr));
        }
        for output in outputs {
            builder = builder.output(output);
        }

        Ok(Self {
            registry,
            gateway,
            publisher: builder.build(),
            events,
        })
    }

    /// Ingest `reader` to EOF, then publish once and emit to every output.
    ///
    /// The fleet summary is logged before returning.
    pub async fn run_once<R>(
        &self,
        reader: R,
        description: &str,
        stats: Arc<SourceStats>,
    ) -> Result<Arc<Snapshot>>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        spawn_reader(reader, description, self.gateway.clone(), stats)
            .await
            .context("sample reader failed")?;
        let snapshot = self.publisher.emit_now().await;
        log_fleet_health(&snapshot);
        Ok(snapshot)
    }
}

pub fn log_fleet_health(snapshot: &Snapshot) {
    let summary = snapshot.summary();
    info!(
        sequence = snapshot.sequence,
        nodes = summary.total(),
        healthy = summary.healthy,
        warning = summary.warning,
        critical = summary.critical,
        mean_load = format_args!("{:.1}", summary.mean_load),
        "fleet health"
    );
}

/// Log a fleet summary line for each snapshot received on `rx`.
///
/// Summaries are logged at info when the fleet's health counts change and
/// at debug otherwise.
pub fn spawn_summary_logger(mut rx: mpsc::Receiver<Arc<Snapshot>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut previous: Option<FleetSummary> = None;
        while let Some(snapshot) = rx.recv().await {
            let summary = snapshot.summary();
            let changed = previous.map_or(true, |p| !same_counts(&p, &summary));
            if changed {
                log_fleet_health(&snapshot);
            } else {
                debug!(
                    sequence = snapshot.sequence,
                    mean_load = format_args!("{:.1}", summary.mean_load),
                    "snapshot published"
                );
            }
            previous = Some(summary);
        }
    })
}

fn same_counts(a: &FleetSummary, b: &FleetSummary) -> bool {
    a.healthy == b.healthy
        && a.warning == b.warning
        && a.critical == b.critical
        && a.reporting == b.reporting
}
