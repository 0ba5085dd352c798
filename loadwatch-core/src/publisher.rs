//! Snapshot publication: aggregate every node, swap in the result atomically.

use std::sync::Arc;
use std::time::Duration;

use loadwatch_types::{current_timestamp_ms, Aggregate, NodeHealth, Snapshot};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::aggregation::AggregationEngine;
use crate::events::{Event, EventLog, Severity};
use crate::output::Output;

/// Default interval between background publications.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Default upper bound on a single output's emit.
pub const DEFAULT_EMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Produces immutable point-in-time snapshots of every node's aggregate.
///
/// Readers call `latest()` and get a shared pointer to a complete snapshot;
/// they never see rows from two different publication passes.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use loadwatch_core::{AggregationEngine, NodeRegistry, Output, SnapshotPublisher, Thresholds, Window};
///
/// #[tokio::main]
/// async fn main() {
///     let registry = Arc::new(NodeRegistry::default());
///     registry.register("cluster-a-node-1");
///
///     let engine = AggregationEngine::new(registry, Window::default(), Thresholds::default()).unwrap();
///     let publisher = SnapshotPublisher::builder(engine)
///         .output(Output::file("snapshot.json"))
///         .interval(Duration::from_secs(1))
///         .build();
///
///     // Start background publication
///     let emission = publisher.start();
///
///     tokio::time::sleep(Duration::from_secs(5)).await;
///     println!("{} nodes", publisher.latest().len());
///     emission.stop();
/// }
/// ```
#[derive(Debug)]
pub struct SnapshotPublisher {
    state: Arc<PublisherState>,
    outputs: Arc<Vec<Output>>,
    interval: Duration,
    emit_timeout: Duration,
}

#[derive(Debug)]
struct PublisherState {
    engine: AggregationEngine,
    latest: RwLock<Arc<Snapshot>>,
    /// Serializes publishers so timestamps and sequence numbers stay ordered.
    publishing: Mutex<()>,
    events: Option<Arc<EventLog>>,
}

impl PublisherState {
    fn publish(&self) -> Arc<Snapshot> {
        let _serial = self.publishing.lock();

        let previous = self.latest.read().clone();
        let snapshot = self
            .engine
            .aggregate_all()
            .into_iter()
            .fold(Snapshot::builder(), |b, aggregate| b.aggregate(aggregate))
            .timestamp_ms(current_timestamp_ms().max(previous.timestamp_ms))
            .sequence(previous.sequence + 1)
            .build();
        let snapshot = Arc::new(snapshot);

        if let Some(events) = &self.events {
            record_transitions(events, &previous, &snapshot);
        }

        *self.latest.write() = snapshot.clone();
        debug!(
            sequence = snapshot.sequence,
            nodes = snapshot.len(),
            "published snapshot"
        );
        snapshot
    }
}

fn record_transitions(events: &EventLog, previous: &Snapshot, current: &Snapshot) {
    for node in current.iter() {
        let before = previous
            .get(node.node_id.as_str())
            .map(|a| a.status)
            .unwrap_or(NodeHealth::Healthy);
        if before != node.status {
            events.record(transition_event(before, node));
        }
    }
}

fn transition_event(before: NodeHealth, node: &Aggregate) -> Event {
    Event::new(
        node.node_id.clone(),
        Severity::for_status(node.status),
        format!(
            "status {} -> {} (avg {:.1}, trend {:+.1})",
            before, node.status, node.windowed_average, node.trend
        ),
    )
}

impl SnapshotPublisher {
    /// Create a publisher with no outputs and the default interval.
    pub fn new(engine: AggregationEngine) -> Self {
        Self::builder(engine).build()
    }

    pub fn builder(engine: AggregationEngine) -> SnapshotPublisherBuilder {
        SnapshotPublisherBuilder::new(engine)
    }

    /// Aggregate every registered node and make the result the latest snapshot.
    ///
    /// Rows are ordered by node id. Timestamps never go backwards between
    /// successive publications even if the system clock does.
    pub fn publish(&self) -> Arc<Snapshot> {
        self.state.publish()
    }

    /// The most recently published snapshot, or `Snapshot::empty()` if none.
    pub fn latest(&self) -> Arc<Snapshot> {
        self.state.latest.read().clone()
    }

    /// Aggregate a single node without publishing.
    pub fn aggregate(&self, node_id: &str) -> crate::Result<Aggregate> {
        self.state.engine.aggregate(node_id)
    }

    pub fn engine(&self) -> &AggregationEngine {
        &self.state.engine
    }

    /// Up to `k` recent events, newest first. Empty if no log is attached.
    pub fn recent_events(&self, k: usize) -> Vec<Event> {
        self.state
            .events
            .as_ref()
            .map(|events| events.recent(k))
            .unwrap_or_default()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start background publication.
    ///
    /// Spawns a tokio task that publishes every interval, and a second task
    /// that emits the newest snapshot to all configured outputs. Publication
    /// never waits on an output: a sink slower than the interval only sees
    /// the latest snapshot when it catches up. Each emit is bounded by the
    /// emit timeout, and failures are logged.
    #[cfg(feature = "tokio")]
    pub fn start(&self) -> EmissionHandle {
        use tokio::sync::watch;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let (snapshot_tx, mut snapshot_rx) = watch::channel(self.latest());
        let state = self.state.clone();
        let outputs = self.outputs.clone();
        let interval = self.interval;
        let emit_timeout = self.emit_timeout;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let _ = snapshot_tx.send(state.publish());
                    }
                    changed = stop_rx.changed() => {
                        // A dropped handle stops the loop as well
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("snapshot publication stopped");
        });

        // Ends once the publication task drops its sender
        tokio::spawn(async move {
            while snapshot_rx.changed().await.is_ok() {
                let snapshot = snapshot_rx.borrow_and_update().clone();
                emit_all(&outputs, &snapshot, emit_timeout).await;
            }
            debug!("snapshot emission stopped");
        });

        EmissionHandle { stop_tx }
    }

    /// Publish and emit to all outputs immediately.
    ///
    /// Returns after every output finished or hit the emit timeout.
    #[cfg(feature = "tokio")]
    pub async fn emit_now(&self) -> Arc<Snapshot> {
        let snapshot = self.publish();
        emit_all(&self.outputs, &snapshot, self.emit_timeout).await;
        snapshot
    }
}

#[cfg(feature = "tokio")]
async fn emit_all(outputs: &[Output], snapshot: &Arc<Snapshot>, timeout: Duration) {
    for output in outputs {
        match tokio::time::timeout(timeout, output.emit(snapshot)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(output = %output.describe(), error = %e, "failed to emit snapshot");
            }
            Err(_) => {
                tracing::warn!(
                    output = %output.describe(),
                    timeout_ms = timeout.as_millis() as u64,
                    "timed out emitting snapshot"
                );
            }
        }
    }
}

/// Builder for configuring a SnapshotPublisher.
#[derive(Debug)]
pub struct SnapshotPublisherBuilder {
    engine: AggregationEngine,
    outputs: Vec<Output>,
    interval: Option<Duration>,
    emit_timeout: Option<Duration>,
    events: Option<Arc<EventLog>>,
}

impl SnapshotPublisherBuilder {
    pub fn new(engine: AggregationEngine) -> Self {
        Self {
            engine,
            outputs: Vec::new(),
            interval: None,
            emit_timeout: None,
            events: None,
        }
    }

    /// Add an output destination.
    ///
    /// Multiple outputs can be added; snapshots will be emitted to all of them.
    pub fn output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    /// Set the background publication interval.
    ///
    /// Defaults to 1 second if not specified.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Bound each output's emit. Defaults to 5 seconds.
    pub fn emit_timeout(mut self, timeout: Duration) -> Self {
        self.emit_timeout = Some(timeout);
        self
    }

    /// Record health transitions into `events`.
    pub fn event_log(mut self, events: Arc<EventLog>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> SnapshotPublisher {
        SnapshotPublisher {
            state: Arc::new(PublisherState {
                engine: self.engine,
                latest: RwLock::new(Arc::new(Snapshot::empty())),
                publishing: Mutex::new(()),
                events: self.events,
            }),
            outputs: Arc::new(self.outputs),
            interval: self.interval.unwrap_or(DEFAULT_INTERVAL),
            emit_timeout: self.emit_timeout.unwrap_or(DEFAULT_EMIT_TIMEOUT),
        }
    }
}

/// Handle for controlling background emission.
///
/// Drop this handle to stop emission, or call `stop()` explicitly.
#[cfg(feature = "tokio")]
#[derive(Debug)]
pub struct EmissionHandle {
    stop_tx: tokio::sync::watch::Sender<bool>,
}

#[cfg(feature = "tokio")]
impl EmissionHandle {
    /// Stop background emission.
    pub fn stop(self) {
        let _ = self.stop_tx.send(true);
    }
}
