//! # loadwatch-core
//!
//! Concurrent ingestion and rolling aggregation of node load samples.
//!
//! Monitored sources push timestamped samples through an [`IngestGateway`];
//! each node keeps its most recent samples in a bounded [`SampleBuffer`]
//! owned by the [`NodeRegistry`]. The [`AggregationEngine`] turns a node's
//! buffer into an [`Aggregate`] (windowed average, trend, health), and the
//! [`SnapshotPublisher`] assembles every node's aggregate into an immutable
//! [`Snapshot`] for dashboards and exporters.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use loadwatch_core::{
//!     current_timestamp_ms, AggregationEngine, IngestGateway, NodeHealth, NodeRegistry, Sample,
//!     SnapshotPublisher, Thresholds, Window,
//! };
//!
//! let registry = Arc::new(NodeRegistry::new(128).unwrap());
//! registry.register("n1");
//!
//! let gateway = IngestGateway::new(registry.clone());
//! let now = current_timestamp_ms();
//! for (i, load) in [10.0, 20.0, 30.0].into_iter().enumerate() {
//!     gateway.ingest(Sample::new("n1", now - 3 + i as u64, load)).unwrap();
//! }
//!
//! let engine = AggregationEngine::new(registry, Window::default(), Thresholds::default()).unwrap();
//! let publisher = SnapshotPublisher::new(engine);
//!
//! let snapshot = publisher.publish();
//! let n1 = snapshot.get("n1").unwrap();
//! assert_eq!(n1.windowed_average, 20.0);
//! assert_eq!(n1.status, NodeHealth::Healthy);
//! ```
//!
//! ## Concurrency
//!
//! - Every node's buffer has its own lock; ingestion for unrelated nodes
//!   never contends.
//! - The registry map is only write-locked by `register`.
//! - Aggregation copies a node's window under its lock and computes outside it.
//! - The latest snapshot is swapped in as a whole; readers hold an `Arc`.

mod aggregation;
mod buffer;
mod error;
mod events;
mod gateway;
mod output;
mod publisher;
mod registry;

pub use aggregation::{AggregationEngine, Thresholds, Window, DEFAULT_WINDOW_SAMPLES};
pub use buffer::{SampleBuffer, DEFAULT_CAPACITY};
pub use error::{InvalidReason, Result, WatchError};
pub use events::{Event, EventLog, Severity, DEFAULT_EVENT_CAPACITY};
pub use gateway::{BatchReport, IngestGateway, IngestStats, DEFAULT_CLOCK_SKEW};
pub use output::Output;
pub use publisher::{
    SnapshotPublisher, SnapshotPublisherBuilder, DEFAULT_EMIT_TIMEOUT, DEFAULT_INTERVAL,
};
pub use registry::{NodeBuffer, NodeIds, NodeRegistry};

#[cfg(feature = "tokio")]
pub use publisher::EmissionHandle;

// Re-export types for convenience
pub use loadwatch_types::{
    current_timestamp_ms, Aggregate, FleetSummary, NodeHealth, NodeId, Sample, Snapshot,
};
