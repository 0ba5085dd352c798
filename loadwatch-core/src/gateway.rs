//! Ingestion boundary: validates samples and routes them to node buffers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use loadwatch_types::{current_timestamp_ms, Sample};
use tracing::warn;

use crate::error::{InvalidReason, Result, WatchError};
use crate::registry::NodeRegistry;

/// How far ahead of the local clock a sample timestamp may be.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(2);

/// Accepts samples from monitored sources.
///
/// Cheap to clone; clones share the registry and counters, so hand one to
/// each source task.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use loadwatch_core::{IngestGateway, NodeRegistry, Sample};
/// use loadwatch_core::current_timestamp_ms;
///
/// let registry = Arc::new(NodeRegistry::default());
/// let gateway = IngestGateway::new(registry.clone());
///
/// let sample = Sample::new("cluster-a-node-7", current_timestamp_ms(), 42.0);
/// assert!(gateway.ingest(sample.clone()).is_err()); // not registered yet
///
/// registry.register("cluster-a-node-7");
/// gateway.ingest(sample).unwrap();
/// ```
#[derive(Clone)]
pub struct IngestGateway {
    registry: Arc<NodeRegistry>,
    clock_skew: Duration,
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    rejected: AtomicU64,
}

/// Totals since the gateway was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestStats {
    pub accepted: u64,
    pub rejected: u64,
}

/// Outcome of `ingest_batch`.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub accepted: usize,
    pub rejected: Vec<WatchError>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

impl IngestGateway {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            clock_skew: DEFAULT_CLOCK_SKEW,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Set how far in the future a sample timestamp may be.
    pub fn with_clock_skew(mut self, tolerance: Duration) -> Self {
        self.clock_skew = tolerance;
        self
    }

    /// Validate a sample and append it to its node's buffer.
    ///
    /// Nodes must be registered first; ingestion never creates them. On any
    /// error the node's buffer is left untouched.
    pub fn ingest(&self, sample: Sample) -> Result<()> {
        self.ingest_at(sample, current_timestamp_ms())
    }

    /// Like `ingest`, judging the timestamp against `now_ms` instead of the
    /// system clock.
    pub fn ingest_at(&self, sample: Sample, now_ms: u64) -> Result<()> {
        let result = self.store(sample, now_ms);
        match &result {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "rejected sample");
            }
        }
        result
    }

    /// Ingest samples in order. A rejected sample does not stop the batch.
    pub fn ingest_batch(&self, samples: impl IntoIterator<Item = Sample>) -> BatchReport {
        let mut report = BatchReport::default();
        for sample in samples {
            match self.ingest(sample) {
                Ok(()) => report.accepted += 1,
                Err(e) => report.rejected.push(e),
            }
        }
        report
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    fn store(&self, sample: Sample, now_ms: u64) -> Result<()> {
        if let Err(reason) = self.validate(&sample, now_ms) {
            return Err(WatchError::InvalidSample {
                node_id: sample.node_id,
                timestamp_ms: sample.timestamp_ms,
                reason,
            });
        }

        let node = self.registry.buffer_for(sample.node_id.as_str())?;
        let mut buffer = node.lock();
        buffer.push(sample)
    }

    fn validate(&self, sample: &Sample, now_ms: u64) -> std::result::Result<(), InvalidReason> {
        if !sample.load.is_finite() {
            return Err(InvalidReason::LoadNotFinite);
        }
        if !(0.0..=100.0).contains(&sample.load) {
            return Err(InvalidReason::LoadOutOfRange(sample.load));
        }

        if sample.timestamp_ms == 0 {
            return Err(InvalidReason::MissingTimestamp);
        }
        let tolerance_ms = self.clock_skew.as_millis() as u64;
        if sample.timestamp_ms > now_ms.saturating_add(tolerance_ms) {
            return Err(InvalidReason::FromTheFuture {
                ahead_ms: sample.timestamp_ms - now_ms,
                tolerance_ms,
            });
        }

        for (name, value) in &sample.extra {
            if name.is_empty() {
                return Err(InvalidReason::EmptyMetricName);
            }
            if !value.is_finite() {
                return Err(InvalidReason::MetricNotFinite(name.clone()));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for IngestGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestGateway")
            .field("nodes", &self.registry.len())
            .field("clock_skew", &self.clock_skew)
            .field("stats", &self.stats())
            .finish()
    }
}
