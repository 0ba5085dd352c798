//! Snapshot - a point-in-time view of every node's aggregate.

use alloc::vec::Vec;

use crate::{Aggregate, NodeHealth, SCHEMA_VERSION};

/// A point-in-time snapshot of all registered nodes.
///
/// Rows are sorted by node id so consumers can diff successive snapshots
/// positionally. A snapshot is never mutated once published; new state
/// means a new snapshot.
///
/// # Example
///
/// ```rust
/// use loadwatch_types::{Aggregate, Snapshot};
///
/// let snapshot = Snapshot::builder()
///     .aggregate(Aggregate::builder("gpu-2").average(64.0).build())
///     .aggregate(Aggregate::builder("gpu-1").average(31.0).build())
///     .build();
///
/// assert_eq!(snapshot.get("gpu-1").unwrap().windowed_average, 31.0);
///
/// // Serialize with serde (requires "serde" feature)
/// // let json = serde_json::to_string(&snapshot)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct Snapshot {
    /// Schema version, [`SCHEMA_VERSION`] for snapshots built here.
    #[cfg_attr(feature = "minicbor", n(0))]
    pub version: u32,

    /// Unix timestamp in milliseconds when this snapshot was produced.
    #[cfg_attr(feature = "minicbor", n(1))]
    pub timestamp_ms: u64,

    /// Publication sequence number; 0 for the empty sentinel.
    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(2))]
    pub sequence: u64,

    /// One aggregate per node, ascending by node id.
    #[cfg_attr(feature = "minicbor", n(3))]
    pub nodes: Vec<Aggregate>,
}

impl Snapshot {
    /// The sentinel returned before anything has been published.
    pub fn empty() -> Self {
        Self {
            version: SCHEMA_VERSION,
            timestamp_ms: 0,
            sequence: 0,
            nodes: Vec::new(),
        }
    }

    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new()
    }

    /// Check if the snapshot is empty (no nodes).
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes in the snapshot.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True for the sentinel that stands in for "nothing published yet".
    pub fn is_sentinel(&self) -> bool {
        self.sequence == 0 && self.timestamp_ms == 0 && self.nodes.is_empty()
    }

    /// Look up one node's aggregate.
    pub fn get(&self, node_id: &str) -> Option<&Aggregate> {
        self.nodes
            .binary_search_by(|a| a.node_id.as_str().cmp(node_id))
            .ok()
            .map(|idx| &self.nodes[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Aggregate> {
        self.nodes.iter()
    }

    /// Fleet-wide roll-up of this snapshot.
    pub fn summary(&self) -> FleetSummary {
        let mut summary = FleetSummary::default();
        let mut load_sum = 0.0;

        for node in &self.nodes {
            match node.status {
                NodeHealth::Healthy => summary.healthy += 1,
                NodeHealth::Warning => summary.warning += 1,
                NodeHealth::Critical => summary.critical += 1,
            }
            if node.has_data() {
                summary.reporting += 1;
                load_sum += node.windowed_average;
            }
        }

        if summary.reporting > 0 {
            summary.mean_load = load_sum / summary.reporting as f64;
        }
        summary
    }
}

/// Counts and averages across every node in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FleetSummary {
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
    /// Nodes with at least one buffered sample.
    pub reporting: usize,
    /// Mean of the windowed averages of reporting nodes.
    pub mean_load: f64,
}

impl FleetSummary {
    pub fn total(&self) -> usize {
        self.healthy + self.warning + self.critical
    }

    /// Worst status present, `Healthy` for an empty fleet.
    pub fn worst(&self) -> NodeHealth {
        if self.critical > 0 {
            NodeHealth::Critical
        } else if self.warning > 0 {
            NodeHealth::Warning
        } else {
            NodeHealth::Healthy
        }
    }
}

/// Builder for constructing `Snapshot` instances.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    timestamp_ms: Option<u64>,
    sequence: u64,
    nodes: Vec<Aggregate>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a specific timestamp (milliseconds since Unix epoch).
    pub fn timestamp_ms(mut self, ts: u64) -> Self {
        self.timestamp_ms = Some(ts);
        self
    }

    pub fn sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.nodes.push(aggregate);
        self
    }

    /// Build the snapshot, sorting rows by node id.
    #[cfg(feature = "std")]
    pub fn build(self) -> Snapshot {
        let ts = self.timestamp_ms.unwrap_or_else(crate::current_timestamp_ms);
        self.finish(ts)
    }

    /// Build the snapshot with a specific timestamp (for no_std).
    #[cfg(not(feature = "std"))]
    pub fn build(self) -> Snapshot {
        let ts = self.timestamp_ms.unwrap_or(0);
        self.finish(ts)
    }

    fn finish(mut self, timestamp_ms: u64) -> Snapshot {
        self.nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Snapshot {
            version: SCHEMA_VERSION,
            timestamp_ms,
            sequence: self.sequence,
            nodes: self.nodes,
        }
    }
}
