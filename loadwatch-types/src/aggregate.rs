//! Per-node aggregates and derived health.

use alloc::collections::BTreeMap;
use alloc::string::String;
use core::fmt;

use crate::NodeId;

/// Health classification derived from a node's recent load.
///
/// Ordered by severity so `max()` over a set of nodes yields the worst one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
#[cfg_attr(feature = "minicbor", cbor(index_only))]
pub enum NodeHealth {
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "ok"))]
    #[cfg_attr(feature = "minicbor", n(0))]
    Healthy,
    #[cfg_attr(feature = "serde", serde(rename = "warn"))]
    #[cfg_attr(feature = "minicbor", n(1))]
    Warning,
    #[cfg_attr(feature = "serde", serde(rename = "crit"))]
    #[cfg_attr(feature = "minicbor", n(2))]
    Critical,
}

impl NodeHealth {
    /// Returns the short wire symbol (`ok`, `warn`, `crit`).
    pub fn symbol(&self) -> &'static str {
        match self {
            NodeHealth::Healthy => "ok",
            NodeHealth::Warning => "warn",
            NodeHealth::Critical => "crit",
        }
    }
}

impl fmt::Display for NodeHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Rolling statistics for one node, computed from its sample buffer.
///
/// Aggregates are always recomputed as a whole; there is no partial update.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct Aggregate {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub node_id: NodeId,

    /// Mean load over the current window, 0 when the window is empty.
    #[cfg_attr(feature = "minicbor", n(1))]
    pub windowed_average: f64,

    /// Current window average minus the preceding window average.
    ///
    /// 0 when there is not enough history for a preceding window.
    #[cfg_attr(feature = "minicbor", n(2))]
    pub trend: f64,

    #[cfg_attr(feature = "minicbor", n(3))]
    pub status: NodeHealth,

    /// Number of samples in the current window.
    #[cfg_attr(feature = "minicbor", n(4))]
    pub sample_count: u64,

    /// Timestamp (ms since epoch) of the newest buffered sample.
    #[cfg_attr(feature = "minicbor", n(5))]
    pub last_updated_ms: Option<u64>,

    /// Highest load in the current window.
    #[cfg_attr(feature = "minicbor", n(6))]
    pub peak_load: f64,

    /// Mean of each auxiliary metric over the samples in the current window
    /// that carry it.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "BTreeMap::is_empty")
    )]
    #[cfg_attr(feature = "minicbor", n(7))]
    pub extra: BTreeMap<String, f64>,
}

impl Aggregate {
    /// The aggregate of a node with no samples: zero load, zero trend, healthy.
    pub fn empty(node_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: node_id.into(),
            windowed_average: 0.0,
            trend: 0.0,
            status: NodeHealth::Healthy,
            sample_count: 0,
            last_updated_ms: None,
            peak_load: 0.0,
            extra: BTreeMap::new(),
        }
    }

    pub fn builder(node_id: impl Into<NodeId>) -> AggregateBuilder {
        AggregateBuilder {
            inner: Self::empty(node_id),
        }
    }

    /// True if no sample has ever been buffered for this node.
    pub fn has_data(&self) -> bool {
        self.last_updated_ms.is_some()
    }
}

/// Builder for `Aggregate`, mostly useful in tests and adapters.
#[derive(Debug)]
pub struct AggregateBuilder {
    inner: Aggregate,
}

impl AggregateBuilder {
    pub fn average(mut self, avg: f64) -> Self {
        self.inner.windowed_average = avg;
        self
    }

    pub fn trend(mut self, trend: f64) -> Self {
        self.inner.trend = trend;
        self
    }

    pub fn status(mut self, status: NodeHealth) -> Self {
        self.inner.status = status;
        self
    }

    pub fn sample_count(mut self, count: u64) -> Self {
        self.inner.sample_count = count;
        self
    }

    pub fn last_updated_ms(mut self, ts: u64) -> Self {
        self.inner.last_updated_ms = Some(ts);
        self
    }

    pub fn peak_load(mut self, peak: f64) -> Self {
        self.inner.peak_load = peak;
        self
    }

    pub fn extra(mut self, name: impl Into<String>, value: f64) -> Self {
        self.inner.extra.insert(name.into(), value);
        self
    }

    pub fn build(self) -> Aggregate {
        self.inner
    }
}
