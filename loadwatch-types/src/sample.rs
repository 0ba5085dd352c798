//! Node identity and raw metric samples.

use alloc::collections::BTreeMap;
use alloc::string::String;
use core::borrow::Borrow;
use core::fmt;

/// Stable identifier of a monitored node (e.g. `"cluster-a-node-7"`).
///
/// Ordering is lexicographic on the underlying string, which is the order
/// snapshot rows are published in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
#[cfg_attr(feature = "minicbor", cbor(transparent))]
pub struct NodeId(#[cfg_attr(feature = "minicbor", n(0))] pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One timestamped measurement of a node's load and auxiliary metrics.
///
/// Samples are immutable once built. `load` is a utilisation percentage and
/// is expected to lie in `[0, 100]`; validation happens at ingestion, not here.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct Sample {
    /// Node this sample was taken from.
    #[cfg_attr(feature = "minicbor", n(0))]
    pub node_id: NodeId,

    /// Unix timestamp in milliseconds when the sample was taken.
    #[cfg_attr(feature = "minicbor", n(1))]
    pub timestamp_ms: u64,

    /// Load percentage.
    #[cfg_attr(feature = "minicbor", n(2))]
    pub load: f64,

    /// Additional named metrics (throughput, context usage, ...).
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "BTreeMap::is_empty")
    )]
    #[cfg_attr(feature = "minicbor", n(3))]
    pub extra: BTreeMap<String, f64>,
}

impl Sample {
    pub fn new(node_id: impl Into<NodeId>, timestamp_ms: u64, load: f64) -> Self {
        Self {
            node_id: node_id.into(),
            timestamp_ms,
            load,
            extra: BTreeMap::new(),
        }
    }

    /// Attach a named auxiliary metric.
    pub fn with_extra(mut self, name: impl Into<String>, value: f64) -> Self {
        self.extra.insert(name.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_orders_lexicographically() {
        let mut ids = [NodeId::from("n10"), NodeId::from("n1"), NodeId::from("n2")];
        ids.sort();
        assert_eq!(ids.map(|id| id.0), ["n1", "n10", "n2"].map(String::from));
    }

    #[test]
    fn node_id_borrows_as_str() {
        let mut map = BTreeMap::new();
        map.insert(NodeId::from("cluster-a-node-7"), 1);
        assert_eq!(map.get("cluster-a-node-7"), Some(&1));
    }

    #[test]
    fn sample_with_extra() {
        let s = Sample::new("n1", 1000, 50.0)
            .with_extra("tps", 18402.0)
            .with_extra("context", 85.0);
        assert_eq!(s.extra.len(), 2);
        assert_eq!(s.extra.get("tps"), Some(&18402.0));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn sample_parses_without_extra() {
        let s: Sample =
            serde_json::from_str(r#"{"node_id":"n1","timestamp_ms":5,"load":12.5}"#).unwrap();
        assert_eq!(s, Sample::new("n1", 5, 12.5));

        let json = serde_json::to_string(&s).unwrap();
        assert!(!json.contains("extra"));
    }
}
