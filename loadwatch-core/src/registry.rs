//! Registry of monitored nodes and their sample buffers.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use loadwatch_types::NodeId;
use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::debug;

use crate::buffer::{SampleBuffer, DEFAULT_CAPACITY};
use crate::error::{Result, WatchError};
use crate::events::{Event, EventLog, Severity};

/// A registered node: its id and its exclusively owned sample buffer.
///
/// Each node has its own lock, so ingestion for unrelated nodes never
/// contends.
#[derive(Debug)]
pub struct NodeBuffer {
    id: NodeId,
    buffer: Mutex<SampleBuffer>,
}

impl NodeBuffer {
    fn new(id: NodeId, capacity: NonZeroUsize) -> Self {
        Self {
            id,
            buffer: Mutex::new(SampleBuffer::new(capacity)),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Lock the buffer. Keep the guard short-lived: copy what you need and drop it.
    pub fn lock(&self) -> MutexGuard<'_, SampleBuffer> {
        self.buffer.lock()
    }
}

/// Mapping from node id to buffer.
///
/// The map itself is only write-locked by `register`; ingestion and
/// aggregation take a read lock just long enough to clone the node's `Arc`.
#[derive(Debug)]
pub struct NodeRegistry {
    nodes: RwLock<BTreeMap<NodeId, Arc<NodeBuffer>>>,
    capacity: NonZeroUsize,
    events: Option<Arc<EventLog>>,
}

impl NodeRegistry {
    /// Create a registry whose buffers hold `capacity` samples each.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| WatchError::InvalidConfig("buffer capacity must be at least 1".into()))?;
        Ok(Self {
            nodes: RwLock::new(BTreeMap::new()),
            capacity,
            events: None,
        })
    }

    /// Record registrations into `events`.
    pub fn with_event_log(mut self, events: Arc<EventLog>) -> Self {
        self.events = Some(events);
        self
    }

    /// Register a node, creating an empty buffer for it.
    ///
    /// Idempotent: registering a known node is a no-op. Returns whether the
    /// node was newly added.
    pub fn register(&self, node_id: impl Into<NodeId>) -> bool {
        let node_id = node_id.into();

        // Fast path
        if self.nodes.read().contains_key(&node_id) {
            return false;
        }

        // Slow path: double-check under the write lock
        let added = {
            let mut nodes = self.nodes.write();
            if nodes.contains_key(&node_id) {
                false
            } else {
                let node = Arc::new(NodeBuffer::new(node_id.clone(), self.capacity));
                nodes.insert(node_id.clone(), node);
                true
            }
        };

        if added {
            debug!(node = %node_id, capacity = self.capacity.get(), "registered node");
            if let Some(events) = &self.events {
                events.record(Event::new(node_id, Severity::Info, "node registered"));
            }
        }
        added
    }

    /// The buffer owned by `node_id`.
    pub fn buffer_for(&self, node_id: &str) -> Result<Arc<NodeBuffer>> {
        self.nodes
            .read()
            .get(node_id)
            .cloned()
            .ok_or_else(|| WatchError::UnknownNode {
                node_id: node_id.into(),
            })
    }

    /// Ids of every node registered at the time of the call, ascending.
    ///
    /// Nodes registered afterwards do not show up in the returned sequence.
    pub fn all_node_ids(&self) -> NodeIds {
        NodeIds(self.nodes.read().keys().cloned().collect())
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.read().contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Per-node buffer capacity.
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            capacity: NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            events: None,
        }
    }
}

/// Point-in-time list of registered node ids.
///
/// Finite and restartable: iterate by reference as often as needed, or
/// consume it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeIds(Vec<NodeId>);

impl NodeIds {
    pub fn iter(&self) -> std::slice::Iter<'_, NodeId> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for NodeIds {
    type Item = NodeId;
    type IntoIter = std::vec::IntoIter<NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a NodeIds {
    type Item = &'a NodeId;
    type IntoIter = std::slice::Iter<'a, NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadwatch_types::Sample;

    #[test]
    fn register_is_idempotent() {
        let registry = NodeRegistry::default();
        assert!(registry.register("n1"));
        assert!(!registry.register("n1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_does_not_reset_existing_buffer() {
        let registry = NodeRegistry::default();
        registry.register("n1");
        registry
            .buffer_for("n1")
            .unwrap()
            .lock()
            .push(Sample::new("n1", 10, 5.0))
            .unwrap();

        registry.register("n1");
        assert_eq!(registry.buffer_for("n1").unwrap().lock().len(), 1);
    }

    #[test]
    fn buffer_for_returns_same_arc_on_second_call() {
        let registry = NodeRegistry::default();
        registry.register("n1");

        let b1 = registry.buffer_for("n1").unwrap();
        let b2 = registry.buffer_for("n1").unwrap();
        assert!(Arc::ptr_eq(&b1, &b2));
        assert_eq!(b1.id().as_str(), "n1");
    }

    #[test]
    fn unknown_node_is_an_error() {
        let registry = NodeRegistry::default();
        let err = registry.buffer_for("ghost").unwrap_err();
        assert_eq!(
            err,
            WatchError::UnknownNode {
                node_id: "ghost".into()
            }
        );
    }

    #[test]
    fn all_node_ids_is_sorted_and_frozen_at_call_time() {
        let registry = NodeRegistry::default();
        for id in ["node-c", "node-a", "node-b"] {
            registry.register(id);
        }

        let ids = registry.all_node_ids();
        registry.register("node-d");

        let names: Vec<&str> = ids.iter().map(NodeId::as_str).collect();
        assert_eq!(names, ["node-a", "node-b", "node-c"]);

        // Restartable
        assert_eq!(ids.iter().count(), 3);
        assert_eq!(ids.into_iter().count(), 3);
        assert_eq!(registry.all_node_ids().len(), 4);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            NodeRegistry::new(0),
            Err(WatchError::InvalidConfig(_))
        ));
        assert_eq!(NodeRegistry::new(16).unwrap().capacity(), 16);
    }

    #[test]
    fn registrations_are_logged() {
        let events = Arc::new(EventLog::default());
        let registry = NodeRegistry::new(8).unwrap().with_event_log(events.clone());

        registry.register("n1");
        registry.register("n1");

        assert_eq!(events.len(), 1);
        assert_eq!(events.recent(1)[0].message, "node registered");
    }

    #[test]
    fn concurrent_registration_of_same_node_adds_it_once() {
        use std::thread;

        let registry = Arc::new(NodeRegistry::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let r = registry.clone();
                thread::spawn(move || r.register("shared"))
            })
            .collect();

        let added: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();

        assert_eq!(added, 1);
        assert_eq!(registry.len(), 1);
    }
}
