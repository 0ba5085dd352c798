//! Bounded log of notable events: registrations and health transitions.

use std::collections::VecDeque;
use std::fmt;

use loadwatch_types::{current_timestamp_ms, NodeHealth, NodeId};
use parking_lot::Mutex;

/// Default number of events kept.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Severity a transition *into* `status` is reported with.
    pub fn for_status(status: NodeHealth) -> Self {
        match status {
            NodeHealth::Healthy => Severity::Info,
            NodeHealth::Warning => Severity::Warn,
            NodeHealth::Critical => Severity::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub timestamp_ms: u64,
    pub node_id: NodeId,
    pub severity: Severity,
    pub message: String,
}

impl Event {
    pub fn new(node_id: NodeId, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp_ms: current_timestamp_ms(),
            node_id,
            severity,
            message: message.into(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}: {}", self.timestamp_ms, self.severity, self.node_id, self.message)
    }
}

/// Newest-first event log that drops the oldest entry when full.
#[derive(Debug)]
pub struct EventLog {
    entries: Mutex<VecDeque<Event>>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record(&self, event: Event) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_back();
        }
        entries.push_front(event);
    }

    /// Up to `k` most recent events, newest first.
    pub fn recent(&self, k: usize) -> Vec<Event> {
        self.entries.lock().iter().take(k).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(msg: &str) -> Event {
        Event::new(NodeId::from("n1"), Severity::Info, msg)
    }

    #[test]
    fn newest_first_and_bounded() {
        let log = EventLog::new(3);
        for msg in ["a", "b", "c", "d"] {
            log.record(event(msg));
        }

        let messages: Vec<String> = log.recent(10).into_iter().map(|e| e.message).collect();
        assert_eq!(messages, ["d", "c", "b"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn recent_limits_count() {
        let log = EventLog::default();
        log.record(event("a"));
        log.record(event("b"));
        assert_eq!(log.recent(1)[0].message, "b");
    }

    #[test]
    fn zero_capacity_records_nothing() {
        let log = EventLog::new(0);
        log.record(event("a"));
        assert!(log.is_empty());
    }

    #[test]
    fn severity_follows_target_status() {
        assert_eq!(Severity::for_status(NodeHealth::Healthy), Severity::Info);
        assert_eq!(Severity::for_status(NodeHealth::Warning), Severity::Warn);
        assert_eq!(Severity::for_status(NodeHealth::Critical), Severity::Error);
    }
}
