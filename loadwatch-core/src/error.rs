//! Error types for ingestion, lookup and configuration.

use loadwatch_types::NodeId;
use thiserror::Error;

/// Why a sample was refused at the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidReason {
    #[error("load {0} outside [0, 100]")]
    LoadOutOfRange(f64),

    #[error("load is not a finite number")]
    LoadNotFinite,

    #[error("timestamp is zero")]
    MissingTimestamp,

    #[error("timestamp is {ahead_ms}ms ahead of the local clock (tolerance {tolerance_ms}ms)")]
    FromTheFuture { ahead_ms: u64, tolerance_ms: u64 },

    #[error("extra metric has an empty name")]
    EmptyMetricName,

    #[error("extra metric `{0}` is not a finite number")]
    MetricNotFinite(String),
}

/// Errors raised by the loadwatch core.
///
/// Every ingestion error carries the identifying fields of the offending
/// sample so callers can log or alert without consulting internal state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WatchError {
    /// The sample failed validation and was not stored.
    #[error("invalid sample from {node_id} at {timestamp_ms}: {reason}")]
    InvalidSample {
        node_id: NodeId,
        timestamp_ms: u64,
        reason: InvalidReason,
    },

    /// The operation referenced a node that was never registered.
    #[error("unknown node: {node_id}")]
    UnknownNode { node_id: NodeId },

    /// The sample is older than the newest sample already buffered.
    #[error(
        "out-of-order sample from {node_id}: {timestamp_ms} is before last stored {last_timestamp_ms}"
    )]
    OutOfOrderSample {
        node_id: NodeId,
        timestamp_ms: u64,
        last_timestamp_ms: u64,
    },

    /// A component was constructed with unusable settings.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl WatchError {
    /// The node this error is about, if any.
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            WatchError::InvalidSample { node_id, .. }
            | WatchError::UnknownNode { node_id }
            | WatchError::OutOfOrderSample { node_id, .. } => Some(node_id),
            WatchError::InvalidConfig(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;
