//! # loadwatch-types
//!
//! Core types for node load observability. This crate defines the schema
//! shared by everything that produces or consumes loadwatch data: the samples
//! monitored sources send in, the per-node aggregates computed from them, and
//! the snapshots handed to dashboards and exporters.
//!
//! ## Design Goals
//!
//! - **Zero required dependencies**: Core types work without any serialization framework
//! - **Optional serialization**: Enable `serde` and/or `minicbor` features as needed
//! - **Versioned schema**: Snapshots include version info for forward compatibility
//! - **Stable ordering**: Snapshot rows are always sorted by node id
//!
//! ## Features
//!
//! - `std` (default): Standard library support
//! - `serde`: JSON/MessagePack/etc. serialization via serde
//! - `minicbor`: Compact binary serialization via CBOR
//! - `all`: Enable all serialization formats
//!
//! ## Example
//!
//! ```rust
//! use loadwatch_types::{Aggregate, NodeHealth, Sample, Snapshot};
//!
//! let sample = Sample::new("cluster-a-node-7", 1703160000000, 42.5).with_extra("tps", 18402.0);
//! assert_eq!(sample.node_id.as_str(), "cluster-a-node-7");
//!
//! let snapshot = Snapshot::builder()
//!     .timestamp_ms(1703160001000)
//!     .aggregate(Aggregate::builder("node-b").average(75.0).status(NodeHealth::Warning).build())
//!     .aggregate(Aggregate::builder("node-a").average(12.0).build())
//!     .build();
//!
//! // Rows are ordered by node id regardless of insertion order
//! assert_eq!(snapshot.nodes[0].node_id.as_str(), "node-a");
//! assert_eq!(snapshot.summary().warning, 1);
//! ```
//!
//! ## Schema Version
//!
//! The current schema version is **1**. The version is included in serialized
//! snapshots to allow consumers to handle format evolution gracefully.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod aggregate;
mod sample;
mod snapshot;

pub use aggregate::*;
pub use sample::*;
pub use snapshot::*;

/// Current schema version.
///
/// Written into every [`Snapshot`]; bumped on breaking format changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Get current timestamp in milliseconds since Unix epoch.
#[cfg(feature = "std")]
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
