//! # loadwatch
//!
//! Daemon around [`loadwatch_core`]: reads node load samples as
//! newline-delimited JSON from stdin, a file or TCP peers, aggregates them
//! per node and publishes snapshots to a file, a TCP endpoint or stdout.
//!
//! ```bash
//! # One-shot: aggregate a recorded sample file and print the snapshot
//! loadwatch --node n1 --node n2 --input samples.ndjson --once
//!
//! # Long-running: accept samples over TCP, write a snapshot every 500ms
//! loadwatch --config loadwatch.toml --listen 0.0.0.0:9901 --output snapshot.json --interval 500
//! ```
//!
//! Configuration is layered: defaults, then the TOML file, then
//! `LOADWATCH__*` environment variables, then command-line flags.

pub mod daemon;
pub mod settings;
pub mod source;

pub use daemon::{log_fleet_health, spawn_summary_logger, Daemon};
pub use settings::Settings;
pub use source::{serve_tcp, spawn_reader, SourceStats, SourceTotals};
