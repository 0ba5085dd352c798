//! Daemon configuration: TOML file, `LOADWATCH__*` environment overrides, defaults.
//!
//! ```toml
//! nodes = ["cluster-a-node-1", "cluster-a-node-2"]
//!
//! [buffer]
//! capacity = 128
//!
//! [aggregation]
//! window_samples = 20      # or: window_secs = 60
//! warn_load = 70.0
//! crit_load = 90.0
//! crit_trend = 30.0
//!
//! [ingest]
//! clock_skew_ms = 2000
//!
//! [publish]
//! interval_ms = 1000
//! output_file = "snapshot.json"
//! output_tcp = "127.0.0.1:9900"
//! event_capacity = 64
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use loadwatch_core::{
    Thresholds, WatchError, Window, DEFAULT_CAPACITY, DEFAULT_CLOCK_SKEW, DEFAULT_EVENT_CAPACITY,
    DEFAULT_INTERVAL, DEFAULT_WINDOW_SAMPLES,
};

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Nodes registered at startup.
    pub nodes: Vec<String>,
    pub buffer: BufferSettings,
    pub aggregation: AggregationSettings,
    pub ingest: IngestSettings,
    pub publish: PublishSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BufferSettings {
    pub capacity: usize,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AggregationSettings {
    pub window_samples: Option<usize>,
    pub window_secs: Option<u64>,
    pub warn_load: f64,
    pub crit_load: f64,
    pub crit_trend: f64,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        Self {
            window_samples: None,
            window_secs: None,
            warn_load: thresholds.warn_load,
            crit_load: thresholds.crit_load,
            crit_trend: thresholds.crit_trend,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub clock_skew_ms: u64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            clock_skew_ms: DEFAULT_CLOCK_SKEW.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PublishSettings {
    pub interval_ms: u64,
    pub output_file: Option<PathBuf>,
    pub output_tcp: Option<String>,
    pub event_capacity: usize,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL.as_millis() as u64,
            output_file: None,
            output_tcp: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file, then `LOADWATCH__*` env vars.
    ///
    /// `LOADWATCH__PUBLISH__INTERVAL_MS=500` overrides `[publish] interval_ms`;
    /// `LOADWATCH__NODES=a,b` sets the node list.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(
                Environment::with_prefix("LOADWATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("nodes")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration")?;

        let settings: Settings = config
            .try_deserialize()
            .context("invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a TOML string (no environment overrides).
    pub fn from_toml(toml: &str) -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
            .context("invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let a = &self.aggregation;
        if a.window_samples.is_some() && a.window_secs.is_some() {
            return Err(invalid(
                "set either aggregation.window_samples or aggregation.window_secs, not both".into(),
            ));
        }
        if a.warn_load > a.crit_load {
            return Err(invalid(format!(
                "aggregation.warn_load ({}) must not exceed aggregation.crit_load ({})",
                a.warn_load, a.crit_load
            )));
        }
        if self.publish.interval_ms == 0 {
            return Err(invalid("publish.interval_ms must be greater than zero".into()));
        }
        Ok(())
    }

    /// The aggregation window; `window_secs` selects a time span.
    pub fn window(&self) -> Window {
        match (self.aggregation.window_samples, self.aggregation.window_secs) {
            (_, Some(secs)) => Window::Span(Duration::from_secs(secs)),
            (Some(n), None) => Window::Samples(n),
            (None, None) => Window::Samples(DEFAULT_WINDOW_SAMPLES),
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            warn_load: self.aggregation.warn_load,
            crit_load: self.aggregation.crit_load,
            crit_trend: self.aggregation.crit_trend,
        }
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_millis(self.ingest.clock_skew_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.publish.interval_ms)
    }
}

fn invalid(message: String) -> anyhow::Error {
    WatchError::InvalidConfig(message).into()
}
