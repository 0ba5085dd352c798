//! Rolling statistics and health classification over a node's buffer.
//!
//! The engine never aggregates in place: it copies the samples it needs
//! while holding the node's lock, releases the lock, and computes from the
//! copy. Results depend only on buffer contents, never on the wall clock.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use loadwatch_types::{Aggregate, NodeHealth, NodeId, Sample};
use tracing::warn;

use crate::buffer::SampleBuffer;
use crate::error::{Result, WatchError};
use crate::registry::NodeRegistry;

/// Default number of samples in a count-based window.
pub const DEFAULT_WINDOW_SAMPLES: usize = 20;

/// How the current window is cut from a node's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// The last `n` samples. The preceding window is the `n` before those.
    Samples(usize),
    /// Samples within `d` of the newest sample's timestamp. The preceding
    /// window is the span of equal length immediately before it.
    Span(Duration),
}

impl Default for Window {
    fn default() -> Self {
        Window::Samples(DEFAULT_WINDOW_SAMPLES)
    }
}

impl Window {
    fn validate(&self, capacity: usize) -> Result<()> {
        match *self {
            Window::Samples(0) => Err(WatchError::InvalidConfig(
                "window must contain at least one sample".into(),
            )),
            Window::Samples(n) if n.saturating_mul(2) > capacity => {
                Err(WatchError::InvalidConfig(format!(
                    "a {n}-sample window needs a buffer of at least {} samples to compute a trend, capacity is {capacity}",
                    n.saturating_mul(2)
                )))
            }
            Window::Span(d) if d.as_millis() == 0 => Err(WatchError::InvalidConfig(
                "window span must be at least 1ms".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Copy the current and (if complete) preceding window out of `buf`.
    fn cut(&self, buf: &SampleBuffer) -> WindowCut {
        let last_updated_ms = buf.last().map(|s| s.timestamp_ms);

        match *self {
            Window::Samples(n) => {
                let mut current = buf.recent(n.saturating_mul(2));
                let split = current.len().saturating_sub(n);
                let previous: Vec<Sample> = current.drain(..split).collect();
                WindowCut {
                    previous: (previous.len() == n).then_some(previous),
                    current,
                    last_updated_ms,
                }
            }
            Window::Span(span) => {
                let Some(newest) = last_updated_ms else {
                    return WindowCut::default();
                };
                let span_ms = span.as_millis() as u64;
                let current_start = newest.saturating_sub(span_ms);
                let previous_start = newest.saturating_sub(span_ms.saturating_mul(2));

                let mut current = Vec::new();
                let mut previous = Vec::new();
                for sample in buf.iter().rev() {
                    if sample.timestamp_ms > current_start {
                        current.push(sample.clone());
                    } else if sample.timestamp_ms > previous_start {
                        previous.push(sample.clone());
                    } else {
                        break;
                    }
                }
                current.reverse();
                previous.reverse();

                // A full buffer whose oldest sample falls inside the preceding
                // span may have evicted part of it.
                let evicted = buf.len() == buf.capacity()
                    && buf.iter().next().is_some_and(|s| s.timestamp_ms > previous_start);

                WindowCut {
                    previous: (!previous.is_empty() && !evicted).then_some(previous),
                    current,
                    last_updated_ms,
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct WindowCut {
    current: Vec<Sample>,
    previous: Option<Vec<Sample>>,
    last_updated_ms: Option<u64>,
}

/// Load thresholds for health classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Windowed average at or above which a node is in warning state.
    pub warn_load: f64,
    /// Windowed average at or above which a node is critical.
    pub crit_load: f64,
    /// Trend magnitude at or above which a node is critical regardless of load.
    pub crit_trend: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warn_load: 70.0,
            crit_load: 90.0,
            crit_trend: 30.0,
        }
    }
}

impl Thresholds {
    pub fn classify(&self, average: f64, trend: f64) -> NodeHealth {
        if average >= self.crit_load || trend.abs() >= self.crit_trend {
            NodeHealth::Critical
        } else if average >= self.warn_load {
            NodeHealth::Warning
        } else {
            NodeHealth::Healthy
        }
    }
}

/// Computes `Aggregate`s from the registry's buffers on demand.
#[derive(Debug, Clone)]
pub struct AggregationEngine {
    registry: Arc<NodeRegistry>,
    window: Window,
    thresholds: Thresholds,
}

impl AggregationEngine {
    /// Fails with `InvalidConfig` if the window cannot be served by the
    /// registry's buffer capacity.
    pub fn new(registry: Arc<NodeRegistry>, window: Window, thresholds: Thresholds) -> Result<Self> {
        window.validate(registry.capacity())?;
        Ok(Self {
            registry,
            window,
            thresholds,
        })
    }

    /// Aggregate one node's recent samples.
    pub fn aggregate(&self, node_id: &str) -> Result<Aggregate> {
        let node = self.registry.buffer_for(node_id)?;
        let cut = {
            let buf = node.lock();
            self.window.cut(&buf)
        };
        Ok(self.compute(node.id().clone(), cut))
    }

    /// Aggregate every registered node, ascending by node id.
    pub fn aggregate_all(&self) -> Vec<Aggregate> {
        self.registry
            .all_node_ids()
            .iter()
            .filter_map(|id| match self.aggregate(id.as_str()) {
                Ok(aggregate) => Some(aggregate),
                Err(e) => {
                    warn!(node = %id, error = %e, "skipping node during aggregation");
                    None
                }
            })
            .collect()
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    fn compute(&self, node_id: NodeId, cut: WindowCut) -> Aggregate {
        let average = mean_load(&cut.current);
        let trend = cut
            .previous
            .as_deref()
            .map(|prev| average - mean_load(prev))
            .unwrap_or(0.0);

        Aggregate {
            node_id,
            windowed_average: average,
            trend,
            status: self.thresholds.classify(average, trend),
            sample_count: cut.current.len() as u64,
            last_updated_ms: cut.last_updated_ms,
            peak_load: cut.current.iter().map(|s| s.load).fold(0.0, f64::max),
            extra: mean_extras(&cut.current),
        }
    }
}

fn mean_load(samples: &[Sample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.load).sum::<f64>() / samples.len() as f64
}

fn mean_extras(samples: &[Sample]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for sample in samples {
        for (name, value) in &sample.extra {
            let entry = sums.entry(name.as_str()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(name, (sum, count))| (name.to_string(), sum / count as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(window: Window) -> AggregationEngine {
        let registry = Arc::new(NodeRegistry::new(128).unwrap());
        registry.register("n1");
        AggregationEngine::new(registry, window, Thresholds::default()).unwrap()
    }

    fn feed(engine: &AggregationEngine, loads: &[f64], start_ms: u64, step_ms: u64) {
        let node = engine.registry().buffer_for("n1").unwrap();
        let mut buf = node.lock();
        let first = buf.last().map(|s| s.timestamp_ms + step_ms).unwrap_or(start_ms);
        for (i, load) in loads.iter().enumerate() {
            buf.push(Sample::new("n1", first + i as u64 * step_ms, *load))
                .unwrap();
        }
    }

    #[test]
    fn empty_buffer_is_zero_and_healthy() {
        let engine = engine(Window::default());
        let a = engine.aggregate("n1").unwrap();
        assert_eq!(a.windowed_average, 0.0);
        assert_eq!(a.trend, 0.0);
        assert_eq!(a.status, NodeHealth::Healthy);
        assert_eq!(a.sample_count, 0);
        assert_eq!(a.last_updated_ms, None);
    }

    #[test]
    fn average_of_partial_window() {
        let engine = engine(Window::default());
        feed(&engine, &[10.0, 20.0, 30.0], 1000, 1000);

        let a = engine.aggregate("n1").unwrap();
        assert_eq!(a.windowed_average, 20.0);
        assert_eq!(a.trend, 0.0);
        assert_eq!(a.status, NodeHealth::Healthy);
        assert_eq!(a.sample_count, 3);
        assert_eq!(a.peak_load, 30.0);
        assert_eq!(a.last_updated_ms, Some(3000));
    }

    #[test]
    fn high_average_is_critical() {
        let engine = engine(Window::default());
        feed(&engine, &[95.0, 96.0, 97.0], 1000, 1000);

        let a = engine.aggregate("n1").unwrap();
        assert_eq!(a.windowed_average, 96.0);
        assert_eq!(a.status, NodeHealth::Critical);
    }

    #[test]
    fn warning_between_thresholds() {
        let engine = engine(Window::default());
        feed(&engine, &[72.0, 74.0, 76.0], 1000, 1000);
        assert_eq!(engine.aggregate("n1").unwrap().status, NodeHealth::Warning);
    }

    #[test]
    fn sharp_trend_is_critical_even_at_warning_load() {
        let engine = engine(Window::Samples(3));
        feed(&engine, &[20.0, 20.0, 20.0], 1000, 1000);
        feed(&engine, &[50.0, 55.0, 60.0], 0, 1000);

        let a = engine.aggregate("n1").unwrap();
        assert_eq!(a.windowed_average, 55.0);
        assert_eq!(a.trend, 35.0);
        assert_eq!(a.status, NodeHealth::Critical);
    }

    #[test]
    fn sharp_drop_is_critical_too() {
        let engine = engine(Window::Samples(2));
        feed(&engine, &[80.0, 80.0, 40.0, 40.0], 1000, 1000);

        let a = engine.aggregate("n1").unwrap();
        assert_eq!(a.trend, -40.0);
        assert_eq!(a.status, NodeHealth::Critical);
    }

    #[test]
    fn incomplete_previous_window_means_no_trend() {
        let engine = engine(Window::Samples(3));
        // 3 in the current window, only 2 before it
        feed(&engine, &[0.0, 0.0, 60.0, 60.0, 60.0], 1000, 1000);

        let a = engine.aggregate("n1").unwrap();
        assert_eq!(a.windowed_average, 60.0);
        assert_eq!(a.trend, 0.0);
        assert_eq!(a.status, NodeHealth::Healthy);
    }

    #[test]
    fn only_the_latest_window_is_averaged() {
        let engine = engine(Window::Samples(2));
        feed(&engine, &[99.0, 99.0, 99.0, 10.0, 20.0, 30.0, 40.0], 1000, 1000);

        let a = engine.aggregate("n1").unwrap();
        assert_eq!(a.windowed_average, 35.0);
        assert_eq!(a.trend, 20.0);
        assert_eq!(a.sample_count, 2);
    }

    #[test]
    fn span_window_cuts_by_timestamp() {
        let engine = engine(Window::Span(Duration::from_secs(10)));
        // previous span (t-20s, t-10s]: 20, 20 ; current span (t-10s, t]: 55, 55
        let node = engine.registry().buffer_for("n1").unwrap();
        {
            let mut buf = node.lock();
            for (ts, load) in [
                (1_000, 99.0),
                (25_000, 20.0),
                (30_000, 20.0),
                (35_000, 55.0),
                (40_000, 55.0),
            ] {
                buf.push(Sample::new("n1", ts, load)).unwrap();
            }
        }

        let a = engine.aggregate("n1").unwrap();
        assert_eq!(a.sample_count, 2);
        assert_eq!(a.windowed_average, 55.0);
        assert_eq!(a.trend, 35.0);
        assert_eq!(a.status, NodeHealth::Critical);
    }

    #[test]
    fn span_window_ignores_partly_evicted_history() {
        let engine = engine(Window::Span(Duration::from_secs(10)));
        // 128 samples 100ms apart: the current span holds the last 100, the
        // preceding span only the 28 the buffer still has
        let mut loads = vec![20.0; 28];
        loads.extend([55.0; 100]);
        feed(&engine, &loads, 100_000, 100);

        let a = engine.aggregate("n1").unwrap();
        assert_eq!(a.sample_count, 100);
        assert_eq!(a.windowed_average, 55.0);
        assert_eq!(a.trend, 0.0);
        assert_eq!(a.status, NodeHealth::Healthy);
    }

    #[test]
    fn span_window_without_history_has_no_trend() {
        let engine = engine(Window::Span(Duration::from_secs(10)));
        feed(&engine, &[40.0, 50.0], 100_000, 1000);

        let a = engine.aggregate("n1").unwrap();
        assert_eq!(a.windowed_average, 45.0);
        assert_eq!(a.trend, 0.0);
    }

    #[test]
    fn extras_are_averaged_over_samples_that_carry_them() {
        let engine = engine(Window::default());
        let node = engine.registry().buffer_for("n1").unwrap();
        {
            let mut buf = node.lock();
            buf.push(Sample::new("n1", 1, 10.0).with_extra("tps", 18000.0))
                .unwrap();
            buf.push(Sample::new("n1", 2, 10.0).with_extra("tps", 20000.0))
                .unwrap();
            buf.push(Sample::new("n1", 3, 10.0).with_extra("context", 85.0))
                .unwrap();
        }

        let a = engine.aggregate("n1").unwrap();
        assert_eq!(a.extra.get("tps"), Some(&19000.0));
        assert_eq!(a.extra.get("context"), Some(&85.0));
    }

    #[test]
    fn aggregation_does_not_mutate_and_is_deterministic() {
        let engine = engine(Window::Samples(2));
        feed(&engine, &[10.0, 20.0, 30.0, 40.0], 1000, 1000);

        let first = engine.aggregate("n1").unwrap();
        let second = engine.aggregate("n1").unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.registry().buffer_for("n1").unwrap().lock().len(), 4);
    }

    #[test]
    fn custom_thresholds() {
        let registry = Arc::new(NodeRegistry::new(16).unwrap());
        registry.register("n1");
        let thresholds = Thresholds {
            warn_load: 10.0,
            crit_load: 50.0,
            crit_trend: 5.0,
        };
        let engine = AggregationEngine::new(registry, Window::Samples(4), thresholds).unwrap();
        feed(&engine, &[20.0], 1000, 1000);
        assert_eq!(engine.aggregate("n1").unwrap().status, NodeHealth::Warning);
    }

    #[test]
    fn unknown_node() {
        let engine = engine(Window::default());
        assert!(matches!(
            engine.aggregate("ghost"),
            Err(WatchError::UnknownNode { .. })
        ));
    }

    #[test]
    fn aggregate_all_follows_node_order() {
        let engine = engine(Window::default());
        engine.registry().register("n0");
        engine.registry().register("n2");

        let ids: Vec<String> = engine
            .aggregate_all()
            .into_iter()
            .map(|a| a.node_id.0)
            .collect();
        assert_eq!(ids, ["n0", "n1", "n2"]);
    }

    #[test]
    fn window_must_fit_twice_in_buffer() {
        let registry = Arc::new(NodeRegistry::new(10).unwrap());
        let err = AggregationEngine::new(registry.clone(), Window::Samples(6), Thresholds::default())
            .unwrap_err();
        assert!(matches!(err, WatchError::InvalidConfig(_)));

        assert!(AggregationEngine::new(registry.clone(), Window::Samples(5), Thresholds::default()).is_ok());
        assert!(AggregationEngine::new(registry.clone(), Window::Samples(0), Thresholds::default()).is_err());
        assert!(AggregationEngine::new(registry, Window::Span(Duration::ZERO), Thresholds::default()).is_err());
    }
}
