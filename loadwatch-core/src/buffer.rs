//! Fixed-capacity ring buffer of a node's most recent samples.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use loadwatch_types::Sample;

use crate::error::{Result, WatchError};

/// Default number of samples retained per node.
pub const DEFAULT_CAPACITY: usize = 128;

/// The most recent samples for one node, oldest first.
///
/// Invariants: timestamps are non-decreasing from front to back, and the
/// length never exceeds the capacity. When full, pushing evicts the oldest
/// sample.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    capacity: NonZeroUsize,
}

impl SampleBuffer {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.get()),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one if the buffer is full.
    ///
    /// Fails with `OutOfOrderSample` and leaves the buffer untouched if the
    /// sample is strictly older than the newest stored sample. Equal
    /// timestamps are accepted.
    pub fn push(&mut self, sample: Sample) -> Result<()> {
        if let Some(last) = self.samples.back() {
            if sample.timestamp_ms < last.timestamp_ms {
                return Err(WatchError::OutOfOrderSample {
                    node_id: sample.node_id,
                    timestamp_ms: sample.timestamp_ms,
                    last_timestamp_ms: last.timestamp_ms,
                });
            }
        }

        if self.samples.len() == self.capacity.get() {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        Ok(())
    }

    /// Copy of the last `k` samples (fewer if not that many), in time order.
    pub fn recent(&self, k: usize) -> Vec<Sample> {
        let skip = self.samples.len().saturating_sub(k);
        self.samples.iter().skip(skip).cloned().collect()
    }

    /// Iterate over buffered samples, oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Sample> + ExactSizeIterator {
        self.samples.iter()
    }

    /// Newest sample, if any.
    pub fn last(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}
