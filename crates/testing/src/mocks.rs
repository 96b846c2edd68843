//! Mock implementations of the metrics sink.
//!
//! Provides an in-memory sink capturing every timing sample for assertions.

use grpc_statsd::TimingSink;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// One timing sample as received by a sink
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTiming {
    pub name: String,
    pub duration: Duration,
    pub tags: Vec<String>,
    pub sample_rate: f64,
}

impl RecordedTiming {
    /// Value of the tag with the given key, e.g. `tag("grpc.code")`
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.iter().find_map(|tag| {
            tag.split_once(':')
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v)
        })
    }
}

/// Mock sink recording every timing sample
#[derive(Clone)]
pub struct RecordingSink {
    pub timings: Arc<RwLock<Vec<RecordedTiming>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            timings: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Shared handle suitable for the interceptor constructors
    pub fn handle(&self) -> Option<Arc<dyn TimingSink>> {
        Some(Arc::new(self.clone()))
    }

    pub fn get_timings(&self) -> Vec<RecordedTiming> {
        self.timings.read().clone()
    }

    pub fn last(&self) -> Option<RecordedTiming> {
        self.timings.read().last().cloned()
    }

    pub fn timing_count(&self) -> usize {
        self.timings.read().len()
    }

    pub fn clear(&self) {
        self.timings.write().clear();
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingSink for RecordingSink {
    fn timing(&self, name: &str, duration: Duration, tags: &[String], sample_rate: f64) {
        self.timings.write().push(RecordedTiming {
            name: name.to_string(),
            duration,
            tags: tags.to_vec(),
            sample_rate,
        });
    }
}
