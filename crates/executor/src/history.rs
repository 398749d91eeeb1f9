//! Completed-call records and aggregate performance counters.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// One terminal tool-call outcome. Exactly one record exists per `execute`
/// invocation, regardless of how many attempts it took.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub tool: String,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub attempts: u32,
    pub success: bool,
    /// Taxonomy label when the call failed.
    pub error_kind: Option<&'static str>,
}

/// Aggregate counters over all recorded calls, maintained incrementally so
/// reads never walk the ring buffer.
#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    pub total_calls: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub total_duration: Duration,
    pub min_duration: Option<Duration>,
    pub max_duration: Option<Duration>,
}

impl PerformanceMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.total_calls as f64
    }

    pub fn average_duration(&self) -> Option<Duration> {
        if self.total_calls == 0 {
            return None;
        }
        Some(self.total_duration / self.total_calls as u32)
    }

    fn observe(&mut self, record: &CallRecord) {
        self.total_calls += 1;
        if record.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.total_duration += record.duration;
        self.min_duration = Some(match self.min_duration {
            Some(min) => min.min(record.duration),
            None => record.duration,
        });
        self.max_duration = Some(match self.max_duration {
            Some(max) => max.max(record.duration),
            None => record.duration,
        });
    }
}

struct Inner {
    records: VecDeque<CallRecord>,
    metrics: PerformanceMetrics,
}

/// Bounded ring of [`CallRecord`]s plus running [`PerformanceMetrics`].
/// Metrics cover every call ever recorded, not just those still in the ring.
pub struct CallHistory {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl CallHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                records: VecDeque::with_capacity(capacity.min(64)),
                metrics: PerformanceMetrics::default(),
            }),
        }
    }

    pub fn record(&self, record: CallRecord) {
        let mut inner = self.inner.lock();
        inner.metrics.observe(&record);
        if self.capacity == 0 {
            return;
        }
        if inner.records.len() == self.capacity {
            inner.records.pop_front();
        }
        inner.records.push_back(record);
    }

    /// Snapshot of retained records, oldest first.
    pub fn records(&self) -> Vec<CallRecord> {
        self.inner.lock().records.iter().cloned().collect()
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.inner.lock().metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tool: &str, success: bool, ms: u64) -> CallRecord {
        CallRecord {
            tool: tool.into(),
            started_at: Utc::now(),
            duration: Duration::from_millis(ms),
            attempts: 1,
            success,
            error_kind: if success { None } else { Some("execution_error") },
        }
    }

    #[test]
    fn ring_evicts_oldest() {
        let history = CallHistory::new(2);
        history.record(record("a", true, 1));
        history.record(record("b", true, 2));
        history.record(record("c", true, 3));

        let records = history.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tool, "b");
        assert_eq!(records[1].tool, "c");

        // Metrics still count the evicted call.
        assert_eq!(history.metrics().total_calls, 3);
    }

    #[test]
    fn metrics_track_min_max_and_rate() {
        let history = CallHistory::new(10);
        history.record(record("a", true, 10));
        history.record(record("b", false, 30));
        history.record(record("c", true, 20));

        let m = history.metrics();
        assert_eq!(m.total_calls, 3);
        assert_eq!(m.succeeded, 2);
        assert_eq!(m.failed, 1);
        assert_eq!(m.min_duration, Some(Duration::from_millis(10)));
        assert_eq!(m.max_duration, Some(Duration::from_millis(30)));
        assert_eq!(m.average_duration(), Some(Duration::from_millis(20)));
        assert!((m.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_metrics() {
        let history = CallHistory::new(10);
        let m = history.metrics();
        assert_eq!(m.total_calls, 0);
        assert_eq!(m.success_rate(), 0.0);
        assert_eq!(m.average_duration(), None);
        assert_eq!(m.min_duration, None);
    }
}
