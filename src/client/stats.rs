use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

/// Raw counters behind the aggregator lock
#[derive(Debug, Default, Clone)]
pub struct Statistics {
    pub total_requests: u64,
    pub success_count: u64,
    pub fail_count: u64,
    pub total_duration: Duration,
    /// `None` until the first request is recorded
    pub min_duration: Option<Duration>,
    pub max_duration: Duration,
}

impl Statistics {
    fn record(&mut self, success: bool, duration: Duration) {
        self.total_requests += 1;
        self.total_duration += duration;

        if success {
            self.success_count += 1;
        } else {
            self.fail_count += 1;
        }

        // Two independent comparisons: the first sample is both min and max.
        if self.min_duration.map_or(true, |min| duration < min) {
            self.min_duration = Some(duration);
        }
        if duration > self.max_duration {
            self.max_duration = duration;
        }
    }

    fn summary(&self) -> StatsSummary {
        let (success_rate_percent, avg_duration) = if self.total_requests > 0 {
            (
                self.success_count as f64 / self.total_requests as f64 * 100.0,
                Duration::from_nanos(
                    (self.total_duration.as_nanos() / u128::from(self.total_requests)) as u64,
                ),
            )
        } else {
            (0.0, Duration::ZERO)
        };

        StatsSummary {
            total_requests: self.total_requests,
            success_count: self.success_count,
            fail_count: self.fail_count,
            success_rate_percent,
            avg_duration,
            min_duration: self.min_duration.unwrap_or_default(),
            max_duration: self.max_duration,
        }
    }
}

/// Thread-safe request statistics shared by all generator workers
#[derive(Debug, Default)]
pub struct StatisticsAggregator {
    inner: Mutex<Statistics>,
}

impl StatisticsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished request
    pub fn record_request(&self, success: bool, duration: Duration) {
        self.inner.lock().record(success, duration);
    }

    /// Snapshot of the current counters
    pub fn summary(&self) -> StatsSummary {
        self.inner.lock().summary()
    }

    /// Snapshot and reset in one step
    pub fn take_summary(&self) -> StatsSummary {
        let mut stats = self.inner.lock();
        let summary = stats.summary();
        *stats = Statistics::default();
        summary
    }

    /// Clear all counters
    pub fn reset(&self) {
        *self.inner.lock() = Statistics::default();
    }

    /// Copy of the raw counters
    pub fn counters(&self) -> Statistics {
        self.inner.lock().clone()
    }
}

/// Summary of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSummary {
    pub total_requests: u64,
    pub success_count: u64,
    pub fail_count: u64,
    pub success_rate_percent: f64,
    #[serde(serialize_with = "as_millis")]
    pub avg_duration: Duration,
    #[serde(serialize_with = "as_millis")]
    pub min_duration: Duration,
    #[serde(serialize_with = "as_millis")]
    pub max_duration: Duration,
}

fn as_millis<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_micros() as f64 / 1000.0)
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Response Statistics ---")?;
        writeln!(f, "Total Requests:      {}", self.total_requests)?;
        writeln!(f, "Successful Requests: {}", self.success_count)?;
        writeln!(f, "Failed Requests:     {}", self.fail_count)?;
        writeln!(f, "Success Rate:        {:.2}%", self.success_rate_percent)?;
        writeln!(f, "Average Response:    {:?}", self.avg_duration)?;
        writeln!(f, "Minimum Response:    {:?}", self.min_duration)?;
        writeln!(f, "Maximum Response:    {:?}", self.max_duration)?;
        write!(f, "---------------------------")
    }
}
