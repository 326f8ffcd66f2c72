//! Outbox types and retry policy.

pub mod processor;

use core::str::FromStr;
use std::time::Duration;

pub use processor::OutboxProcessor;

/// Lifecycle of an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Inflight,
    Delivered,
    Dead,
}

impl OutboxStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Inflight => "inflight",
            OutboxStatus::Delivered => "delivered",
            OutboxStatus::Dead => "dead",
        }
    }
}

impl core::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OutboxStatus::Pending),
            "inflight" => Ok(OutboxStatus::Inflight),
            "delivered" => Ok(OutboxStatus::Delivered),
            "dead" => Ok(OutboxStatus::Dead),
            other => Err(format!("unknown outbox status: {other}")),
        }
    }
}

/// Outbox processor tuning.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// How long a leased row stays invisible to other workers.
    pub lease_duration: Duration,
    /// Delivery attempts before an entry is dead-lettered.
    pub max_attempts: u32,
    /// Base of the exponential retry backoff.
    pub backoff_base: Duration,
    /// Worker idle sleep between empty polls.
    pub poll_interval: Duration,
    pub worker_count: usize,
    /// Rows leased per poll; bounds concurrent external deliveries.
    pub lease_batch_size: usize,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(30),
            max_attempts: 5,
            backoff_base: Duration::from_millis(500),
            poll_interval: Duration::from_millis(250),
            worker_count: 2,
            lease_batch_size: 16,
        }
    }
}

const MAX_BACKOFF: Duration = Duration::from_secs(60);
const JITTER: f64 = 0.1;

/// Exponential backoff with deterministic jitter.
///
/// `attempt` is 1-indexed (the attempt that just failed).
pub(crate) fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_ms = base.as_millis() as f64;
    let max_ms = MAX_BACKOFF.as_millis() as f64;
    let exp = 2_f64.powi((attempt - 1).min(20) as i32);
    let delay_ms = (base_ms * exp).min(max_ms);

    // Deterministic "jitter" keyed on the attempt number.
    let pseudo_random = ((attempt as f64 * 17.0) % 100.0) / 100.0;
    let jitter = delay_ms * JITTER * (pseudo_random - 0.5) * 2.0;

    Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
}
