//! Environment-driven configuration.

use std::time::Duration;

use crate::batcher::BatcherConfig;
use crate::outbox::OutboxConfig;

/// Tuning for the whole core. Every value has a default suitable for a local
/// run; production deployments override via environment.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file.
    pub database_path: String,
    pub batcher: BatcherConfig,
    pub outbox: OutboxConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: "merchkit.db".to_string(),
            batcher: BatcherConfig::default(),
            outbox: OutboxConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Load from `MERCHKIT_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_path: env_string("MERCHKIT_DATABASE_PATH", defaults.database_path),
            batcher: BatcherConfig {
                flush_interval: env_millis(
                    "MERCHKIT_FLUSH_INTERVAL_MS",
                    defaults.batcher.flush_interval,
                ),
                batch_size_threshold: env_usize(
                    "MERCHKIT_BATCH_SIZE_THRESHOLD",
                    defaults.batcher.batch_size_threshold,
                ),
                max_queue_depth: env_usize(
                    "MERCHKIT_MAX_QUEUE_DEPTH",
                    defaults.batcher.max_queue_depth,
                ),
            },
            outbox: OutboxConfig {
                lease_duration: env_millis(
                    "MERCHKIT_OUTBOX_LEASE_DURATION_MS",
                    defaults.outbox.lease_duration,
                ),
                max_attempts: env_u32(
                    "MERCHKIT_OUTBOX_MAX_ATTEMPTS",
                    defaults.outbox.max_attempts,
                ),
                backoff_base: env_millis(
                    "MERCHKIT_OUTBOX_BACKOFF_BASE_MS",
                    defaults.outbox.backoff_base,
                ),
                poll_interval: env_millis(
                    "MERCHKIT_OUTBOX_POLL_INTERVAL_MS",
                    defaults.outbox.poll_interval,
                ),
                worker_count: env_usize(
                    "MERCHKIT_OUTBOX_WORKER_COUNT",
                    defaults.outbox.worker_count,
                ),
                lease_batch_size: env_usize(
                    "MERCHKIT_OUTBOX_LEASE_BATCH_SIZE",
                    defaults.outbox.lease_batch_size,
                ),
            },
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                tracing::warn!(%key, value = %raw, "ignoring unparseable duration override");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<usize>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(%key, value = %raw, "ignoring unparseable integer override");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<u32>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(%key, value = %raw, "ignoring unparseable integer override");
                default
            }
        },
        Err(_) => default,
    }
}
