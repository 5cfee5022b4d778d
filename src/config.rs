use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Upper bound on worker threads per pool.
pub const MAX_THREADS: usize = 5;

/// Upper bound on queued tasks per pool.
pub const MAX_QUEUE_SIZE: usize = 1500;

/// Sizing for a [`WorkerPool`](crate::WorkerPool).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub threads: usize,
    /// Number of queued tasks at which producers start to block.
    pub max_queue_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get().min(MAX_THREADS),
            max_queue_size: MAX_QUEUE_SIZE,
        }
    }
}

impl PoolConfig {
    /// Returns a copy with both limits forced into their supported ranges.
    pub fn clamped(self) -> Self {
        Self {
            threads: self.threads.clamp(1, MAX_THREADS),
            max_queue_size: self.max_queue_size.clamp(1, MAX_QUEUE_SIZE),
        }
    }

    /// Loads a configuration from a JSON file. Missing fields take their
    /// default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_to_supported_range() {
        let config = PoolConfig {
            threads: 12,
            max_queue_size: 10_000,
        }
        .clamped();
        assert_eq!(config.threads, MAX_THREADS);
        assert_eq!(config.max_queue_size, MAX_QUEUE_SIZE);

        let config = PoolConfig {
            threads: 0,
            max_queue_size: 0,
        }
        .clamped();
        assert_eq!(config.threads, 1);
        assert_eq!(config.max_queue_size, 1);
    }

    #[test]
    fn default_respects_thread_limit() {
        let config = PoolConfig::default();
        assert!(config.threads >= 1 && config.threads <= MAX_THREADS);
        assert_eq!(config.max_queue_size, MAX_QUEUE_SIZE);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: PoolConfig = serde_json::from_str(r#"{"max_queue_size": 3}"#).unwrap();
        assert_eq!(config.max_queue_size, 3);
        assert_eq!(config.threads, PoolConfig::default().threads);
    }
}
