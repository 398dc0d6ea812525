use serde::{Deserialize, Serialize};

/// Ordering applied to tasks entering a worker's ready queue.
///
/// FIFO is the safe default: every woken connection makes progress before
/// any connection runs twice. LIFO favors cache-warm bursts at the price of
/// fairness. Insertion order within a single wakeup batch is preserved
/// under both policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadyPolicy {
    #[default]
    Fifo,
    Lifo,
}

/// Engine-level configuration: worker count, scheduling policy and the two
/// connection timeouts.
///
/// `read_timeout_ms` bounds a single receive while a request is in flight;
/// `keepalive_timeout_ms` bounds the idle gap between requests on a reused
/// connection. They are deliberately distinct knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub ready_policy: ReadyPolicy,
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_keepalive_timeout_ms")]
    pub keepalive_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            ready_policy: ReadyPolicy::default(),
            backlog: default_backlog(),
            read_timeout_ms: default_read_timeout_ms(),
            keepalive_timeout_ms: default_keepalive_timeout_ms(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(1)
}

fn default_backlog() -> u32 {
    1024
}

fn default_read_timeout_ms() -> u64 {
    5_000
}

fn default_keepalive_timeout_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied_to_empty_config() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.workers >= 1);
        assert_eq!(cfg.ready_policy, ReadyPolicy::Fifo);
        assert_eq!(cfg.backlog, 1024);
        assert_eq!(cfg.read_timeout_ms, 5_000);
        assert_eq!(cfg.keepalive_timeout_ms, 10_000);
    }

    #[test]
    fn ready_policy_parses_snake_case() {
        let cfg: RuntimeConfig = serde_json::from_str(r#"{"ready_policy": "lifo"}"#).unwrap();
        assert_eq!(cfg.ready_policy, ReadyPolicy::Lifo);
    }
}
