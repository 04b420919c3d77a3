//! Engine configuration.
//!
//! Settings are constructed once and injected at [`crate::Engine`] startup;
//! there is no global mutable configuration state. [`EngineConfig::from_env`]
//! is offered for operators who want environment-variable wiring, but the
//! struct itself is the only thing the engine ever reads from.

use std::time::Duration;

/// Tunables for the dispatch engine. All fields have sane defaults; override
/// only what you need.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Name of the ordered-set key holding deadlines.
    pub timeline_key: String,
    /// Name of the hash key holding payload bytes.
    pub payloads_key: String,
    /// Separator joining `topic` and `timer_id` inside the compound key.
    pub separator: String,
    /// Idle sleep between polls when the last batch was short.
    pub poll_interval: Duration,
    /// Max timers fetched per poll.
    pub batch_size: usize,
    /// Max concurrent dispatch tasks.
    pub concurrency: usize,
    /// TTL on the per-timer write lock.
    pub timer_lock_ttl: Duration,
    /// TTL on the per-timer dispatch lease.
    pub consume_lease_ttl: Duration,
    /// How long `set_timer`/`remove_timer` wait for the timer lock.
    pub lock_acquire_timeout: Duration,
    /// Time between the stop signal and forced cancellation.
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeline_key: "timers_timeline".to_string(),
            payloads_key: "timers_payloads".to_string(),
            separator: "--".to_string(),
            poll_interval: Duration::from_secs(1),
            batch_size: 128,
            concurrency: 64,
            timer_lock_ttl: Duration::from_secs(5),
            consume_lease_ttl: Duration::from_secs(30),
            lock_acquire_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl EngineConfig {
    /// Build a configuration from environment variables, falling back to
    /// [`EngineConfig::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            timeline_key: std::env::var("TIMER_ENGINE_TIMELINE_KEY")
                .unwrap_or(defaults.timeline_key),
            payloads_key: std::env::var("TIMER_ENGINE_PAYLOADS_KEY")
                .unwrap_or(defaults.payloads_key),
            separator: std::env::var("TIMER_ENGINE_SEPARATOR").unwrap_or(defaults.separator),
            poll_interval: std::env::var("TIMER_ENGINE_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            batch_size: std::env::var("TIMER_ENGINE_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.batch_size),
            concurrency: std::env::var("TIMER_ENGINE_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.concurrency),
            timer_lock_ttl: std::env::var("TIMER_ENGINE_TIMER_LOCK_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.timer_lock_ttl),
            consume_lease_ttl: std::env::var("TIMER_ENGINE_CONSUME_LEASE_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.consume_lease_ttl),
            lock_acquire_timeout: std::env::var("TIMER_ENGINE_LOCK_ACQUIRE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_acquire_timeout),
            shutdown_grace: std::env::var("TIMER_ENGINE_SHUTDOWN_GRACE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.shutdown_grace),
        }
    }
}
