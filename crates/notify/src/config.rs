use std::time::Duration;

/// Dispatcher tuning loaded from environment variables.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Time between poll ticks (default: 30s).
    pub interval: Duration,
    /// Maximum due entries handled per tick (default: 100).
    pub batch_limit: i64,
    /// Minimum time between recurring-event rollover sweeps (default: 1h).
    pub rollover_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            batch_limit: 100,
            rollover_interval: Duration::from_secs(3600),
        }
    }
}

impl DispatcherConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// | Env var                  | Default |
    /// |--------------------------|---------|
    /// | `DISPATCH_INTERVAL_SECS` | `30`    |
    /// | `DISPATCH_BATCH_LIMIT`   | `100`   |
    /// | `ROLLOVER_INTERVAL_SECS` | `3600`  |
    ///
    /// Zero values are ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let interval = std::env::var("DISPATCH_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.interval);

        let batch_limit = std::env::var("DISPATCH_BATCH_LIMIT")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.batch_limit);

        let rollover_interval = std::env::var("ROLLOVER_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.rollover_interval);

        Self {
            interval,
            batch_limit,
            rollover_interval,
        }
    }
}
