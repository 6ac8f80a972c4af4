//! Coordinator tunables loaded from code or environment variables.

use std::time::Duration;

/// Tunables for a [`Manager`](crate::Manager) instance.
///
/// Reads from environment variables via [`ManagerOptions::from_env`]:
/// - `TCC_TIMEOUT_MS` — foreground Try-phase budget in milliseconds (default: `5000`)
/// - `TCC_MONITOR_TICK_MS` — recovery cadence in milliseconds (default: `10000`)
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Upper bound on the foreground Try phase; a component that has not
    /// replied when it elapses counts as rejected. Also the age past which
    /// recovery cancels a transaction that never completed its Try phase.
    pub timeout: Duration,

    /// Recovery monitor cadence. The store lease TTL is derived from it.
    pub monitor_tick: Duration,
}

impl ManagerOptions {
    /// Creates options with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads options from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout: std::env::var("TCC_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            monitor_tick: std::env::var("TCC_MONITOR_TICK_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.monitor_tick),
        }
    }

    /// Sets the foreground Try-phase budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the recovery monitor cadence.
    pub fn with_monitor_tick(mut self, tick: Duration) -> Self {
        self.monitor_tick = tick;
        self
    }

    /// Lease TTL handed to the store: two ticks, so a crashed holder frees
    /// the lease before it can starve recovery.
    pub(crate) fn lease_ttl(&self) -> Duration {
        self.monitor_tick * 2
    }
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            monitor_tick: Duration::from_secs(10),
        }
    }
}
