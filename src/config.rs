use std::time::Duration;

/// The default watchdog lease. A held lock's key expires this long after the
/// last renewal; the watchdog renews at one third of it.
pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a [`RedcoordClient`](crate::RedcoordClient).
#[derive(Debug, Clone)]
pub struct RedcoordConfig {
    /// Redis connection URL (e.g. `redis://127.0.0.1:6379`).
    ///
    /// Use the `rediss://` scheme for TLS connections.
    pub url: String,

    /// Number of connections in the `deadpool-redis` pool.
    pub pool_size: usize,

    /// Timeout for acquiring a pooled connection.
    pub connection_timeout: Duration,

    /// Watchdog lease applied to every lock mutation. Values below 30
    /// seconds are replaced by [`DEFAULT_WATCHDOG_TIMEOUT`]; see
    /// [`effective_watchdog`](Self::effective_watchdog).
    pub watchdog_timeout: Duration,
}

impl Default for RedcoordConfig {
    fn default() -> Self {
        Self {
            url: String::from("redis://127.0.0.1:6379"),
            pool_size: 10,
            connection_timeout: Duration::from_secs(5),
            watchdog_timeout: DEFAULT_WATCHDOG_TIMEOUT,
        }
    }
}

impl RedcoordConfig {
    /// Create a configuration for the given URL with default pool settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the watchdog lease.
    #[must_use]
    pub fn watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.watchdog_timeout = timeout;
        self
    }

    /// Return the watchdog lease that will actually be used.
    ///
    /// A lease shorter than 30 seconds leaves too little room between
    /// renewals and expiry, so such values fall back to the default.
    pub fn effective_watchdog(&self) -> Duration {
        if self.watchdog_timeout < DEFAULT_WATCHDOG_TIMEOUT {
            tracing::warn!(
                configured = ?self.watchdog_timeout,
                "watchdog timeout below 30s, using the default"
            );
            return DEFAULT_WATCHDOG_TIMEOUT;
        }
        self.watchdog_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let cfg = RedcoordConfig::default();
        assert_eq!(cfg.url, "redis://127.0.0.1:6379");
        assert_eq!(cfg.pool_size, 10);
        assert_eq!(cfg.connection_timeout, Duration::from_secs(5));
        assert_eq!(cfg.watchdog_timeout, DEFAULT_WATCHDOG_TIMEOUT);
    }

    #[test]
    fn short_watchdog_falls_back_to_default() {
        let cfg = RedcoordConfig::new("redis://127.0.0.1:6379")
            .watchdog_timeout(Duration::from_secs(1));
        assert_eq!(cfg.effective_watchdog(), DEFAULT_WATCHDOG_TIMEOUT);
    }

    #[test]
    fn long_watchdog_is_kept() {
        let cfg = RedcoordConfig::default().watchdog_timeout(Duration::from_secs(45));
        assert_eq!(cfg.effective_watchdog(), Duration::from_secs(45));
    }
}
