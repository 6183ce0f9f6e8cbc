use std::sync::Arc;
use std::time::Duration;

use deadpool_redis::{Config, Runtime};
use uuid::Uuid;

use crate::atomic::{AtomicDouble, AtomicLong};
use crate::bitset::BitSet;
use crate::config::RedcoordConfig;
use crate::error::Error;
use crate::executor::ScriptExecutor;
use crate::lock::{Mutex, ReadWriteLock, ReentrantLock};
use crate::ratelimiter::RateLimiter;
use crate::watchdog::RenewalRegistry;

/// Process-wide handle to the store.
///
/// Owns the connection pool, a stable client UUID that prefixes every
/// owner tag minted by this process, and the watchdog lease shared by all
/// locks. Cloning is cheap; all clones share the same identity, pool, and
/// renewal registry.
#[derive(Clone)]
pub struct RedcoordClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    executor: ScriptExecutor,
    client: redis::Client,
    id: String,
    watchdog_timeout: Duration,
    renewals: RenewalRegistry,
}

impl RedcoordClient {
    /// Create a client from the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the pool cannot be created and
    /// [`Error::Redis`] if the URL is malformed.
    pub fn new(config: &RedcoordConfig) -> Result<Self, Error> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| Error::Connection(e.to_string()))?
            .map_err(|e| Error::Connection(e.to_string()))?;

        // Pub/sub subscriptions need their own connections outside the pool.
        let client = redis::Client::open(config.url.as_str())?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                executor: ScriptExecutor::new(pool),
                client,
                id: Uuid::new_v4().to_string(),
                watchdog_timeout: config.effective_watchdog(),
                renewals: RenewalRegistry::new(),
            }),
        })
    }

    /// The process-wide client UUID.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub(crate) fn executor(&self) -> &ScriptExecutor {
        &self.inner.executor
    }

    pub(crate) fn watchdog_timeout(&self) -> Duration {
        self.inner.watchdog_timeout
    }

    pub(crate) fn renewals(&self) -> &RenewalRegistry {
        &self.inner.renewals
    }

    /// Open a dedicated pub/sub connection.
    pub(crate) async fn subscriber(&self) -> Result<redis::aio::PubSub, Error> {
        Ok(self.inner.client.get_async_pubsub().await?)
    }

    /// A reentrant distributed lock named `name`.
    ///
    /// The same task may acquire it repeatedly; it becomes free once every
    /// acquisition has been matched by an unlock.
    pub fn get_lock(&self, name: impl Into<String>) -> ReentrantLock {
        ReentrantLock::new(self.clone(), name)
    }

    /// A non-reentrant mutex named `name`.
    ///
    /// A second acquisition from the holding task blocks like any other
    /// contender, mirroring an in-process mutex.
    pub fn get_mutex(&self, name: impl Into<String>) -> Mutex {
        Mutex::new(self.clone(), name)
    }

    /// A read/write lock named `name`.
    pub fn get_read_write_lock(&self, name: impl Into<String>) -> ReadWriteLock {
        ReadWriteLock::new(self.clone(), name)
    }

    /// A distributed rate limiter named `name`.
    pub fn get_rate_limiter(&self, name: impl Into<String>) -> RateLimiter {
        RateLimiter::new(self.clone(), name)
    }

    /// A distributed integer counter named `name`.
    pub fn get_atomic_long(&self, name: impl Into<String>) -> AtomicLong {
        AtomicLong::new(self.clone(), name)
    }

    /// A distributed float counter named `name`.
    pub fn get_atomic_double(&self, name: impl Into<String>) -> AtomicDouble {
        AtomicDouble::new(self.clone(), name)
    }

    /// A distributed bit field named `name`.
    pub fn get_bit_set(&self, name: impl Into<String>) -> BitSet {
        BitSet::new(self.clone(), name)
    }
}
