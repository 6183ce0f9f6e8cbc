//! Distributed token-bucket rate limiter.
//!
//! Outstanding grants live in a sorted set scored by acquisition time;
//! every script sweeps members older than one interval before doing any
//! accounting, so tokens flow back as their window slides past. The
//! limiter holds no in-process caches: every call is one script round
//! trip.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::RngCore;

use crate::client::RedcoordClient;
use crate::error::Error;
use crate::executor::ScriptArg;
use crate::naming;
use crate::object::{HasObject, ObjectBase};
use crate::scripts;

/// Whose requests share the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateType {
    /// All clients of this limiter share one bucket.
    Overall,
    /// Each client UUID gets its own bucket.
    PerClient,
}

impl RateType {
    fn as_arg(self) -> i64 {
        match self {
            Self::Overall => 0,
            Self::PerClient => 1,
        }
    }

    fn from_field(field: &str) -> Option<Self> {
        match field {
            "0" => Some(Self::Overall),
            "1" => Some(Self::PerClient),
            _ => None,
        }
    }
}

/// A limiter's stored configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Permits per interval.
    pub rate: u64,
    /// Window length.
    pub interval: Duration,
    /// Bucket sharing mode.
    pub rate_type: RateType,
}

/// A distributed rate limiter.
///
/// Configure once with [`try_set_rate`](Self::try_set_rate) (first caller
/// wins) or forcibly with [`set_rate`](Self::set_rate), then draw permits
/// with the `try_acquire*` / `acquire*` family.
#[derive(Clone)]
pub struct RateLimiter {
    object: ObjectBase,
}

impl HasObject for RateLimiter {
    fn object(&self) -> &ObjectBase {
        &self.object
    }

    fn expire_keys(&self) -> Vec<String> {
        vec![
            self.object.raw_name.clone(),
            self.value_name(),
            self.permits_name(),
        ]
    }
}

impl RateLimiter {
    pub(crate) fn new(client: RedcoordClient, name: impl Into<String>) -> Self {
        Self {
            object: ObjectBase::new(client, name),
        }
    }

    /// The limiter's logical name.
    pub fn name(&self) -> &str {
        &self.object.name
    }

    fn value_name(&self) -> String {
        naming::suffix_name(&self.object.raw_name, "value")
    }

    fn client_value_name(&self) -> String {
        naming::suffix_name(&self.value_name(), self.object.client.id())
    }

    fn permits_name(&self) -> String {
        naming::suffix_name(&self.object.raw_name, "permits")
    }

    fn client_permits_name(&self) -> String {
        naming::suffix_name(&self.permits_name(), self.object.client.id())
    }

    // The acquire scripts receive all five candidate keys and pick the
    // pair matching the stored `type` field.
    fn acquire_keys(&self) -> Vec<String> {
        vec![
            self.object.raw_name.clone(),
            self.value_name(),
            self.client_value_name(),
            self.permits_name(),
            self.client_permits_name(),
        ]
    }

    /// Store the configuration only if none exists yet.
    ///
    /// Returns `true` iff this call performed the write; concurrent and
    /// later callers see `false` and the existing configuration stays.
    pub async fn try_set_rate(
        &self,
        mode: RateType,
        rate: u64,
        interval: Duration,
    ) -> Result<bool, Error> {
        let result = self
            .object
            .executor()
            .eval_int(
                scripts::RATE_TRY_SET,
                std::slice::from_ref(&self.object.raw_name),
                &[
                    ScriptArg::from(rate),
                    ScriptArg::Int(interval_ms(interval)),
                    ScriptArg::Int(mode.as_arg()),
                ],
            )
            .await?;
        Ok(result == 1)
    }

    /// Overwrite the configuration and reset the bucket state.
    pub async fn set_rate(
        &self,
        mode: RateType,
        rate: u64,
        interval: Duration,
    ) -> Result<(), Error> {
        self.object
            .executor()
            .eval(
                scripts::RATE_SET,
                &[
                    self.object.raw_name.clone(),
                    self.value_name(),
                    self.permits_name(),
                ],
                &[
                    ScriptArg::from(rate),
                    ScriptArg::Int(interval_ms(interval)),
                    ScriptArg::Int(mode.as_arg()),
                ],
            )
            .await?;
        Ok(())
    }

    /// Read the stored configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] when no configuration has been
    /// stored for this name.
    pub async fn get_config(&self) -> Result<RateLimiterConfig, Error> {
        let mut conn = self.object.conn().await?;
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(&self.object.raw_name)
            .query_async(&mut conn)
            .await?;
        parse_config(&self.object.name, &fields)
    }

    /// Try to take one permit without waiting.
    pub async fn try_acquire(&self) -> Result<bool, Error> {
        self.try_acquire_permits(1).await
    }

    /// Try to take `permits` permits without waiting.
    pub async fn try_acquire_permits(&self, permits: u64) -> Result<bool, Error> {
        Ok(self.try_acquire_script(permits).await?.is_none())
    }

    /// Take one permit, waiting as long as the store tells us to.
    pub async fn acquire(&self) -> Result<(), Error> {
        self.acquire_permits(1).await
    }

    /// Take `permits` permits, waiting as long as the store tells us to.
    pub async fn acquire_permits(&self, permits: u64) -> Result<(), Error> {
        self.acquire_loop(permits, None).await.map(|_| ())
    }

    /// Take one permit, waiting at most `timeout`.
    pub async fn try_acquire_with_timeout(&self, timeout: Duration) -> Result<bool, Error> {
        self.try_acquire_permits_with_timeout(1, timeout).await
    }

    /// Take `permits` permits, waiting at most `timeout`. Returns `false`
    /// when the timeout elapses before a grant.
    pub async fn try_acquire_permits_with_timeout(
        &self,
        permits: u64,
        timeout: Duration,
    ) -> Result<bool, Error> {
        self.acquire_loop(permits, Some(timeout)).await
    }

    /// Sweep expired grants and return the current available count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] when no configuration exists.
    pub async fn available_permits(&self) -> Result<u64, Error> {
        let available = self
            .object
            .executor()
            .eval_int(
                scripts::RATE_AVAILABLE,
                &self.acquire_keys(),
                &[ScriptArg::Int(now_ms())],
            )
            .await
            .map_err(|e| self.map_script_error(e))?;
        Ok(u64::try_from(available).unwrap_or(0))
    }

    /// One acquire attempt. `None` means granted; an integer is the delay
    /// in milliseconds until a retry can be useful.
    async fn try_acquire_script(&self, permits: u64) -> Result<Option<i64>, Error> {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);

        self.object
            .executor()
            .eval(
                scripts::RATE_TRY_ACQUIRE,
                &self.acquire_keys(),
                &[
                    ScriptArg::from(permits),
                    ScriptArg::Int(now_ms()),
                    ScriptArg::Str(hex::encode(nonce)),
                ],
            )
            .await
            .map_err(|e| self.map_script_error(e))
    }

    /// Retry until granted, sleeping for each store-computed delay. With a
    /// timeout the loop fails fast once the remaining wait cannot cover
    /// the next delay.
    async fn acquire_loop(&self, permits: u64, timeout: Option<Duration>) -> Result<bool, Error> {
        let start = tokio::time::Instant::now();
        loop {
            let Some(delay_ms) = self.try_acquire_script(permits).await? else {
                return Ok(true);
            };
            let delay = Duration::from_millis(u64::try_from(delay_ms).unwrap_or(0));

            let Some(timeout) = timeout else {
                tokio::time::sleep(delay).await;
                continue;
            };

            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Ok(false);
            }
            if remaining < delay {
                tokio::time::sleep(remaining).await;
                return Ok(false);
            }
            tokio::time::sleep(delay).await;
            if start.elapsed() >= timeout {
                return Ok(false);
            }
        }
    }

    // The acquire scripts signal misuse through Lua assertions; fold those
    // back into the error taxonomy.
    fn map_script_error(&self, err: Error) -> Error {
        if let Error::Redis(ref redis_err) = err {
            let message = redis_err.to_string();
            if message.contains("not initialized") {
                return Error::NotInitialized(self.object.name.clone());
            }
            if message.contains("could not exceed defined rate") {
                return Error::InvalidArgument(format!(
                    "requested permits exceed the configured rate of `{}`",
                    self.object.name
                ));
            }
        }
        err
    }
}

fn parse_config(name: &str, fields: &HashMap<String, String>) -> Result<RateLimiterConfig, Error> {
    if fields.is_empty() {
        return Err(Error::NotInitialized(name.to_string()));
    }
    let rate = fields
        .get("rate")
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| Error::UnexpectedReply("rate limiter config missing `rate`".into()))?;
    let interval = fields
        .get("interval")
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .ok_or_else(|| Error::UnexpectedReply("rate limiter config missing `interval`".into()))?;
    let rate_type = fields
        .get("type")
        .and_then(|v| RateType::from_field(v))
        .ok_or_else(|| Error::UnexpectedReply("rate limiter config missing `type`".into()))?;
    Ok(RateLimiterConfig {
        rate,
        interval,
        rate_type,
    })
}

fn interval_ms(interval: Duration) -> i64 {
    i64::try_from(interval.as_millis()).unwrap_or(i64::MAX)
}

fn now_ms() -> i64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}


#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use crate::config::RedcoordConfig;

    use super::*;

    fn test_client() -> RedcoordClient {
        let url = std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        RedcoordClient::new(&RedcoordConfig::new(url)).expect("client creation should succeed")
    }

    fn unique_name(prefix: &str) -> String {
        format!("{prefix}-{}", uuid::Uuid::new_v4())
    }

    #[tokio::test]
    async fn config_is_set_exactly_once() {
        let limiter = test_client().get_rate_limiter(unique_name("config"));

        assert!(limiter
            .try_set_rate(RateType::Overall, 10, Duration::from_secs(1))
            .await
            .expect("first try_set_rate"));
        let config = limiter.get_config().await.expect("config");
        assert_eq!(config.rate, 10);
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.rate_type, RateType::Overall);

        assert!(!limiter
            .try_set_rate(RateType::Overall, 20, Duration::from_secs(2))
            .await
            .expect("second try_set_rate"));
        let config = limiter.get_config().await.expect("config again");
        assert_eq!(config.rate, 10, "losing try_set_rate must not mutate");
    }

    #[tokio::test]
    async fn unconfigured_limiter_reports_not_initialized() {
        let limiter = test_client().get_rate_limiter(unique_name("uninit"));
        assert!(matches!(
            limiter.get_config().await,
            Err(Error::NotInitialized(_))
        ));
        assert!(matches!(
            limiter.try_acquire().await,
            Err(Error::NotInitialized(_))
        ));
        assert!(matches!(
            limiter.available_permits().await,
            Err(Error::NotInitialized(_))
        ));
    }

    #[tokio::test]
    async fn over_rate_request_is_invalid() {
        let limiter = test_client().get_rate_limiter(unique_name("over"));
        limiter
            .set_rate(RateType::Overall, 5, Duration::from_secs(1))
            .await
            .expect("set_rate");
        assert!(matches!(
            limiter.try_acquire_permits(6).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn saturation_grants_exactly_rate_permits() {
        let limiter = test_client().get_rate_limiter(unique_name("saturate"));
        limiter
            .set_rate(RateType::Overall, 5, Duration::from_secs(1))
            .await
            .expect("set_rate");

        let mut granted = 0;
        while limiter.try_acquire().await.expect("try_acquire") {
            granted += 1;
            assert!(granted <= 5, "granted more than the rate");
        }
        assert_eq!(granted, 5);
        assert!(!limiter.try_acquire().await.expect("exhausted"));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(
            limiter.available_permits().await.expect("available"),
            5,
            "the full rate returns after one interval"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn blocking_acquire_spreads_over_windows() {
        let limiter = test_client().get_rate_limiter(unique_name("blocking"));
        limiter
            .set_rate(RateType::Overall, 2, Duration::from_secs(1))
            .await
            .expect("set_rate");

        let start = tokio::time::Instant::now();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await.expect("acquire");
                start.elapsed()
            }));
        }
        let mut completions = Vec::new();
        for handle in handles {
            completions.push(handle.await.expect("task"));
        }
        completions.sort();

        assert!(completions[0] < Duration::from_secs(1), "{completions:?}");
        assert!(completions[1] < Duration::from_secs(1), "{completions:?}");
        assert!(completions[2] >= Duration::from_secs(1), "{completions:?}");
        assert!(completions[3] < Duration::from_secs(2), "{completions:?}");
    }

    #[tokio::test]
    async fn timed_acquire_gives_up_in_time() {
        let limiter = test_client().get_rate_limiter(unique_name("timed"));
        limiter
            .set_rate(RateType::Overall, 1, Duration::from_secs(5))
            .await
            .expect("set_rate");

        assert!(limiter.try_acquire().await.expect("first permit"));

        let started = tokio::time::Instant::now();
        let got = limiter
            .try_acquire_with_timeout(Duration::from_millis(300))
            .await
            .expect("timed acquire");
        assert!(!got, "bucket is empty for 5s");
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(280), "{waited:?}");
        assert!(waited < Duration::from_millis(1000), "{waited:?}");
    }

    #[tokio::test]
    async fn per_client_buckets_are_independent() {
        let name = unique_name("per-client");
        let first = test_client().get_rate_limiter(&name);
        let second = test_client().get_rate_limiter(&name);
        first
            .set_rate(RateType::PerClient, 1, Duration::from_secs(10))
            .await
            .expect("set_rate");

        assert!(first.try_acquire().await.expect("first client"));
        assert!(!first.try_acquire().await.expect("first exhausted"));
        assert!(
            second.try_acquire().await.expect("second client"),
            "each client draws from its own bucket"
        );
    }

    #[tokio::test]
    async fn set_rate_resets_the_bucket() {
        let limiter = test_client().get_rate_limiter(unique_name("reset"));
        limiter
            .set_rate(RateType::Overall, 3, Duration::from_secs(10))
            .await
            .expect("set_rate");
        assert!(limiter.try_acquire_permits(3).await.expect("drain"));
        assert!(!limiter.try_acquire().await.expect("empty"));

        limiter
            .set_rate(RateType::Overall, 3, Duration::from_secs(10))
            .await
            .expect("set_rate again");
        assert_eq!(limiter.available_permits().await.expect("available"), 3);
    }
}
