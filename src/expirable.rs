//! TTL management shared by all named instances.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::error::Error;
use crate::executor::ScriptArg;
use crate::object::HasObject;
use crate::scripts;

/// Expiry operations available on every named instance.
///
/// Expiring a lock or rate limiter removes its state once the TTL lapses;
/// the instance can be used again afterwards and will re-create its keys.
#[async_trait]
pub trait Expirable {
    /// Set a relative expiry on the instance's keys. Returns `true` if at
    /// least one key accepted it.
    async fn expire(&self, ttl: Duration) -> Result<bool, Error>;

    /// Set an absolute expiry on the instance's keys.
    async fn expire_at(&self, deadline: SystemTime) -> Result<bool, Error>;

    /// Remove any expiry. Returns `true` if at least one key had one.
    async fn clear_expire(&self) -> Result<bool, Error>;

    /// Remaining time to live of the instance's data key, or `None` when
    /// no expiry is set or the key does not exist.
    async fn remain_time_to_live(&self) -> Result<Option<Duration>, Error>;
}

#[async_trait]
impl<T> Expirable for T
where
    T: HasObject + Send + Sync,
{
    async fn expire(&self, ttl: Duration) -> Result<bool, Error> {
        let ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let result = self
            .object()
            .executor()
            .eval_int(scripts::EXPIRE, &self.expire_keys(), &[ScriptArg::Int(ms)])
            .await?;
        Ok(result == 1)
    }

    async fn expire_at(&self, deadline: SystemTime) -> Result<bool, Error> {
        let at_ms = deadline
            .duration_since(UNIX_EPOCH)
            .map_err(|_| Error::InvalidArgument("expiry before the Unix epoch".into()))?
            .as_millis();
        let at_ms = i64::try_from(at_ms).unwrap_or(i64::MAX);
        let result = self
            .object()
            .executor()
            .eval_int(
                scripts::EXPIRE_AT,
                &self.expire_keys(),
                &[ScriptArg::Int(at_ms)],
            )
            .await?;
        Ok(result == 1)
    }

    async fn clear_expire(&self) -> Result<bool, Error> {
        let result = self
            .object()
            .executor()
            .eval_int(scripts::CLEAR_EXPIRE, &self.expire_keys(), &[])
            .await?;
        Ok(result == 1)
    }

    async fn remain_time_to_live(&self) -> Result<Option<Duration>, Error> {
        let mut conn = self.object().conn().await?;
        let ttl_ms: i64 = redis::cmd("PTTL")
            .arg(&self.object().raw_name)
            .query_async(&mut conn)
            .await?;
        if ttl_ms < 0 {
            return Ok(None);
        }
        Ok(Some(Duration::from_millis(ttl_ms.unsigned_abs())))
    }
}
