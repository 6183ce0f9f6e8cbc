//! Distributed atomic counters.
//!
//! Thin wrappers over `INCRBY` / `INCRBYFLOAT` plus a small script pair
//! for compare-and-set and read-and-delete. A missing key reads as zero.

use redis::AsyncCommands;

use crate::client::RedcoordClient;
use crate::error::Error;
use crate::executor::ScriptArg;
use crate::object::{HasObject, ObjectBase};
use crate::scripts;

/// A distributed `i64` counter.
#[derive(Clone)]
pub struct AtomicLong {
    object: ObjectBase,
}

impl HasObject for AtomicLong {
    fn object(&self) -> &ObjectBase {
        &self.object
    }
}

impl AtomicLong {
    pub(crate) fn new(client: RedcoordClient, name: impl Into<String>) -> Self {
        Self {
            object: ObjectBase::new(client, name),
        }
    }

    /// Current value; zero when the key does not exist.
    pub async fn get(&self) -> Result<i64, Error> {
        let mut conn = self.object.conn().await?;
        let value: Option<i64> = conn.get(&self.object.raw_name).await?;
        Ok(value.unwrap_or(0))
    }

    pub async fn set(&self, value: i64) -> Result<(), Error> {
        let mut conn = self.object.conn().await?;
        let () = conn.set(&self.object.raw_name, value).await?;
        Ok(())
    }

    pub async fn add_and_get(&self, delta: i64) -> Result<i64, Error> {
        let mut conn = self.object.conn().await?;
        Ok(conn.incr(&self.object.raw_name, delta).await?)
    }

    pub async fn increment_and_get(&self) -> Result<i64, Error> {
        self.add_and_get(1).await
    }

    pub async fn decrement_and_get(&self) -> Result<i64, Error> {
        self.add_and_get(-1).await
    }

    pub async fn get_and_add(&self, delta: i64) -> Result<i64, Error> {
        let new = self.add_and_get(delta).await?;
        Ok(new - delta)
    }

    pub async fn get_and_increment(&self) -> Result<i64, Error> {
        self.get_and_add(1).await
    }

    pub async fn get_and_decrement(&self) -> Result<i64, Error> {
        self.get_and_add(-1).await
    }

    /// Swap in `value` and return the previous value.
    pub async fn get_and_set(&self, value: i64) -> Result<i64, Error> {
        let mut conn = self.object.conn().await?;
        let old: Option<i64> = conn.getset(&self.object.raw_name, value).await?;
        Ok(old.unwrap_or(0))
    }

    /// Read and delete in one step.
    pub async fn get_and_delete(&self) -> Result<i64, Error> {
        let old: Option<i64> = self
            .object
            .executor()
            .eval(
                scripts::ATOMIC_GET_AND_DELETE,
                std::slice::from_ref(&self.object.raw_name),
                &[],
            )
            .await?;
        Ok(old.unwrap_or(0))
    }

    /// Set `update` iff the current value equals `expect`. An absent key
    /// compares equal to zero.
    pub async fn compare_and_set(&self, expect: i64, update: i64) -> Result<bool, Error> {
        let swapped = self
            .object
            .executor()
            .eval_int(
                scripts::ATOMIC_LONG_CAS,
                std::slice::from_ref(&self.object.raw_name),
                &[ScriptArg::Int(expect), ScriptArg::Int(update)],
            )
            .await?;
        Ok(swapped == 1)
    }
}

/// A distributed `f64` counter.
#[derive(Clone)]
pub struct AtomicDouble {
    object: ObjectBase,
}

impl HasObject for AtomicDouble {
    fn object(&self) -> &ObjectBase {
        &self.object
    }
}

impl AtomicDouble {
    pub(crate) fn new(client: RedcoordClient, name: impl Into<String>) -> Self {
        Self {
            object: ObjectBase::new(client, name),
        }
    }

    /// Current value; zero when the key does not exist.
    pub async fn get(&self) -> Result<f64, Error> {
        let mut conn = self.object.conn().await?;
        let value: Option<f64> = conn.get(&self.object.raw_name).await?;
        Ok(value.unwrap_or(0.0))
    }

    pub async fn set(&self, value: f64) -> Result<(), Error> {
        let mut conn = self.object.conn().await?;
        let () = conn.set(&self.object.raw_name, value).await?;
        Ok(())
    }

    pub async fn add_and_get(&self, delta: f64) -> Result<f64, Error> {
        let mut conn = self.object.conn().await?;
        Ok(conn.incr(&self.object.raw_name, delta).await?)
    }

    pub async fn increment_and_get(&self) -> Result<f64, Error> {
        self.add_and_get(1.0).await
    }

    pub async fn decrement_and_get(&self) -> Result<f64, Error> {
        self.add_and_get(-1.0).await
    }

    pub async fn get_and_add(&self, delta: f64) -> Result<f64, Error> {
        let new = self.add_and_get(delta).await?;
        Ok(new - delta)
    }

    pub async fn get_and_increment(&self) -> Result<f64, Error> {
        self.get_and_add(1.0).await
    }

    pub async fn get_and_decrement(&self) -> Result<f64, Error> {
        self.get_and_add(-1.0).await
    }

    /// Swap in `value` and return the previous value.
    pub async fn get_and_set(&self, value: f64) -> Result<f64, Error> {
        let mut conn = self.object.conn().await?;
        let old: Option<f64> = conn.getset(&self.object.raw_name, value).await?;
        Ok(old.unwrap_or(0.0))
    }

    /// Read and delete in one step.
    pub async fn get_and_delete(&self) -> Result<f64, Error> {
        let old: Option<f64> = self
            .object
            .executor()
            .eval_typed(
                scripts::ATOMIC_GET_AND_DELETE,
                std::slice::from_ref(&self.object.raw_name),
                &[],
            )
            .await?;
        Ok(old.unwrap_or(0.0))
    }

    /// Set `update` iff the current value compares numerically equal to
    /// `expect`. An absent key compares equal to zero.
    pub async fn compare_and_set(&self, expect: f64, update: f64) -> Result<bool, Error> {
        let swapped = self
            .object
            .executor()
            .eval_int(
                scripts::ATOMIC_DOUBLE_CAS,
                std::slice::from_ref(&self.object.raw_name),
                &[
                    ScriptArg::Str(expect.to_string()),
                    ScriptArg::Str(update.to_string()),
                ],
            )
            .await?;
        Ok(swapped == 1)
    }
}
