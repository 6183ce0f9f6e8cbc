//! Script evaluation.
//!
//! All hot-path state transitions go through [`ScriptExecutor::eval`],
//! which distinguishes the store's "no value" reply (`nil` from the
//! script) from integer replies. The sentinel is part of the script
//! contract and is never an error.

use deadpool_redis::{Connection, Pool};
use redis::Script;

use crate::error::Error;

/// An argument to a server-side script.
#[derive(Debug, Clone)]
pub(crate) enum ScriptArg {
    Int(i64),
    Str(String),
}

impl From<i64> for ScriptArg {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for ScriptArg {
    fn from(v: u64) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<String> for ScriptArg {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&str> for ScriptArg {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

/// Submits scripts from the fixed catalog against the shared pool.
#[derive(Clone)]
pub(crate) struct ScriptExecutor {
    pool: Pool,
}

impl ScriptExecutor {
    pub(crate) fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Obtain a connection from the pool.
    pub(crate) async fn conn(&self) -> Result<Connection, Error> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }

    /// Evaluate a script and decode its reply as `T`.
    pub(crate) async fn eval_typed<T: redis::FromRedisValue>(
        &self,
        source: &str,
        keys: &[String],
        args: &[ScriptArg],
    ) -> Result<T, Error> {
        let script = Script::new(source);
        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(key.as_str());
        }
        for arg in args {
            match arg {
                ScriptArg::Int(v) => invocation.arg(*v),
                ScriptArg::Str(v) => invocation.arg(v.as_str()),
            };
        }

        let mut conn = self.conn().await?;
        Ok(invocation.invoke_async(&mut conn).await?)
    }

    /// Evaluate a script, returning `None` for the "no value" outcome and
    /// the integer reply otherwise.
    pub(crate) async fn eval(
        &self,
        source: &str,
        keys: &[String],
        args: &[ScriptArg],
    ) -> Result<Option<i64>, Error> {
        self.eval_typed(source, keys, args).await
    }

    /// Evaluate a script whose contract always yields an integer.
    pub(crate) async fn eval_int(
        &self,
        source: &str,
        keys: &[String],
        args: &[ScriptArg],
    ) -> Result<i64, Error> {
        self.eval(source, keys, args)
            .await?
            .ok_or_else(|| Error::UnexpectedReply("script returned no value".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arg_conversions() {
        assert!(matches!(ScriptArg::from(7i64), ScriptArg::Int(7)));
        assert!(matches!(ScriptArg::from(7u64), ScriptArg::Int(7)));
        assert!(matches!(ScriptArg::from("x"), ScriptArg::Str(s) if s == "x"));
    }
}
