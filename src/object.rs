//! Shared base for every named instance.

use deadpool_redis::Connection;

use crate::client::RedcoordClient;
use crate::error::Error;
use crate::executor::ScriptExecutor;
use crate::naming;

/// What a lock, limiter, or counter has in common: the client handle, the
/// logical name, and the hash-tag-wrapped data key derived from it.
#[derive(Clone)]
pub(crate) struct ObjectBase {
    pub(crate) client: RedcoordClient,
    pub(crate) name: String,
    pub(crate) raw_name: String,
}

impl ObjectBase {
    pub(crate) fn new(client: RedcoordClient, name: impl Into<String>) -> Self {
        let name = name.into();
        let raw_name = naming::wrap(&name);
        Self {
            client,
            name,
            raw_name,
        }
    }

    pub(crate) fn executor(&self) -> &ScriptExecutor {
        self.client.executor()
    }

    pub(crate) async fn conn(&self) -> Result<Connection, Error> {
        self.executor().conn().await
    }
}

/// Implemented by every public instance type; gives the blanket
/// [`Expirable`](crate::Expirable) implementation access to the key family.
pub(crate) trait HasObject {
    fn object(&self) -> &ObjectBase;

    /// The keys an expiry applies to. Most instances own a single data
    /// key; the rate limiter overrides this with its whole family.
    fn expire_keys(&self) -> Vec<String> {
        vec![self.object().raw_name.clone()]
    }
}
