use async_trait::async_trait;

use crate::client::RedcoordClient;
use crate::error::Error;
use crate::executor::ScriptArg;
use crate::naming;
use crate::object::{HasObject, ObjectBase};
use crate::scripts;

use super::{InnerLock, LockBase, UNLOCK_MESSAGE};

/// A non-reentrant distributed mutex.
///
/// Unlike [`ReentrantLock`](super::ReentrantLock), a second acquisition by
/// the holding task does not succeed; it waits like any other contender.
/// This mirrors the behaviour of an in-process mutex.
#[derive(Clone)]
pub struct Mutex {
    base: LockBase,
}

impl Mutex {
    pub(crate) fn new(client: RedcoordClient, name: impl Into<String>) -> Self {
        Self {
            base: LockBase::new(client, name, None),
        }
    }

    /// The mutex's logical name.
    pub fn name(&self) -> &str {
        &self.base.object.name
    }
}

impl HasObject for Mutex {
    fn object(&self) -> &ObjectBase {
        &self.base.object
    }
}

#[async_trait]
impl InnerLock for Mutex {
    fn base(&self) -> &LockBase {
        &self.base
    }

    fn channel_name(&self) -> String {
        naming::prefix_name("redisson_mutex__channel", &self.base.object.name)
    }

    fn renew_script(&self) -> &'static str {
        scripts::MUTEX_RENEW
    }

    async fn try_lock_inner(&self, task_id: u64) -> Result<Option<i64>, Error> {
        self.base
            .eval(
                scripts::MUTEX_TRY_ACQUIRE,
                std::slice::from_ref(&self.base.object.raw_name),
                &[
                    ScriptArg::Int(self.base.lease_ms()),
                    ScriptArg::Str(self.base.owner_tag(task_id)),
                ],
            )
            .await
    }

    async fn unlock_inner(&self, task_id: u64) -> Result<Option<i64>, Error> {
        self.base
            .eval(
                scripts::MUTEX_UNLOCK,
                &[self.base.object.raw_name.clone(), self.channel_name()],
                &[
                    ScriptArg::Int(UNLOCK_MESSAGE),
                    ScriptArg::Int(self.base.lease_ms()),
                    ScriptArg::Str(self.base.owner_tag(task_id)),
                ],
            )
            .await
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use std::time::Duration;

    use crate::config::RedcoordConfig;
    use crate::lock::Lock;

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
    async fn is_not_reentrant() {
        let client = test_client();
        let mutex = client.get_mutex(unique_name("mutex"));

        mutex.lock().await.expect("first acquisition");
        assert!(
            !mutex.try_lock().await.expect("try"),
            "the holding task must not re-enter"
        );
        let err = mutex
            .lock_with_timeout(Duration::from_millis(200))
            .await
            .expect_err("re-acquisition must time out");
        assert!(matches!(err, Error::ObtainLockTimeout(_)));

        mutex.unlock().await.expect("unlock");
        assert!(mutex.try_lock().await.expect("reacquire after unlock"));
        mutex.unlock().await.expect("cleanup");
    }

    #[tokio::test]
    async fn unlock_by_non_owner_is_rejected() {
        let client = test_client();
        let name = unique_name("mutex-owner");
        let mutex = client.get_mutex(&name);
        mutex.lock().await.expect("lock");

        let stranger = test_client().get_mutex(&name);
        let err = stranger.unlock().await.expect_err("must fail");
        assert!(matches!(err, Error::NotLockedByCurrentOwner { .. }));

        mutex.unlock().await.expect("cleanup");
    }

    #[tokio::test]
    async fn handoff_between_clients() {
        let name = unique_name("mutex-handoff");
        let first = test_client().get_mutex(&name);
        first.lock().await.expect("lock");

        let second = test_client().get_mutex(&name);
        let waiter = tokio::spawn(async move {
            second.lock().await.expect("lock after release");
            second.unlock().await.expect("unlock");
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        first.unlock().await.expect("release");
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("handoff within bounds")
            .expect("waiter");
    }
}
