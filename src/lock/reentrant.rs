use async_trait::async_trait;

use crate::client::RedcoordClient;
use crate::error::Error;
use crate::executor::ScriptArg;
use crate::naming;
use crate::object::{HasObject, ObjectBase};
use crate::scripts;

use super::{InnerLock, LockBase, UNLOCK_MESSAGE};

/// A reentrant distributed lock.
///
/// The holding task may acquire it again; each acquisition increments a
/// per-owner counter in the store and must be matched by an
/// [`unlock`](super::Lock::unlock) before the lock becomes available to
/// other owners.
#[derive(Clone)]
pub struct ReentrantLock {
    base: LockBase,
}

impl ReentrantLock {
    pub(crate) fn new(client: RedcoordClient, name: impl Into<String>) -> Self {
        Self {
            base: LockBase::new(client, name, None),
        }
    }

    /// The lock's logical name.
    pub fn name(&self) -> &str {
        &self.base.object.name
    }
}

impl HasObject for ReentrantLock {
    fn object(&self) -> &ObjectBase {
        &self.base.object
    }
}

#[async_trait]
impl InnerLock for ReentrantLock {
    fn base(&self) -> &LockBase {
        &self.base
    }

    fn channel_name(&self) -> String {
        naming::prefix_name("redisson_lock__channel", &self.base.object.name)
    }

    fn renew_script(&self) -> &'static str {
        scripts::LOCK_RENEW
    }

    async fn try_lock_inner(&self, task_id: u64) -> Result<Option<i64>, Error> {
        self.base
            .eval(
                scripts::LOCK_TRY_ACQUIRE,
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
                scripts::LOCK_UNLOCK,
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
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
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

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn mutual_exclusion_under_contention() {
        let client = test_client();
        let name = unique_name("contended");
        let counter = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let lock = client.get_lock(&name);
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    lock.lock().await.expect("lock");
                    let seen = counter.load(Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    counter.store(seen + 1, Ordering::SeqCst);
                    lock.unlock().await.expect("unlock");
                }
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }

        assert_eq!(counter.load(Ordering::SeqCst), 500);
    }

    #[tokio::test]
    async fn reentrant_acquisition_needs_matching_unlocks() {
        let client = test_client();
        let name = unique_name("reentrant");
        let lock = client.get_lock(&name);

        lock.lock().await.expect("first");
        lock.lock().await.expect("second");
        lock.lock().await.expect("third");

        let other = test_client().get_lock(&name);
        assert!(!other.try_lock().await.expect("try"), "held three deep");

        lock.unlock().await.expect("unlock 1");
        lock.unlock().await.expect("unlock 2");
        assert!(!other.try_lock().await.expect("try"), "still held one deep");

        lock.unlock().await.expect("unlock 3");
        assert!(other.try_lock().await.expect("try"), "fully released");
        other.unlock().await.expect("cleanup");
    }

    #[tokio::test]
    async fn unlock_without_lock_is_rejected() {
        let client = test_client();
        let lock = client.get_lock(unique_name("never-held"));
        let err = lock.unlock().await.expect_err("must fail");
        assert!(matches!(err, Error::NotLockedByCurrentOwner { .. }));
    }

    #[tokio::test]
    async fn release_wakes_a_blocked_waiter() {
        let client_a = test_client();
        let client_b = test_client();
        let name = unique_name("handoff");

        let lock_a = client_a.get_lock(&name);
        lock_a.lock().await.expect("lock A");

        let lock_b = client_b.get_lock(&name);
        let waiter = tokio::spawn(async move {
            let started = tokio::time::Instant::now();
            lock_b.lock().await.expect("lock B");
            let waited = started.elapsed();
            lock_b.unlock().await.expect("unlock B");
            waited
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        lock_a.unlock().await.expect("unlock A");

        let waited = waiter.await.expect("waiter");
        assert!(waited >= Duration::from_millis(450), "waited {waited:?}");
        assert!(waited < Duration::from_millis(1500), "woke late: {waited:?}");
    }

    #[tokio::test]
    async fn lock_with_timeout_fails_while_held_elsewhere() {
        let client = test_client();
        let name = unique_name("timeout");

        let holder = client.get_lock(&name);
        holder.lock().await.expect("hold");

        let contender = test_client().get_lock(&name);
        let err = contender
            .lock_with_timeout(Duration::from_millis(300))
            .await
            .expect_err("must time out");
        assert!(matches!(err, Error::ObtainLockTimeout(_)));

        holder.unlock().await.expect("cleanup");
    }

    // Holds the lock for 1.5x the lease; only a running watchdog keeps the
    // key alive that long.
    #[tokio::test]
    #[ignore = "takes 45s; run explicitly"]
    async fn watchdog_keeps_a_long_hold_alive() {
        let client = test_client();
        let lock = client.get_lock(unique_name("long-hold"));

        lock.lock().await.expect("lock");
        tokio::time::sleep(Duration::from_secs(45)).await;
        lock.unlock().await.expect("still held after 1.5x lease");
    }
}
