//! Distributed locks.
//!
//! The three lock flavours share one acquire/release loop and differ only
//! in their script set and channel naming:
//!
//! - [`ReentrantLock`]: per-owner hash counters, re-acquirable by the
//!   holding task.
//! - [`Mutex`]: a conditional string set; the holding task blocks like
//!   any other contender on re-acquisition.
//! - [`ReadWriteLock`]: a mode-tagged hash shared by a [`ReadLock`] and a
//!   [`WriteLock`].
//!
//! Acquisition subscribes to the lock's channel, then alternates between
//! script attempts and waiting for either the held lock's remaining TTL to
//! lapse or a release notification to arrive. Whoever's retry reaches the
//! store first wins; there is no fairness guarantee.

mod mutex;
mod reentrant;
mod rwlock;

pub use mutex::Mutex;
pub use reentrant::ReentrantLock;
pub use rwlock::{ReadLock, ReadWriteLock, WriteLock};

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::time::Instant;

use crate::client::RedcoordClient;
use crate::error::Error;
use crate::executor::ScriptArg;
use crate::object::ObjectBase;
use crate::task_id::current_task_id;
use crate::watchdog::RenewJob;

/// Channel payload announcing a write/exclusive release.
pub(crate) const UNLOCK_MESSAGE: i64 = 0;
/// Channel payload announcing a read release.
pub(crate) const READ_UNLOCK_MESSAGE: i64 = 1;

/// Operations shared by every lock flavour.
#[async_trait]
pub trait Lock: Send + Sync {
    /// Acquire the lock, waiting as long as it takes.
    async fn lock(&self) -> Result<(), Error>;

    /// Acquire the lock, waiting at most `wait`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ObtainLockTimeout`] when the wait elapses first.
    async fn lock_with_timeout(&self, wait: Duration) -> Result<(), Error>;

    /// Attempt a single acquisition without waiting.
    async fn try_lock(&self) -> Result<bool, Error>;

    /// Release one level of the lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLockedByCurrentOwner`] when the store shows no
    /// ownership by the calling task.
    async fn unlock(&self) -> Result<(), Error>;
}

/// The per-flavour script quartet behind the shared loop.
#[async_trait]
pub(crate) trait InnerLock: Send + Sync {
    fn base(&self) -> &LockBase;

    fn channel_name(&self) -> String;

    fn renew_script(&self) -> &'static str;

    /// Returns `None` when acquired, or the held lock's remaining TTL.
    async fn try_lock_inner(&self, task_id: u64) -> Result<Option<i64>, Error>;

    /// Returns `None` when the caller is not the owner, `0` when a
    /// reentrant level remains, `1` on full release.
    async fn unlock_inner(&self, task_id: u64) -> Result<Option<i64>, Error>;
}

#[async_trait]
impl<T: InnerLock> Lock for T {
    async fn lock(&self) -> Result<(), Error> {
        acquire(self, None).await
    }

    async fn lock_with_timeout(&self, wait: Duration) -> Result<(), Error> {
        acquire(self, Some(Instant::now() + wait)).await
    }

    async fn try_lock(&self) -> Result<bool, Error> {
        let task_id = current_task_id();
        Ok(try_acquire(self, task_id).await?.is_none())
    }

    async fn unlock(&self) -> Result<(), Error> {
        release(self).await
    }
}

/// State shared by all flavours: the object base, the renewal entry name,
/// and the lease applied on every mutation.
#[derive(Clone)]
pub(crate) struct LockBase {
    pub(crate) object: ObjectBase,
    entry_name: String,
    lease: Duration,
}

impl LockBase {
    pub(crate) fn new(client: RedcoordClient, name: impl Into<String>, role: Option<&str>) -> Self {
        let object = ObjectBase::new(client, name);
        let entry_name = match role {
            Some(role) => format!("{}:{}:{role}", object.client.id(), object.name),
            None => format!("{}:{}", object.client.id(), object.name),
        };
        let lease = object.client.watchdog_timeout();
        Self {
            object,
            entry_name,
            lease,
        }
    }

    pub(crate) fn lease_ms(&self) -> i64 {
        i64::try_from(self.lease.as_millis()).unwrap_or(i64::MAX)
    }

    /// The owner tag proving this task's ownership in unlock and renew.
    pub(crate) fn owner_tag(&self, task_id: u64) -> String {
        format!("{}:{task_id}", self.object.client.id())
    }

    pub(crate) async fn eval(
        &self,
        script: &str,
        keys: &[String],
        args: &[ScriptArg],
    ) -> Result<Option<i64>, Error> {
        self.object.executor().eval(script, keys, args).await
    }

    fn schedule_renewal(&self, task_id: u64, script: &'static str) {
        let job = RenewJob {
            executor: self.object.executor().clone(),
            entry_name: self.entry_name.clone(),
            raw_name: self.object.raw_name.clone(),
            client_id: self.object.client.id().to_string(),
            lease: self.lease,
            script,
        };
        self.object.client.renewals().schedule(job, task_id);
    }

    fn cancel_renewal(&self, task_id: Option<u64>) {
        self.object.client.renewals().cancel(&self.entry_name, task_id);
    }
}

async fn try_acquire<L: InnerLock + ?Sized>(
    lock: &L,
    task_id: u64,
) -> Result<Option<i64>, Error> {
    let ttl = lock.try_lock_inner(task_id).await?;
    if ttl.is_none() {
        lock.base().schedule_renewal(task_id, lock.renew_script());
    }
    Ok(ttl)
}

async fn acquire<L: InnerLock + ?Sized>(
    lock: &L,
    deadline: Option<Instant>,
) -> Result<(), Error> {
    let task_id = current_task_id();
    let channel = lock.channel_name();

    // Subscribe before the first attempt so a release between a failed
    // attempt and the wait cannot be missed.
    let mut pubsub = lock.base().object.client.subscriber().await?;
    pubsub.subscribe(&channel).await?;
    let mut messages = Box::pin(pubsub.on_message());

    loop {
        let ttl = match try_acquire(lock, task_id).await? {
            None => return Ok(()),
            Some(ttl) => ttl,
        };

        // Wake when the holder's lease would have lapsed or when a release
        // is announced, whichever comes first. A negative TTL means the
        // key vanished between the attempt and now; retry immediately.
        let retry_after = Duration::from_millis(u64::try_from(ttl).unwrap_or(0));
        let deadline_hit = match deadline {
            Some(deadline) => tokio::select! {
                biased;
                () = tokio::time::sleep_until(deadline) => true,
                () = tokio::time::sleep(retry_after) => false,
                _ = messages.next() => false,
            },
            None => tokio::select! {
                () = tokio::time::sleep(retry_after) => false,
                _ = messages.next() => false,
            },
        };
        if deadline_hit {
            return Err(Error::ObtainLockTimeout(lock.base().object.name.clone()));
        }
    }
}

async fn release<L: InnerLock + ?Sized>(lock: &L) -> Result<(), Error> {
    let task_id = current_task_id();
    let status = lock.unlock_inner(task_id).await;
    // The renewer is dropped before the script result is examined so a
    // failed decrement in the store cannot leave a dangling renewal task.
    lock.base().cancel_renewal(Some(task_id));
    match status? {
        Some(_) => Ok(()),
        None => Err(Error::NotLockedByCurrentOwner {
            name: lock.base().object.name.clone(),
            owner: lock.base().owner_tag(task_id),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedcoordConfig;

    fn test_client() -> RedcoordClient {
        RedcoordClient::new(&RedcoordConfig::default()).expect("client")
    }

    #[tokio::test]
    async fn owner_tag_combines_client_and_task() {
        let client = test_client();
        let base = LockBase::new(client.clone(), "jobs", None);
        assert_eq!(base.owner_tag(42), format!("{}:42", client.id()));
    }

    #[tokio::test]
    async fn entry_name_carries_the_role() {
        let client = test_client();
        let plain = LockBase::new(client.clone(), "jobs", None);
        let read = LockBase::new(client.clone(), "jobs", Some("read"));
        assert_eq!(plain.entry_name, format!("{}:jobs", client.id()));
        assert_eq!(read.entry_name, format!("{}:jobs:read", client.id()));
    }
}
