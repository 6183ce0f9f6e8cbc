use async_trait::async_trait;

use crate::client::RedcoordClient;
use crate::error::Error;
use crate::executor::ScriptArg;
use crate::naming;
use crate::object::{HasObject, ObjectBase};
use crate::scripts;

use super::{InnerLock, LockBase, READ_UNLOCK_MESSAGE, UNLOCK_MESSAGE};

const CHANNEL_PREFIX: &str = "redisson_rwlock__channel";

/// A distributed read/write lock.
///
/// Both sides share one hash in the store and one notification channel.
/// Any number of owners may hold the read side at once; the write side is
/// exclusive against readers and writers. Both sides are reentrant for
/// their owner. A writer may additionally take the read side and then
/// release the write side (downgrade); taking the write side while only
/// holding the read side (upgrade) is refused.
#[derive(Clone)]
pub struct ReadWriteLock {
    read: ReadLock,
    write: WriteLock,
}

impl ReadWriteLock {
    pub(crate) fn new(client: RedcoordClient, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            read: ReadLock {
                base: LockBase::new(client.clone(), name.clone(), Some("read")),
            },
            write: WriteLock {
                base: LockBase::new(client, name, Some("write")),
            },
        }
    }

    /// The lock used for shared access.
    pub fn read_lock(&self) -> ReadLock {
        self.read.clone()
    }

    /// The lock used for exclusive access.
    pub fn write_lock(&self) -> WriteLock {
        self.write.clone()
    }
}

impl HasObject for ReadWriteLock {
    fn object(&self) -> &ObjectBase {
        &self.read.base.object
    }
}

/// The shared side of a [`ReadWriteLock`].
#[derive(Clone)]
pub struct ReadLock {
    base: LockBase,
}

impl HasObject for ReadLock {
    fn object(&self) -> &ObjectBase {
        &self.base.object
    }
}

#[async_trait]
impl InnerLock for ReadLock {
    fn base(&self) -> &LockBase {
        &self.base
    }

    fn channel_name(&self) -> String {
        naming::prefix_name(CHANNEL_PREFIX, &self.base.object.name)
    }

    fn renew_script(&self) -> &'static str {
        scripts::READ_RENEW
    }

    async fn try_lock_inner(&self, task_id: u64) -> Result<Option<i64>, Error> {
        self.base
            .eval(
                scripts::READ_TRY_ACQUIRE,
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
                scripts::READ_UNLOCK,
                &[self.base.object.raw_name.clone(), self.channel_name()],
                &[
                    ScriptArg::Int(READ_UNLOCK_MESSAGE),
                    ScriptArg::Int(self.base.lease_ms()),
                    ScriptArg::Str(self.base.owner_tag(task_id)),
                ],
            )
            .await
    }
}

/// The exclusive side of a [`ReadWriteLock`].
#[derive(Clone)]
pub struct WriteLock {
    base: LockBase,
}

impl HasObject for WriteLock {
    fn object(&self) -> &ObjectBase {
        &self.base.object
    }
}

#[async_trait]
impl InnerLock for WriteLock {
    fn base(&self) -> &LockBase {
        &self.base
    }

    fn channel_name(&self) -> String {
        naming::prefix_name(CHANNEL_PREFIX, &self.base.object.name)
    }

    fn renew_script(&self) -> &'static str {
        scripts::WRITE_RENEW
    }

    async fn try_lock_inner(&self, task_id: u64) -> Result<Option<i64>, Error> {
        self.base
            .eval(
                scripts::WRITE_TRY_ACQUIRE,
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
                scripts::WRITE_UNLOCK,
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
