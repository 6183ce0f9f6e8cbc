//! Expiration renewal engine.
//!
//! Each held lock gets at most one renewal task per process, regardless of
//! how many local tasks hold it reentrantly. The registry maps an entry
//! name (`<clientUUID>:<lockName>`, plus a role suffix for read/write
//! sub-locks) to the set of holding tasks; the renewal task fires at one
//! third of the lease and renews on behalf of the first recorded holder.
//!
//! Renewal failures are deliberately quiet: the entry is evicted and the
//! next user operation surfaces the problem.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::AbortHandle;

use crate::error::Error;
use crate::executor::{ScriptArg, ScriptExecutor};

/// Everything the renewal task needs to refresh one lock's lease.
pub(crate) struct RenewJob {
    pub(crate) executor: ScriptExecutor,
    pub(crate) entry_name: String,
    pub(crate) raw_name: String,
    pub(crate) client_id: String,
    pub(crate) lease: Duration,
    pub(crate) script: &'static str,
}

impl RenewJob {
    async fn renew(&self, task_id: u64) -> Result<i64, Error> {
        let lease_ms = i64::try_from(self.lease.as_millis()).unwrap_or(i64::MAX);
        let owner = format!("{}:{}", self.client_id, task_id);
        self.executor
            .eval_int(
                self.script,
                std::slice::from_ref(&self.raw_name),
                &[ScriptArg::Int(lease_ms), ScriptArg::Str(owner)],
            )
            .await
    }
}

#[derive(Default)]
struct EntryState {
    // Insertion-ordered multiset of (task id, reentrancy count). The first
    // task is the one the renewal fires on behalf of.
    owners: Vec<(u64, u32)>,
    abort: Option<AbortHandle>,
}

pub(crate) struct ExpirationEntry {
    state: Mutex<EntryState>,
}

impl ExpirationEntry {
    fn new(task_id: u64) -> Self {
        Self {
            state: Mutex::new(EntryState {
                owners: vec![(task_id, 1)],
                abort: None,
            }),
        }
    }

    fn add_task(&self, task_id: u64) {
        let mut state = self.state.lock().expect("renewal entry poisoned");
        match state.owners.iter_mut().find(|(id, _)| *id == task_id) {
            Some((_, count)) => *count += 1,
            None => state.owners.push((task_id, 1)),
        }
    }

    fn remove_task(&self, task_id: u64) {
        let mut state = self.state.lock().expect("renewal entry poisoned");
        if let Some(pos) = state.owners.iter().position(|(id, _)| *id == task_id) {
            state.owners[pos].1 -= 1;
            if state.owners[pos].1 == 0 {
                state.owners.remove(pos);
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.state.lock().expect("renewal entry poisoned").owners.is_empty()
    }

    fn first_task_id(&self) -> Option<u64> {
        self.state
            .lock()
            .expect("renewal entry poisoned")
            .owners
            .first()
            .map(|(id, _)| *id)
    }

    fn set_abort(&self, handle: AbortHandle) {
        self.state.lock().expect("renewal entry poisoned").abort = Some(handle);
    }

    // The abort handle is taken out before the map entry is dropped so the
    // renewal task never keeps a dead entry alive.
    fn take_abort(&self) -> Option<AbortHandle> {
        self.state.lock().expect("renewal entry poisoned").abort.take()
    }
}

/// Process-wide registry of lock renewal entries.
#[derive(Clone, Default)]
pub(crate) struct RenewalRegistry {
    entries: Arc<DashMap<String, Arc<ExpirationEntry>>>,
}

impl RenewalRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a successful acquire by `task_id`. The first holder of a
    /// lock spawns the renewal task; re-entries only bump the count.
    pub(crate) fn schedule(&self, job: RenewJob, task_id: u64) {
        match self.entries.entry(job.entry_name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(occupied) => {
                occupied.get().add_task(task_id);
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let entry = Arc::new(ExpirationEntry::new(task_id));
                vacant.insert(Arc::clone(&entry));
                let handle = tokio::spawn(renew_loop(self.clone(), job));
                entry.set_abort(handle.abort_handle());
            }
        }
    }

    /// Record a release by `task_id`, or forget the whole entry when
    /// `task_id` is `None`. The renewal task is cancelled once no local
    /// holder remains.
    pub(crate) fn cancel(&self, entry_name: &str, task_id: Option<u64>) {
        let Some(entry) = self.entries.get(entry_name).map(|e| Arc::clone(&e)) else {
            return;
        };
        if let Some(task_id) = task_id {
            entry.remove_task(task_id);
        }
        if task_id.is_none() || entry.is_empty() {
            if let Some(abort) = entry.take_abort() {
                abort.abort();
            }
            self.entries.remove(entry_name);
        }
    }

    fn lookup(&self, entry_name: &str) -> Option<Arc<ExpirationEntry>> {
        self.entries.get(entry_name).map(|e| Arc::clone(&e))
    }

    fn evict(&self, entry_name: &str) {
        if let Some(entry) = self.entries.get(entry_name).map(|e| Arc::clone(&e)) {
            entry.take_abort();
            self.entries.remove(entry_name);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

async fn renew_loop(registry: RenewalRegistry, job: RenewJob) {
    let period = job.lease / 3;
    loop {
        tokio::time::sleep(period).await;

        let Some(entry) = registry.lookup(&job.entry_name) else {
            return;
        };
        let Some(task_id) = entry.first_task_id() else {
            return;
        };

        match job.renew(task_id).await {
            Ok(1) => {
                tracing::debug!(lock = %job.entry_name, "lease renewed");
            }
            Ok(_) => {
                // The owner tag is gone from the store; stop renewing.
                tracing::debug!(lock = %job.entry_name, "owner no longer present, dropping renewal");
                registry.cancel(&job.entry_name, None);
                return;
            }
            Err(error) => {
                tracing::warn!(lock = %job.entry_name, %error, "lease renewal failed, dropping entry");
                registry.evict(&job.entry_name);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_job(entry_name: &str) -> RenewJob {
        let pool = deadpool_redis::Config::from_url("redis://127.0.0.1:6379")
            .builder()
            .expect("pool builder")
            .runtime(deadpool_redis::Runtime::Tokio1)
            .build()
            .expect("pool");
        RenewJob {
            executor: ScriptExecutor::new(pool),
            entry_name: entry_name.to_string(),
            raw_name: "{test}".to_string(),
            client_id: "client".to_string(),
            // Long lease so the renewal task never fires during the test.
            lease: Duration::from_secs(3600),
            script: crate::scripts::LOCK_RENEW,
        }
    }

    #[test]
    fn entry_tracks_reentrancy_counts() {
        let entry = ExpirationEntry::new(7);
        entry.add_task(7);
        entry.add_task(9);
        assert_eq!(entry.first_task_id(), Some(7));

        entry.remove_task(7);
        assert_eq!(entry.first_task_id(), Some(7), "count 2 -> 1 keeps the task");
        entry.remove_task(7);
        assert_eq!(entry.first_task_id(), Some(9), "count 0 removes the task");

        entry.remove_task(9);
        assert!(entry.is_empty());
    }

    #[test]
    fn first_task_follows_insertion_order() {
        let entry = ExpirationEntry::new(1);
        entry.add_task(2);
        entry.add_task(3);
        entry.remove_task(1);
        assert_eq!(entry.first_task_id(), Some(2));
    }

    #[tokio::test]
    async fn reentry_shares_one_entry() {
        let registry = RenewalRegistry::new();
        registry.schedule(test_job("c:lock"), 1);
        registry.schedule(test_job("c:lock"), 1);
        registry.schedule(test_job("c:lock"), 2);
        assert_eq!(registry.len(), 1);

        registry.cancel("c:lock", Some(1));
        registry.cancel("c:lock", Some(2));
        assert_eq!(registry.len(), 1, "one reentrant level is still held");

        registry.cancel("c:lock", Some(1));
        assert_eq!(registry.len(), 0, "last release drops the entry");
    }

    #[tokio::test]
    async fn cancel_all_forgets_the_entry() {
        let registry = RenewalRegistry::new();
        registry.schedule(test_job("c:other"), 4);
        registry.schedule(test_job("c:other"), 5);
        registry.cancel("c:other", None);
        assert_eq!(registry.len(), 0);
    }
}
