//! Per-task owner identity.
//!
//! Lock ownership is proven by a tag of the form `<clientUUID>:<taskId>`.
//! The task id must stay stable across every suspension point between an
//! acquire and the matching release, so it is derived once per call from
//! the identity of the running tokio task.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SYNTHETIC_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // Fallback identity for code running outside a tokio task, e.g. a
    // bare `Runtime::block_on`. Pinned to the thread for its lifetime.
    static THREAD_ID: u64 = NEXT_SYNTHETIC_ID.fetch_add(1, Ordering::Relaxed);
}

/// Return a process-unique id for the current task.
///
/// Inside a tokio task this is derived from the runtime's task id and is
/// stable for the task's whole lifetime. Outside a task a synthesized id
/// pinned to the current thread is used instead.
pub(crate) fn current_task_id() -> u64 {
    match tokio::task::try_id() {
        Some(id) => {
            let mut hasher = DefaultHasher::new();
            id.hash(&mut hasher);
            hasher.finish()
        }
        None => THREAD_ID.with(|id| *id),
    }
}
