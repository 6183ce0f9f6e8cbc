//! Distributed coordination primitives on Redis.
//!
//! This crate turns a shared Redis deployment into a toolkit of
//! coordination primitives for processes cooperating across a network:
//!
//! - **Locks**: a reentrant lock, a non-reentrant mutex, and a read/write
//!   lock, all with a watchdog that keeps a held lock's lease alive and a
//!   pub/sub channel that wakes waiters the moment a holder releases.
//! - **Rate limiter**: a token bucket with per-permit expiry, usable
//!   cluster-wide or per client, with blocking acquisition under timeout.
//! - **Counters and bit fields**: atomic `i64`/`f64` counters and a
//!   `BITFIELD` wrapper.
//!
//! Every state transition is a single Lua script, so correctness rests on
//! Redis's single-threaded script execution rather than on client-side
//! locking. Keys for one resource share a `{hash tag}` and stay legal on
//! clustered deployments.
//!
//! # Consistency
//!
//! With a single Redis instance the locks give full mutual exclusion. In
//! Sentinel or Cluster deployments asynchronous replication can lose a
//! lock during failover; do not use these locks where occasional duplicate
//! execution is unacceptable. There are no fencing tokens.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use redcoord::{Lock, RateType, RedcoordClient, RedcoordConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), redcoord::Error> {
//!     let client = RedcoordClient::new(&RedcoordConfig::new("redis://127.0.0.1:6379"))?;
//!
//!     let lock = client.get_lock("orders");
//!     lock.lock().await?;
//!     // critical section
//!     lock.unlock().await?;
//!
//!     let limiter = client.get_rate_limiter("api-calls");
//!     limiter
//!         .try_set_rate(RateType::Overall, 100, Duration::from_secs(1))
//!         .await?;
//!     limiter.acquire().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Ownership
//!
//! A lock is owned by a `clientUUID:taskId` pair: the process-wide client
//! UUID plus an id pinned to the acquiring tokio task. Acquire, renew, and
//! unlock must therefore happen on the same task. The watchdog renews a
//! held lock at one third of the lease (30 seconds by default) until the
//! last local holder releases it.

mod atomic;
mod bitset;
mod client;
mod config;
mod error;
mod executor;
mod expirable;
mod lock;
mod naming;
mod object;
mod ratelimiter;
mod scripts;
mod task_id;
mod watchdog;

pub use atomic::{AtomicDouble, AtomicLong};
pub use bitset::BitSet;
pub use client::RedcoordClient;
pub use config::{RedcoordConfig, DEFAULT_WATCHDOG_TIMEOUT};
pub use error::Error;
pub use expirable::Expirable;
pub use lock::{Lock, Mutex, ReadLock, ReadWriteLock, ReentrantLock, WriteLock};
pub use ratelimiter::{RateLimiter, RateLimiterConfig, RateType};
