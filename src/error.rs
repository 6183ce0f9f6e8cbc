use thiserror::Error;

/// Errors from coordination primitives.
#[derive(Debug, Error)]
pub enum Error {
    /// The pool could not hand out a connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// Waiting to acquire a lock outlasted the caller's deadline.
    #[error("timed out waiting to acquire lock `{0}`")]
    ObtainLockTimeout(String),

    /// `unlock` was called but the store shows no ownership by this owner tag.
    #[error("lock `{name}` is not held by owner `{owner}`")]
    NotLockedByCurrentOwner { name: String, owner: String },

    /// The rate limiter's configuration hash is missing.
    #[error("rate limiter `{0}` is not initialized")]
    NotInitialized(String),

    /// A caller-supplied argument is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The store replied with a shape the client does not understand.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Transport-level failure, surfaced verbatim.
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}
