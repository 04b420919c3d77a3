//! Crate-wide error taxonomy.
//!
//! Each subsystem (lock manager, codec, registry, dispatch loop) defines its
//! own narrow error enum; [`TimerError`] composes them into the type the
//! public API returns.

use thiserror::Error;

/// Errors raised while acquiring or releasing a distributed lock.
#[derive(Error, Debug)]
pub enum LockError {
    #[error("timed out acquiring lock for key {0}")]
    AcquisitionTimeout(String),

    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),
}

/// Errors raised while encoding or decoding a timer payload.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("failed to encode payload: {0}")]
    Encode(String),

    #[error("failed to decode payload: {0}")]
    Decode(String),

    #[error("payload failed schema validation: {0}")]
    Validation(String),
}

/// Errors raised by the handler registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("handler already registered for topic '{0}'")]
    DuplicateHandler(String),

    #[error("no handler registered for topic '{0}'")]
    HandlerNotFound(String),
}

/// Top-level error type returned by the public API.
#[derive(Error, Debug)]
pub enum TimerError {
    #[error("invalid identifier '{0}': must be non-empty and must not contain the separator")]
    InvalidIdentifier(String),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("handler failed: {0}")]
    HandlerFailure(String),
}

pub type TimerResult<T> = Result<T, TimerError>;
