//! Distributed locking on top of the store: the timer lock and the consume
//! lease.
//!
//! Both flavors are `SET key value NX EX ttl` for acquisition and a Lua
//! compare-and-delete script for release. The primary release path is always
//! an explicit, awaited call (`release_timer_lock` / `release_consume_lease`)
//! — never a synchronous `Drop`: blocking on async I/O from a `Drop` impl
//! inside a Tokio runtime is unsound under `tokio-comp`. `Drop` is used only
//! as a non-blocking, fire-and-forget safety net (a spawned cleanup task) for
//! a dispatch task aborted mid-flight after the shutdown grace period, whose
//! lease would otherwise sit until TTL expiry.

use std::time::Duration;

use redis::aio::ConnectionManager;
use uuid::Uuid;

use crate::error::LockError;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Acquires and releases the two lock flavors: the per-timer write lock and
/// the per-timer consume lease. Cheap to clone: it only holds a
/// `ConnectionManager`, which is itself a cheap cloneable handle.
#[derive(Clone)]
pub struct LockManager {
    conn: ConnectionManager,
}

fn spawn_best_effort_release(conn: &ConnectionManager, key: &str, token: &str) {
    let mut conn = conn.clone();
    let key = key.to_string();
    let token = token.to_string();
    tokio::spawn(async move {
        let result: Result<i32, _> = redis::cmd("EVAL")
            .arg(RELEASE_SCRIPT)
            .arg(1)
            .arg(&key)
            .arg(&token)
            .query_async(&mut conn)
            .await;

        if let Err(error) = result {
            tracing::warn!(%key, %error, "best-effort lock release on drop failed");
        }
    });
}

/// A held timer lock, returned by [`LockManager::acquire_timer_lock`].
/// Release it explicitly with [`LockManager::release_timer_lock`] once the
/// guarded write completes; an unreleased lock is cleaned up best-effort on
/// drop.
pub struct TimerLock {
    key: String,
    token: String,
    conn: ConnectionManager,
    released: bool,
}

impl Drop for TimerLock {
    fn drop(&mut self) {
        if !self.released {
            spawn_best_effort_release(&self.conn, &self.key, &self.token);
        }
    }
}

/// A held consume lease, returned by
/// [`LockManager::try_acquire_consume_lease`] when acquisition succeeds.
/// Release it only when the handler fails — call
/// [`LockManager::release_consume_lease`] then, so the timer is retried on
/// the next poll. On success, or on a "payload already gone" short-circuit,
/// call [`ConsumeLease::abandon`] instead, which documents the intentional
/// "leave it to expire" outcome without touching the store. A lease that is
/// neither released nor abandoned (a task cancelled mid-flight) is cleaned
/// up best-effort on drop, so shutdown never strands a timer mid-dispatch.
pub struct ConsumeLease {
    key: String,
    token: String,
    conn: ConnectionManager,
    released: bool,
}

impl ConsumeLease {
    /// Intentionally leave the lease to expire (the success path, or the
    /// "payload already gone" short-circuit). Suppresses the drop-time
    /// best-effort release.
    pub fn abandon(mut self) {
        self.released = true;
    }
}

impl Drop for ConsumeLease {
    fn drop(&mut self) {
        if !self.released {
            spawn_best_effort_release(&self.conn, &self.key, &self.token);
        }
    }
}

impl LockManager {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn lock_key(resource: &str) -> String {
        format!("lock:timer:{resource}")
    }

    fn consume_key(resource: &str) -> String {
        format!("lock:consume:{resource}")
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, LockError> {
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(result.is_some())
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<(), LockError> {
        let _: i32 = redis::cmd("EVAL")
            .arg(RELEASE_SCRIPT)
            .arg(1)
            .arg(key)
            .arg(token)
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    /// Blocking acquire of the per-timer write lock, polling with a fixed
    /// backoff until `timeout` elapses.
    pub async fn acquire_timer_lock(
        &self,
        resource: &str,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<TimerLock, LockError> {
        let key = Self::lock_key(resource);
        let token = Uuid::new_v4().to_string();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.set_nx_ex(&key, &token, ttl).await? {
                return Ok(TimerLock {
                    key,
                    token,
                    conn: self.conn.clone(),
                    released: false,
                });
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(LockError::AcquisitionTimeout(resource.to_string()));
            }

            tokio::time::sleep(RETRY_DELAY).await;
        }
    }

    /// Release a held timer lock. Safe to call even if the lock already
    /// expired: the fencing token guard means a stale holder can never delete
    /// someone else's lock.
    pub async fn release_timer_lock(&self, mut lock: TimerLock) -> Result<(), LockError> {
        lock.released = true;
        self.compare_and_delete(&lock.key, &lock.token).await
    }

    /// Non-blocking acquire of the per-timer consume lease. Returns `None`
    /// immediately if another worker already holds it.
    pub async fn try_acquire_consume_lease(
        &self,
        resource: &str,
        ttl: Duration,
    ) -> Result<Option<ConsumeLease>, LockError> {
        let key = Self::consume_key(resource);
        let token = Uuid::new_v4().to_string();

        if self.set_nx_ex(&key, &token, ttl).await? {
            Ok(Some(ConsumeLease {
                key,
                token,
                conn: self.conn.clone(),
                released: false,
            }))
        } else {
            Ok(None)
        }
    }

    /// Release a held consume lease. Call this only when the handler fails,
    /// so the timer becomes eligible for retry on the next poll.
    pub async fn release_consume_lease(&self, mut lease: ConsumeLease) -> Result<(), LockError> {
        lease.released = true;
        self.compare_and_delete(&lease.key, &lease.token).await
    }
}
