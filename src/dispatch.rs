//! The read path: per-timer dispatch task logic.
//!
//! The poll/fan-out driver lives on [`crate::Engine`]; this module is the
//! single-timer state machine — claim, fetch, route, validate, invoke —
//! spawned once per due key and bounded by the engine's concurrency
//! semaphore.

use std::sync::Arc;
use std::time::Duration;

use crate::key;
use crate::lock::LockManager;
use crate::registry::Router;
use crate::stats::StatsCounters;
use crate::store::Store;

/// Attempt to dispatch the timer stored under compound key `key`. Never
/// returns an error: every failure mode is logged and handled locally so
/// that one bad timer can never stop the dispatch loop.
pub(crate) async fn dispatch_one(
    key: String,
    store: Store,
    locks: LockManager,
    router: Arc<Router>,
    separator: String,
    consume_lease_ttl: Duration,
    stats: Arc<StatsCounters>,
) {
    // (a) claim the consume lease; skip silently if another worker holds it.
    let lease = match locks.try_acquire_consume_lease(&key, consume_lease_ttl).await {
        Ok(Some(lease)) => lease,
        Ok(None) => {
            stats.record_skipped();
            return;
        }
        Err(error) => {
            tracing::warn!(%key, %error, "failed to acquire consume lease");
            return;
        }
    };

    // (b) fetch the payload; absence means another worker already cleaned
    // up, so there is nothing left to release or dispatch.
    let payload = match store.get_payload(&key).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            lease.abandon();
            return;
        }
        Err(error) => {
            tracing::warn!(%key, %error, "failed to fetch payload");
            let _ = locks.release_consume_lease(lease).await;
            return;
        }
    };

    // (c) split K on the first separator occurrence.
    let Some((topic, timer_id)) = key::split(&key, &separator) else {
        tracing::error!(%key, "corrupted timeline entry: separator not found");
        let _ = locks.release_consume_lease(lease).await;
        return;
    };

    // (d) look up the route.
    let Some(route) = router.lookup(topic) else {
        tracing::warn!(topic, timer_id, "no handler registered for topic");
        let _ = locks.release_consume_lease(lease).await;
        stats.record_skipped();
        return;
    };

    // (e) decode and validate against the route's schema.
    let value = match route.schema.validate(&payload) {
        Ok(value) => value,
        Err(error) => {
            tracing::error!(topic, timer_id, %error, "payload decode/validation failed");
            let _ = locks.release_consume_lease(lease).await;
            stats.record_skipped();
            return;
        }
    };

    // (f) invoke the handler.
    match route.handler.call(value).await {
        Ok(()) => {
            if let Err(error) = store.delete_timer(&key).await {
                tracing::error!(topic, timer_id, %error, "failed to delete dispatched timer");
            }
            // Deliberately left to expire rather than released; see ConsumeLease docs.
            lease.abandon();
            stats.record_dispatched();
        }
        Err(error) => {
            tracing::error!(topic, timer_id, %error, "handler failed, timer will be retried");
            let _ = locks.release_consume_lease(lease).await;
            stats.record_failed();
        }
    }
}
