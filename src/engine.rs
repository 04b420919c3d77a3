//! The engine: construct, run, stop, and the scheduler write path.
//!
//! A connection-backed handle exposing both the `set_timer`/`remove_timer`
//! write API and the `run_forever`/`stop` poll/fan-out/backoff driver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use redis::aio::ConnectionManager;
use serde::Serialize;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;

use crate::codec;
use crate::config::EngineConfig;
use crate::dispatch;
use crate::error::{RegistryError, TimerError, TimerResult};
use crate::key;
use crate::lock::LockManager;
use crate::registry::Router;
use crate::stats::{EngineStats, StatsCounters};
use crate::store::Store;

const BASE_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// The distributed timer dispatch engine. Owns a store connection, the
/// handler registry, and the dispatch loop's lifecycle. Cheap to clone: all
/// shared state lives behind `Arc`/cloneable connection handles, so a handle
/// can be passed to callers that only need `set_timer`/`remove_timer`
/// without also owning the poll loop.
#[derive(Clone)]
pub struct Engine {
    store: Store,
    locks: LockManager,
    config: Arc<EngineConfig>,
    stats: Arc<StatsCounters>,
    shutdown: Arc<Notify>,
    stopping: Arc<AtomicBool>,
    router_builder: Arc<std::sync::Mutex<Router>>,
    frozen_router: Arc<OnceLock<Arc<Router>>>,
}

impl Engine {
    /// Construct the engine: open the store connection and install the
    /// initial registry and settings. Opens the connection but performs no
    /// store reads or writes.
    pub async fn new(redis_url: &str, router: Router, config: EngineConfig) -> TimerResult<Self> {
        let client = redis::Client::open(redis_url).map_err(TimerError::Store)?;
        let conn = ConnectionManager::new(client).await.map_err(TimerError::Store)?;

        Ok(Self::from_connection(conn, router, config))
    }

    /// Construct from an already-open connection manager, for callers that
    /// share one connection across several collaborators (or tests using an
    /// embedded/mocked server).
    pub fn from_connection(conn: ConnectionManager, router: Router, config: EngineConfig) -> Self {
        let store = Store::new(conn.clone(), &config);
        let locks = LockManager::new(conn);

        Self {
            store,
            locks,
            config: Arc::new(config),
            stats: Arc::new(StatsCounters::default()),
            shutdown: Arc::new(Notify::new()),
            stopping: Arc::new(AtomicBool::new(false)),
            router_builder: Arc::new(std::sync::Mutex::new(router)),
            frozen_router: Arc::new(OnceLock::new()),
        }
    }

    /// Merge another registry into this engine's. Fails with
    /// `DuplicateHandler` on topic collision. Must be called before
    /// [`Engine::run_forever`] starts; once the loop has frozen the
    /// registry, further merges are rejected.
    pub fn include_router(&self, other: Router) -> TimerResult<()> {
        if self.frozen_router.get().is_some() {
            return Err(TimerError::Registry(RegistryError::DuplicateHandler(
                "registry is already frozen; include_router called after run_forever started"
                    .to_string(),
            )));
        }

        let mut guard = self.router_builder.lock().expect("router builder mutex poisoned");
        let current = std::mem::take(&mut *guard);
        *guard = current.merge(other)?;
        Ok(())
    }

    fn current_registry(&self) -> Arc<Router> {
        if let Some(frozen) = self.frozen_router.get() {
            return frozen.clone();
        }
        let guard = self.router_builder.lock().expect("router builder mutex poisoned");
        Arc::new(guard.clone())
    }

    /// Enqueue or overwrite a timer. Succeeds even if `topic` has no
    /// registered handler; dispatch will later fail with `HandlerNotFound`.
    /// Use [`Engine::set_timer_strict`] to reject unknown topics up front.
    pub async fn set_timer<T: Serialize>(
        &self,
        topic: &str,
        timer_id: &str,
        payload: &T,
        activation_period: Duration,
    ) -> TimerResult<()> {
        self.write_timer(topic, timer_id, payload, activation_period).await
    }

    /// Like [`Engine::set_timer`], but rejects topics with no registered
    /// handler before touching the store.
    pub async fn set_timer_strict<T: Serialize>(
        &self,
        topic: &str,
        timer_id: &str,
        payload: &T,
        activation_period: Duration,
    ) -> TimerResult<()> {
        if self.current_registry().lookup(topic).is_none() {
            return Err(TimerError::Registry(RegistryError::HandlerNotFound(
                topic.to_string(),
            )));
        }
        self.write_timer(topic, timer_id, payload, activation_period).await
    }

    async fn write_timer<T: Serialize>(
        &self,
        topic: &str,
        timer_id: &str,
        payload: &T,
        activation_period: Duration,
    ) -> TimerResult<()> {
        key::validate_identifier(topic, &self.config.separator)?;
        key::validate_identifier(timer_id, &self.config.separator)?;

        let compound_key = key::join(topic, timer_id, &self.config.separator);
        let bytes = codec::encode(payload)?;
        let deadline_ms = now_ms() + activation_period.as_millis() as i64;

        let lock = self
            .locks
            .acquire_timer_lock(&compound_key, self.config.timer_lock_ttl, self.config.lock_acquire_timeout)
            .await?;

        let write_result = self.store.write_timer(&compound_key, deadline_ms, &bytes).await;
        self.locks.release_timer_lock(lock).await?;
        write_result.map_err(TimerError::Store)
    }

    /// Cancel a timer. A no-op, not an error, if the timer is not present
    /// (already dispatched, already cancelled, or never created).
    pub async fn remove_timer(&self, topic: &str, timer_id: &str) -> TimerResult<()> {
        key::validate_identifier(topic, &self.config.separator)?;
        key::validate_identifier(timer_id, &self.config.separator)?;

        let compound_key = key::join(topic, timer_id, &self.config.separator);

        let lock = self
            .locks
            .acquire_timer_lock(&compound_key, self.config.timer_lock_ttl, self.config.lock_acquire_timeout)
            .await?;

        let delete_result = self.store.delete_timer(&compound_key).await;
        self.locks.release_timer_lock(lock).await?;
        delete_result.map_err(TimerError::Store)
    }

    /// A point-in-time snapshot of dispatch counters.
    pub fn stats(&self) -> EngineStats {
        self.stats.snapshot()
    }

    /// Signal the dispatch loop to exit at its next safe point. Returns
    /// immediately; [`Engine::run_forever`] is what actually observes the
    /// signal and unwinds.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    /// Run the poll/fan-out dispatch loop until [`Engine::stop`] is called.
    /// Freezes the registry on first entry: any later `include_router` call
    /// fails.
    pub async fn run_forever(&self) -> TimerResult<()> {
        let registry = self
            .frozen_router
            .get_or_init(|| {
                let guard = self.router_builder.lock().expect("router builder mutex poisoned");
                Arc::new(guard.clone())
            })
            .clone();

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut backoff = BASE_BACKOFF;

        while !self.stopping.load(Ordering::SeqCst) {
            while tasks.try_join_next().is_some() {}

            let due = match self.store.due_keys(now_ms(), self.config.batch_size).await {
                Ok(keys) => {
                    backoff = BASE_BACKOFF;
                    keys
                }
                Err(error) => {
                    tracing::warn!(%error, delay_ms = backoff.as_millis() as u64, "poll failed, backing off");
                    if wait_or_stop(&self.shutdown, backoff).await {
                        break;
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
            };

            self.stats.record_poll(due.len());
            let saturated = due.len() >= self.config.batch_size;

            for due_key in due {
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };

                let store = self.store.clone();
                let locks = self.locks.clone();
                let registry = registry.clone();
                let separator = self.config.separator.clone();
                let ttl = self.config.consume_lease_ttl;
                let stats = self.stats.clone();
                stats.task_started();

                tasks.spawn(async move {
                    dispatch::dispatch_one(due_key, store, locks, registry, separator, ttl, stats.clone())
                        .await;
                    stats.task_finished();
                    drop(permit);
                });
            }

            if self.stopping.load(Ordering::SeqCst) {
                break;
            }

            if !saturated && wait_or_stop(&self.shutdown, self.config.poll_interval).await {
                break;
            }
        }

        self.drain_on_shutdown(tasks).await;
        Ok(())
    }

    async fn drain_on_shutdown(&self, mut tasks: JoinSet<()>) {
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };

        if tokio::time::timeout(self.config.shutdown_grace, drain).await.is_err() {
            tracing::warn!("shutdown grace period elapsed; aborting outstanding dispatch tasks");
            tasks.shutdown().await;
        }
    }
}

/// Wait for `duration`, or return early (with `true`) if the shutdown signal
/// fires first.
async fn wait_or_stop(shutdown: &Notify, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.notified() => true,
    }
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}
