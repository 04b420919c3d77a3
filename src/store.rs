//! The store-facing operations the engine needs: timeline and payload-map
//! reads/writes, plus two atomic scripted operations (multi-write on
//! `set_timer`, multi-remove on deletion). Command shapes are direct
//! `redis::cmd(...)` calls rather than a higher-level ORM: the store client
//! is a thin, semantically-named command surface.

use redis::aio::ConnectionManager;

use crate::config::EngineConfig;

/// Remove `K` from both the timeline and the payload map in a single atomic
/// step, so no observer ever sees one present without the other.
const DELETE_SCRIPT: &str = r#"
redis.call("ZREM", KEYS[1], ARGV[1])
redis.call("HDEL", KEYS[2], ARGV[1])
return 1
"#;

/// Thin wrapper binding a connection to the two configured store keys.
#[derive(Clone)]
pub struct Store {
    conn: ConnectionManager,
    timeline_key: String,
    payloads_key: String,
}

impl Store {
    pub fn new(conn: ConnectionManager, config: &EngineConfig) -> Self {
        Self {
            conn,
            timeline_key: config.timeline_key.clone(),
            payloads_key: config.payloads_key.clone(),
        }
    }

    /// Write `(K, deadline_ms)` to the timeline and `(K, bytes)` to the
    /// payload map as a single atomic multi-write (`MULTI`/`EXEC`).
    pub async fn write_timer(
        &self,
        key: &str,
        deadline_ms: i64,
        payload: &[u8],
    ) -> redis::RedisResult<()> {
        redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(&self.timeline_key)
            .arg(deadline_ms)
            .arg(key)
            .ignore()
            .cmd("HSET")
            .arg(&self.payloads_key)
            .arg(key)
            .arg(payload)
            .ignore()
            .query_async(&mut self.conn.clone())
            .await
    }

    /// Remove `K` from the timeline and payload map atomically. A no-op if
    /// `K` is absent from both.
    pub async fn delete_timer(&self, key: &str) -> redis::RedisResult<()> {
        let _: i32 = redis::cmd("EVAL")
            .arg(DELETE_SCRIPT)
            .arg(2)
            .arg(&self.timeline_key)
            .arg(&self.payloads_key)
            .arg(key)
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    /// Fetch compound keys with a deadline in `[0, now_ms]`, ascending by
    /// score, up to `limit` entries.
    pub async fn due_keys(&self, now_ms: i64, limit: usize) -> redis::RedisResult<Vec<String>> {
        redis::cmd("ZRANGEBYSCORE")
            .arg(&self.timeline_key)
            .arg(0)
            .arg(now_ms)
            .arg("LIMIT")
            .arg(0)
            .arg(limit as i64)
            .query_async(&mut self.conn.clone())
            .await
    }

    /// Fetch the payload bytes for `K`, or `None` if already cleaned up by
    /// another worker.
    pub async fn get_payload(&self, key: &str) -> redis::RedisResult<Option<Vec<u8>>> {
        redis::cmd("HGET")
            .arg(&self.payloads_key)
            .arg(key)
            .query_async(&mut self.conn.clone())
            .await
    }
}
