mod fake;
mod keys;

pub use fake::FakeStore;
pub use keys::Keys;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::error::{Result, WikiSurgeError};

/// A thin, generic wrapper over the ordered key-value store backing every
/// per-page window, alert stream, and cache entry in the system. Mirrors
/// the shape of a Redis connection-manager cache wrapper: typed
/// get/set-with-ttl plus the handful of collection primitives (sets,
/// hashes, lists, sorted sets, streams) the detectors need, leaving the
/// per-component key schema and pipelining to the calling module.
///
/// Two backends share this one type so every detector, the digest
/// collector, and the analysis cache can be driven in tests without a live
/// Redis: [`Store::connect`] wraps a real connection manager, while
/// [`Store::fake`] wraps an in-process, TTL-aware map with the same
/// semantics. No call site needs to know which backend it has.
#[derive(Clone)]
pub struct Store {
    backend: Backend,
}

#[derive(Clone)]
enum Backend {
    Redis(ConnectionManager),
    Fake(FakeStore),
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.backend {
            Backend::Redis(_) => f.debug_struct("Store").field("backend", &"redis").finish(),
            Backend::Fake(_) => f.debug_struct("Store").field("backend", &"fake").finish(),
        }
    }
}

impl Store {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!("connecting to shared keyspace at {}", redis_url);

        let client = redis::Client::open(redis_url)
            .map_err(|e| WikiSurgeError::Config(format!("invalid redis url: {e}")))?;
        let conn = ConnectionManager::new(client).await?;

        info!("shared keyspace connection established");
        Ok(Self { backend: Backend::Redis(conn) })
    }

    /// Construct a store directly from an existing connection manager, used
    /// by tests that share a connection across fixtures.
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self { backend: Backend::Redis(conn) }
    }

    /// An in-process fake backed by a TTL-aware map with the same
    /// collection semantics as Redis, used throughout this crate's test
    /// suite to drive detectors and the digest pipeline end-to-end without
    /// a live server.
    pub fn fake() -> Self {
        Self { backend: Backend::Fake(FakeStore::new()) }
    }

    pub async fn ping(&self) -> Result<()> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let _: String = redis::cmd("PING").query_async(&mut conn).await?;
                Ok(())
            }
            Backend::Fake(_) => Ok(()),
        }
    }

    // -- scalar / JSON cache -------------------------------------------------

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_string(key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.set_string(key, &json, ttl).await
    }

    pub async fn get_string(&self, key: &str) -> Result<Option<String>> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                Ok(conn.get(key).await?)
            }
            Backend::Fake(fake) => Ok(fake.get_string(key)),
        }
    }

    pub async fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                match ttl {
                    Some(ttl) => {
                        let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
                    }
                    None => {
                        let _: () = conn.set(key, value).await?;
                    }
                }
                Ok(())
            }
            Backend::Fake(fake) => {
                fake.set_string(key, value, ttl);
                Ok(())
            }
        }
    }

    /// Set a key only if absent, returning whether this call created it.
    /// Used for "set-if-absent" fields like `editwar:start:{p}`.
    pub async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let created: bool = conn.set_nx(key, value).await?;
                if created {
                    let _: () = conn.expire(key, ttl.as_secs() as i64).await?;
                }
                Ok(created)
            }
            Backend::Fake(fake) => Ok(fake.set_nx(key, value, ttl)),
        }
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                Ok(conn.exists(key).await?)
            }
            Backend::Fake(fake) => Ok(fake.exists(key)),
        }
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let _: () = conn.expire(key, ttl.as_secs() as i64).await?;
                Ok(())
            }
            Backend::Fake(fake) => {
                fake.expire(key, ttl);
                Ok(())
            }
        }
    }

    /// Remaining TTL for a key, if any. Not part of the spec's external
    /// interface; exposed so tests can assert the TTL invariants in
    /// spec.md §8 ("analysis cache TTL >= ...") without a live server.
    pub async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let secs: i64 = conn.ttl(key).await?;
                Ok(if secs >= 0 { Some(Duration::from_secs(secs as u64)) } else { None })
            }
            Backend::Fake(fake) => Ok(fake.ttl_remaining(key)),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let _: () = conn.del(key).await?;
                Ok(())
            }
            Backend::Fake(fake) => {
                fake.delete(key);
                Ok(())
            }
        }
    }

    pub async fn delete_many(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let _: () = conn.del(keys).await?;
                Ok(())
            }
            Backend::Fake(fake) => {
                for key in keys {
                    fake.delete(key);
                }
                Ok(())
            }
        }
    }

    /// Non-blocking key scan for a glob pattern, used by the sweepers. Bounded
    /// to a single SCAN cursor pass per call; callers loop until the cursor
    /// returns to 0.
    pub async fn scan_match(&self, pattern: &str) -> Result<Vec<String>> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let mut found = Vec::new();
                let mut cursor: u64 = 0;
                loop {
                    let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(200)
                        .query_async(&mut conn)
                        .await?;
                    found.extend(batch);
                    cursor = next;
                    if cursor == 0 {
                        break;
                    }
                }
                Ok(found)
            }
            Backend::Fake(fake) => Ok(fake.scan_match(pattern)),
        }
    }

    // -- sets -----------------------------------------------------------------

    pub async fn scard(&self, key: &str) -> Result<u64> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                Ok(conn.scard(key).await?)
            }
            Backend::Fake(fake) => Ok(fake.scard(key)),
        }
    }

    /// Add a member to a set only if it is under `max_members`, refreshing
    /// the TTL either way. Returns the resulting cardinality.
    pub async fn sadd_bounded(
        &self,
        key: &str,
        member: &str,
        max_members: usize,
        ttl: Duration,
    ) -> Result<u64> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let is_member: bool = conn.sismember(key, member).await?;
                let current: u64 = conn.scard(key).await?;
                if is_member || (current as usize) < max_members {
                    let _: () = conn.sadd(key, member).await?;
                }
                let _: () = conn.expire(key, ttl.as_secs() as i64).await?;
                Ok(conn.scard(key).await?)
            }
            Backend::Fake(fake) => Ok(fake.sadd_bounded(key, member, max_members, ttl)),
        }
    }

    pub async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let _: () = conn.sadd(key, member).await?;
                Ok(())
            }
            Backend::Fake(fake) => {
                fake.sadd(key, member);
                Ok(())
            }
        }
    }

    pub async fn srem(&self, key: &str, member: &str) -> Result<()> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let _: () = conn.srem(key, member).await?;
                Ok(())
            }
            Backend::Fake(fake) => {
                fake.srem(key, member);
                Ok(())
            }
        }
    }

    pub async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                Ok(conn.smembers(key).await?)
            }
            Backend::Fake(fake) => Ok(fake.smembers(key)),
        }
    }

    // -- hashes ---------------------------------------------------------------

    pub async fn hset_many(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Duration,
    ) -> Result<()> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let _: () = conn.hset_multiple(key, fields).await?;
                let _: () = conn.expire(key, ttl.as_secs() as i64).await?;
                Ok(())
            }
            Backend::Fake(fake) => {
                fake.hset_many(key, fields, ttl);
                Ok(())
            }
        }
    }

    pub async fn incr(&self, key: &str, delta: i64, ttl: Duration) -> Result<i64> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let value: i64 = conn.incr(key, delta).await?;
                let _: () = conn.expire(key, ttl.as_secs() as i64).await?;
                Ok(value)
            }
            Backend::Fake(fake) => Ok(fake.incr(key, delta, ttl)),
        }
    }

    pub async fn hincrby(&self, key: &str, field: &str, delta: i64, ttl: Duration) -> Result<i64> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let value: i64 = conn.hincr(key, field, delta).await?;
                let _: () = conn.expire(key, ttl.as_secs() as i64).await?;
                Ok(value)
            }
            Backend::Fake(fake) => Ok(fake.hincrby(key, field, delta, ttl)),
        }
    }

    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                Ok(conn.hgetall(key).await?)
            }
            Backend::Fake(fake) => Ok(fake.hgetall(key)),
        }
    }

    pub async fn hlen(&self, key: &str) -> Result<u64> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                Ok(conn.hlen(key).await?)
            }
            Backend::Fake(fake) => Ok(fake.hlen(key)),
        }
    }

    // -- lists ------------------------------------------------------------------

    /// Push a value to the front of a list, trim to `max_len`, refresh TTL.
    pub async fn lpush_trim(
        &self,
        key: &str,
        value: &str,
        max_len: isize,
        ttl: Duration,
    ) -> Result<()> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let _: () = conn.lpush(key, value).await?;
                let _: () = conn.ltrim(key, 0, max_len - 1).await?;
                let _: () = conn.expire(key, ttl.as_secs() as i64).await?;
                Ok(())
            }
            Backend::Fake(fake) => {
                fake.lpush_trim(key, value, max_len, ttl);
                Ok(())
            }
        }
    }

    pub async fn lrange_all(&self, key: &str) -> Result<Vec<String>> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                Ok(conn.lrange(key, 0, -1).await?)
            }
            Backend::Fake(fake) => Ok(fake.lrange_all(key)),
        }
    }

    pub async fn llen(&self, key: &str) -> Result<u64> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                Ok(conn.llen(key).await?)
            }
            Backend::Fake(fake) => Ok(fake.llen(key)),
        }
    }

    // -- sorted sets --------------------------------------------------------

    pub async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let _: () = conn.zadd(key, member, score).await?;
                Ok(())
            }
            Backend::Fake(fake) => {
                fake.zadd(key, member, score);
                Ok(())
            }
        }
    }

    pub async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                Ok(conn.zscore(key, member).await?)
            }
            Backend::Fake(fake) => Ok(fake.zscore(key, member)),
        }
    }

    pub async fn zrem(&self, key: &str, member: &str) -> Result<()> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let _: () = conn.zrem(key, member).await?;
                Ok(())
            }
            Backend::Fake(fake) => {
                fake.zrem(key, member);
                Ok(())
            }
        }
    }

    pub async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<()> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let _: () = conn.zrembyscore(key, min, max).await?;
                Ok(())
            }
            Backend::Fake(fake) => {
                fake.zremrangebyscore(key, min, max);
                Ok(())
            }
        }
    }

    pub async fn zcard(&self, key: &str) -> Result<u64> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                Ok(conn.zcard(key).await?)
            }
            Backend::Fake(fake) => Ok(fake.zcard(key)),
        }
    }

    pub async fn zcount(&self, key: &str, min: f64, max: f64) -> Result<u64> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                Ok(conn.zcount(key, min, max).await?)
            }
            Backend::Fake(fake) => Ok(fake.zcount(key, min, max)),
        }
    }

    pub async fn zrank(&self, key: &str, member: &str) -> Result<Option<u64>> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let rank: Option<u64> = conn.zrevrank(key, member).await?;
                Ok(rank)
            }
            Backend::Fake(fake) => Ok(fake.zrevrank(key, member)),
        }
    }

    /// Highest-scoring `n` members with their scores, descending.
    pub async fn zrevrange_withscores(&self, key: &str, n: isize) -> Result<Vec<(String, f64)>> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let rows: Vec<(String, f64)> = conn.zrevrange_withscores(key, 0, n - 1).await?;
                Ok(rows)
            }
            Backend::Fake(fake) => Ok(fake.zrevrange_withscores(key, n)),
        }
    }

    /// Trim a sorted set to its top `max_entries` members by score.
    pub async fn zremrangebyrank_keep_top(&self, key: &str, max_entries: isize) -> Result<()> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let total: isize = conn.zcard(key).await?;
                if total > max_entries {
                    let _: () = conn.zremrangebyrank(key, 0, total - max_entries - 1).await?;
                }
                Ok(())
            }
            Backend::Fake(fake) => {
                fake.zremrangebyrank_keep_top(key, max_entries);
                Ok(())
            }
        }
    }

    // -- streams --------------------------------------------------------------

    /// Append an entry to a stream, trimming it to approximately `maxlen`
    /// entries (Redis `MAXLEN ~`).
    pub async fn xadd_bounded(
        &self,
        stream: &str,
        fields: &[(&str, String)],
        maxlen: usize,
    ) -> Result<String> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let mut cmd = redis::cmd("XADD");
                cmd.arg(stream).arg("MAXLEN").arg("~").arg(maxlen).arg("*");
                for (field, value) in fields {
                    cmd.arg(*field).arg(value);
                }
                let id: String = cmd.query_async(&mut conn).await?;
                Ok(id)
            }
            Backend::Fake(fake) => Ok(fake.xadd_bounded(stream, fields, maxlen)),
        }
    }

    pub async fn xlen(&self, stream: &str) -> Result<u64> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                Ok(conn.xlen(stream).await?)
            }
            Backend::Fake(fake) => Ok(fake.xlen(stream)),
        }
    }

    /// All stream entries with an id timestamp >= `since_ms`.
    pub async fn xrange_since(
        &self,
        stream: &str,
        since_ms: i64,
    ) -> Result<Vec<HashMap<String, String>>> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let start = format!("{since_ms}-0");
                let result: redis::streams::StreamRangeReply = conn
                    .xrange(stream, start, "+")
                    .await
                    .map_err(WikiSurgeError::from)?;
                Ok(result
                    .ids
                    .into_iter()
                    .map(|entry| {
                        entry
                            .map
                            .into_iter()
                            .filter_map(|(k, v)| {
                                redis::from_redis_value::<String>(&v).ok().map(|s| (k, s))
                            })
                            .collect::<HashMap<String, String>>()
                    })
                    .collect())
            }
            Backend::Fake(fake) => Ok(fake.xrange_since(stream, since_ms)),
        }
    }

    /// Publishes a message on a pub/sub channel (e.g. the live edit feed
    /// the WebSocket forwarder fans out from).
    pub async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let _: i64 = conn.publish(channel, message).await?;
                Ok(())
            }
            Backend::Fake(fake) => {
                fake.publish(channel, message);
                Ok(())
            }
        }
    }

    /// Raw command escape hatch for operations not otherwise wrapped (e.g.
    /// administrative commands used only in tests). Not available against
    /// the fake backend, which only implements the typed operations above.
    pub async fn raw<T: redis::FromRedisValue>(&self, cmd: redis::Cmd) -> RedisResult<T> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                cmd.query_async(&mut conn).await
            }
            Backend::Fake(_) => Err(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "raw commands are not supported against the fake store backend",
            ))),
        }
    }
}

pub fn debug_key(label: &str, key: &str) {
    debug!("{label}: {key}");
}
