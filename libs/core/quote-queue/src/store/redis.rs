//! Durable Redis backend.
//!
//! Key layout under a prefix (default `quote_processing`):
//!
//! | Key | Type | Content |
//! |---|---|---|
//! | `{prefix}:queue` | sorted set | pending ids, score `-priority * 1e13 + sequence` |
//! | `{prefix}:queue:records` | hash | id -> pending message JSON |
//! | `{prefix}:processing` | hash | id -> leased record, field TTL `timeout + 60s` |
//! | `{prefix}:completed` | hash | id -> terminal message JSON, field TTL = retention |
//! | `{prefix}:stats` | hash | cumulative counters and the sequence counter |
//!
//! Records are read and transformed in Rust, then written back by a Lua script
//! that first checks the stored record is byte-for-byte the one that was read.
//! A lost race therefore changes nothing and surfaces as `InvalidState` (or a
//! retry, for leasing). Per-field TTLs need `HEXPIRE`, available from Redis 7.4.

use super::{Backend, QueueStore, lease_expired_error};
use crate::backoff::{RetryConfig, retry_with_backoff};
use crate::error::QueueError;
use crate::message::{CancelOutcome, EnqueueOptions, Message, MessageId, Payload, Resolution};
use crate::stats::{QueueCounters, QueueStats, StatsAccumulator};
use ::redis::aio::ConnectionManager;
use ::redis::{Client, Script};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Extra lifetime of a processing record beyond its lease
const LEASE_TTL_MARGIN_SECS: u64 = 60;

/// Attempts at claiming the queue head before reporting an empty queue
const LEASE_ATTEMPTS: usize = 16;

/// Attempts at cancelling a message that keeps changing underneath
const CANCEL_ATTEMPTS: usize = 3;

const ENQUEUE_SCRIPT: &str = r#"
if redis.call('ZCARD', KEYS[1]) >= tonumber(ARGV[4]) then
    return -1
end
local sequence = redis.call('HINCRBY', KEYS[3], 'sequence', 1)
local score = -tonumber(ARGV[3]) * 1e13 + sequence
redis.call('ZADD', KEYS[1], string.format('%.0f', score), ARGV[1])
redis.call('HSET', KEYS[2], ARGV[1], ARGV[2])
redis.call('HINCRBY', KEYS[3], 'total_enqueued', 1)
return sequence
"#;

const CLAIM_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[2], ARGV[1]) ~= ARGV[2] then
    return 0
end
if redis.call('ZREM', KEYS[1], ARGV[1]) == 0 then
    return 0
end
redis.call('HDEL', KEYS[2], ARGV[1])
redis.call('HSET', KEYS[3], ARGV[1], ARGV[3])
redis.call('HEXPIRE', KEYS[3], ARGV[4], 'FIELDS', 1, ARGV[1])
redis.call('HINCRBY', KEYS[4], 'total_leased', 1)
return 1
"#;

const PRUNE_SCRIPT: &str = r#"
if redis.call('HEXISTS', KEYS[2], ARGV[1]) == 0 then
    return redis.call('ZREM', KEYS[1], ARGV[1])
end
return 0
"#;

const FINISH_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], ARGV[1]) ~= ARGV[2] then
    return 0
end
redis.call('HDEL', KEYS[1], ARGV[1])
redis.call('HSET', KEYS[2], ARGV[1], ARGV[3])
redis.call('HEXPIRE', KEYS[2], ARGV[4], 'FIELDS', 1, ARGV[1])
for i = 5, #ARGV do
    redis.call('HINCRBY', KEYS[3], ARGV[i], 1)
end
return 1
"#;

const REQUEUE_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], ARGV[1]) ~= ARGV[2] then
    return 0
end
redis.call('HDEL', KEYS[1], ARGV[1])
redis.call('HSET', KEYS[3], ARGV[1], ARGV[3])
redis.call('ZADD', KEYS[2], ARGV[4], ARGV[1])
for i = 5, #ARGV do
    redis.call('HINCRBY', KEYS[4], ARGV[i], 1)
end
return 1
"#;

const CANCEL_PENDING_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[2], ARGV[1]) ~= ARGV[2] then
    return 0
end
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('HDEL', KEYS[2], ARGV[1])
redis.call('HSET', KEYS[3], ARGV[1], ARGV[3])
redis.call('HEXPIRE', KEYS[3], ARGV[4], 'FIELDS', 1, ARGV[1])
redis.call('HINCRBY', KEYS[4], 'total_cancelled', 1)
return 1
"#;

// HSET drops a field's TTL, so it is set again
const REPLACE_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], ARGV[1]) ~= ARGV[2] then
    return 0
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[3])
redis.call('HEXPIRE', KEYS[1], ARGV[4], 'FIELDS', 1, ARGV[1])
return 1
"#;

/// Oldest server with per-field hash expiry
const MIN_SERVER_VERSION: (u32, u32) = (7, 4);

/// Major and minor version from an `INFO server` reply
fn parse_server_version(info: &str) -> Option<(u32, u32)> {
    let version = info
        .lines()
        .find_map(|line| line.strip_prefix("redis_version:"))?;
    let mut parts = version.trim().split('.').map(|part| part.parse::<u32>().ok());
    Some((parts.next()??, parts.next()??))
}

/// Fully qualified key names for one queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisKeys {
    pub queue: String,
    pub records: String,
    pub processing: String,
    pub completed: String,
    pub stats: String,
}

impl RedisKeys {
    pub fn new(prefix: &str) -> Self {
        Self {
            queue: format!("{prefix}:queue"),
            records: format!("{prefix}:queue:records"),
            processing: format!("{prefix}:processing"),
            completed: format!("{prefix}:completed"),
            stats: format!("{prefix}:stats"),
        }
    }
}

/// Redis store configuration
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub key_prefix: String,
    /// Maximum number of PENDING messages
    pub max_size: usize,
    /// How long terminal messages are kept
    pub retention: Duration,
}

impl RedisStoreConfig {
    pub fn new(key_prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            ..Self::default()
        }
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "quote_processing".to_string(),
            max_size: 1000,
            retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// What lives in the processing hash: the message plus its queue score, so a
/// retry can go back to the same position.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeasedRecord {
    message: Message,
    score: f64,
}

struct Scripts {
    enqueue: Script,
    claim: Script,
    prune: Script,
    finish: Script,
    requeue: Script,
    cancel_pending: Script,
    replace: Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            enqueue: Script::new(ENQUEUE_SCRIPT),
            claim: Script::new(CLAIM_SCRIPT),
            prune: Script::new(PRUNE_SCRIPT),
            finish: Script::new(FINISH_SCRIPT),
            requeue: Script::new(REQUEUE_SCRIPT),
            cancel_pending: Script::new(CANCEL_PENDING_SCRIPT),
            replace: Script::new(REPLACE_SCRIPT),
        }
    }
}

/// Durable queue store shared by every worker using the same key prefix
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    keys: RedisKeys,
    max_size: usize,
    retention_secs: u64,
    scripts: Arc<Scripts>,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager, config: RedisStoreConfig) -> Self {
        Self {
            conn,
            keys: RedisKeys::new(&config.key_prefix),
            max_size: config.max_size,
            retention_secs: config.retention.as_secs().max(1),
            scripts: Arc::new(Scripts::load()),
        }
    }

    /// Connect with retries and verify the server answers PING
    pub async fn connect(
        url: &str,
        config: RedisStoreConfig,
        retry: &RetryConfig,
    ) -> Result<Self, QueueError> {
        let client = Client::open(url)
            .map_err(|e| QueueError::Config(format!("Invalid Redis URL: {e}")))?;

        let conn = retry_with_backoff(
            || {
                let client = client.clone();
                async move {
                    let mut conn = ConnectionManager::new(client).await?;
                    let _: String = ::redis::cmd("PING").query_async(&mut conn).await?;
                    Ok::<_, QueueError>(conn)
                }
            },
            retry,
        )
        .await?;

        let info: String = ::redis::cmd("INFO")
            .arg("server")
            .query_async(&mut conn.clone())
            .await?;
        match parse_server_version(&info) {
            Some(version) if version < MIN_SERVER_VERSION => {
                return Err(QueueError::Config(format!(
                    "Redis {}.{} does not support HEXPIRE, {}.{} or newer is required",
                    version.0, version.1, MIN_SERVER_VERSION.0, MIN_SERVER_VERSION.1
                )));
            }
            Some(_) => {}
            None => warn!("Could not read the Redis server version, assuming HEXPIRE support"),
        }

        info!(prefix = %config.key_prefix, "Connected to Redis queue backend");
        Ok(Self::new(conn, config))
    }

    pub fn keys(&self) -> &RedisKeys {
        &self.keys
    }

    fn processing_ttl(&self, message: &Message, now: DateTime<Utc>) -> u64 {
        let remaining = message
            .lease_deadline()
            .map(|deadline| (deadline - now).num_seconds().max(0) as u64)
            .unwrap_or(message.timeout_seconds);
        remaining + LEASE_TTL_MARGIN_SECS
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, QueueError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = ::redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await?;
        Ok(raw)
    }

    async fn hvals(&self, key: &str) -> Result<Vec<String>, QueueError> {
        let mut conn = self.conn.clone();
        let values: Vec<String> = ::redis::cmd("HVALS")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }

    async fn not_processing(&self, id: MessageId) -> QueueError {
        match self.get(id).await {
            Ok(Some(message)) => QueueError::invalid_state(
                id,
                format!("expected processing, found {}", message.status),
            ),
            Ok(None) => QueueError::invalid_state(id, "unknown message"),
            Err(e) => e,
        }
    }

    /// Apply an attempt outcome to a leased record and move it with a CAS script
    async fn resolve<F>(
        &self,
        id: MessageId,
        extra_counter: Option<&'static str>,
        apply: F,
    ) -> Result<Resolution, QueueError>
    where
        F: FnOnce(&mut Message) -> Result<Resolution, QueueError> + Send,
    {
        let field = id.to_string();
        let Some(raw) = self.hget(&self.keys.processing, &field).await? else {
            return Err(self.not_processing(id).await);
        };

        let mut leased: LeasedRecord = serde_json::from_str(&raw)?;
        let resolution = apply(&mut leased.message)?;
        let record = serde_json::to_string(&leased.message)?;

        let counter = match resolution {
            Resolution::Completed => "total_completed",
            Resolution::Requeued => "total_retries",
            Resolution::DeadLettered => "total_failed",
            Resolution::Cancelled => "total_cancelled",
        };

        let mut conn = self.conn.clone();
        let applied: i32 = if resolution == Resolution::Requeued {
            let mut invocation = self.scripts.requeue.prepare_invoke();
            invocation
                .key(&self.keys.processing)
                .key(&self.keys.queue)
                .key(&self.keys.records)
                .key(&self.keys.stats)
                .arg(&field)
                .arg(&raw)
                .arg(&record)
                .arg(leased.score)
                .arg(counter);
            if let Some(extra) = extra_counter {
                invocation.arg(extra);
            }
            invocation.invoke_async(&mut conn).await?
        } else {
            let mut invocation = self.scripts.finish.prepare_invoke();
            invocation
                .key(&self.keys.processing)
                .key(&self.keys.completed)
                .key(&self.keys.stats)
                .arg(&field)
                .arg(&raw)
                .arg(&record)
                .arg(self.retention_secs)
                .arg(counter);
            if let Some(extra) = extra_counter {
                invocation.arg(extra);
            }
            invocation.invoke_async(&mut conn).await?
        };

        if applied == 0 {
            return Err(QueueError::invalid_state(
                id,
                "lease was resolved concurrently",
            ));
        }
        Ok(resolution)
    }
}

#[async_trait]
impl QueueStore for RedisStore {
    fn backend(&self) -> Backend {
        Backend::Redis
    }

    async fn enqueue(
        &self,
        payload: Payload,
        options: EnqueueOptions,
    ) -> Result<MessageId, QueueError> {
        let message = Message::new(payload, options, Utc::now());
        let record = serde_json::to_string(&message)?;

        let mut conn = self.conn.clone();
        let sequence: i64 = self
            .scripts
            .enqueue
            .key(&self.keys.queue)
            .key(&self.keys.records)
            .key(&self.keys.stats)
            .arg(message.id.to_string())
            .arg(record)
            .arg(u32::from(message.priority.value()))
            .arg(self.max_size)
            .invoke_async(&mut conn)
            .await?;

        if sequence < 0 {
            return Err(QueueError::Capacity {
                max_size: self.max_size,
            });
        }

        info!(
            message_id = %message.id,
            priority = %message.priority,
            sequence,
            "Message enqueued"
        );
        Ok(message.id)
    }

    async fn lease_next(&self) -> Result<Option<Message>, QueueError> {
        let mut conn = self.conn.clone();

        for _ in 0..LEASE_ATTEMPTS {
            let head: Vec<(String, f64)> = ::redis::cmd("ZRANGE")
                .arg(&self.keys.queue)
                .arg(0)
                .arg(0)
                .arg("WITHSCORES")
                .query_async(&mut conn)
                .await?;
            let Some((field, score)) = head.into_iter().next() else {
                return Ok(None);
            };

            let Some(raw) = self.hget(&self.keys.records, &field).await? else {
                let pruned: i32 = self
                    .scripts
                    .prune
                    .key(&self.keys.queue)
                    .key(&self.keys.records)
                    .arg(&field)
                    .invoke_async(&mut conn)
                    .await?;
                if pruned > 0 {
                    warn!(message_id = %field, "Dropped queue entry without a record");
                }
                continue;
            };

            let mut message: Message = serde_json::from_str(&raw)?;
            let now = Utc::now();
            message.begin_lease(now)?;
            let leased = LeasedRecord {
                message: message.clone(),
                score,
            };
            let claimed: i32 = self
                .scripts
                .claim
                .key(&self.keys.queue)
                .key(&self.keys.records)
                .key(&self.keys.processing)
                .key(&self.keys.stats)
                .arg(&field)
                .arg(&raw)
                .arg(serde_json::to_string(&leased)?)
                .arg(self.processing_ttl(&message, now))
                .invoke_async(&mut conn)
                .await?;

            if claimed == 1 {
                debug!(message_id = %message.id, priority = %message.priority, "Message leased");
                return Ok(Some(message));
            }
            debug!(message_id = %field, "Lost lease race, retrying");
        }

        Ok(None)
    }

    async fn complete(&self, id: MessageId, result: Value) -> Result<Resolution, QueueError> {
        let now = Utc::now();
        self.resolve(id, None, |message| message.complete(now, result))
            .await
    }

    async fn fail(&self, id: MessageId, error: &str) -> Result<Resolution, QueueError> {
        let now = Utc::now();
        self.resolve(id, None, |message| message.fail(now, error))
            .await
    }

    async fn cancel(&self, id: MessageId) -> Result<CancelOutcome, QueueError> {
        let field = id.to_string();
        let mut conn = self.conn.clone();

        for _ in 0..CANCEL_ATTEMPTS {
            let now = Utc::now();

            if let Some(raw) = self.hget(&self.keys.records, &field).await? {
                let mut message: Message = serde_json::from_str(&raw)?;
                let outcome = message.cancel(now)?;
                let applied: i32 = self
                    .scripts
                    .cancel_pending
                    .key(&self.keys.queue)
                    .key(&self.keys.records)
                    .key(&self.keys.completed)
                    .key(&self.keys.stats)
                    .arg(&field)
                    .arg(&raw)
                    .arg(serde_json::to_string(&message)?)
                    .arg(self.retention_secs)
                    .invoke_async(&mut conn)
                    .await?;
                if applied == 1 {
                    info!(message_id = %id, "Pending message cancelled");
                    return Ok(outcome);
                }
                continue;
            }

            if let Some(raw) = self.hget(&self.keys.processing, &field).await? {
                let mut leased: LeasedRecord = serde_json::from_str(&raw)?;
                if leased.message.cancel_requested {
                    return Ok(CancelOutcome::Deferred);
                }
                let outcome = leased.message.cancel(now)?;
                let applied: i32 = self
                    .scripts
                    .replace
                    .key(&self.keys.processing)
                    .arg(&field)
                    .arg(&raw)
                    .arg(serde_json::to_string(&leased)?)
                    .arg(self.processing_ttl(&leased.message, now))
                    .invoke_async(&mut conn)
                    .await?;
                if applied == 1 {
                    info!(message_id = %id, "Cancel recorded for message in flight");
                    return Ok(outcome);
                }
                continue;
            }

            if let Some(raw) = self.hget(&self.keys.completed, &field).await? {
                let mut message: Message = serde_json::from_str(&raw)?;
                return message.cancel(now);
            }

            // The message may have moved between the three reads
            if self.get(id).await?.is_none() {
                return Err(QueueError::invalid_state(id, "unknown message"));
            }
        }

        Err(QueueError::invalid_state(
            id,
            "message kept changing state during cancel",
        ))
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<usize, QueueError> {
        let expired: Vec<MessageId> = self
            .hvals(&self.keys.processing)
            .await?
            .iter()
            .filter_map(|raw| match serde_json::from_str::<LeasedRecord>(raw) {
                Ok(leased) => Some(leased.message),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable processing record");
                    None
                }
            })
            .filter(|message| message.lease_expired(now))
            .map(|message| message.id)
            .collect();

        let mut reclaimed = 0;
        for id in expired {
            let outcome = self
                .resolve(id, Some("total_reclaimed"), |message| {
                    if !message.lease_expired(now) {
                        return Err(QueueError::invalid_state(message.id, "lease was renewed"));
                    }
                    let error = lease_expired_error(message);
                    message.fail(now, &error)
                })
                .await;

            match outcome {
                Ok(resolution) => {
                    reclaimed += 1;
                    info!(message_id = %id, resolution = %resolution, "Expired lease reclaimed");
                }
                Err(e) if e.is_invalid_state() => {
                    debug!(message_id = %id, error = %e, "Lease resolved before reclaim");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(reclaimed)
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>, QueueError> {
        let field = id.to_string();

        if let Some(raw) = self.hget(&self.keys.records, &field).await? {
            return Ok(Some(serde_json::from_str(&raw)?));
        }
        if let Some(raw) = self.hget(&self.keys.processing, &field).await? {
            let leased: LeasedRecord = serde_json::from_str(&raw)?;
            return Ok(Some(leased.message));
        }
        if let Some(raw) = self.hget(&self.keys.completed, &field).await? {
            return Ok(Some(serde_json::from_str(&raw)?));
        }
        Ok(None)
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<QueueStats, QueueError> {
        let mut acc = StatsAccumulator::new(now, self.max_size);

        for raw in self.hvals(&self.keys.records).await? {
            match serde_json::from_str::<Message>(&raw) {
                Ok(message) => acc.observe(&message),
                Err(e) => warn!(error = %e, "Skipping unreadable pending record"),
            }
        }
        for raw in self.hvals(&self.keys.processing).await? {
            match serde_json::from_str::<LeasedRecord>(&raw) {
                Ok(leased) => acc.observe(&leased.message),
                Err(e) => warn!(error = %e, "Skipping unreadable processing record"),
            }
        }
        for raw in self.hvals(&self.keys.completed).await? {
            match serde_json::from_str::<Message>(&raw) {
                Ok(message) => acc.observe(&message),
                Err(e) => warn!(error = %e, "Skipping unreadable terminal record"),
            }
        }

        let mut conn = self.conn.clone();
        let fields: HashMap<String, u64> = ::redis::cmd("HGETALL")
            .arg(&self.keys.stats)
            .query_async(&mut conn)
            .await?;

        Ok(acc.finish(QueueCounters::from_fields(&fields)))
    }

    async fn purge_terminal(&self, older_than: DateTime<Utc>) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let entries: HashMap<String, String> = ::redis::cmd("HGETALL")
            .arg(&self.keys.completed)
            .query_async(&mut conn)
            .await?;

        let stale: Vec<&String> = entries
            .iter()
            .filter(|(_, raw)| {
                serde_json::from_str::<Message>(raw)
                    .ok()
                    .and_then(|message| message.completed_at)
                    .is_some_and(|at| at < older_than)
            })
            .map(|(field, _)| field)
            .collect();

        if stale.is_empty() {
            return Ok(0);
        }

        let removed: usize = ::redis::cmd("HDEL")
            .arg(&self.keys.completed)
            .arg(&stale)
            .query_async(&mut conn)
            .await?;
        let _: i64 = ::redis::cmd("HINCRBY")
            .arg(&self.keys.stats)
            .arg("total_purged")
            .arg(removed)
            .query_async(&mut conn)
            .await?;

        debug!(purged = removed, "Purged terminal messages");
        Ok(removed)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: String = ::redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let keys = RedisKeys::new("quote_processing");
        assert_eq!(keys.queue, "quote_processing:queue");
        assert_eq!(keys.records, "quote_processing:queue:records");
        assert_eq!(keys.processing, "quote_processing:processing");
        assert_eq!(keys.completed, "quote_processing:completed");
        assert_eq!(keys.stats, "quote_processing:stats");
    }

    #[test]
    fn test_parse_server_version() {
        let info = "# Server\r\nredis_version:8.0.2\r\nredis_mode:standalone\r\n";
        assert_eq!(parse_server_version(info), Some((8, 0)));

        let old = "# Server\r\nredis_version:7.2.4\r\n";
        let version = parse_server_version(old).unwrap();
        assert!(version < MIN_SERVER_VERSION);

        assert_eq!(parse_server_version("# Server\r\nredis_mode:standalone\r\n"), None);
        assert_eq!(parse_server_version("redis_version:unknown\r\n"), None);
    }

    #[test]
    fn test_config_defaults() {
        let config = RedisStoreConfig::default();
        assert_eq!(config.key_prefix, "quote_processing");
        assert_eq!(config.max_size, 1000);
        assert_eq!(config.retention, Duration::from_secs(86_400));

        let config = RedisStoreConfig::new("test").with_max_size(5);
        assert_eq!(config.key_prefix, "test");
        assert_eq!(config.max_size, 5);
    }

    #[test]
    fn test_leased_record_round_trip_keeps_score() {
        let mut message = Message::new(Payload::new(), EnqueueOptions::default(), Utc::now());
        message.begin_lease(Utc::now()).unwrap();
        let record = LeasedRecord {
            message,
            score: -29_999_999_999_999.0,
        };

        let raw = serde_json::to_string(&record).unwrap();
        let decoded: LeasedRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(decoded.score, record.score);
        assert_eq!(decoded.message, record.message);
    }
}
