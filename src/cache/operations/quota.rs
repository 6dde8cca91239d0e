use std::sync::Arc;

use async_trait::async_trait;
use redis::Client as RedisClient;
use tracing::trace;

use super::QuotaStore;
use crate::cache::models::ConsumeOutcome;
use crate::quota::{QuotaError, QuotaPolicy};

/// 原子地检查并消耗配额
///
/// 记录保存在哈希 `used` / `block_until` 两个字段中，
/// 返回 `{allowed, used, block_until}`，未设置冷却时 `block_until` 为 0。
const CHECK_AND_CONSUME_SCRIPT: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local cooldown_ms = tonumber(ARGV[2])
local ttl = tonumber(ARGV[3])
local now = tonumber(ARGV[4])

local data = redis.call('HMGET', key, 'used', 'block_until')
local used = tonumber(data[1]) or 0
local block_until = tonumber(data[2])

if block_until and block_until > now then
    return {0, used, block_until}
end

if block_until then
    used = 0
    redis.call('HDEL', key, 'block_until')
end

if used >= limit then
    block_until = now + cooldown_ms
    redis.call('HSET', key, 'used', limit, 'block_until', block_until)
    redis.call('EXPIRE', key, ttl)
    return {0, limit, block_until}
end

used = used + 1
redis.call('HSET', key, 'used', used)
redis.call('EXPIRE', key, ttl)
return {1, used, 0}
"#;

/// Redis 配额存储
pub struct RedisQuotaStore {
    redis: Arc<RedisClient>,
    script: redis::Script,
}

impl RedisQuotaStore {
    pub fn new(redis: Arc<RedisClient>) -> Self {
        Self {
            redis,
            script: redis::Script::new(CHECK_AND_CONSUME_SCRIPT),
        }
    }
}

#[async_trait]
impl QuotaStore for RedisQuotaStore {
    async fn check_and_consume(
        &self,
        key: &str,
        policy: &QuotaPolicy,
        now_ms: i64,
    ) -> Result<ConsumeOutcome, QuotaError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let (allowed, used, block_until): (i64, i64, i64) = self
            .script
            .key(key)
            .arg(policy.limit_per_batch)
            .arg(policy.cooldown_ms())
            .arg(policy.record_ttl_secs)
            .arg(now_ms)
            .invoke_async(&mut conn)
            .await?;

        trace!(key = %key, allowed, used, block_until, "Redis quota check");

        let used = u32::try_from(used)
            .map_err(|_| QuotaError::store(format!("corrupt used counter: {}", used)))?;

        Ok(ConsumeOutcome {
            allowed: allowed == 1,
            used,
            block_until: (block_until > 0).then_some(block_until),
        })
    }

    async fn record_device(
        &self,
        key: &str,
        device_id: &str,
        ttl_secs: u64,
    ) -> Result<(), QuotaError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let _: () = redis::pipe()
            .atomic()
            .sadd(key, device_id)
            .ignore()
            .expire(key, ttl_secs as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::AsyncCommands;

    const T0: i64 = 1_700_000_000_000;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/".to_string())
    }

    fn policy(limit: u32, cooldown_secs: u64) -> QuotaPolicy {
        QuotaPolicy {
            limit_per_batch: limit,
            cooldown_secs,
            record_ttl_secs: 1000,
            device_registry_ttl_secs: 1000,
        }
    }

    async fn fresh_store(key: &str) -> (RedisQuotaStore, redis::aio::MultiplexedConnection) {
        let client = Arc::new(RedisClient::open(redis_url()).unwrap());
        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(key).await.unwrap();
        (RedisQuotaStore::new(client), conn)
    }

    #[tokio::test]
    #[ignore = "Requires running Redis instance"]
    async fn test_batch_then_cooldown_then_new_batch() {
        let key = "quota:device:test-redis-batch";
        let (store, _conn) = fresh_store(key).await;
        let policy = policy(2, 100);

        let first = store.check_and_consume(key, &policy, T0).await.unwrap();
        assert!(first.allowed);
        assert_eq!(first.used, 1);

        let second = store.check_and_consume(key, &policy, T0 + 1).await.unwrap();
        assert!(second.allowed);
        assert_eq!(second.used, 2);

        let third = store.check_and_consume(key, &policy, T0 + 2).await.unwrap();
        assert!(!third.allowed);
        assert_eq!(third.used, 2);
        assert_eq!(third.block_until, Some(T0 + 2 + 100_000));

        let during = store
            .check_and_consume(key, &policy, T0 + 50_000)
            .await
            .unwrap();
        assert!(!during.allowed);
        assert_eq!(during.block_until, Some(T0 + 2 + 100_000));

        let after = store
            .check_and_consume(key, &policy, T0 + 101_000)
            .await
            .unwrap();
        assert!(after.allowed);
        assert_eq!(after.used, 1);
        assert_eq!(after.block_until, None);
    }

    #[tokio::test]
    #[ignore = "Requires running Redis instance"]
    async fn test_denial_during_block_does_not_write() {
        let key = "quota:device:test-redis-block";
        let (store, mut conn) = fresh_store(key).await;
        let policy = policy(1, 100);

        assert!(store.check_and_consume(key, &policy, T0).await.unwrap().allowed);
        let blocked = store.check_and_consume(key, &policy, T0 + 1).await.unwrap();
        assert!(!blocked.allowed);

        // 缩短 TTL，拒绝后若被刷新会回到 1000
        let _: () = conn.expire(key, 500).await.unwrap();

        let denied = store
            .check_and_consume(key, &policy, T0 + 10_000)
            .await
            .unwrap();
        assert!(!denied.allowed);

        let block_until: Option<i64> = conn.hget(key, "block_until").await.unwrap();
        assert_eq!(block_until, blocked.block_until);
        let used: Option<u32> = conn.hget(key, "used").await.unwrap();
        assert_eq!(used, Some(1));
        let ttl: i64 = conn.ttl(key).await.unwrap();
        assert!(ttl > 0 && ttl <= 500, "ttl was refreshed to {}", ttl);
    }

    #[tokio::test]
    #[ignore = "Requires running Redis instance"]
    async fn test_concurrent_attempts_admit_exactly_limit() {
        let key = "quota:device:test-redis-concurrent";
        let (store, _conn) = fresh_store(key).await;
        let store = Arc::new(store);
        let policy = policy(5, 100);

        let attempts = (0..20).map(|_| {
            let store = store.clone();
            let policy = policy.clone();
            async move { store.check_and_consume(key, &policy, T0).await.unwrap() }
        });
        let outcomes = futures_util::future::join_all(attempts).await;

        assert_eq!(outcomes.iter().filter(|o| o.allowed).count(), 5);
        assert!(outcomes.iter().all(|o| o.used <= 5));
    }

    #[tokio::test]
    #[ignore = "Requires running Redis instance"]
    async fn test_record_device_sets_ttl() {
        let key = "userdevices:test-redis-user";
        let (store, mut conn) = fresh_store(key).await;

        store.record_device(key, "device-aaaa", 1000).await.unwrap();
        store.record_device(key, "device-bbbb", 1000).await.unwrap();
        store.record_device(key, "device-aaaa", 1000).await.unwrap();

        let members: std::collections::HashSet<String> = conn.smembers(key).await.unwrap();
        assert_eq!(members.len(), 2);
        let ttl: i64 = conn.ttl(key).await.unwrap();
        assert!(ttl > 0 && ttl <= 1000);
    }
}
