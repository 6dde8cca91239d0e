//! 内存配额存储
//!
//! 使用 DashMap 的分片锁保证同一个键的检查与写回是原子的。
//! 状态只存在于当前进程，适用于测试和单实例本地开发。

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::QuotaStore;
use crate::cache::models::{ConsumeOutcome, QuotaRecord};
use crate::quota::{QuotaError, QuotaPolicy};

#[derive(Debug, Clone, Copy)]
struct StoredRecord {
    record: QuotaRecord,
    expires_at: i64,
}

#[derive(Debug, Clone, Default)]
struct StoredDevices {
    devices: HashSet<String>,
    expires_at: i64,
}

#[derive(Default)]
pub struct MemoryQuotaStore {
    records: DashMap<String, StoredRecord>,
    devices: DashMap<String, StoredDevices>,
    operations: AtomicU64,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取当前记录，已过期的记录视为不存在
    pub fn record(&self, key: &str, now_ms: i64) -> Option<QuotaRecord> {
        self.records
            .get(key)
            .filter(|stored| stored.expires_at > now_ms)
            .map(|stored| stored.record)
    }

    /// 用户名下记录过的设备
    pub fn devices(&self, key: &str) -> HashSet<String> {
        self.devices
            .get(key)
            .map(|stored| stored.devices.clone())
            .unwrap_or_default()
    }

    /// 当前保存的键数量
    pub fn key_count(&self) -> usize {
        self.records.len() + self.devices.len()
    }

    /// 已执行的存储操作次数
    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn check_and_consume(
        &self,
        key: &str,
        policy: &QuotaPolicy,
        now_ms: i64,
    ) -> Result<ConsumeOutcome, QuotaError> {
        self.operations.fetch_add(1, Ordering::SeqCst);

        let mut entry = self
            .records
            .entry(key.to_string())
            .or_insert_with(|| StoredRecord {
                record: QuotaRecord::default(),
                expires_at: now_ms,
            });

        // 超过保留期的记录等同于新记录
        if entry.expires_at <= now_ms {
            entry.record = QuotaRecord::default();
        }

        let (outcome, write) =
            entry
                .record
                .consume(policy.limit_per_batch, policy.cooldown_ms(), now_ms);

        if let Some(next) = write {
            entry.record = next;
            entry.expires_at = now_ms + policy.record_ttl_secs as i64 * 1000;
        }

        trace!(key = %key, allowed = outcome.allowed, used = outcome.used, "Memory quota check");
        Ok(outcome)
    }

    async fn record_device(
        &self,
        key: &str,
        device_id: &str,
        ttl_secs: u64,
    ) -> Result<(), QuotaError> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        let mut entry = self.devices.entry(key.to_string()).or_default();
        entry.devices.insert(device_id.to_string());
        entry.expires_at = Utc::now().timestamp_millis() + ttl_secs as i64 * 1000;
        Ok(())
    }

    async fn cleanup(&self, now_ms: i64) -> Result<(), QuotaError> {
        self.records.retain(|_, stored| stored.expires_at > now_ms);
        self.devices.retain(|_, stored| stored.expires_at > now_ms);
        debug!(key_count = self.key_count(), "Memory quota store cleanup complete");
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(limit: u32) -> QuotaPolicy {
        QuotaPolicy {
            limit_per_batch: limit,
            cooldown_secs: 100,
            record_ttl_secs: 1_000,
            device_registry_ttl_secs: 10_000,
        }
    }

    #[tokio::test]
    async fn test_counts_up_to_limit_then_blocks() {
        let store = MemoryQuotaStore::new();
        let policy = policy(3);

        for expected in 1..=3 {
            let outcome = store.check_and_consume("k", &policy, 0).await.unwrap();
            assert!(outcome.allowed);
            assert_eq!(outcome.used, expected);
        }

        let outcome = store.check_and_consume("k", &policy, 0).await.unwrap();
        assert!(!outcome.allowed);
        assert_eq!(outcome.block_until, Some(100_000));
        assert_eq!(
            store.record("k", 0),
            Some(QuotaRecord { used: 3, block_until: Some(100_000) })
        );
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = MemoryQuotaStore::new();
        let policy = policy(1);

        assert!(store.check_and_consume("a", &policy, 0).await.unwrap().allowed);
        assert!(store.check_and_consume("b", &policy, 0).await.unwrap().allowed);
        assert!(!store.check_and_consume("a", &policy, 0).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_expired_record_is_forgotten() {
        let store = MemoryQuotaStore::new();
        let policy = policy(1);

        assert!(store.check_and_consume("k", &policy, 0).await.unwrap().allowed);
        assert!(store.record("k", 999_999).is_some());
        assert!(store.record("k", 1_000_000).is_none());

        let outcome = store.check_and_consume("k", &policy, 1_000_000).await.unwrap();
        assert!(outcome.allowed);
        assert_eq!(outcome.used, 1);
    }

    #[tokio::test]
    async fn test_concurrent_attempts_are_not_over_admitted() {
        let store = std::sync::Arc::new(MemoryQuotaStore::new());
        let policy = policy(5);

        let attempts = (0..32).map(|_| {
            let store = store.clone();
            let policy = policy.clone();
            tokio::spawn(async move { store.check_and_consume("k", &policy, 0).await })
        });

        let results = futures_util::future::join_all(attempts).await;
        let allowed = results
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .filter(|outcome| outcome.allowed)
            .count();

        assert_eq!(allowed, 5);
        assert_eq!(store.record("k", 0).unwrap().used, 5);
    }

    #[tokio::test]
    async fn test_cleanup_drops_expired_entries() {
        let store = MemoryQuotaStore::new();
        let policy = policy(3);
        let now = Utc::now().timestamp_millis();

        store.check_and_consume("old", &policy, 0).await.unwrap();
        store.check_and_consume("fresh", &policy, now).await.unwrap();
        store.record_device("userdevices:u", "device-a", 10).await.unwrap();
        assert_eq!(store.key_count(), 3);

        store.cleanup(now).await.unwrap();
        assert!(store.record("old", 0).is_none());
        assert!(store.record("fresh", now).is_some());
        assert!(store.devices("userdevices:u").contains("device-a"));
        assert_eq!(store.key_count(), 2);

        // 设备集合保留 10 秒
        store.cleanup(now + 60_000).await.unwrap();
        assert!(store.devices("userdevices:u").is_empty());
        assert!(store.record("fresh", now).is_some());
        assert_eq!(store.key_count(), 1);
    }

    #[tokio::test]
    async fn test_record_device_collects_set() {
        let store = MemoryQuotaStore::new();
        store.record_device("userdevices:u", "device-a", 10).await.unwrap();
        store.record_device("userdevices:u", "device-b", 10).await.unwrap();
        store.record_device("userdevices:u", "device-a", 10).await.unwrap();

        let devices = store.devices("userdevices:u");
        assert_eq!(devices.len(), 2);
        assert!(devices.contains("device-b"));
    }
}
