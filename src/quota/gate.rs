use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{ClientIdentity, QuotaError, QuotaPolicy, ScopeIdentity};
use crate::cache::QuotaStore;

/// 配额检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed {
        used: u32,
        limit: u32,
    },
    Denied {
        used: u32,
        limit: u32,
        retry_after_secs: u64,
        block_until: i64,
    },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed { .. })
    }
}

/// 配额闸门
///
/// 在调用上游生成接口之前消耗一次配额。消耗在调用前记录，
/// 无论上游是否成功都不会退还。
pub struct QuotaGate {
    store: Arc<dyn QuotaStore>,
    policy: QuotaPolicy,
}

impl QuotaGate {
    pub fn new(store: Arc<dyn QuotaStore>, policy: QuotaPolicy) -> Self {
        info!(
            store = store.store_type(),
            limit = policy.limit_per_batch,
            cooldown_secs = policy.cooldown_secs,
            "Quota gate initialized"
        );
        Self { store, policy }
    }

    pub async fn check_and_consume(
        &self,
        scope: &ScopeIdentity,
    ) -> Result<QuotaDecision, QuotaError> {
        self.check_and_consume_at(scope, Utc::now().timestamp_millis())
            .await
    }

    /// 以指定时间（毫秒时间戳）执行配额检查
    pub async fn check_and_consume_at(
        &self,
        scope: &ScopeIdentity,
        now_ms: i64,
    ) -> Result<QuotaDecision, QuotaError> {
        let key = scope.storage_key();
        let outcome = self
            .store
            .check_and_consume(&key, &self.policy, now_ms)
            .await?;
        let limit = self.policy.limit_per_batch;

        if outcome.allowed {
            debug!(scope = %scope, used = outcome.used, limit, "Quota consumed");
            return Ok(QuotaDecision::Allowed {
                used: outcome.used,
                limit,
            });
        }

        let block_until = outcome
            .block_until
            .unwrap_or(now_ms + self.policy.cooldown_ms());
        let retry_after_secs = ((block_until - now_ms).max(0) as u64).div_ceil(1000);

        info!(scope = %scope, used = outcome.used, retry_after_secs, "Quota cooldown active");
        Ok(QuotaDecision::Denied {
            used: outcome.used,
            limit,
            retry_after_secs,
            block_until,
        })
    }

    /// 记录用户使用的设备，失败只记录日志
    pub async fn record_device(&self, identity: &ClientIdentity) {
        let Some(key) = identity.device_registry_key() else {
            return;
        };

        if let Err(e) = self
            .store
            .record_device(&key, &identity.device_id, self.policy.device_registry_ttl_secs)
            .await
        {
            warn!(key = %key, error = %e, "Failed to record user device");
        }
    }
}
