//! 生成请求的配额与冷却控制
//!
//! 每个客户端（用户或设备）在一个批次内最多发起 `limit_per_batch` 次生成，
//! 用尽后进入固定时长的冷却期，冷却结束后开始新的批次。

mod gate;
mod scope;

pub use gate::{QuotaDecision, QuotaGate};
pub use scope::{
    ClientIdentity, DEVICE_ID_HEADER, MAX_USER_ID_CHARS, MIN_DEVICE_ID_CHARS, ScopeError,
    ScopeIdentity, ScopeType, USER_ID_HEADER,
};

use thiserror::Error;

/// 配额策略参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaPolicy {
    /// 每个批次允许的尝试次数
    pub limit_per_batch: u32,
    /// 用尽后的冷却时长（秒）
    pub cooldown_secs: u64,
    /// 配额记录保留时长（秒），只限制存储增长，不影响冷却
    pub record_ttl_secs: u64,
    /// 用户设备集合保留时长（秒）
    pub device_registry_ttl_secs: u64,
}

impl QuotaPolicy {
    pub fn cooldown_ms(&self) -> i64 {
        self.cooldown_secs as i64 * 1000
    }
}

/// 配额存储错误
#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Quota store error: {0}")]
    Store(String),
}

impl QuotaError {
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::Store(msg.into())
    }
}
