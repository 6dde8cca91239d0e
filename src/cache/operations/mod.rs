/// 缓存操作
/// 提供配额存储的抽象以及 Redis / 内存两种实现
pub mod memory;
pub mod quota;

pub use memory::MemoryQuotaStore;
pub use quota::RedisQuotaStore;

use async_trait::async_trait;

use crate::cache::models::ConsumeOutcome;
use crate::quota::{QuotaError, QuotaPolicy};

/// 配额存储后端
///
/// `check_and_consume` 必须对同一个键原子地完成读取、判断和写回，
/// 同一客户端的并发请求不能因为读写交错而被多放行。
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// 检查并消耗一次配额
    async fn check_and_consume(
        &self,
        key: &str,
        policy: &QuotaPolicy,
        now_ms: i64,
    ) -> Result<ConsumeOutcome, QuotaError>;

    /// 记录用户使用过的设备，仅用于审计
    async fn record_device(
        &self,
        key: &str,
        device_id: &str,
        ttl_secs: u64,
    ) -> Result<(), QuotaError>;

    /// 清理已过期的数据，Redis 依赖键的 TTL 自行过期
    async fn cleanup(&self, _now_ms: i64) -> Result<(), QuotaError> {
        Ok(())
    }

    /// 存储类型名称，用于日志
    fn store_type(&self) -> &'static str;
}
