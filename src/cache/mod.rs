// 缓存模块
// 包含配额记录的数据结构、键和存储操作

pub mod keys;
pub mod models;
pub mod operations;

pub use models::{ConsumeOutcome, QuotaRecord};
pub use operations::{MemoryQuotaStore, QuotaStore, RedisQuotaStore};
