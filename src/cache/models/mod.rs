/// 缓存数据模型
/// 定义缓存数据的结构体
pub mod quota;

pub use quota::{ConsumeOutcome, QuotaRecord};
