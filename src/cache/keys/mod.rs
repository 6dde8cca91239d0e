/// 缓存键模块
/// 提供各种缓存键生成函数
pub mod quota_keys;

pub use quota_keys::{quota_key, user_devices_key};
