/// 配额记录缓存键前缀
const QUOTA_PREFIX: &str = "quota:";

/// 用户设备集合缓存键前缀
const USER_DEVICES_PREFIX: &str = "userdevices:";

/// 生成配额记录缓存键，格式为 `quota:<scope_type>:<scope_id>`
pub fn quota_key(scope_type: &str, scope_id: &str) -> String {
    format!("{}{}:{}", QUOTA_PREFIX, scope_type, scope_id)
}

/// 生成用户设备集合缓存键
pub fn user_devices_key(user_id: &str) -> String {
    format!("{}{}", USER_DEVICES_PREFIX, user_id)
}
