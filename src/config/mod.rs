use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::quota::QuotaPolicy;

/// 配额存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaBackend {
    Redis,
    Memory,
}

impl FromStr for QuotaBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(QuotaBackend::Redis),
            "memory" => Ok(QuotaBackend::Memory),
            other => Err(format!("unknown quota backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// 仅 Redis 后端必填
    pub redis_url: Option<String>,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub quota_backend: QuotaBackend,
    pub quota_limit_per_batch: u32,
    pub quota_cooldown_secs: u64,
    pub quota_record_ttl_secs: u64,
    pub user_devices_ttl_secs: u64,
    pub upstream_timeout_secs: u64,
    pub max_image_bytes: usize,
    pub max_body_bytes: usize,
}

pub const DEFAULT_LIMIT_PER_BATCH: u32 = 20;
pub const DEFAULT_COOLDOWN_SECS: u64 = 15 * 60;
pub const DEFAULT_RECORD_TTL_SECS: u64 = 30 * 24 * 3600;
pub const DEFAULT_USER_DEVICES_TTL_SECS: u64 = 365 * 24 * 3600;
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;
pub const DEFAULT_MAX_BODY_BYTES: usize = 12 * 1024 * 1024;

/// 读取可选环境变量，缺失或解析失败时使用默认值
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = %raw, "Invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

/// Redis 后端要求提供连接地址，内存后端忽略缺失的地址
fn resolve_redis_url(
    backend: QuotaBackend,
    value: Result<String, env::VarError>,
) -> Result<Option<String>, env::VarError> {
    match backend {
        QuotaBackend::Redis => value.map(Some),
        QuotaBackend::Memory => Ok(value.ok()),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let quota_backend = env_or("QUOTA_BACKEND", QuotaBackend::Redis);

        Ok(Config {
            redis_url: resolve_redis_url(quota_backend, env::var("REDIS_URL"))?,
            gemini_api_key: env::var("GEMINI_API_KEY")?,
            gemini_model: env_or("GEMINI_MODEL", "gemini-2.5-flash-image".to_string()),
            gemini_base_url: env_or(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com".to_string(),
            ),
            server_host: env_or("SERVER_HOST", "0.0.0.0".to_string()),
            server_port: env_or("SERVER_PORT", 3000),
            api_base_uri: env_or("API_BASE_URI", "/api".to_string()),
            quota_backend,
            quota_limit_per_batch: env_or("QUOTA_LIMIT_PER_BATCH", DEFAULT_LIMIT_PER_BATCH),
            quota_cooldown_secs: env_or("QUOTA_COOLDOWN_SECS", DEFAULT_COOLDOWN_SECS),
            quota_record_ttl_secs: env_or("QUOTA_RECORD_TTL_SECS", DEFAULT_RECORD_TTL_SECS),
            user_devices_ttl_secs: env_or("USER_DEVICES_TTL_SECS", DEFAULT_USER_DEVICES_TTL_SECS),
            upstream_timeout_secs: env_or("UPSTREAM_TIMEOUT_SECS", DEFAULT_UPSTREAM_TIMEOUT_SECS),
            max_image_bytes: env_or("MAX_IMAGE_BYTES", DEFAULT_MAX_IMAGE_BYTES),
            max_body_bytes: env_or("MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES),
        })
    }

    pub fn quota_policy(&self) -> QuotaPolicy {
        QuotaPolicy {
            limit_per_batch: self.quota_limit_per_batch,
            cooldown_secs: self.quota_cooldown_secs,
            record_ttl_secs: self.quota_record_ttl_secs,
            device_registry_ttl_secs: self.user_devices_ttl_secs,
        }
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}
