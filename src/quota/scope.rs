use std::fmt;

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::Serialize;
use thiserror::Error;

use crate::cache::keys::{quota_key, user_devices_key};
use crate::error::AppError;

pub const DEVICE_ID_HEADER: &str = "x-device-id";
pub const USER_ID_HEADER: &str = "x-user-id";

/// 设备ID最短长度
pub const MIN_DEVICE_ID_CHARS: usize = 8;
/// 用户ID最长保留长度，超出部分截断
pub const MAX_USER_ID_CHARS: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScopeError {
    #[error("X-Device-Id header is required")]
    MissingDeviceId,

    #[error("X-Device-Id must be at least {MIN_DEVICE_ID_CHARS} characters")]
    DeviceIdTooShort,

    #[error("{0} header is not valid text")]
    InvalidHeader(&'static str),
}

/// 限流单位类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
    Device,
    User,
}

impl ScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::Device => "device",
            ScopeType::User => "user",
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 被限流的单位
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeIdentity {
    pub scope_type: ScopeType,
    pub scope_id: String,
}

impl ScopeIdentity {
    pub fn storage_key(&self) -> String {
        quota_key(self.scope_type.as_str(), &self.scope_id)
    }
}

impl fmt::Display for ScopeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope_type, self.scope_id)
    }
}

/// 请求携带的客户端身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub device_id: String,
    pub user_id: Option<String>,
}

impl ClientIdentity {
    /// 从请求头的原始值解析客户端身份
    ///
    /// 设备ID必填；用户ID为空时视为未提供，过长时截断。
    pub fn parse(device_id: Option<&str>, user_id: Option<&str>) -> Result<Self, ScopeError> {
        let device_id = device_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ScopeError::MissingDeviceId)?;

        if device_id.chars().count() < MIN_DEVICE_ID_CHARS {
            return Err(ScopeError::DeviceIdTooShort);
        }

        let user_id = user_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| id.chars().take(MAX_USER_ID_CHARS).collect::<String>());

        Ok(Self {
            device_id: device_id.to_string(),
            user_id,
        })
    }

    /// 有用户ID时按用户限流，否则按设备限流
    pub fn scope(&self) -> ScopeIdentity {
        match &self.user_id {
            Some(user_id) => ScopeIdentity {
                scope_type: ScopeType::User,
                scope_id: user_id.clone(),
            },
            None => ScopeIdentity {
                scope_type: ScopeType::Device,
                scope_id: self.device_id.clone(),
            },
        }
    }

    /// 用户设备集合的键，仅在按用户限流时存在
    pub fn device_registry_key(&self) -> Option<String> {
        self.user_id.as_deref().map(user_devices_key)
    }
}

fn header_value<'a>(parts: &'a Parts, name: &'static str) -> Result<Option<&'a str>, ScopeError> {
    match parts.headers.get(name) {
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| ScopeError::InvalidHeader(name)),
        None => Ok(None),
    }
}

impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let device_id = header_value(parts, DEVICE_ID_HEADER)?;
        let user_id = header_value(parts, USER_ID_HEADER)?;
        Ok(ClientIdentity::parse(device_id, user_id)?)
    }
}
