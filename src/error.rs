use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::generation::GenerationError;
use crate::quota::{QuotaError, ScopeError, ScopeType};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    InvalidIdentity(#[from] ScopeError),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    InvalidStyle(String),

    #[error("Unsupported mime type: {0}")]
    InvalidMimeType(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Generation limit reached, retry in {retry_after_secs} seconds")]
    Cooldown {
        scope: ScopeType,
        used: u32,
        limit: u32,
        retry_after_secs: u64,
    },

    #[error("Quota service unavailable, try again later")]
    QuotaUnavailable(#[from] QuotaError),

    #[error("Image generation failed")]
    Upstream(#[from] GenerationError),
}

#[derive(Serialize)]
struct CooldownDetails {
    scope: ScopeType,
    used: u32,
    limit: u32,
    retry_after_seconds: u64,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
    #[serde(flatten)]
    cooldown: Option<CooldownDetails>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidIdentity(_)
            | AppError::InvalidRequest(_)
            | AppError::InvalidStyle(_)
            | AppError::InvalidMimeType(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Cooldown { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::QuotaUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream(GenerationError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidIdentity(_) => "INVALID_DEVICE_ID",
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::InvalidStyle(_) => "INVALID_STYLE",
            AppError::InvalidMimeType(_) => "INVALID_MIME_TYPE",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::Cooldown { .. } => "COOLDOWN",
            AppError::QuotaUnavailable(_) => "QUOTA_UNAVAILABLE",
            AppError::Upstream(GenerationError::Timeout(_)) => "UPSTREAM_TIMEOUT",
            AppError::Upstream(_) => "UPSTREAM_ERROR",
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return AppError::PayloadTooLarge("Request body too large".to_string());
        }
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let cooldown = match &self {
            AppError::Cooldown {
                scope,
                used,
                limit,
                retry_after_secs,
            } => Some(CooldownDetails {
                scope: *scope,
                used: *used,
                limit: *limit,
                retry_after_seconds: *retry_after_secs,
            }),
            _ => None,
        };
        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code(),
            cooldown,
        });

        let mut response = (status, body).into_response();
        if let AppError::Cooldown {
            retry_after_secs, ..
        } = self
        {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
