use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::generation::prompts::{DEFAULT_MIME_TYPE, normalize_mime_type, normalize_note};
use crate::generation::{GenerationRequest, Style};
use crate::quota::ScopeType;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub image_base64: Option<String>,
    pub mime_type: Option<String>,
    pub style: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuotaStatus {
    pub scope: ScopeType,
    pub used: u32,
    pub limit: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub image_base64: String,
    pub mime_type: String,
    pub style: Style,
    pub quota: QuotaStatus,
}

/// 拆分 `data:<mime>;base64,<payload>` 格式的图片数据
fn split_data_url(raw: &str) -> (Option<&str>, &str) {
    match raw.strip_prefix("data:").and_then(|rest| rest.split_once(',')) {
        Some((meta, payload)) => (meta.strip_suffix(";base64"), payload),
        None => (None, raw),
    }
}

impl GenerateRequest {
    /// 校验请求并转换为生成请求，所有检查都在消耗配额之前完成
    pub fn into_generation_request(
        self,
        max_image_bytes: usize,
    ) -> Result<GenerationRequest, AppError> {
        let raw = self
            .image_base64
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::InvalidRequest("imageBase64 is required".to_string()))?;

        let (data_url_mime, payload) = split_data_url(raw);

        // 解码前按长度估算，避免为超大请求分配内存
        if payload.len() / 4 * 3 > max_image_bytes + 2 {
            return Err(AppError::PayloadTooLarge(format!(
                "Image exceeds the {} byte limit",
                max_image_bytes
            )));
        }

        let image = BASE64
            .decode(payload)
            .map_err(|_| AppError::InvalidRequest("imageBase64 is not valid base64".to_string()))?;
        if image.is_empty() {
            return Err(AppError::InvalidRequest("imageBase64 is empty".to_string()));
        }
        if image.len() > max_image_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "Image exceeds the {} byte limit",
                max_image_bytes
            )));
        }

        let requested_mime = self
            .mime_type
            .as_deref()
            .or(data_url_mime)
            .unwrap_or(DEFAULT_MIME_TYPE);
        let mime_type = normalize_mime_type(requested_mime)
            .ok_or_else(|| AppError::InvalidMimeType(requested_mime.to_string()))?;

        let style = match self.style.as_deref().map(str::trim) {
            None | Some("") => Style::default(),
            Some(style) => style.parse::<Style>().map_err(AppError::InvalidStyle)?,
        };

        Ok(GenerationRequest {
            image,
            mime_type: mime_type.to_string(),
            style,
            note: normalize_note(self.note.as_deref()),
        })
    }
}
