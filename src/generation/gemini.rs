//! Gemini `generateContent` client.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::prompts::build_prompt;
use super::{GeneratedImage, GenerationError, GenerationRequest, ImageGenerator};

const API_KEY_HEADER: &str = "x-goog-api-key";
/// 错误信息最多保留的字符数
const MAX_ERROR_MESSAGE_CHARS: usize = 512;

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

fn to_gemini_request(request: &GenerationRequest) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![
                RequestPart {
                    inline_data: Some(InlineData {
                        mime_type: request.mime_type.clone(),
                        data: BASE64.encode(&request.image),
                    }),
                    text: None,
                },
                RequestPart {
                    inline_data: None,
                    text: Some(build_prompt(request.style, request.note.as_deref())),
                },
            ],
        }],
    }
}

/// 取第一个候选结果中第一个带图片数据的部分
fn extract_image(response: &GenerateContentResponse) -> Option<&ResponseInlineData> {
    response
        .candidates
        .first()?
        .content
        .as_ref()?
        .parts
        .iter()
        .filter_map(|part| part.inline_data.as_ref())
        .find(|inline| inline.data.as_deref().is_some_and(|d| !d.is_empty()))
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedImage, GenerationError> {
        debug!(
            model = %self.model,
            style = %request.style,
            bytes = request.image.len(),
            "Sending generation request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&to_gemini_request(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                message: message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect(),
            });
        }

        let body = response.text().await?;
        let parsed: GenerateContentResponse =
            serde_json::from_str(&body).map_err(|e| GenerationError::Decode(e.to_string()))?;

        let inline = extract_image(&parsed).ok_or(GenerationError::EmptyImage)?;
        let data = BASE64
            .decode(inline.data.as_deref().unwrap_or_default())
            .map_err(|e| GenerationError::Decode(e.to_string()))?;

        Ok(GeneratedImage {
            data,
            mime_type: inline
                .mime_type
                .clone()
                .unwrap_or_else(|| "image/png".to_string()),
        })
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    inline_data: Option<ResponseInlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseInlineData {
    mime_type: Option<String>,
    data: Option<String>,
}
