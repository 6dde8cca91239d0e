//! 上游图片生成调用
//!
//! 生成本身完全交给外部模型完成，这里只负责提示词、请求封装、
//! 单次重试和整体超时。

mod gemini;
pub mod prompts;

pub use gemini::GeminiClient;
pub use prompts::Style;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

/// 最多尝试次数（首次调用加一次重试）
pub const MAX_ATTEMPTS: u32 = 2;

/// 生成请求
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub image: Vec<u8>,
    pub mime_type: String,
    pub style: Style,
    pub note: Option<String>,
}

/// 生成结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub data: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Upstream error: {status} - {message}")]
    Upstream { status: u16, message: String },

    #[error("Upstream returned no image")]
    EmptyImage,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to decode upstream response: {0}")]
    Decode(String),

    #[error("Upstream call timed out after {0:?}")]
    Timeout(Duration),
}

impl GenerationError {
    /// 仅上游 5xx 和无图片的响应可以重试
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Upstream { status, .. } => *status >= 500,
            GenerationError::EmptyImage => true,
            _ => false,
        }
    }
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest)
    -> Result<GeneratedImage, GenerationError>;
}

/// 在截止时间内调用生成接口，可重试错误最多重试一次
///
/// 超时后正在进行的调用被直接丢弃。
pub async fn generate_with_retry(
    generator: &dyn ImageGenerator,
    request: &GenerationRequest,
    deadline: Duration,
) -> Result<GeneratedImage, GenerationError> {
    let attempts = async {
        let mut attempt = 1;
        loop {
            match generator.generate(request).await {
                Ok(image) => return Ok(image),
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    warn!(attempt, error = %e, "Upstream generation failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    };

    match tokio::time::timeout(deadline, attempts).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// 按顺序返回预设结果的生成器
    struct ScriptedGenerator {
        results: Mutex<VecDeque<Result<GeneratedImage, GenerationError>>>,
        calls: AtomicU32,
        delay: Option<Duration>,
    }

    impl ScriptedGenerator {
        fn new(results: Vec<Result<GeneratedImage, GenerationError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: AtomicU32::new(0),
                delay: None,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageGenerator for ScriptedGenerator {
        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> Result<GeneratedImage, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(GenerationError::EmptyImage))
        }
    }

    fn image() -> GeneratedImage {
        GeneratedImage {
            data: vec![1, 2, 3],
            mime_type: "image/png".to_string(),
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            image: vec![0xff],
            mime_type: "image/png".to_string(),
            style: Style::Clean,
            note: None,
        }
    }

    fn server_error() -> GenerationError {
        GenerationError::Upstream {
            status: 503,
            message: "overloaded".to_string(),
        }
    }

    #[tokio::test]
    async fn test_success_needs_single_call() {
        let generator = ScriptedGenerator::new(vec![Ok(image())]);
        let result = generate_with_retry(&generator, &request(), Duration::from_secs(60)).await;
        assert_eq!(result.unwrap(), image());
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_retried_once() {
        let generator = ScriptedGenerator::new(vec![Err(server_error()), Ok(image())]);
        let result = generate_with_retry(&generator, &request(), Duration::from_secs(60)).await;
        assert!(result.is_ok());
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_image_twice_gives_up() {
        let generator = ScriptedGenerator::new(vec![
            Err(GenerationError::EmptyImage),
            Err(GenerationError::EmptyImage),
            Ok(image()),
        ]);
        let result = generate_with_retry(&generator, &request(), Duration::from_secs(60)).await;
        assert!(matches!(result, Err(GenerationError::EmptyImage)));
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let generator = ScriptedGenerator::new(vec![
            Err(GenerationError::Upstream {
                status: 400,
                message: "bad image".to_string(),
            }),
            Ok(image()),
        ]);
        let result = generate_with_retry(&generator, &request(), Duration::from_secs(60)).await;
        assert!(matches!(
            result,
            Err(GenerationError::Upstream { status: 400, .. })
        ));
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_aborts_slow_call() {
        let mut generator = ScriptedGenerator::new(vec![Ok(image())]);
        generator.delay = Some(Duration::from_secs(120));

        let result = generate_with_retry(&generator, &request(), Duration::from_secs(60)).await;
        assert!(matches!(result, Err(GenerationError::Timeout(d)) if d == Duration::from_secs(60)));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(server_error().is_retryable());
        assert!(GenerationError::EmptyImage.is_retryable());
        assert!(!GenerationError::Decode("bad".into()).is_retryable());
        assert!(!GenerationError::Timeout(Duration::from_secs(1)).is_retryable());
    }
}
