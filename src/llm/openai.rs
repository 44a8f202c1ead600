//! OpenAI 兼容 API 客户端
//!
//! 直接用 reqwest 向 `{base_url}/chat/completions` 发送本 crate 的线上类型，这样工具调用记录可以原样进入时间线。
//! 本层不做任何重试，失败一次就返回；重试只由 RetryingLlmClient 负责。
//! 非 2xx 响应保留 HTTP 状态码，错误体按 async_openai 的 ApiError 解析。

use std::time::Duration;

use async_openai::config::OPENAI_API_BASE;
use async_openai::error::ApiError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::core::LlmError;
use crate::llm::{ChatCompletionClient, ChatRequest, ChatResponse};

/// 连接参数（每个 Agent 可以有自己的 key / base_url）
#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub user_agent: Option<String>,
}

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

/// 服务端错误体：{"error": {...}}
#[derive(Deserialize)]
struct ErrorBody {
    error: ApiError,
}

impl OpenAiClient {
    pub fn new(settings: &ClientSettings) -> Result<Self, LlmError> {
        let api_key = settings
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());
        let base = settings.base_url.as_deref().unwrap_or(OPENAI_API_BASE);

        let mut http = reqwest::Client::builder();
        if settings.timeout_secs > 0 {
            http = http.timeout(Duration::from_secs(settings.timeout_secs));
        }
        if let Some(ua) = settings.user_agent.as_deref() {
            http = http.user_agent(ua);
        }
        let http = http
            .build()
            .map_err(|e| LlmError::Connection(format!("http client build failed: {}", e)))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key,
        })
    }

    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;
        if !status.is_success() {
            return Err(map_status(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

/// 非 2xx 响应 → Status；能解析出 ApiError 就用它的描述，否则用原始响应体
fn map_status(status: StatusCode, body: &str) -> LlmError {
    let message = match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error.to_string(),
        Err(_) if body.trim().is_empty() => status.canonical_reason().unwrap_or("no body").to_string(),
        Err(_) => body.trim().to_string(),
    };
    LlmError::Status {
        code: Some(status.as_u16()),
        message,
    }
}

#[async_trait]
impl ChatCompletionClient for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.send(request).await.map_err(|e| {
            tracing::error!(model = %request.model, error = %e, "completion request failed");
            e
        })
    }
}
