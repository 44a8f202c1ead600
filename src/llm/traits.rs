//! 补全客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock / Scripted）实现 ChatCompletionClient：一次请求返回一条 assistant 消息。
//! RetryingLlmClient 包装任意后端，是唯一的重试层：连接失败、429 与 5xx 最多重试 max_retries 次。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::LlmError;
use crate::llm::{ChatRequest, ChatResponse};

/// 补全客户端 trait（非流式）
#[async_trait]
pub trait ChatCompletionClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;
}

/// 重试配置：最大重试次数与线性退避基数
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

/// 带重试的客户端包装
pub struct RetryingLlmClient {
    inner: Arc<dyn ChatCompletionClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn ChatCompletionClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl ChatCompletionClient for RetryingLlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let mut attempt = 0u32;
        loop {
            match self.inner.complete(request).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, max = self.config.max_retries, error = %e, "retrying completion request");
                    tokio::time::sleep(self.config.backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
