//! Mock 补全客户端（无需 API）
//!
//! - MockLlmClient：回显最后一条 user 消息，未配置 API Key 时用于本地跑通对话流程
//! - ScriptedLlmClient：按脚本依次返回预设响应并记录每次请求，用于测试 ReAct 循环

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::LlmError;
use crate::llm::{ChatCompletionClient, ChatRequest, ChatResponse};
use crate::memory::Role;

/// Mock 客户端：回显其他人最近的发言
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl ChatCompletionClient for MockLlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text())
            .unwrap_or("(no input)");
        Ok(ChatResponse::text(format!("Echo from Mock: {}", last_user)))
    }
}

/// 脚本客户端：响应用完后返回 InvalidResponse
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlmClient {
    pub fn new(responses: Vec<Result<ChatResponse, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 已收到的全部请求（按顺序）
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatCompletionClient for ScriptedLlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        next.unwrap_or_else(|| Err(LlmError::InvalidResponse("script exhausted".to_string())))
    }
}
