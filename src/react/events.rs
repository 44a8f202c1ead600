//! ReAct 过程事件：调试模式下用于展示每轮请求、工具调用、观察与回复

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 第几轮补全请求
    RoundStarted {
        agent: String,
        round: usize,
        max_rounds: usize,
    },
    /// 调用工具
    ToolCall {
        agent: String,
        tool: String,
        call_id: String,
        arguments: String,
    },
    /// 工具返回（预览，避免过长）
    Observation {
        agent: String,
        tool: String,
        call_id: String,
        preview: String,
    },
    /// 工具执行失败，错误标记已写回模型
    ToolFailure {
        agent: String,
        tool: String,
        reason: String,
    },
    /// 最终回复
    Reply { agent: String, text: String },
    /// 单次响应的 Token 使用
    TokenUsage {
        agent: String,
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
    },
}
