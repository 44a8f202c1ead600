//! 错误类型
//!
//! 分层：LlmError（补全服务）→ TurnError（整轮失败，不写入时间线）；
//! ToolError 仅在工具执行器内部出现，最终转为 Observation 文本；
//! CapabilityLoadError 在 Agent 初始化时被吞掉（Agent 退化为无工具）。

use std::path::PathBuf;

use thiserror::Error;

/// 补全服务调用失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// 服务端拒绝请求（额度、鉴权、请求格式错误等）
    #[error("provider rejected request (status {}): {message}", code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    Status { code: Option<u16>, message: String },

    /// 传输层失败（DNS、连接、超时）
    #[error("provider connection failed: {0}")]
    Connection(String),

    /// 响应无法解析或缺少 choices
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// 连接失败、429 与 5xx 可重试；其余拒绝（鉴权、请求格式）不重试
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Connection(_) => true,
            LlmError::Status { code: Some(code), .. } => *code == 429 || (500..600).contains(code),
            _ => false,
        }
    }
}

/// 单轮发言失败：一律整轮作废，不追加半成品 Turn
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    #[error("provider status error: {0}")]
    ProviderStatus(LlmError),

    #[error("provider connection error: {0}")]
    ProviderConnection(LlmError),

    #[error("provider returned an unusable response: {0}")]
    InvalidResponse(LlmError),

    #[error("reasoning loop exceeded {max_rounds} completion rounds")]
    RoundLimitExceeded { max_rounds: usize },

    #[error("turn cancelled")]
    Cancelled,
}

impl From<LlmError> for TurnError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Status { .. } => TurnError::ProviderStatus(err),
            LlmError::Connection(_) => TurnError::ProviderConnection(err),
            LlmError::InvalidResponse(_) => TurnError::InvalidResponse(err),
        }
    }
}

/// 单个工具调用失败；Display 即写回给模型的错误标记文本
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Error: Tool {0} not found.")]
    UnknownTool(String),

    #[error("Error: invalid arguments for {tool}: {detail}")]
    InvalidArguments { tool: String, detail: String },

    #[error("Error: {0}")]
    Failed(String),

    #[error("Error: tool {tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },
}

/// 外部工具注册表初始化失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityLoadError {
    #[error("capability {capability}: tool {tool} has no program")]
    MissingProgram { capability: String, tool: String },

    #[error("capability {capability}: tool {tool} parameters must be a JSON object schema")]
    InvalidSchema { capability: String, tool: String },

    #[error("duplicate tool name {0} across capabilities")]
    DuplicateTool(String),
}

/// 时间线导入导出失败
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("history decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("history IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// 某个 Turn 的工具调用与工具返回不成对
    #[error("turn {position} has unpaired tool calls in internal_steps")]
    UnpairedSteps { position: usize },
}

/// 编排层错误
#[derive(Error, Debug)]
pub enum DialogueError {
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("no agents configured")]
    NoAgents,

    #[error("no turn at position {position} (timeline has {len})")]
    TurnNotFound { position: usize, len: usize },

    #[error("agent {agent}: client init failed: {source}")]
    AgentInit { agent: String, source: LlmError },

    #[error(transparent)]
    Turn(#[from] TurnError),

    #[error(transparent)]
    History(#[from] HistoryError),
}
