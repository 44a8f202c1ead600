//! 核心层：错误类型与对话编排

pub mod error;
pub mod orchestrator;

pub use error::{
    CapabilityLoadError, DialogueError, HistoryError, LlmError, ToolError, TurnError,
};
pub use orchestrator::{DialogueManager, DialogueSettings};
