//! LLM 层：补全客户端抽象、线上格式与实现（OpenAI 兼容 / Mock / Scripted）

pub mod mock;
pub mod openai;
pub mod traits;
pub mod wire;

pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{ClientSettings, OpenAiClient};
pub use traits::{ChatCompletionClient, RetryConfig, RetryingLlmClient};
pub use wire::{ChatRequest, ChatResponse, Choice, FunctionSchema, ResponseMessage, ToolSchema, Usage};
