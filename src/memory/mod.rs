//! 记忆层：协议消息、时间线数据模型、共享时间线存储与持久化

pub mod conversation;
pub mod history;
pub mod persistence;
pub mod turn;

pub use conversation::{Message, Role};
pub use history::HistoryStore;
pub use persistence::HistoryPersistence;
pub use turn::{FunctionCall, Step, ToolCall, ToolCallBatch, ToolObservation, Turn};
