//! 认知层：私有视角上下文重建与 ReAct 主循环

pub mod context;
pub mod events;
pub mod loop_;

pub use context::ContextBuilder;
pub use events::ReactEvent;
pub use loop_::{react_loop, ReactResult, ReactSession, DEFAULT_MAX_ROUNDS};
