//! MASS - 多 Agent 模拟对话框架
//!
//! 模块划分：
//! - **agent**: Agent 身份、补全客户端与私有工具
//! - **cli**: 交互式命令行
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与对话编排
//! - **llm**: 补全客户端抽象与实现（OpenAI 兼容 / Mock / Scripted）
//! - **memory**: 时间线数据模型、共享时间线与持久化
//! - **observability**: 日志初始化
//! - **react**: 私有视角上下文重建与 ReAct 主循环
//! - **tools**: 工具 trait、注册表、执行器与能力提供者

pub mod agent;
pub mod cli;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;
