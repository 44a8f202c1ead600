//! 工具层：Tool trait 与注册表、执行器、能力提供者、插件与内置工具

pub mod echo;
pub mod executor;
pub mod plugin;
pub mod provider;
pub mod registry;
pub mod schema;

pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use plugin::PluginTool;
pub use provider::{CapabilityProvider, RegistryProvider, BUILTIN_CAPABILITY};
pub use registry::{Tool, ToolRegistry};
pub use schema::parameters_schema_for;
