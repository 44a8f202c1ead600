//! 能力提供者：按能力名为 Agent 装配私有工具
//!
//! RegistryProvider 读取配置中的 [capabilities.<name>]，为每个条目构建 PluginTool；
//! 能力名 `builtin` 提供内置 echo。能力名不区分大小写（配置加载会把表名转成小写）。未知能力名跳过并告警；条目非法则整体返回 CapabilityLoadError，
//! 由 Agent 初始化时降级为无工具。

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{AppConfig, CapabilitySection};
use crate::core::CapabilityLoadError;
use crate::tools::{EchoTool, PluginTool, Tool};

/// 内置能力名
pub const BUILTIN_CAPABILITY: &str = "builtin";

/// 给定能力名列表，返回可调用的工具句柄
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    async fn load(&self, capabilities: &[String]) -> Result<Vec<Arc<dyn Tool>>, CapabilityLoadError>;
}

/// 基于配置的能力注册表
#[derive(Debug, Clone, Default)]
pub struct RegistryProvider {
    registry: HashMap<String, CapabilitySection>,
    workspace: PathBuf,
    timeout_secs: u64,
}

impl RegistryProvider {
    pub fn new(registry: HashMap<String, CapabilitySection>, workspace: PathBuf, timeout_secs: u64) -> Self {
        Self {
            registry: registry.into_iter().map(|(name, section)| (name.to_lowercase(), section)).collect(),
            workspace,
            timeout_secs,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        let workspace = cfg
            .tools
            .workspace_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(cfg.capabilities.clone(), workspace, cfg.tools.timeout_secs)
    }
}

#[async_trait]
impl CapabilityProvider for RegistryProvider {
    async fn load(&self, capabilities: &[String]) -> Result<Vec<Arc<dyn Tool>>, CapabilityLoadError> {
        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for capability in capabilities {
            let key = capability.to_lowercase();
            if key == BUILTIN_CAPABILITY {
                if !seen.insert("echo".to_string()) {
                    return Err(CapabilityLoadError::DuplicateTool("echo".to_string()));
                }
                tools.push(Arc::new(EchoTool));
                continue;
            }
            let Some(section) = self.registry.get(&key) else {
                tracing::warn!(capability = %capability, "unknown capability, skipped");
                continue;
            };
            for entry in &section.tools {
                if entry.program.trim().is_empty() {
                    return Err(CapabilityLoadError::MissingProgram {
                        capability: capability.clone(),
                        tool: entry.name.clone(),
                    });
                }
                if entry.parameters.as_ref().is_some_and(|p| !p.is_object()) {
                    return Err(CapabilityLoadError::InvalidSchema {
                        capability: capability.clone(),
                        tool: entry.name.clone(),
                    });
                }
                if !seen.insert(entry.name.clone()) {
                    return Err(CapabilityLoadError::DuplicateTool(entry.name.clone()));
                }
                tools.push(Arc::new(PluginTool::new(entry, &self.workspace, self.timeout_secs)));
            }
        }
        Ok(tools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginEntry;

    fn plugin(name: &str, program: &str) -> PluginEntry {
        PluginEntry {
            name: name.into(),
            description: String::new(),
            program: program.into(),
            args: vec![],
            parameters: None,
        }
    }

    fn provider(entries: Vec<(&str, Vec<PluginEntry>)>) -> RegistryProvider {
        let registry = entries
            .into_iter()
            .map(|(k, tools)| (k.to_string(), CapabilitySection { tools }))
            .collect();
        RegistryProvider::new(registry, PathBuf::from("."), 5)
    }

    fn names(tools: &[Arc<dyn Tool>]) -> Vec<String> {
        tools.iter().map(|t| t.name().to_string()).collect()
    }

    #[tokio::test]
    async fn test_loads_requested_capabilities_in_order() {
        let p = provider(vec![
            ("search", vec![plugin("web_search", "search.sh")]),
            ("files", vec![plugin("read", "cat"), plugin("list", "ls")]),
        ]);
        let tools = p
            .load(&["files".into(), "builtin".into(), "missing".into()])
            .await
            .unwrap();
        assert_eq!(names(&tools), vec!["read", "list", "echo"]);
    }

    #[tokio::test]
    async fn test_capability_names_ignore_case() {
        let p = provider(vec![("WebSearch", vec![plugin("web_search", "search.sh")])]);
        let tools = p.load(&["WebSearch".into(), "BuiltIn".into()]).await.unwrap();
        assert_eq!(names(&tools), vec!["web_search", "echo"]);
    }

    #[tokio::test]
    async fn test_mixed_case_capability_from_config_file() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [[agents]]
                id = "a"
                name = "A"
                capabilities = ["WebSearch"]

                [capabilities.WebSearch]
                tools = [{ name = "web_search", program = "search.sh" }]
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        let tools = RegistryProvider::from_config(&cfg)
            .load(&cfg.agents[0].capabilities)
            .await
            .unwrap();
        assert_eq!(names(&tools), vec!["web_search"]);
    }

    #[tokio::test]
    async fn test_empty_program_is_load_error() {
        let p = provider(vec![("bad", vec![plugin("broken", " ")])]);
        let err = p.load(&["bad".into()]).await.err().unwrap();
        assert!(matches!(err, CapabilityLoadError::MissingProgram { .. }));
    }

    #[tokio::test]
    async fn test_non_object_schema_is_load_error() {
        let mut entry = plugin("odd", "odd.sh");
        entry.parameters = Some(serde_json::json!("string"));
        let p = provider(vec![("odd", vec![entry])]);
        let err = p.load(&["odd".into()]).await.err().unwrap();
        assert!(matches!(err, CapabilityLoadError::InvalidSchema { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let p = provider(vec![
            ("a", vec![plugin("dup", "x")]),
            ("b", vec![plugin("dup", "y")]),
        ]);
        let err = p.load(&["a".into(), "b".into()]).await.err().unwrap();
        assert_eq!(err, CapabilityLoadError::DuplicateTool("dup".into()));
    }
}
