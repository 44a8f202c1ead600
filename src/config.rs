//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MASS__*` 覆盖（双下划线表示嵌套，如 `MASS__LLM__MODEL=gpt-4o-mini`）。
//! 角色（[[agents]]）与能力注册表（[capabilities.<name>]）也在同一文件中声明。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub engine: EngineSection,
    pub tools: ToolsSection,
    pub agents: Vec<AgentSection>,
    /// 能力名 -> 该能力提供的工具
    pub capabilities: HashMap<String, CapabilitySection>,
}

/// [app] 段：调试模式、退出时自动保存、历史目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub debug_mode: bool,
    pub save_on_exit: bool,
    pub history_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            debug_mode: false,
            save_on_exit: false,
            history_dir: PathBuf::from("history"),
        }
    }
}

/// [llm] 段：所有角色共用的默认连接参数（角色可单独覆盖 model / base_url / api_key）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub user_agent: Option<String>,
    /// 未配置任何 API Key 时退回 Mock 客户端
    pub allow_mock: bool,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            base_url: None,
            api_key: None,
            timeout_secs: 30,
            max_retries: 2,
            user_agent: None,
            allow_mock: true,
        }
    }
}

/// [engine] 段：ReAct 循环上限与同批工具是否并发
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub max_rounds: usize,
    pub parallel_tool_calls: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_rounds: 20,
            parallel_tool_calls: false,
        }
    }
}

/// [tools] 段：单次工具调用超时、插件工作目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub timeout_secs: u64,
    pub workspace_root: Option<PathBuf>,
}

impl ToolsSection {
    /// 创建配置的工作目录（未配置时什么也不做）
    pub fn ensure_workspace(&self) -> std::io::Result<()> {
        match self.workspace_root.as_deref() {
            Some(dir) => std::fs::create_dir_all(dir),
            None => Ok(()),
        }
    }
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            workspace_root: None,
        }
    }
}

/// [[agents]] 条目：一个角色
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub system_prompt: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// 该角色私有的能力名列表（对应 [capabilities.<name>]，或内置 builtin）
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// [capabilities.<name>] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CapabilitySection {
    pub tools: Vec<PluginEntry>,
}

/// 进程型插件工具：program + 参数模板（{{key}} 取自模型传入的参数，{{workspace}} 为工作目录）
#[derive(Debug, Clone, Deserialize)]
pub struct PluginEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// 参数 JSON Schema；缺省为任意对象
    pub parameters: Option<serde_json::Value>,
}

/// 依次尝试的默认配置文件（不含扩展名），取第一个存在的
const DEFAULT_CONFIG_CANDIDATES: [&str; 3] = ["config/default", "../config/default", "default"];

fn default_config_file() -> Option<&'static str> {
    DEFAULT_CONFIG_CANDIDATES
        .into_iter()
        .find(|stem| Path::new(&format!("{stem}.toml")).is_file())
}

/// 分层加载：默认 TOML -> 显式指定的文件 -> 环境变量 MASS__*
///
/// 显式文件不存在时只告警；环境变量用双下划线表示嵌套键（MASS__ENGINE__MAX_ROUNDS=5）。
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(stem) = default_config_file() {
        builder = builder.add_source(config::File::with_name(stem).required(false));
    }
    match config_path {
        Some(path) if path.is_file() => {
            builder = builder.add_source(config::File::from(path));
        }
        Some(path) => tracing::warn!(path = %path.display(), "config file not found, ignoring"),
        None => {}
    }
    builder
        .add_source(
            config::Environment::with_prefix("MASS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> AppConfig {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let cfg = parse("");
        assert_eq!(cfg.engine.max_rounds, 20);
        assert!(!cfg.engine.parallel_tool_calls);
        assert_eq!(cfg.llm.model, "gpt-4o");
        assert_eq!(cfg.app.history_dir, PathBuf::from("history"));
        assert!(cfg.agents.is_empty());
    }

    #[test]
    fn test_ensure_workspace() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("ws/inner");
        let tools = ToolsSection {
            workspace_root: Some(nested.clone()),
            ..ToolsSection::default()
        };
        tools.ensure_workspace().unwrap();
        assert!(nested.is_dir());
        assert!(ToolsSection::default().ensure_workspace().is_ok());

        // 父路径是普通文件时无法创建
        let file = dir.path().join("plain");
        std::fs::write(&file, "x").unwrap();
        let blocked = ToolsSection {
            workspace_root: Some(file.join("ws")),
            ..ToolsSection::default()
        };
        assert!(blocked.ensure_workspace().is_err());
    }

    #[test]
    fn test_agents_and_capabilities() {
        let cfg = parse(
            r#"
            [engine]
            max_rounds = 5

            [[agents]]
            id = "scammer"
            name = "Mallory"
            system_prompt = "You are persuasive."
            model = "gpt-4o-mini"
            capabilities = ["search", "builtin"]

            [[agents]]
            id = "victim"
            name = "Victor"

            [capabilities.search]
            tools = [
              { name = "web_search", description = "Search the web", program = "search.sh", args = ["{{query}}"], parameters = { type = "object", properties = { query = { type = "string" } } } },
            ]
            "#,
        );
        assert_eq!(cfg.engine.max_rounds, 5);
        assert_eq!(cfg.agents.len(), 2);
        assert_eq!(cfg.agents[0].capabilities, vec!["search", "builtin"]);
        assert_eq!(cfg.agents[1].system_prompt, "");
        let search = &cfg.capabilities["search"];
        assert_eq!(search.tools[0].args, vec!["{{query}}"]);
        let params = search.tools[0].parameters.as_ref().unwrap();
        assert_eq!(params["properties"]["query"]["type"], "string");
    }
}
