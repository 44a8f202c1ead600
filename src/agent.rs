//! Agent：身份、补全客户端与私有工具
//!
//! 每个 Agent 持有自己的 system prompt、模型名、补全客户端与工具执行器；工具只对该 Agent 可见。
//! 初始化时向 CapabilityProvider 申请能力，失败则降级为无工具并记录错误，不阻止启动。

use std::sync::Arc;
use std::time::Duration;

use crate::config::{AgentSection, LlmSection, ToolsSection};
use crate::core::LlmError;
use crate::llm::{
    ChatCompletionClient, ClientSettings, MockLlmClient, OpenAiClient, RetryConfig, RetryingLlmClient,
};
use crate::tools::{CapabilityProvider, ToolExecutor, ToolRegistry};

/// Agent 身份：id 在一次会话中唯一，name 是他人看到的显示名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    pub system_prompt: String,
}

/// 一个参与对话的 Agent
pub struct Agent {
    pub profile: AgentProfile,
    pub model: String,
    pub client: Arc<dyn ChatCompletionClient>,
    pub executor: ToolExecutor,
}

impl Agent {
    pub fn new(
        profile: AgentProfile,
        model: impl Into<String>,
        client: Arc<dyn ChatCompletionClient>,
        executor: ToolExecutor,
    ) -> Self {
        Self {
            profile,
            model: model.into(),
            client,
            executor,
        }
    }

    /// 从配置构建：解析连接参数、创建客户端、加载能力
    pub async fn from_config(
        section: &AgentSection,
        llm: &LlmSection,
        tools: &ToolsSection,
        provider: &dyn CapabilityProvider,
    ) -> Result<Self, LlmError> {
        let profile = AgentProfile {
            id: section.id.clone(),
            name: section.name.clone(),
            system_prompt: section.system_prompt.clone(),
        };
        let model = section.model.clone().unwrap_or_else(|| llm.model.clone());
        let client = create_client(section, llm)?;

        let executor = match provider.load(&section.capabilities).await {
            Ok(handles) => {
                let registry: ToolRegistry = handles.into_iter().collect();
                ToolExecutor::new(registry, tools.timeout_secs)
            }
            Err(e) => {
                tracing::error!(agent = %section.id, error = %e, "capability load failed, agent runs without tools");
                ToolExecutor::empty()
            }
        };

        tracing::info!(
            agent = %profile.id,
            model = %model,
            tools = ?executor.tool_names(),
            "agent initialized"
        );
        Ok(Self::new(profile, model, client, executor))
    }

    pub fn id(&self) -> &str {
        &self.profile.id
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }
}

/// 角色级参数优先于 [llm]；没有任何 Key 且允许 Mock 时退回 MockLlmClient
fn create_client(section: &AgentSection, llm: &LlmSection) -> Result<Arc<dyn ChatCompletionClient>, LlmError> {
    let api_key = section
        .api_key
        .clone()
        .or_else(|| llm.api_key.clone())
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());

    if api_key.is_none() && llm.allow_mock {
        tracing::warn!(agent = %section.id, "No API key set, using Mock LLM");
        return Ok(Arc::new(MockLlmClient));
    }

    let settings = ClientSettings {
        base_url: section.base_url.clone().or_else(|| llm.base_url.clone()),
        api_key,
        timeout_secs: llm.timeout_secs,
        user_agent: llm.user_agent.clone(),
    };
    let inner: Arc<dyn ChatCompletionClient> = Arc::new(OpenAiClient::new(&settings)?);
    Ok(Arc::new(RetryingLlmClient::new(
        inner,
        RetryConfig {
            max_retries: llm.max_retries,
            backoff: Duration::from_millis(500),
        },
    )))
}
