//! 对话编排器
//!
//! 负责：按配置创建全部 Agent、持有共享时间线，并提供 speak / auto / delete / export / load / debug。
//! 同一时刻只有一个 Turn 在进行（turn_lock）；Turn 开始时在读锁下取快照，结束后在写锁下追加，
//! 因此进行中的 Turn 不受期间 delete / load 影响。Agent 本身无状态，删除或加载后无需重同步。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::agent::Agent;
use crate::config::AppConfig;
use crate::core::DialogueError;
use crate::memory::{HistoryPersistence, HistoryStore, Turn};
use crate::react::{react_loop, ReactEvent, ReactSession, DEFAULT_MAX_ROUNDS};
use crate::tools::RegistryProvider;

/// 编排参数（来自 [app] 与 [engine]）
#[derive(Debug, Clone)]
pub struct DialogueSettings {
    pub max_rounds: usize,
    pub parallel_tool_calls: bool,
    pub debug_mode: bool,
    pub save_on_exit: bool,
    pub history_dir: PathBuf,
}

impl Default for DialogueSettings {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            parallel_tool_calls: false,
            debug_mode: false,
            save_on_exit: false,
            history_dir: PathBuf::from("history"),
        }
    }
}

impl From<&AppConfig> for DialogueSettings {
    fn from(cfg: &AppConfig) -> Self {
        if cfg.engine.max_rounds == 0 {
            tracing::warn!("engine.max_rounds = 0, using 1");
        }
        Self {
            max_rounds: cfg.engine.max_rounds.max(1),
            parallel_tool_calls: cfg.engine.parallel_tool_calls,
            debug_mode: cfg.app.debug_mode,
            save_on_exit: cfg.app.save_on_exit,
            history_dir: cfg.app.history_dir.clone(),
        }
    }
}

/// 多 Agent 对话管理器
pub struct DialogueManager {
    /// 按配置顺序排列（auto 轮转顺序）
    agents: Vec<Agent>,
    index: HashMap<String, usize>,
    history: RwLock<HistoryStore>,
    turn_lock: Mutex<()>,
    persistence: HistoryPersistence,
    settings: DialogueSettings,
    debug: AtomicBool,
    event_tx: Option<UnboundedSender<ReactEvent>>,
}

impl DialogueManager {
    /// id 重复时保留先出现的 Agent
    pub fn new(agents: Vec<Agent>, settings: DialogueSettings) -> Self {
        let mut roster: Vec<Agent> = Vec::with_capacity(agents.len());
        let mut index = HashMap::new();
        for agent in agents {
            if index.contains_key(agent.id()) {
                tracing::warn!(agent = %agent.id(), "duplicate agent id, ignored");
                continue;
            }
            index.insert(agent.id().to_string(), roster.len());
            roster.push(agent);
        }
        Self {
            agents: roster,
            index,
            history: RwLock::new(HistoryStore::new()),
            turn_lock: Mutex::new(()),
            persistence: HistoryPersistence::new(&settings.history_dir),
            debug: AtomicBool::new(settings.debug_mode),
            settings,
            event_tx: None,
        }
    }

    /// 从配置创建全部 Agent；能力加载失败的 Agent 以无工具方式加入
    pub async fn from_config(cfg: &AppConfig) -> Result<Self, DialogueError> {
        let provider = RegistryProvider::from_config(cfg);
        let mut agents = Vec::with_capacity(cfg.agents.len());
        for section in &cfg.agents {
            let agent = Agent::from_config(section, &cfg.llm, &cfg.tools, &provider)
                .await
                .map_err(|source| DialogueError::AgentInit {
                    agent: section.id.clone(),
                    source,
                })?;
            agents.push(agent);
        }
        if agents.is_empty() {
            tracing::warn!("no agents configured");
        }
        Ok(Self::new(agents, DialogueSettings::from(cfg)))
    }

    /// 调试模式下向该通道推送 ReactEvent
    pub fn with_event_tx(mut self, tx: UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.index.get(id).map(|&i| &self.agents[i])
    }

    pub fn settings(&self) -> &DialogueSettings {
        &self.settings
    }

    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
        tracing::info!(enabled, "debug mode toggled");
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    /// 让指定 Agent 发言一次；失败时时间线不变
    pub async fn speak(&self, agent_id: &str, cancel: CancellationToken) -> Result<Turn, DialogueError> {
        let agent = self
            .agent(agent_id)
            .ok_or_else(|| DialogueError::UnknownAgent(agent_id.to_string()))?;

        let _turn = self.turn_lock.lock().await;
        let snapshot = self.history.read().await.snapshot();

        let mut session = ReactSession::new(agent, cancel)
            .with_max_rounds(self.settings.max_rounds)
            .with_parallel_tool_calls(self.settings.parallel_tool_calls);
        if self.debug_enabled() {
            if let Some(tx) = &self.event_tx {
                session = session.with_event_tx(tx);
            }
        }

        let result = react_loop(session, &snapshot).await.map_err(|e| {
            tracing::error!(agent = %agent_id, error = %e, "turn failed, nothing appended");
            e
        })?;

        let turn = Turn::new(agent.id(), agent.name(), result.response, result.steps);
        let mut history = self.history.write().await;
        let stored = history.append(turn).clone();
        tracing::info!(
            agent = %agent_id,
            steps = stored.internal_steps.len(),
            position = history.len() - 1,
            "turn appended"
        );
        Ok(stored)
    }

    /// 按花名册顺序轮转的前 rounds 个发言者
    pub fn round_robin(&self, rounds: usize) -> Result<Vec<String>, DialogueError> {
        if self.agents.is_empty() {
            return Err(DialogueError::NoAgents);
        }
        Ok((0..rounds)
            .map(|i| self.agents[i % self.agents.len()].id().to_string())
            .collect())
    }

    /// 自动轮转 rounds 次；任一 Turn 失败即停止，已完成的保留在时间线中
    pub async fn auto(&self, rounds: usize, cancel: CancellationToken) -> Result<Vec<Turn>, DialogueError> {
        let mut turns = Vec::with_capacity(rounds);
        for agent_id in self.round_robin(rounds)? {
            turns.push(self.speak(&agent_id, cancel.clone()).await?);
        }
        Ok(turns)
    }

    /// 当前时间线快照
    pub async fn turns(&self) -> Vec<Turn> {
        self.history.read().await.snapshot()
    }

    pub async fn len(&self) -> usize {
        self.history.read().await.len()
    }

    /// 按位置删除一个 Turn（连同其 Step）
    pub async fn delete(&self, position: usize) -> Result<Turn, DialogueError> {
        let mut history = self.history.write().await;
        let len = history.len();
        let removed = history
            .delete_at(position)
            .ok_or(DialogueError::TurnNotFound { position, len })?;
        tracing::info!(position, speaker = %removed.speaker_id, "turn deleted");
        Ok(removed)
    }

    /// 导出到 history 目录，返回文件路径
    pub async fn export(&self, name: Option<&str>) -> Result<PathBuf, DialogueError> {
        let store = HistoryStore::from_turns(self.turns().await);
        Ok(self.persistence.save(&store, name).await?)
    }

    /// 从文件整体替换时间线，返回加载的 Turn 数；失败时保持原状
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<usize, DialogueError> {
        let loaded = self.persistence.load(path).await?;
        let count = loaded.len();
        let unknown: Vec<&str> = loaded
            .turns()
            .iter()
            .map(|t| t.speaker_id.as_str())
            .filter(|id| !self.index.contains_key(*id))
            .collect();
        if !unknown.is_empty() {
            tracing::warn!(speakers = ?unknown, "loaded history contains speakers not in roster");
        }
        *self.history.write().await = loaded;
        Ok(count)
    }
}
