//! 共享时间线
//!
//! 所有 Agent 共享的有序 Turn 序列：只追加、按位置删除、整体导出/导入。
//! 删除无需任何重同步：各 Agent 的上下文每次都从剩余时间线重新构建。

use crate::core::HistoryError;
use crate::memory::Turn;

/// 时间线存储
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    turns: Vec<Turn>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    /// 追加到末尾；时间戳不早于上一条（保持追加顺序单调），返回存入的 Turn
    pub fn append(&mut self, mut turn: Turn) -> &Turn {
        if let Some(last) = self.turns.last() {
            if turn.timestamp < last.timestamp {
                turn.timestamp = last.timestamp;
            }
        }
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    /// 删除 position 处的 Turn（连同其 Step），越界返回 None
    pub fn delete_at(&mut self, position: usize) -> Option<Turn> {
        if position < self.turns.len() {
            Some(self.turns.remove(position))
        } else {
            None
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// 一次发言开始时取的一致快照，后续删除不影响进行中的发言
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// 序列化整个时间线（Turn 及其嵌套 Step）
    pub fn export(&self) -> Result<String, HistoryError> {
        Ok(serde_json::to_string_pretty(&self.turns)?)
    }

    /// 整体替换时间线；解析失败或某个 Turn 的工具调用与结果未一一配对时保持原状
    pub fn import(&mut self, serialized: &str) -> Result<(), HistoryError> {
        let turns: Vec<Turn> = serde_json::from_str(serialized)?;
        if let Some(position) = turns.iter().position(|t| !t.steps_well_paired()) {
            return Err(HistoryError::UnpairedSteps { position });
        }
        self.turns = turns;
        Ok(())
    }
}
