//! 私有视角上下文重建
//!
//! 从共享时间线为某个 Agent 重建发给补全服务的消息序列：
//! - 首条为该 Agent 的 system prompt
//! - 自己的 Turn：先结算他人发言缓冲，再原样回放 internal_steps（工具调用与结果），最后是 assistant 回复
//! - 他人的 Turn：只取 `{speaker_name: content}` 进缓冲，从不读取其 internal_steps
//! - 连续的他人发言合并为一条 user 消息（JSON 数组），避免连续同角色消息
//!
//! 纯函数：同一时间线、同一身份，输出恒等；删除或重新加载后无需任何重同步。

use serde_json::Value;

use crate::agent::AgentProfile;
use crate::memory::{Message, Turn};

/// 上下文构建器（无状态）
pub struct ContextBuilder;

impl ContextBuilder {
    pub fn build(profile: &AgentProfile, timeline: &[Turn]) -> Vec<Message> {
        let mut messages = vec![Message::system(profile.system_prompt.clone())];
        let mut foreign: Vec<Value> = Vec::new();

        for turn in timeline {
            if turn.speaker_id == profile.id {
                flush_foreign(&mut foreign, &mut messages);
                messages.extend(turn.internal_steps.iter().map(|step| step.to_message()));
                messages.push(Message::assistant(turn.content.clone()));
            } else {
                let mut entry = serde_json::Map::new();
                entry.insert(turn.speaker_name.clone(), Value::String(turn.content.clone()));
                foreign.push(Value::Object(entry));
            }
        }
        flush_foreign(&mut foreign, &mut messages);
        messages
    }
}

/// 缓冲非空时结算为一条 user 消息并清空
fn flush_foreign(buffer: &mut Vec<Value>, messages: &mut Vec<Message>) {
    if buffer.is_empty() {
        return;
    }
    let content = Value::Array(std::mem::take(buffer)).to_string();
    messages.push(Message::user(content));
}
