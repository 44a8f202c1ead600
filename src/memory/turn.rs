//! 时间线数据模型：Turn 与 Step
//!
//! Turn 是某个 Agent 一次完成的发言；Step 是该轮内部的私有推理记录
//! （一批工具调用请求或一条工具返回）。持久化形状：
//!
//! ```json
//! {"speaker_id": "a", "speaker_name": "Alice", "content": "...", "timestamp": "2024-05-01T08:00:00Z",
//!  "internal_steps": [
//!    {"role": "assistant", "tool_calls": [{"id": "c1", "type": "function", "function": {"name": "lookup", "arguments": "{}"}}]},
//!    {"role": "tool", "tool_call_id": "c1", "name": "lookup", "content": "..."}
//!  ]}
//! ```
//!
//! 未知字段一律保存在 `extra` 中并原样写回；旧版字段名 role_id / role_name / internal_thoughts 可被读取。

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::memory::{Message, Role};

/// 工具调用类型（目前协议只有 function）
pub const FUNCTION_CALL_TYPE: &str = "function";

fn default_call_type() -> String {
    FUNCTION_CALL_TYPE.to_string()
}

/// 被调用的函数：名称 + 序列化后的参数字符串
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// 单个工具调用请求
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_call_type")]
    pub kind: String,
    pub function: FunctionCall,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: default_call_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
            extra: Map::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// 一次补全响应中的全部工具调用（assistant 角色）
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallBatch {
    /// 部分模型会在调用工具时附带文本
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub extra: Map<String, Value>,
}

/// 单个 call id 的工具返回（tool 角色）
#[derive(Clone, Debug, PartialEq)]
pub struct ToolObservation {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
    pub extra: Map<String, Value>,
}

/// 私有推理步骤
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StepRecord", into = "StepRecord")]
pub enum Step {
    ToolCallRequest(ToolCallBatch),
    ToolResult(ToolObservation),
}

impl Step {
    pub fn request(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Step::ToolCallRequest(ToolCallBatch {
            content,
            tool_calls,
            extra: Map::new(),
        })
    }

    pub fn result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Step::ToolResult(ToolObservation {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
            extra: Map::new(),
        })
    }

    /// 回放为协议消息
    pub fn to_message(&self) -> Message {
        match self {
            Step::ToolCallRequest(batch) => {
                Message::tool_calls(batch.content.clone(), batch.tool_calls.clone())
            }
            Step::ToolResult(obs) => {
                Message::tool_result(obs.tool_call_id.clone(), obs.name.clone(), obs.content.clone())
            }
        }
    }
}

/// 磁盘上的 step 记录（与 OpenAI 消息同形）
#[derive(Serialize, Deserialize)]
struct StepRecord {
    role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TryFrom<StepRecord> for Step {
    type Error = String;

    fn try_from(rec: StepRecord) -> Result<Self, Self::Error> {
        match rec.role {
            Role::Assistant => match rec.tool_calls {
                Some(calls) if !calls.is_empty() => Ok(Step::ToolCallRequest(ToolCallBatch {
                    content: rec.content,
                    tool_calls: calls,
                    extra: rec.extra,
                })),
                _ => Err("assistant step without tool_calls".to_string()),
            },
            Role::Tool => {
                let tool_call_id = rec
                    .tool_call_id
                    .ok_or_else(|| "tool step without tool_call_id".to_string())?;
                Ok(Step::ToolResult(ToolObservation {
                    tool_call_id,
                    name: rec.name.unwrap_or_default(),
                    content: rec.content.unwrap_or_default(),
                    extra: rec.extra,
                }))
            }
            other => Err(format!("unexpected step role {:?}", other)),
        }
    }
}

impl From<Step> for StepRecord {
    fn from(step: Step) -> Self {
        match step {
            Step::ToolCallRequest(batch) => StepRecord {
                role: Role::Assistant,
                content: batch.content,
                tool_calls: Some(batch.tool_calls),
                tool_call_id: None,
                name: None,
                extra: batch.extra,
            },
            Step::ToolResult(obs) => StepRecord {
                role: Role::Tool,
                content: Some(obs.content),
                tool_calls: None,
                tool_call_id: Some(obs.tool_call_id),
                name: Some(obs.name),
                extra: obs.extra,
            },
        }
    }
}

/// 一次完成的发言
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(alias = "role_id")]
    pub speaker_id: String,
    #[serde(alias = "role_name")]
    pub speaker_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    #[serde(with = "iso_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, alias = "internal_thoughts")]
    pub internal_steps: Vec<Step>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Turn {
    pub fn new(
        speaker_id: impl Into<String>,
        speaker_name: impl Into<String>,
        content: impl Into<String>,
        internal_steps: Vec<Step>,
    ) -> Self {
        Self {
            speaker_id: speaker_id.into(),
            speaker_name: speaker_name.into(),
            content: content.into(),
            timestamp: Utc::now(),
            internal_steps,
            extra: Map::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 每批工具调用之后、其它 step 之前，恰好跟随每个 call id 的一条结果
    pub fn steps_well_paired(&self) -> bool {
        let mut pending: HashSet<&str> = HashSet::new();
        for step in &self.internal_steps {
            match step {
                Step::ToolCallRequest(batch) => {
                    if !pending.is_empty() {
                        return false;
                    }
                    for call in &batch.tool_calls {
                        if !pending.insert(call.id.as_str()) {
                            return false;
                        }
                    }
                }
                Step::ToolResult(obs) => {
                    if !pending.remove(obs.tool_call_id.as_str()) {
                        return false;
                    }
                }
            }
        }
        pending.is_empty()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// ISO-8601 时间戳：写出 RFC 3339（UTC），读入时也接受无时区的本地格式
pub mod iso_timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Ok(ts.with_timezone(&Utc)),
            Err(_) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|n| n.and_utc()),
        }
    }
}
