//! 工具执行器
//!
//! 持有 Agent 的 ToolRegistry 与单次调用超时。invoke(call) 依次做：按名查找 → 解析参数 → 超时内执行；
//! 任何失败都变成 ToolError，其 Display 即写回模型的错误标记文本，从不中止本轮。
//! 每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::ToolError;
use crate::llm::ToolSchema;
use crate::memory::ToolCall;
use crate::tools::ToolRegistry;

/// 工具执行器：对每次调用施加超时，并将失败映射为 ToolError
#[derive(Clone)]
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 无工具的执行器
    pub fn empty() -> Self {
        Self::new(ToolRegistry::new(), 30)
    }

    pub fn has_tools(&self) -> bool {
        !self.registry.is_empty()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.registry.schemas()
    }

    /// 执行一个工具调用
    pub async fn invoke(&self, call: &ToolCall) -> Result<String, ToolError> {
        let name = call.name();
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let args = decode_arguments(call)?;

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, tool.execute(args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": name,
            "call_id": call.id,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(ToolError::Failed(e)),
            Err(_) => Err(ToolError::Timeout {
                tool: name.to_string(),
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

/// 解析 function.arguments；空串视为 {}
fn decode_arguments(call: &ToolCall) -> Result<Value, ToolError> {
    let raw = call.function.arguments.trim();
    if raw.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments {
        tool: call.name().to_string(),
        detail: e.to_string(),
    })
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
