//! Echo 工具（内置能力 builtin，测试与离线演示用）

use async_trait::async_trait;
use schemars::JsonSchema;
use serde_json::Value;

use crate::tools::{parameters_schema_for, Tool};

#[allow(dead_code)]
#[derive(JsonSchema)]
struct EchoArgs {
    /// 要回显的文本
    text: String,
}

/// Echo 工具：回显文本
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo text back unchanged."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<EchoArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let text = args
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or("(empty)");
        Ok(text.to_string())
    }
}
