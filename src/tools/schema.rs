//! 工具参数 JSON Schema 生成（schemars）
//!
//! 内置工具用 `#[derive(JsonSchema)]` 描述参数，生成的 schema 直接放进 function.parameters。

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 生成 T 的参数 schema，去掉 `$schema` / `title` 等对 function calling 无用的顶层键
pub fn parameters_schema_for<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}
