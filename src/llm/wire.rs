//! 补全请求/响应的线上格式（OpenAI chat completions 兼容）

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::LlmError;
use crate::memory::{Message, ToolCall};

/// 工具 schema：{"type": "function", "function": {name, description, parameters}}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSchema,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: crate::memory::turn::FUNCTION_CALL_TYPE.to_string(),
            function: FunctionSchema {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// 单次补全请求
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

impl ChatRequest {
    /// 有工具时附带 tools 与 tool_choice=auto，否则两者都不发送
    pub fn new(model: impl Into<String>, messages: Vec<Message>, tools: &[ToolSchema]) -> Self {
        let (tools, tool_choice) = if tools.is_empty() {
            (None, None)
        } else {
            (Some(tools.to_vec()), Some("auto".to_string()))
        };
        Self {
            model: model.into(),
            messages,
            tools,
            tool_choice,
        }
    }
}

/// 响应中的 assistant 消息：最终文本或一批工具调用
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ResponseMessage {
    /// 非空的工具调用列表
    pub fn requested_calls(&self) -> Option<&[ToolCall]> {
        match &self.tool_calls {
            Some(calls) if !calls.is_empty() => Some(calls),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self::from_message(ResponseMessage {
            content: Some(content.into()),
            tool_calls: None,
        })
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self::from_message(ResponseMessage {
            content: None,
            tool_calls: Some(calls),
        })
    }

    fn from_message(message: ResponseMessage) -> Self {
        Self {
            choices: vec![Choice {
                message,
                finish_reason: None,
            }],
            usage: None,
        }
    }

    /// 取第一个 choice 的消息；无 choice 视为无效响应
    pub fn into_message(self) -> Result<ResponseMessage, LlmError> {
        self.choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_without_tools_omits_tool_fields() {
        let req = ChatRequest::new("gpt-4o", vec![Message::system("sys")], &[]);
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());
    }

    #[test]
    fn test_request_with_tools() {
        let schema = ToolSchema::function("echo", "Echo text", json!({"type": "object"}));
        let req = ChatRequest::new("gpt-4o", vec![], &[schema]);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["tool_choice"], "auto");
        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["tools"][0]["function"]["name"], "echo");
    }

    #[test]
    fn test_parse_tool_call_response() {
        let raw = json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{"id": "call_1", "type": "function", "function": {"name": "lookup", "arguments": "{\"x\":1}"}}]
                }
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let resp: ChatResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
        let msg = resp.into_message().unwrap();
        let calls = msg.requested_calls().unwrap();
        assert_eq!(calls[0].name(), "lookup");
        assert_eq!(calls[0].function.arguments, r#"{"x":1}"#);
    }

    #[test]
    fn test_empty_tool_calls_is_final() {
        let msg = ResponseMessage {
            content: Some("done".into()),
            tool_calls: Some(vec![]),
        };
        assert!(msg.requested_calls().is_none());
    }

    #[test]
    fn test_no_choices_is_invalid() {
        let err = ChatResponse::default().into_message().unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }
}
