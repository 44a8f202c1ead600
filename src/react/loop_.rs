//! ReAct 主循环
//!
//! Build（ContextBuilder 重建私有视角）-> Request -> 若有工具调用则 Invoke 并写回 -> 下一轮 Request；
//! 响应不含工具调用时结束本轮。工具失败写成错误标记交给模型决定；只有补全调用本身失败才终止本轮。
//! 支持取消（两个挂起点都会响应）、最大轮数限制，以及可选的同批工具并发执行。

use futures_util::future::join_all;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::agent::Agent;
use crate::core::TurnError;
use crate::llm::ChatRequest;
use crate::memory::{Step, ToolCall, Turn};
use crate::react::{ContextBuilder, ReactEvent};

/// 单次 Turn 内默认最大补全轮数，防止死循环
pub const DEFAULT_MAX_ROUNDS: usize = 20;
/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// ReAct 循环执行结果：最终回复与本轮产生的内部步骤
#[derive(Debug)]
pub struct ReactResult {
    pub response: String,
    pub steps: Vec<Step>,
}

/// ReAct 会话配置
pub struct ReactSession<'a> {
    /// 发言的 Agent（必需）
    pub agent: &'a Agent,
    /// 取消令牌（必需）
    pub cancel_token: CancellationToken,
    /// 可选：事件推送通道
    pub event_tx: Option<&'a UnboundedSender<ReactEvent>>,
    pub max_rounds: usize,
    /// 同一批工具调用是否并发执行
    pub parallel_tool_calls: bool,
}

impl<'a> ReactSession<'a> {
    /// 创建最小配置的 ReactSession
    pub fn new(agent: &'a Agent, cancel_token: CancellationToken) -> Self {
        Self {
            agent,
            cancel_token,
            event_tx: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
            parallel_tool_calls: false,
        }
    }

    /// 设置事件推送通道
    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 至少一轮：0 会被当作 1
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }

    fn send_event(&self, ev: ReactEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(ev);
        }
    }
}

/// 为 session.agent 跑完一个 Turn；timeline 为开始时的只读快照
pub async fn react_loop(session: ReactSession<'_>, timeline: &[Turn]) -> Result<ReactResult, TurnError> {
    let agent = session.agent;
    let agent_id = agent.profile.id.clone();
    let cancel_token = session.cancel_token.clone();

    let mut messages = ContextBuilder::build(&agent.profile, timeline);
    let tools = agent.executor.schemas();
    let mut steps: Vec<Step> = Vec::new();

    for round in 1..=session.max_rounds {
        if cancel_token.is_cancelled() {
            return Err(TurnError::Cancelled);
        }
        session.send_event(ReactEvent::RoundStarted {
            agent: agent_id.clone(),
            round,
            max_rounds: session.max_rounds,
        });
        tracing::debug!(agent = %agent_id, round, messages = messages.len(), "completion request");

        let request = ChatRequest::new(agent.model.clone(), messages.clone(), &tools);
        let response = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return Err(TurnError::Cancelled),
            r = agent.client.complete(&request) => r?,
        };
        if let Some(usage) = response.usage {
            session.send_event(ReactEvent::TokenUsage {
                agent: agent_id.clone(),
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            });
        }

        let reply = response.into_message()?;
        let calls: Vec<ToolCall> = match reply.requested_calls() {
            Some(calls) => calls.to_vec(),
            None => {
                let text = reply.content.unwrap_or_default();
                session.send_event(ReactEvent::Reply {
                    agent: agent_id.clone(),
                    text: text.clone(),
                });
                return Ok(ReactResult { response: text, steps });
            }
        };

        let request_step = Step::request(reply.content, calls.clone());
        messages.push(request_step.to_message());
        steps.push(request_step);

        let observations = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => return Err(TurnError::Cancelled),
            obs = invoke_batch(&session, &calls) => obs,
        };
        for (call, observation) in calls.iter().zip(observations) {
            let result_step = Step::result(call.id.clone(), call.name(), observation);
            messages.push(result_step.to_message());
            steps.push(result_step);
        }
    }

    tracing::warn!(agent = %agent_id, max_rounds = session.max_rounds, "round limit exceeded");
    Err(TurnError::RoundLimitExceeded {
        max_rounds: session.max_rounds,
    })
}

/// 执行一批工具调用，结果按请求顺序返回
async fn invoke_batch(session: &ReactSession<'_>, calls: &[ToolCall]) -> Vec<String> {
    if session.parallel_tool_calls {
        join_all(calls.iter().map(|call| invoke_one(session, call))).await
    } else {
        let mut observations = Vec::with_capacity(calls.len());
        for call in calls {
            observations.push(invoke_one(session, call).await);
        }
        observations
    }
}

/// 单次调用：失败转成错误标记文本
async fn invoke_one(session: &ReactSession<'_>, call: &ToolCall) -> String {
    let agent_id = &session.agent.profile.id;
    session.send_event(ReactEvent::ToolCall {
        agent: agent_id.clone(),
        tool: call.name().to_string(),
        call_id: call.id.clone(),
        arguments: call.function.arguments.clone(),
    });

    let observation = match session.agent.executor.invoke(call).await {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(agent = %agent_id, tool = %call.name(), call_id = %call.id, error = %e, "tool call failed");
            session.send_event(ReactEvent::ToolFailure {
                agent: agent_id.clone(),
                tool: call.name().to_string(),
                reason: e.to_string(),
            });
            e.to_string()
        }
    };

    let preview: String = observation.chars().take(OBSERVATION_PREVIEW_CHARS).collect();
    let preview = if observation.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!("{}...", preview)
    } else {
        preview
    };
    session.send_event(ReactEvent::Observation {
        agent: agent_id.clone(),
        tool: call.name().to_string(),
        call_id: call.id.clone(),
        preview,
    });
    observation
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::agent::AgentProfile;
    use crate::core::LlmError;
    use crate::llm::{ChatCompletionClient, ChatResponse, ScriptedLlmClient};
    use crate::memory::Role;
    use crate::tools::{EchoTool, Tool, ToolExecutor, ToolRegistry};

    struct LookupTool;

    #[async_trait]
    impl Tool for LookupTool {
        fn name(&self) -> &str {
            "lookup"
        }
        fn description(&self) -> &str {
            "looks things up"
        }
        async fn execute(&self, args: Value) -> Result<String, String> {
            Ok(format!("found {}", args["q"].as_str().unwrap_or("?")))
        }
    }

    /// 模拟耗时不同的工具，用于验证并发结果按调用顺序回填
    struct DelayTool;

    #[async_trait]
    impl Tool for DelayTool {
        fn name(&self) -> &str {
            "delay"
        }
        fn description(&self) -> &str {
            "sleeps for ms then returns it"
        }
        async fn execute(&self, args: Value) -> Result<String, String> {
            let ms = args["ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(format!("slept {ms}"))
        }
    }

    /// 永不返回的客户端
    struct HangingClient;

    #[async_trait]
    impl ChatCompletionClient for HangingClient {
        async fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse, LlmError> {
            std::future::pending().await
        }
    }

    fn agent_with(client: Arc<dyn ChatCompletionClient>, tools: Vec<Arc<dyn Tool>>) -> Agent {
        let registry: ToolRegistry = tools.into_iter().collect();
        Agent::new(
            AgentProfile {
                id: "a".into(),
                name: "Alice".into(),
                system_prompt: "You are Alice.".into(),
            },
            "test-model",
            client,
            ToolExecutor::new(registry, 5),
        )
    }

    fn scripted(responses: Vec<Result<ChatResponse, LlmError>>) -> Arc<ScriptedLlmClient> {
        Arc::new(ScriptedLlmClient::new(responses))
    }

    #[tokio::test]
    async fn test_plain_reply_without_tools() {
        let client = scripted(vec![Ok(ChatResponse::text("hello"))]);
        let agent = agent_with(client.clone(), vec![]);
        let result = react_loop(ReactSession::new(&agent, CancellationToken::new()), &[])
            .await
            .unwrap();
        assert_eq!(result.response, "hello");
        assert!(result.steps.is_empty());

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].tools.is_none());
        assert!(requests[0].tool_choice.is_none());
    }

    #[tokio::test]
    async fn test_tool_round_then_reply() {
        let client = scripted(vec![
            Ok(ChatResponse::tool_calls(vec![ToolCall::function("c1", "lookup", r#"{"q":"x"}"#)])),
            Ok(ChatResponse::text("done")),
        ]);
        let agent = agent_with(client.clone(), vec![Arc::new(LookupTool)]);
        let result = react_loop(ReactSession::new(&agent, CancellationToken::new()), &[])
            .await
            .unwrap();
        assert_eq!(result.response, "done");
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.steps[1], Step::result("c1", "lookup", "found x"));

        let requests = client.requests();
        assert_eq!(requests[0].tool_choice.as_deref(), Some("auto"));
        // 第二轮请求能看到工具调用与结果
        let second = &requests[1].messages;
        assert_eq!(second[second.len() - 2].role, Role::Assistant);
        assert_eq!(second[second.len() - 1].tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_bad_arguments_do_not_abort_turn() {
        let client = scripted(vec![
            Ok(ChatResponse::tool_calls(vec![ToolCall::function("c1", "lookup", "not json")])),
            Ok(ChatResponse::text("sorry")),
        ]);
        let agent = agent_with(client, vec![Arc::new(LookupTool)]);
        let result = react_loop(ReactSession::new(&agent, CancellationToken::new()), &[])
            .await
            .unwrap();
        assert_eq!(result.response, "sorry");
        assert_eq!(result.steps.len(), 2);
        match &result.steps[1] {
            Step::ToolResult(obs) => assert!(obs.content.starts_with("Error: invalid arguments for lookup")),
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_marker() {
        let client = scripted(vec![
            Ok(ChatResponse::tool_calls(vec![ToolCall::function("c1", "missing", "{}")])),
            Ok(ChatResponse::text("ok")),
        ]);
        let agent = agent_with(client, vec![Arc::new(EchoTool)]);
        let result = react_loop(ReactSession::new(&agent, CancellationToken::new()), &[])
            .await
            .unwrap();
        assert_eq!(result.steps[1], Step::result("c1", "missing", "Error: Tool missing not found."));
    }

    #[tokio::test]
    async fn test_batch_emits_one_request_step_and_ordered_results() {
        let client = scripted(vec![
            Ok(ChatResponse::tool_calls(vec![
                ToolCall::function("c1", "echo", r#"{"text":"one"}"#),
                ToolCall::function("c2", "echo", r#"{"text":"two"}"#),
            ])),
            Ok(ChatResponse::text("both")),
        ]);
        let agent = agent_with(client, vec![Arc::new(EchoTool)]);
        let result = react_loop(ReactSession::new(&agent, CancellationToken::new()), &[])
            .await
            .unwrap();
        assert_eq!(result.steps.len(), 3);
        assert!(matches!(&result.steps[0], Step::ToolCallRequest(b) if b.tool_calls.len() == 2));
        assert_eq!(result.steps[1], Step::result("c1", "echo", "one"));
        assert_eq!(result.steps[2], Step::result("c2", "echo", "two"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_results_repaired_in_call_order() {
        let client = scripted(vec![
            Ok(ChatResponse::tool_calls(vec![
                ToolCall::function("slow", "delay", r#"{"ms":300}"#),
                ToolCall::function("fast", "delay", r#"{"ms":10}"#),
            ])),
            Ok(ChatResponse::text("ok")),
        ]);
        let agent = agent_with(client, vec![Arc::new(DelayTool)]);
        let session = ReactSession::new(&agent, CancellationToken::new()).with_parallel_tool_calls(true);
        let result = react_loop(session, &[]).await.unwrap();
        assert_eq!(result.steps[1], Step::result("slow", "delay", "slept 300"));
        assert_eq!(result.steps[2], Step::result("fast", "delay", "slept 10"));
    }

    #[tokio::test]
    async fn test_round_limit() {
        let call = || Ok(ChatResponse::tool_calls(vec![ToolCall::function("c", "echo", "{}")]));
        let client = scripted(vec![call(), call(), call()]);
        let agent = agent_with(client.clone(), vec![Arc::new(EchoTool)]);
        let session = ReactSession::new(&agent, CancellationToken::new()).with_max_rounds(3);
        let err = react_loop(session, &[]).await.unwrap_err();
        assert_eq!(err, TurnError::RoundLimitExceeded { max_rounds: 3 });
        assert_eq!(client.request_count(), 3);
    }

    #[tokio::test]
    async fn test_zero_round_limit_still_asks_once() {
        let client = scripted(vec![Ok(ChatResponse::text("answer"))]);
        let agent = agent_with(client.clone(), vec![]);
        let session = ReactSession::new(&agent, CancellationToken::new()).with_max_rounds(0);
        assert_eq!(session.max_rounds, 1);
        let result = react_loop(session, &[]).await.unwrap();
        assert_eq!(result.response, "answer");
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test]
    async fn test_provider_error_is_fatal() {
        let client = scripted(vec![Err(LlmError::Status {
            code: Some(401),
            message: "bad key".into(),
        })]);
        let agent = agent_with(client, vec![]);
        let err = react_loop(ReactSession::new(&agent, CancellationToken::new()), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::ProviderStatus(_)));
    }

    #[tokio::test]
    async fn test_cancel_during_request() {
        let agent = agent_with(Arc::new(HangingClient), vec![]);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        let err = react_loop(ReactSession::new(&agent, token), &[]).await.unwrap_err();
        assert_eq!(err, TurnError::Cancelled);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let client = scripted(vec![Ok(ChatResponse::text("never"))]);
        let agent = agent_with(client.clone(), vec![]);
        let token = CancellationToken::new();
        token.cancel();
        let err = react_loop(ReactSession::new(&agent, token), &[]).await.unwrap_err();
        assert_eq!(err, TurnError::Cancelled);
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let client = scripted(vec![
            Ok(ChatResponse::tool_calls(vec![ToolCall::function("c1", "missing", "{}")])),
            Ok(ChatResponse::text("fine")),
        ]);
        let agent = agent_with(client, vec![]);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let session = ReactSession::new(&agent, CancellationToken::new()).with_event_tx(&tx);
        react_loop(session, &[]).await.unwrap();
        drop(tx);
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        assert!(events.iter().any(|e| matches!(e, ReactEvent::ToolFailure { tool, .. } if tool == "missing")));
        assert_eq!(
            events.last(),
            Some(&ReactEvent::Reply {
                agent: "a".into(),
                text: "fine".into()
            })
        );
    }

    #[tokio::test]
    async fn test_usage_reported_as_event() {
        let mut response = ChatResponse::text("counted");
        response.usage = Some(crate::llm::Usage {
            prompt_tokens: 12,
            completion_tokens: 3,
            total_tokens: 15,
        });
        let agent = agent_with(scripted(vec![Ok(response)]), vec![]);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let session = ReactSession::new(&agent, CancellationToken::new()).with_event_tx(&tx);
        react_loop(session, &[]).await.unwrap();
        drop(tx);
        let mut usage = Vec::new();
        while let Some(ev) = rx.recv().await {
            if let ReactEvent::TokenUsage { total_tokens, .. } = ev {
                usage.push(total_tokens);
            }
        }
        assert_eq!(usage, vec![15]);
    }
}
