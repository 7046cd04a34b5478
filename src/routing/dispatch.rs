//! Dispatcher：执行已校验的 Agent 调用
//!
//! 入口解析顺序：直接处理器 → run_command → run_command_with_context（需有上下文）。
//! 每次调用在独立任务上限时执行，调用方取消时任务随之中止；panic 与超时都转为 DispatchFailure；Agent 不存在直接报告，
//! 其余失败（抛错、结果形状不符、`success: false`）升级到三级兜底。每次调用输出一行 JSON 审计日志。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tokio_util::task::AbortOnDropHandle;

use crate::agents::{Agent, AgentFault, AgentTable};
use crate::core::{preview, AgentCall, AgentResult, DispatchFailure, RoutingError};
use crate::routing::fallback::{Escalation, FallbackAction, FallbackResolver};

/// 调用走的是哪个入口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Direct,
    RunCommand,
    WithContext,
}

/// dispatch 的结局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPath {
    /// Agent 成功返回
    Completed,
    /// Agent 不在调用表中，未走兜底
    AgentMissing,
    /// 失败后由三级兜底给出结果
    Escalated,
}

/// 带结局标记的结果
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub result: AgentResult,
    pub path: DispatchPath,
}

pub struct Dispatcher {
    agents: AgentTable,
    fallback: Arc<FallbackResolver>,
    timeout_secs: u64,
}

impl Dispatcher {
    pub fn new(agents: AgentTable, fallback: Arc<FallbackResolver>, timeout_secs: u64) -> Self {
        Self {
            agents,
            fallback,
            timeout_secs,
        }
    }

    pub fn agents(&self) -> &AgentTable {
        &self.agents
    }

    /// 执行并在失败时兜底；永不向调用方报错
    pub async fn dispatch(&self, call: &AgentCall, context: Option<&str>, query: &str) -> Dispatched {
        let failure = match self.invoke(call, context).await {
            Ok(result) => {
                return Dispatched {
                    result,
                    path: DispatchPath::Completed,
                }
            }
            Err(failure) => failure,
        };
        let err = RoutingError::Dispatch(failure);
        match FallbackResolver::plan(&err) {
            FallbackAction::Report(message) => {
                tracing::error!(agent = %call.agent, "agent not registered in dispatch table");
                Dispatched {
                    result: AgentResult::failure(&call.agent, &call.command, message),
                    path: DispatchPath::AgentMissing,
                }
            }
            FallbackAction::Repair(_) | FallbackAction::DirectAnswer { .. } => {
                let cause = err.to_string();
                let result = self
                    .fallback
                    .direct_answer(Escalation {
                        call,
                        query,
                        context: context.unwrap_or(""),
                        cause: "agent failed",
                        detail: Some(&cause),
                    })
                    .await;
                Dispatched {
                    result,
                    path: DispatchPath::Escalated,
                }
            }
        }
    }

    /// 只执行不兜底：检查结果形状，失败分类为 DispatchFailure
    pub async fn invoke(
        &self,
        call: &AgentCall,
        context: Option<&str>,
    ) -> Result<AgentResult, DispatchFailure> {
        let start = Instant::now();
        let result = self.run(call, context).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(DispatchFailure::Timeout(_)) => "timeout",
            Err(DispatchFailure::ReportedFailure(_)) => "reported_failure",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "dispatch_audit",
            "agent": call.agent,
            "command": call.command,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "params_preview": call.params_preview(),
        });
        tracing::info!(audit = %audit.to_string(), "dispatch");
        result
    }

    async fn run(&self, call: &AgentCall, context: Option<&str>) -> Result<AgentResult, DispatchFailure> {
        let agent = self
            .agents
            .get(&call.agent)
            .ok_or(DispatchFailure::AgentNotFound)?;
        let entry = resolve_entry(agent.as_ref(), &call.command, context.is_some())
            .ok_or_else(|| DispatchFailure::CommandNotFound(call.command.clone()))?;
        tracing::debug!(agent = %call.agent, command = %call.command, ?entry, "dispatching");

        let command = call.command.clone();
        let params = call.params.clone();
        let context = context.map(str::to_string);
        // 调用方被取消（future 被丢弃）时随之中止 Agent 任务
        let mut task = AbortOnDropHandle::new(tokio::spawn(async move {
            match entry {
                Entry::Direct => agent.handle(&command, &params, context.as_deref()).await,
                Entry::RunCommand => agent.run_command(&command, &params).await,
                Entry::WithContext => {
                    let context = context.unwrap_or_default();
                    agent.run_command_with_context(&command, &params, &context).await
                }
            }
        }));

        let joined = match timeout(Duration::from_secs(self.timeout_secs), &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                task.abort();
                return Err(DispatchFailure::Timeout(self.timeout_secs));
            }
        };
        let value = match joined {
            Ok(Ok(value)) => value,
            Ok(Err(AgentFault::UnknownCommand(command))) => {
                return Err(DispatchFailure::CommandNotFound(command))
            }
            Ok(Err(fault)) => return Err(DispatchFailure::AgentRaised(fault.to_string())),
            Err(join_err) => {
                return Err(DispatchFailure::AgentRaised(format!("agent task aborted: {join_err}")))
            }
        };

        let preview_text = preview(&value.to_string(), 200);
        let result = AgentResult::from_agent_value(value, &call.agent, &call.command)
            .ok_or(DispatchFailure::MalformedResult(preview_text))?;
        if result.success {
            Ok(result)
        } else {
            let detail = result
                .error
                .clone()
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| result.data_text());
            Err(DispatchFailure::ReportedFailure(detail))
        }
    }
}

fn resolve_entry(agent: &dyn Agent, command: &str, has_context: bool) -> Option<Entry> {
    if agent.handles(command) {
        Some(Entry::Direct)
    } else if agent.supports_run_command() {
        Some(Entry::RunCommand)
    } else if has_context && agent.supports_context() {
        Some(Entry::WithContext)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Params;
    use crate::llm::MockLlmClient;
    use crate::registry::tests::sample_registry;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    /// 按命令名返回预设行为的测试 Agent
    struct Scripted;

    #[async_trait]
    impl Agent for Scripted {
        fn name(&self) -> &str {
            "healthcare_agent"
        }

        fn handles(&self, command: &str) -> bool {
            command == "suggest_advice"
        }

        async fn handle(&self, _: &str, params: &Params, _: Option<&str>) -> Result<Value, AgentFault> {
            Ok(json!({"success": true, "data": format!("advice for {}", params["symptom"])}))
        }

        fn supports_run_command(&self) -> bool {
            true
        }

        async fn run_command(&self, command: &str, _: &Params) -> Result<Value, AgentFault> {
            match command {
                "report_failure" => Ok(json!({"success": false, "error": "quota exceeded"})),
                "malformed" => Ok(json!({"plan": "no success flag"})),
                "raise" => Err(AgentFault::Raised("division by zero".into())),
                "panic" => panic!("agent bug"),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(json!({"success": true}))
                }
                other => Err(AgentFault::UnknownCommand(other.to_string())),
            }
        }
    }

    /// 只有带上下文入口的 Agent
    struct ContextOnly;

    #[async_trait]
    impl Agent for ContextOnly {
        fn name(&self) -> &str {
            "travel_agent"
        }

        fn supports_context(&self) -> bool {
            true
        }

        async fn run_command_with_context(
            &self,
            command: &str,
            _: &Params,
            context: &str,
        ) -> Result<Value, AgentFault> {
            Ok(json!({"success": true, "data": format!("{command} with {context}"), "command": command}))
        }
    }

    fn dispatcher(timeout_secs: u64) -> (Arc<MockLlmClient>, Dispatcher) {
        let llm = Arc::new(MockLlmClient::with_replies(["fallback answer"]));
        let resolver = FallbackResolver::new(llm.clone(), "fallback-model", Arc::new(sample_registry()));
        let mut table = AgentTable::new();
        table.register(Scripted);
        table.register(ContextOnly);
        (llm, Dispatcher::new(table, Arc::new(resolver), timeout_secs))
    }

    fn call(agent: &str, command: &str) -> AgentCall {
        let params = json!({"symptom": "headache"}).as_object().cloned().unwrap();
        AgentCall::new(agent, command, params)
    }

    #[tokio::test]
    async fn test_direct_handler_wins() {
        let (llm, d) = dispatcher(5);
        let out = d.dispatch(&call("healthcare_agent", "suggest_advice"), None, "q").await;
        assert_eq!(out.path, DispatchPath::Completed);
        assert_eq!(out.result.data, json!("advice for \"headache\""));
        assert_eq!(out.result.agent, "healthcare_agent");
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_context_entry_requires_context() {
        let (_, d) = dispatcher(5);
        let ok = d.invoke(&call("travel_agent", "suggest_itinerary"), Some("ctx")).await.unwrap();
        assert_eq!(ok.data, json!("suggest_itinerary with ctx"));
        assert_eq!(
            d.invoke(&call("travel_agent", "suggest_itinerary"), None).await,
            Err(DispatchFailure::CommandNotFound("suggest_itinerary".into()))
        );
    }

    #[tokio::test]
    async fn test_missing_agent_is_reported_without_fallback() {
        let (llm, d) = dispatcher(5);
        let out = d.dispatch(&call("fitness_agent", "suggest_plan"), None, "q").await;
        assert_eq!(out.path, DispatchPath::AgentMissing);
        assert!(!out.result.success);
        assert_eq!(out.result.error.as_deref(), Some("Agent not found"));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failures_escalate_to_fallback() {
        for command in ["report_failure", "malformed", "raise", "panic", "unknown_cmd"] {
            let (llm, d) = dispatcher(5);
            let out = d.dispatch(&call("healthcare_agent", command), Some(""), "my head hurts").await;
            assert_eq!(out.path, DispatchPath::Escalated, "{command}");
            assert!(out.result.success, "{command}");
            assert_eq!(out.result.agent, "healthcare_agent_fallback");
            assert_eq!(out.result.command, "direct_response");
            assert_eq!(llm.call_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_reported_failure_detail_reaches_fallback_prompt() {
        let (llm, d) = dispatcher(5);
        d.dispatch(&call("healthcare_agent", "report_failure"), None, "q").await;
        assert!(llm.calls()[0].1.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_invoke_classifies_failures() {
        let (_, d) = dispatcher(1);
        assert!(matches!(
            d.invoke(&call("healthcare_agent", "malformed"), None).await,
            Err(DispatchFailure::MalformedResult(_))
        ));
        assert!(matches!(
            d.invoke(&call("healthcare_agent", "panic"), None).await,
            Err(DispatchFailure::AgentRaised(_))
        ));
        assert_eq!(
            d.invoke(&call("healthcare_agent", "slow"), None).await,
            Err(DispatchFailure::Timeout(1))
        );
    }

    /// 执行较慢、完成时打标记的 Agent
    struct Lingering(Arc<std::sync::atomic::AtomicBool>);

    #[async_trait]
    impl Agent for Lingering {
        fn name(&self) -> &str {
            "fitness_agent"
        }

        fn supports_run_command(&self) -> bool {
            true
        }

        async fn run_command(&self, _: &str, _: &Params) -> Result<Value, AgentFault> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            self.0.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(json!({"success": true, "data": "plan"}))
        }
    }

    #[tokio::test]
    async fn test_dropped_dispatch_aborts_agent_task() {
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let llm = Arc::new(MockLlmClient::new());
        let resolver = FallbackResolver::new(llm, "fallback-model", Arc::new(sample_registry()));
        let mut table = AgentTable::new();
        table.register(Lingering(finished.clone()));
        let d = Dispatcher::new(table, Arc::new(resolver), 5);

        let dispatched = tokio::time::timeout(
            Duration::from_millis(50),
            d.dispatch(&call("fitness_agent", "suggest_plan"), None, "q"),
        )
        .await;
        assert!(dispatched.is_err());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!finished.load(std::sync::atomic::Ordering::SeqCst));
    }
}
