//! 路由 Pipeline：一次请求的完整编排
//!
//! 组装路由 prompt → 调一次路由模型 → 提取 → 规范化 → 校验（至多一次缺参修复）→ 执行 → 兜底 → 持久化。
//! 任一阶段失败都在原地转入三级兜底，调用方永远拿到一个结构完整的 AgentResult。
//! 请求被取消时不写入任何上下文。

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::agents::AgentTable;
use crate::config::AppConfig;
use crate::context::{ContextStore, Turn};
use crate::core::{
    preview, AgentCall, AgentResult, Params, Resolution, RoutingError, Stage, StageTrace,
};
use crate::llm::LlmClient;
use crate::registry::CapabilityRegistry;
use crate::routing::dispatch::{DispatchPath, Dispatcher};
use crate::routing::extract::extract_payload;
use crate::routing::fallback::{
    repair_missing, Escalation, FallbackAction, FallbackResolver, DIRECT_RESPONSE,
};
use crate::routing::normalize::normalize;
use crate::routing::prompt::build_routing_prompt;
use crate::routing::validate::{validate, ValidationOutcome};

/// 未能确定 Agent 时兜底使用的名字（不在注册表中，结果记为 general_fallback）
const UNROUTED_AGENT: &str = "general";

/// 单次路由请求
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub query: String,
    pub conversation_id: Option<String>,
    pub topic: Option<String>,
}

impl RouteRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}

/// 路由结果：AgentResult + 解决路径与阶段轨迹
#[derive(Debug, Clone, Serialize)]
pub struct RouteOutcome {
    pub result: AgentResult,
    pub conversation_id: String,
    pub topic: String,
    pub resolution: Resolution,
    pub trace: Vec<Stage>,
}

/// Pipeline 运行参数
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub routing_model: String,
    pub fallback_model: String,
    pub default_topic: String,
    pub exclude_main_model: bool,
    pub agent_timeout_secs: u64,
}

impl PipelineSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            routing_model: cfg.llm.routing_model.clone(),
            fallback_model: cfg.llm.fallback_model.clone(),
            default_topic: cfg.app.default_topic.clone(),
            exclude_main_model: cfg.context.exclude_main_model,
            agent_timeout_secs: cfg.agents.timeout_secs,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

pub struct RoutingPipeline {
    llm: Arc<dyn LlmClient>,
    registry: Arc<CapabilityRegistry>,
    dispatcher: Dispatcher,
    fallback: Arc<FallbackResolver>,
    context: Arc<dyn ContextStore>,
    settings: PipelineSettings,
}

impl RoutingPipeline {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: Arc<CapabilityRegistry>,
        agents: AgentTable,
        context: Arc<dyn ContextStore>,
        settings: PipelineSettings,
    ) -> Self {
        let fallback = Arc::new(FallbackResolver::new(
            llm.clone(),
            settings.fallback_model.clone(),
            registry.clone(),
        ));
        let dispatcher = Dispatcher::new(agents, fallback.clone(), settings.agent_timeout_secs);
        Self {
            llm,
            registry,
            dispatcher,
            fallback,
            context,
            settings,
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn context_store(&self) -> &Arc<dyn ContextStore> {
        &self.context
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// 路由一次请求并持久化本轮对话
    pub async fn route(&self, req: RouteRequest) -> RouteOutcome {
        let start = Instant::now();
        let outcome = self.resolve(&req).await;
        self.commit(&req.query, &outcome, start).await;
        outcome
    }

    /// 可取消的路由：取消时返回 None，且不写入上下文
    pub async fn route_cancellable(
        &self,
        req: RouteRequest,
        cancel: CancellationToken,
    ) -> Option<RouteOutcome> {
        let start = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = self.resolve(&req) => Some(outcome),
        };
        match outcome {
            Some(outcome) => {
                self.commit(&req.query, &outcome, start).await;
                Some(outcome)
            }
            None => {
                tracing::info!(query = %preview(&req.query, 200), "request cancelled, nothing persisted");
                None
            }
        }
    }

    async fn resolve(&self, req: &RouteRequest) -> RouteOutcome {
        let conversation_id = req
            .conversation_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let topic = req
            .topic
            .clone()
            .unwrap_or_else(|| self.settings.default_topic.clone());
        let context = match self
            .context
            .get_formatted(&topic, &conversation_id, self.settings.exclude_main_model)
            .await
        {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load conversation context, continuing without it");
                String::new()
            }
        };

        let mut trace = StageTrace::new();
        let (result, resolution) = self.run_stages(&req.query, &context, &mut trace).await;
        advance(&mut trace, Stage::Done);
        RouteOutcome {
            result,
            conversation_id,
            topic,
            resolution,
            trace: trace.stages().to_vec(),
        }
    }

    async fn run_stages(
        &self,
        query: &str,
        context: &str,
        trace: &mut StageTrace,
    ) -> (AgentResult, Resolution) {
        advance(trace, Stage::Routing);
        let prompt = build_routing_prompt(&self.registry, query, context);
        let raw = match self.llm.complete(&self.settings.routing_model, &prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                let call = AgentCall::new(UNROUTED_AGENT, query, Params::new());
                return self.escalate(trace, &call, query, context, e.into()).await;
            }
        };
        tracing::debug!(raw = %preview(&raw, 200), "routing model answered");

        let unrouted = AgentCall::new(UNROUTED_AGENT, DIRECT_RESPONSE, Params::new());
        advance(trace, Stage::Extracting);
        let payload = match extract_payload(&raw) {
            Ok(payload) => payload,
            Err(e) => return self.escalate(trace, &unrouted, query, context, e.into()).await,
        };

        advance(trace, Stage::Normalizing);
        let call = match normalize(payload, Some(&self.registry)) {
            Ok(call) => call,
            Err(e) => return self.escalate(trace, &unrouted, query, context, e.into()).await,
        };

        advance(trace, Stage::Validating);
        let call = match validate(call, &self.registry) {
            ValidationOutcome::Valid(call) => call,
            ValidationOutcome::Invalid { call, failure } => {
                let err = RoutingError::Validation(failure);
                match FallbackResolver::plan(&err) {
                    FallbackAction::Repair(missing) if !trace.repaired() => {
                        advance(trace, Stage::Repairing);
                        tracing::warn!(
                            agent = %call.agent,
                            command = %call.command,
                            tier = 2,
                            cause = %err,
                            "repairing missing parameters with the user query"
                        );
                        let repaired = repair_missing(call, &missing, query);
                        advance(trace, Stage::Validating);
                        match validate(repaired, &self.registry) {
                            ValidationOutcome::Valid(call) => call,
                            ValidationOutcome::Invalid { call, failure } => {
                                return self
                                    .escalate(trace, &call, query, context, failure.into())
                                    .await
                            }
                        }
                    }
                    _ => return self.escalate(trace, &call, query, context, err).await,
                }
            }
        };

        advance(trace, Stage::Dispatching);
        let dispatched = self.dispatcher.dispatch(&call, Some(context), query).await;
        match dispatched.path {
            DispatchPath::Completed => {
                let (resolution, note) = if trace.repaired() {
                    (Resolution::Repaired, "repaired")
                } else {
                    (Resolution::Routed, "routed")
                };
                let mut result = dispatched.result;
                if result.note.is_none() {
                    result.note = Some(note.to_string());
                }
                (result, resolution)
            }
            DispatchPath::AgentMissing => (dispatched.result, Resolution::AgentMissing),
            DispatchPath::Escalated => {
                advance(trace, Stage::Fallback);
                (dispatched.result, Resolution::Fallback)
            }
        }
    }

    async fn escalate(
        &self,
        trace: &mut StageTrace,
        call: &AgentCall,
        query: &str,
        context: &str,
        err: RoutingError,
    ) -> (AgentResult, Resolution) {
        advance(trace, Stage::Fallback);
        tracing::warn!(stage = err.stage(), error = %err, "routing failed, escalating to fallback");
        let cause = err.to_string();
        let result = self
            .fallback
            .direct_answer(Escalation {
                call,
                query,
                context,
                cause: &cause,
                detail: None,
            })
            .await;
        (result, Resolution::Fallback)
    }

    /// 写入本轮对话（用户输入总是写；Agent 回复仅在成功时写）并输出审计日志
    async fn commit(&self, query: &str, outcome: &RouteOutcome, start: Instant) {
        let (topic, conversation_id) = (&outcome.topic, &outcome.conversation_id);
        if let Err(e) = self
            .context
            .save(topic, conversation_id, Turn::User(query.to_string()))
            .await
        {
            tracing::warn!(error = %e, "failed to persist user turn");
        }
        if outcome.result.success {
            let response = outcome.result.data_text();
            if let Err(e) = self.context.save(topic, conversation_id, Turn::Agent(response)).await {
                tracing::warn!(error = %e, "failed to persist agent turn");
            }
        }

        let audit = serde_json::json!({
            "event": "route_audit",
            "agent": outcome.result.agent,
            "command": outcome.result.command,
            "success": outcome.result.success,
            "resolution": outcome.resolution,
            "duration_ms": start.elapsed().as_millis() as u64,
            "query_preview": preview(query, 200),
        });
        tracing::info!(audit = %audit.to_string(), "route");
    }
}

/// 推进阶段轨迹；非法转移说明编排逻辑有缺陷
fn advance(trace: &mut StageTrace, stage: Stage) {
    let entered = trace.enter(stage);
    debug_assert!(entered, "illegal stage transition to {stage:?}");
}
