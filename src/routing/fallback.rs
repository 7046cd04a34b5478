//! 兜底解析：三级逐步降级
//!
//! - 一级：已知 Agent 的默认命令表（只给出命令名，不执行）
//! - 二级：缺参修复，用原始用户问题填补缺失参数，只修复一次
//! - 三级：直接请求兜底模型作答；后端失败也只返回 `success: false`，绝不向上抛错

use std::sync::Arc;

use serde_json::Value;

use crate::core::{AgentCall, AgentResult, DispatchFailure, RoutingError, ValidationFailure};
use crate::llm::LlmClient;
use crate::registry::CapabilityRegistry;
use crate::routing::prompt::build_fallback_prompt;

/// 兜底命令哨兵：表示「由模型直接回答」
pub const DIRECT_RESPONSE: &str = "direct_response";

/// 未注册 Agent 的兜底结果使用的 Agent 名
pub const GENERAL_FALLBACK: &str = "general_fallback";

/// 一级兜底：Agent 名 -> 默认命令
const DEFAULT_COMMANDS: &[(&str, &str)] = &[
    ("food_agent", "suggest_meal"),
    ("fitness_agent", "suggest_plan"),
];

/// 查默认命令；不在表中则返回 DIRECT_RESPONSE
pub fn default_command(agent: &str) -> &'static str {
    DEFAULT_COMMANDS
        .iter()
        .find(|(name, _)| *name == agent)
        .map(|(_, command)| *command)
        .unwrap_or(DIRECT_RESPONSE)
}

/// 二级兜底：缺失参数一律填入用户原始问题
pub fn repair_missing(mut call: AgentCall, missing: &[String], query: &str) -> AgentCall {
    for name in missing {
        call.params.insert(name.clone(), Value::String(query.to_string()));
    }
    call
}

/// 错误对应的兜底动作
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackAction {
    /// 补齐这些参数后重新校验一次
    Repair(Vec<String>),
    /// 交给兜底模型直接回答
    DirectAnswer { cause: String },
    /// 配置问题，原样报告失败，不走兜底
    Report(String),
}

/// 三级兜底的一次请求
#[derive(Debug, Clone, Copy)]
pub struct Escalation<'a> {
    pub call: &'a AgentCall,
    pub query: &'a str,
    pub context: &'a str,
    /// 触发兜底的原因（写入 note 与日志）
    pub cause: &'a str,
    /// Agent 自己报告的失败细节，拼进 prompt
    pub detail: Option<&'a str>,
}

/// 兜底解析器
pub struct FallbackResolver {
    llm: Arc<dyn LlmClient>,
    model: String,
    registry: Arc<CapabilityRegistry>,
}

impl FallbackResolver {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        registry: Arc<CapabilityRegistry>,
    ) -> Self {
        Self {
            llm,
            model: model.into(),
            registry,
        }
    }

    /// 错误 -> 兜底动作的唯一映射
    pub fn plan(err: &RoutingError) -> FallbackAction {
        match err {
            RoutingError::Validation(ValidationFailure::MissingParams(missing)) => {
                FallbackAction::Repair(missing.clone())
            }
            RoutingError::Dispatch(DispatchFailure::AgentNotFound) => {
                FallbackAction::Report(DispatchFailure::AgentNotFound.to_string())
            }
            other => FallbackAction::DirectAnswer {
                cause: other.to_string(),
            },
        }
    }

    /// 兜底结果使用的 Agent 名：已注册 Agent 为 `<agent>_fallback`，否则 `general_fallback`
    pub fn fallback_agent_name(&self, agent: &str) -> String {
        if self.registry.contains(agent) {
            format!("{agent}_fallback")
        } else {
            GENERAL_FALLBACK.to_string()
        }
    }

    /// 三级兜底：直接请求模型作答，永不失败
    pub async fn direct_answer(&self, esc: Escalation<'_>) -> AgentResult {
        let agent = self.fallback_agent_name(&esc.call.agent);
        tracing::warn!(
            agent = %esc.call.agent,
            command = %esc.call.command,
            tier = 3,
            cause = %esc.cause,
            "escalating to direct fallback answer"
        );
        let prompt = build_fallback_prompt(esc.call, esc.query, esc.context, esc.detail);
        let note = format!("fallback: {}", esc.cause);
        match self.llm.complete(&self.model, &prompt).await {
            Ok(answer) => {
                let answer = Value::String(answer.trim().to_string());
                AgentResult::ok(agent, DIRECT_RESPONSE, answer).with_note(note)
            }
            Err(e) => {
                tracing::error!(agent = %agent, error = %e, "fallback backend failed");
                AgentResult::failure(agent, DIRECT_RESPONSE, e.to_string()).with_note(note)
            }
        }
    }
}
