//! Agent 能力层
//!
//! 所有 Agent 实现 Agent trait，启动时按名注册进 AgentTable，调用时一次查表即可，无需反射。
//! 三个入口按 Dispatcher 的解析顺序排列：直接处理器 `handle`、通用 `run_command`、
//! 带上下文的 `run_command_with_context`。返回值是未经检查的 JSON，由 Dispatcher 校验 AgentResult 形状。

pub mod prompt;
pub mod remote;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::AppConfig;
use crate::core::Params;
use crate::llm::LlmClient;
use crate::registry::CapabilityRegistry;

pub use prompt::PromptAgent;
pub use remote::RemoteAgent;

/// Agent 内部缺陷（相当于「抛出异常」）；预期内的业务失败应返回 `{success: false}` 而非 AgentFault
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentFault {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Agent unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Raised(String),
}

/// Agent trait
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    /// 是否有以该命令命名的直接处理器
    fn handles(&self, _command: &str) -> bool {
        false
    }

    async fn handle(
        &self,
        command: &str,
        _params: &Params,
        _context: Option<&str>,
    ) -> Result<Value, AgentFault> {
        Err(AgentFault::UnknownCommand(command.to_string()))
    }

    fn supports_run_command(&self) -> bool {
        false
    }

    async fn run_command(&self, command: &str, _params: &Params) -> Result<Value, AgentFault> {
        Err(AgentFault::UnknownCommand(command.to_string()))
    }

    fn supports_context(&self) -> bool {
        false
    }

    async fn run_command_with_context(
        &self,
        command: &str,
        _params: &Params,
        _context: &str,
    ) -> Result<Value, AgentFault> {
        Err(AgentFault::UnknownCommand(command.to_string()))
    }
}

/// Agent 调用表：按名称存储 Arc<dyn Agent>
#[derive(Default, Clone)]
pub struct AgentTable {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent: impl Agent + 'static) {
        self.register_arc(Arc::new(agent));
    }

    pub fn register_arc(&mut self, agent: Arc<dyn Agent>) {
        let name = agent.name().to_string();
        if self.agents.insert(name.clone(), agent).is_some() {
            tracing::warn!(agent = %name, "agent registered twice, keeping the latest");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// 已注册 Agent 名（排序后返回）
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// 按注册表构建调用表：`[agents.remote]` 中配置了 URL 的走 RemoteAgent，其余为 PromptAgent
pub fn build_agent_table(
    registry: &CapabilityRegistry,
    llm: Arc<dyn LlmClient>,
    cfg: &AppConfig,
) -> Result<AgentTable, AgentFault> {
    let mut table = AgentTable::new();
    for spec in registry.agents() {
        match cfg.agents.remote.get(&spec.name) {
            Some(url) => {
                tracing::info!(agent = %spec.name, url = %url, "registering remote agent");
                table.register(RemoteAgent::new(&spec.name, url, cfg.agents.timeout_secs)?);
            }
            None => table.register(PromptAgent::new(
                spec.clone(),
                llm.clone(),
                cfg.llm.agent_model.clone(),
            )),
        }
    }
    for name in cfg.agents.remote.keys() {
        if !registry.contains(name) {
            tracing::warn!(agent = %name, "remote agent has no declaration, skipped");
        }
    }
    Ok(table)
}
