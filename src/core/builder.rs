//! Pipeline 构建器：统一的启动初始化逻辑
//!
//! CLI 与 Web 共用同一套装配：配置 → 注册表 → LLM 客户端 → Agent 调用表 → 上下文存储 → RoutingPipeline。
//! 注册表或数据库打不开属于启动期致命错误，由 BuildError 返回。

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::agents::{build_agent_table, AgentFault};
use crate::config::{load_config, AppConfig};
use crate::context::{ContextLimits, ContextStore, SqliteContextStore};
use crate::core::{ContextError, RegistryError};
use crate::llm::{create_llm_from_config, LlmClient, LlmError};
use crate::registry::{load_registry, CapabilityRegistry};
use crate::routing::{PipelineSettings, RoutingPipeline};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("Failed to create LLM client: {0}")]
    Llm(#[from] LlmError),

    #[error("Failed to create agent: {0}")]
    Agent(#[from] AgentFault),
}

/// Pipeline 构建器：可替换 LLM、注册表与上下文存储（测试注入 Mock）
pub struct PipelineBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    registry: Option<CapabilityRegistry>,
    context: Option<Arc<dyn ContextStore>>,
}

impl PipelineBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            registry: None,
            context: None,
        }
    }

    /// 从配置文件创建（None 时按默认位置查找）
    pub fn from_config_path(config_path: Option<PathBuf>) -> Result<Self, BuildError> {
        Ok(Self::new(load_config(config_path)?))
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_registry(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_context_store(mut self, store: Arc<dyn ContextStore>) -> Self {
        self.context = Some(store);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn context_limits(&self) -> ContextLimits {
        ContextLimits {
            window: self.config.context.window,
            max_chars: self.config.context.max_chars,
        }
    }

    pub fn build(self) -> Result<RoutingPipeline, BuildError> {
        let limits = self.context_limits();
        let Self {
            config,
            llm,
            registry,
            context,
        } = self;

        let registry = match registry {
            Some(registry) => registry,
            None => load_registry(&config.registry.dir)?,
        };
        let llm = match llm {
            Some(llm) => llm,
            None => create_llm_from_config(&config.llm)?,
        };
        let context: Arc<dyn ContextStore> = match context {
            Some(store) => store,
            None => Arc::new(SqliteContextStore::open(&config.context.db_path, limits)?),
        };
        let agents = build_agent_table(&registry, llm.clone(), &config)?;
        tracing::info!(
            agents = agents.len(),
            backend = llm.backend_name(),
            routing_model = %config.llm.routing_model,
            "routing pipeline ready"
        );
        Ok(RoutingPipeline::new(
            llm,
            Arc::new(registry),
            agents,
            context,
            PipelineSettings::from_config(&config),
        ))
    }
}
