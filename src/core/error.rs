//! 路由错误分类
//!
//! 每一类错误都在发生处被 FallbackResolver 捕获并转为兜底动作，不会越过 Pipeline 边界。
//! 只有启动期的配置错误（注册表加载、数据库打开）才会作为致命错误返回给调用方。

use thiserror::Error;

use crate::llm::LlmError;

/// 模型输出中找不到可解析的结构化块
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("No JSON found in model output")]
    NoJsonBlock,

    #[error("Extracted text is not valid JSON: {0}")]
    InvalidJson(String),
}

/// 载荷形状无法识别
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("could not normalize agent call: {reason}")]
pub struct NormalizationError {
    pub reason: String,
}

impl NormalizationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// 三元组与注册表不匹配
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("unknown function: {agent}.{command}")]
    UnknownCommand { agent: String, command: String },

    #[error("missing parameters: {}", .0.join(", "))]
    MissingParams(Vec<String>),
}

impl ValidationFailure {
    /// 稳定的原因短语（日志与兜底提示中使用）
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnknownAgent(_) => "unknown agent",
            Self::UnknownCommand { .. } => "unknown function",
            Self::MissingParams(_) => "missing parameters",
        }
    }
}

/// Agent 执行失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchFailure {
    #[error("Agent not found")]
    AgentNotFound,

    #[error("Command '{0}' not found in agent")]
    CommandNotFound(String),

    #[error("Agent execution failed: {0}")]
    AgentRaised(String),

    #[error("Agent returned a malformed result: {0}")]
    MalformedResult(String),

    #[error("Agent reported failure: {0}")]
    ReportedFailure(String),

    #[error("Agent timed out after {0}s")]
    Timeout(u64),
}

/// 注册表加载错误（启动期致命）
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to read declaration {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid declaration {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Unknown parameter type '{type_name}' for {agent}.{command}.{param}")]
    UnknownParamType {
        agent: String,
        command: String,
        param: String,
        type_name: String,
    },

    #[error("Duplicate agent declaration: {0}")]
    DuplicateAgent(String),

    #[error("No agent declarations found in {0}")]
    Empty(String),

    #[error("Invalid declaration pattern: {0}")]
    Pattern(String),
}

/// 上下文存储错误
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Context database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Context store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Context store task failed: {0}")]
    Join(String),
}

/// 单次路由请求内可能出现的所有错误
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error(transparent)]
    Dispatch(#[from] DispatchFailure),

    #[error("Backend unavailable: {0}")]
    Backend(#[from] LlmError),
}

impl RoutingError {
    /// 所处阶段（日志字段）
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Extraction(_) => "extracting",
            Self::Normalization(_) => "normalizing",
            Self::Validation(_) => "validating",
            Self::Dispatch(_) => "dispatching",
            Self::Backend(_) => "routing",
        }
    }
}
