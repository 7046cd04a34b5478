//! Beeline - 多 Agent 查询路由
//!
//! 用一个通用语言模型决定把自由文本问题交给哪个专业 Agent（健康、健身、教育、金融、法律、旅行……），
//! 对不可靠的模型输出做提取、规范化、校验与修复，执行后在任何一步失败时逐级兜底。
//!
//! 模块划分：
//! - **agents**: Agent 能力 trait、调用表、Prompt 模板 Agent、远程 Agent
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **context**: 会话上下文存储（SQLite / 内存）
//! - **core**: 错误分类、阶段状态机、AgentCall / AgentResult、启动装配
//! - **llm**: LLM 客户端抽象与实现（Ollama / OpenAI 兼容 / Mock）
//! - **observability**: tracing 初始化
//! - **registry**: 能力注册表与声明加载
//! - **routing**: 提取、规范化、校验、兜底、执行、编排
//! - **server**: HTTP 接口（feature `web`）

pub mod agents;
pub mod config;
pub mod context;
pub mod core;
pub mod llm;
pub mod observability;
pub mod registry;
pub mod routing;
#[cfg(feature = "web")]
pub mod server;

pub use crate::core::{AgentCall, AgentResult, PipelineBuilder};
pub use crate::routing::{RouteOutcome, RouteRequest, RoutingPipeline};
