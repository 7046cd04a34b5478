//! 路由核心：模型输出 → 规范调用 → 校验 → 执行 → 兜底
//!
//! - **extract**: 从模型原始输出中提取 JSON 载荷
//! - **normalize**: 多种载荷形状统一为 {agent, command, params}
//! - **validate**: 对照能力注册表校验
//! - **fallback**: 三级兜底（默认命令 / 缺参修复 / 模型直答）
//! - **dispatch**: 执行 Agent 调用并检查结果契约
//! - **pipeline**: 单次请求的编排与上下文持久化
//! - **prompt** / **schema**: 路由与兜底 prompt

pub mod dispatch;
pub mod extract;
pub mod fallback;
pub mod normalize;
pub mod pipeline;
pub mod prompt;
pub mod schema;
pub mod validate;

pub use dispatch::{DispatchPath, Dispatched, Dispatcher};
pub use extract::extract_payload;
pub use fallback::{
    default_command, repair_missing, Escalation, FallbackAction, FallbackResolver,
    DIRECT_RESPONSE, GENERAL_FALLBACK,
};
pub use normalize::{normalize, Payload, NO_VALUE};
pub use pipeline::{PipelineSettings, RouteOutcome, RouteRequest, RoutingPipeline};
pub use prompt::{build_fallback_prompt, build_routing_prompt};
pub use validate::{check, validate, ValidationOutcome};
