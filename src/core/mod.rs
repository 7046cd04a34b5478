//! 核心层：错误分类、路由阶段状态机、AgentCall / AgentResult、启动装配

pub mod builder;
pub mod error;
pub mod state;
pub mod types;

pub use builder::{BuildError, PipelineBuilder};
pub use error::{
    ContextError, DispatchFailure, ExtractionError, NormalizationError, RegistryError,
    RoutingError, ValidationFailure,
};
pub use state::{Resolution, Stage, StageTrace};
pub use types::{preview, AgentCall, AgentResult, Params};
