//! LLM 客户端抽象
//!
//! 所有后端（Ollama / OpenAI 兼容 / Mock）实现 LlmClient：complete（非流式，按模型名生成文本）。
//! 网络失败、超时、非 2xx 统一转为 LlmError，调用方据此进入兜底，而不是无限阻塞。

use async_trait::async_trait;
use thiserror::Error;

/// 语言模型后端不可用的具体原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("LLM connection failed: {0}")]
    Connection(String),

    #[error("LLM returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("LLM response could not be decoded: {0}")]
    Decode(String),

    #[error("LLM backend error: {0}")]
    Backend(String),
}

/// LLM 客户端 trait：给定模型名与完整 prompt，返回生成文本
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成（请求体等价于 `{model, prompt, stream: false}`）
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, LlmError>;

    /// 后端标识（健康检查与日志用）
    fn backend_name(&self) -> &str {
        "llm"
    }
}
