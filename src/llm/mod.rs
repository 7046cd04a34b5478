//! LLM 层：客户端抽象与实现（Ollama / OpenAI 兼容 / Mock）

pub mod mock;
pub mod ollama;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::config::LlmSection;

pub use mock::MockLlmClient;
pub use ollama::{OllamaClient, OLLAMA_BASE_URL};
pub use openai::OpenAiClient;
pub use traits::{LlmClient, LlmError};

/// 按 [llm].provider 创建客户端；未知 provider 回退到 ollama
pub fn create_llm_from_config(cfg: &LlmSection) -> Result<Arc<dyn LlmClient>, LlmError> {
    let client: Arc<dyn LlmClient> = match cfg.provider.as_str() {
        "openai" => Arc::new(OpenAiClient::new(
            cfg.base_url.as_deref(),
            cfg.api_key.as_deref(),
            cfg.timeouts.request,
        )),
        "ollama" => Arc::new(OllamaClient::new(cfg.base_url.as_deref(), cfg.timeouts.request)?),
        other => {
            tracing::warn!(provider = other, "unknown llm provider, using ollama");
            Arc::new(OllamaClient::new(cfg.base_url.as_deref(), cfg.timeouts.request)?)
        }
    };
    Ok(client)
}
