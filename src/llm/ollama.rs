//! Ollama generate API 客户端
//!
//! POST {base_url}/api/generate，请求体 `{model, prompt, stream: false}`，只取响应中的 `response` 字段。
//! 超时由 reqwest Client 统一设置。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::llm::{LlmClient, LlmError};

pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Ollama 客户端：持有带超时的 reqwest Client 与 base_url
pub struct OllamaClient {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl OllamaClient {
    /// 带超时的 HTTP 客户端构建失败属于启动期错误
    pub fn new(base_url: Option<&str>, timeout_secs: u64) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LlmError::Backend(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(OLLAMA_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    fn map_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout(self.timeout_secs)
        } else if err.is_connect() {
            LlmError::Connection(err.to_string())
        } else if err.is_decode() {
            LlmError::Decode(err.to_string())
        } else {
            LlmError::Backend(err.to_string())
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        let body = GenerateRequest {
            model,
            prompt,
            stream: false,
        };
        let resp = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                code: status.as_u16(),
                body: crate::core::preview(&body, 200),
            });
        }

        let parsed: GenerateResponse = resp.json().await.map_err(|e| self.map_error(e))?;
        Ok(parsed.response)
    }

    fn backend_name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = OllamaClient::new(Some("http://gpu-box:11434/"), 5).unwrap();
        assert_eq!(client.endpoint(), "http://gpu-box:11434/api/generate");
    }

    #[test]
    fn test_request_body_shape() {
        let body = GenerateRequest {
            model: "gemma3:4b",
            prompt: "hi",
            stream: false,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"model": "gemma3:4b", "prompt": "hi", "stream": false})
        );
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_typed_failure() {
        // 端口 9 (discard) 通常无人监听，连接会被立即拒绝
        let client = OllamaClient::new(Some("http://127.0.0.1:9"), 2).unwrap();
        let err = client.complete("gemma3:4b", "ping").await.unwrap_err();
        assert!(matches!(
            err,
            LlmError::Connection(_) | LlmError::Timeout(_) | LlmError::Backend(_)
        ));
    }
}
