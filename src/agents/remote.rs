//! 远程 Agent：通过 HTTP 调用部署在别处的 Agent 服务
//!
//! POST `{command, params, context}` 到配置的 URL，响应体原样交给 Dispatcher 做形状检查。
//! 连接失败、超时、非 2xx 都是 AgentFault::Unavailable，等同于 Agent 抛错。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::agents::{Agent, AgentFault};
use crate::core::{preview, Params};

#[derive(Serialize)]
struct RemoteRequest<'a> {
    command: &'a str,
    params: &'a Params,
    context: &'a str,
}

pub struct RemoteAgent {
    name: String,
    url: String,
    client: Client,
    timeout_secs: u64,
}

impl RemoteAgent {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, AgentFault> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AgentFault::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            name: name.into(),
            url: url.into(),
            client,
            timeout_secs,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn map_error(&self, err: reqwest::Error) -> AgentFault {
        if err.is_timeout() {
            AgentFault::Unavailable(format!("timed out after {}s", self.timeout_secs))
        } else {
            AgentFault::Unavailable(err.to_string())
        }
    }
}

#[async_trait]
impl Agent for RemoteAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_context(&self) -> bool {
        true
    }

    async fn run_command_with_context(
        &self,
        command: &str,
        params: &Params,
        context: &str,
    ) -> Result<Value, AgentFault> {
        let body = RemoteRequest {
            command,
            params,
            context,
        };
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AgentFault::Unavailable(format!(
                "HTTP {}: {}",
                status.as_u16(),
                preview(&body, 200)
            )));
        }
        resp.json::<Value>().await.map_err(|e| self.map_error(e))
    }
}
