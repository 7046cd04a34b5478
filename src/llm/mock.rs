//! Mock LLM 客户端（用于测试，无需后端）
//!
//! 按顺序返回预设回复；预设耗尽后回显 prompt 末行。所有调用的 (model, prompt) 都会被记录，便于断言。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};

/// Mock 客户端：脚本化回复 + 调用记录
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<(String, String)>>,
    always_fail: Option<LlmError>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回给定回复
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        for reply in replies {
            client.push_reply(reply);
        }
        client
    }

    /// 每次调用都以给定错误失败（模拟后端不可达）
    pub fn failing(err: LlmError) -> Self {
        Self {
            always_fail: Some(err),
            ..Self::default()
        }
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Ok(reply.into()));
        }
    }

    pub fn push_failure(&self, err: LlmError) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(err));
        }
    }

    /// 已记录的调用：(model, prompt)
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((model.to_string(), prompt.to_string()));
        }
        if let Some(err) = &self.always_fail {
            return Err(err.clone());
        }
        let scripted = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        match scripted {
            Some(reply) => reply,
            None => {
                let last = prompt.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("(no input)");
                Ok(format!("Mock answer: {}", last.trim()))
            }
        }
    }

    fn backend_name(&self) -> &str {
        "mock"
    }
}
