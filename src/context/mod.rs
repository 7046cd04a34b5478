//! 会话上下文存储
//!
//! 按 (topic, conversation_id) 追加记录每一轮的用户输入与 Agent 回复，读取时只取最近 `window` 行，
//! 格式化为有长度上限的文本交给 Pipeline。主模型（路由模型）输出默认不进入上下文。

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::core::ContextError;

pub use memory::MemoryContextStore;
pub use sqlite::SqliteContextStore;

/// 格式化上下文的标题行
pub const CONTEXT_HEADER: &str = "Previous conversation context:\n";

/// 一条待写入的记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    User(String),
    Agent(String),
    /// 路由模型自身的输出
    MainModel(String),
}

impl Turn {
    pub fn response_type(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Agent(_) => "agent",
            Self::MainModel(_) => "main_model",
        }
    }

    /// 拆成 (user_input, agent_response)
    fn into_columns(self) -> (Option<String>, Option<String>) {
        match self {
            Self::User(text) => (Some(text), None),
            Self::Agent(text) | Self::MainModel(text) => (None, Some(text)),
        }
    }
}

/// 存储中的一行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextRecord {
    pub user_input: Option<String>,
    pub agent_response: Option<String>,
    pub timestamp: NaiveDateTime,
    pub response_type: String,
}

impl ContextRecord {
    fn new(turn: Turn) -> Self {
        let response_type = turn.response_type().to_string();
        let (user_input, agent_response) = turn.into_columns();
        Self {
            user_input,
            agent_response,
            timestamp: chrono::Local::now().naive_local(),
            response_type,
        }
    }

    /// `User: ...` / `Agent: ...` / `Time: ...` 加分隔线
    fn render(&self) -> String {
        let mut out = String::new();
        if let Some(text) = self.user_input.as_deref().filter(|t| !t.is_empty()) {
            out.push_str(&format!("User: {text}\n"));
        }
        if let Some(text) = self.agent_response.as_deref().filter(|t| !t.is_empty()) {
            out.push_str(&format!("Agent: {text}\n"));
        }
        out.push_str(&format!("Time: {}\n---\n", self.timestamp.format("%Y-%m-%d %H:%M:%S")));
        out
    }
}

/// 读取窗口与长度上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    pub window: usize,
    pub max_chars: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            window: 10,
            max_chars: 1000,
        }
    }
}

/// 按时间顺序格式化；超过 max_chars 时先丢最旧的行（最新一行总会保留），仍超出则按字符截断
pub fn format_context(records: &[ContextRecord], max_chars: usize) -> String {
    let rendered: Vec<String> = records.iter().map(ContextRecord::render).collect();
    let header_len = CONTEXT_HEADER.chars().count();
    let mut total: usize = header_len + rendered.iter().map(|r| r.chars().count()).sum::<usize>();
    let mut start = 0;
    while total > max_chars && start + 1 < rendered.len() {
        total -= rendered[start].chars().count();
        start += 1;
    }
    let mut out = String::from(CONTEXT_HEADER);
    for row in &rendered[start..] {
        out.push_str(row);
    }
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }
    out
}

/// 上下文存储 trait
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// 追加一条记录
    async fn save(&self, topic: &str, conversation_id: &str, turn: Turn) -> Result<(), ContextError>;

    /// 最近的记录（时间正序，最多 window 行）
    async fn turns(
        &self,
        topic: &str,
        conversation_id: &str,
        exclude_main_model: bool,
    ) -> Result<Vec<ContextRecord>, ContextError>;

    /// 最近一次用户输入
    async fn last_user_query(
        &self,
        topic: &str,
        conversation_id: &str,
    ) -> Result<Option<String>, ContextError>;

    fn limits(&self) -> ContextLimits;

    /// 连通性检查（/health）
    async fn ping(&self) -> Result<(), ContextError> {
        Ok(())
    }

    /// 格式化后的上下文文本
    async fn get_formatted(
        &self,
        topic: &str,
        conversation_id: &str,
        exclude_main_model: bool,
    ) -> Result<String, ContextError> {
        let records = self.turns(topic, conversation_id, exclude_main_model).await?;
        Ok(format_context(&records, self.limits().max_chars))
    }
}
