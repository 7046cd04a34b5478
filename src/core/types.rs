//! 路由核心数据类型：AgentCall（规范三元组）与 AgentResult（所有调用路径的统一结果）

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Agent 参数表（参数名 -> JSON 值，保持插入顺序）
pub type Params = Map<String, Value>;

/// 规范化后的 Agent 调用：{agent, command, params}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCall {
    pub agent: String,
    pub command: String,
    #[serde(default)]
    pub params: Params,
}

impl AgentCall {
    pub fn new(agent: impl Into<String>, command: impl Into<String>, params: Params) -> Self {
        Self {
            agent: agent.into(),
            command: command.into(),
            params,
        }
    }

    /// 参数预览（日志用，超过 200 字符截断）
    pub fn params_preview(&self) -> String {
        preview(&Value::Object(self.params.clone()).to_string(), 200)
    }
}

/// Agent 调用结果：Dispatcher 与每条兜底路径都只产出这一形状
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub command: String,
    /// 由哪一层解决（routed / repaired / fallback: ...），仅用于观测
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl AgentResult {
    pub fn ok(agent: impl Into<String>, command: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
            agent: agent.into(),
            command: command.into(),
            note: None,
        }
    }

    pub fn failure(
        agent: impl Into<String>,
        command: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
            agent: agent.into(),
            command: command.into(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// 按 AgentResult 契约解读 Agent 返回的任意 JSON：必须是对象且含布尔 `success`。
    /// agent/command 缺省时用调用方的值补齐。
    pub fn from_agent_value(value: Value, agent: &str, command: &str) -> Option<Self> {
        let obj = value.as_object()?;
        let success = obj.get("success")?.as_bool()?;
        let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            success,
            data: obj.get("data").cloned().unwrap_or(Value::Null),
            error: text("error"),
            agent: text("agent").unwrap_or_else(|| agent.to_string()),
            command: text("command").unwrap_or_else(|| command.to_string()),
            note: text("note"),
        })
    }

    /// 适合写入上下文 / 打印给用户的文本形式：字符串 data 原样返回，否则序列化为 JSON
    pub fn data_text(&self) -> String {
        match &self.data {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// 按字符截断（不会切断 UTF-8 字符），超出时追加 "..."
pub fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}
