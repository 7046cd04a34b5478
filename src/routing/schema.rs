//! 路由答复 JSON Schema 生成（schemars）
//!
//! 把「合法 Agent 调用」的 JSON 结构拼进路由 prompt，减少模型输出格式错误。

use schemars::{schema_for, JsonSchema};
use std::collections::BTreeMap;

/// 路由答复格式：与 Normalizer 接受的规范三元组一致（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct AgentCallFormat {
    /// Agent 名，如 healthcare_agent、fitness_agent
    pub agent: String,
    /// 该 Agent 声明的命令名
    pub command: String,
    /// 命令参数，必须包含所有声明参数
    pub params: BTreeMap<String, serde_json::Value>,
}

/// 返回 Agent 调用的 JSON Schema 字符串
pub fn agent_call_schema_json() -> String {
    let schema = schema_for!(AgentCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
