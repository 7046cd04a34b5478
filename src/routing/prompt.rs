//! Prompt 构建：路由 prompt 与兜底直答 prompt

use std::fmt::Write;

use serde_json::Value;

use crate::core::AgentCall;
use crate::registry::CapabilityRegistry;
use crate::routing::schema::agent_call_schema_json;

/// 路由 prompt：说明 + 上下文 + Agent 清单 + 当前问题 + 答复格式
pub fn build_routing_prompt(registry: &CapabilityRegistry, query: &str, context: &str) -> String {
    let mut prompt = String::from(
        "You are a routing assistant. Based on the user query and context, decide which agent to call.\n\n",
    );
    let _ = writeln!(prompt, "Context: {context}\n");
    prompt.push_str("Available agents:\n");
    prompt.push_str(&agent_listing(registry));
    let _ = writeln!(prompt, "\nCurrent query: {query}\n");
    prompt.push_str("Respond ONLY in JSON format:\n");
    prompt.push_str(r#"{"agent": "<agent_name>", "command": "<function_name>", "params": {...}}"#);
    prompt.push_str("\n\nAll required parameters must be present in 'params'.\n");
    let _ = write!(prompt, "\nJSON Schema of the answer:\n{}\n", agent_call_schema_json());
    prompt
}

/// Agent 清单：`- name: description`，每个命令一行 `    - cmd(p: type): description`
pub fn agent_listing(registry: &CapabilityRegistry) -> String {
    let mut out = String::new();
    for agent in registry.agents() {
        let _ = writeln!(out, "- {}: {}", agent.name, agent.description);
        for command in &agent.commands {
            let params = command
                .params
                .iter()
                .map(|p| format!("{}: {}", p.name, p.param_type.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "    - {}({}): {}", command.name, params, command.description);
        }
    }
    out
}

/// 兜底直答 prompt
pub fn build_fallback_prompt(
    call: &AgentCall,
    query: &str,
    context: &str,
    detail: Option<&str>,
) -> String {
    let params = Value::Object(call.params.clone()).to_string();
    let mut prompt = String::from(
        "You are a helpful assistant. The specialised agent below could not answer the user, \
         so answer the user's question directly and concisely.\n\n",
    );
    let _ = writeln!(prompt, "Agent: {}", call.agent);
    let _ = writeln!(prompt, "Command: {}", call.command);
    let _ = writeln!(prompt, "Parameters: {params}");
    if !context.trim().is_empty() {
        let _ = writeln!(prompt, "\n{context}");
    }
    if let Some(detail) = detail.filter(|d| !d.trim().is_empty()) {
        let _ = writeln!(prompt, "\nAgent reported: {detail}");
    }
    let _ = writeln!(prompt, "\nUser question: {query}");
    prompt
}
