//! Prompt 模板 Agent
//!
//! 每个声明一个实例。带 `prompt` 模板的命令是直接处理器（模板中的 `{param}` / `{context}` 会被替换），
//! 其余命令走通用 run_command。模型失败属于预期内的业务失败，返回 `{success: false}`。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agents::{Agent, AgentFault};
use crate::core::Params;
use crate::llm::LlmClient;
use crate::registry::{AgentSpec, CommandSpec};

pub struct PromptAgent {
    spec: AgentSpec,
    llm: Arc<dyn LlmClient>,
    model: String,
}

impl PromptAgent {
    pub fn new(spec: AgentSpec, llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            spec,
            llm,
            model: model.into(),
        }
    }

    fn command(&self, name: &str) -> Result<&CommandSpec, AgentFault> {
        self.spec
            .command(name)
            .ok_or_else(|| AgentFault::UnknownCommand(name.to_string()))
    }

    /// 无模板命令的通用 prompt
    fn generic_prompt(&self, command: &CommandSpec, params: &Params) -> String {
        let mut prompt = format!(
            "You are the {} ({}). Carry out the task '{}': {}\n\nParameters:\n",
            self.spec.name, self.spec.description, command.name, command.description
        );
        for (name, value) in params {
            prompt.push_str(&format!("- {name}: {}\n", param_text(value)));
        }
        prompt.push_str("\nAnswer in plain text.");
        prompt
    }

    async fn ask(&self, command: &str, prompt: String) -> Value {
        match self.llm.complete(&self.model, &prompt).await {
            Ok(answer) => json!({
                "success": true,
                "data": answer.trim(),
                "agent": self.spec.name,
                "command": command,
            }),
            Err(e) => {
                tracing::warn!(agent = %self.spec.name, command, error = %e, "agent model call failed");
                json!({
                    "success": false,
                    "error": e.to_string(),
                    "agent": self.spec.name,
                    "command": command,
                })
            }
        }
    }
}

/// 填充模板：`{name}` 替换为参数值，`{context}` 替换为上下文（无则为空）
pub fn fill_template(template: &str, params: &Params, context: Option<&str>) -> String {
    let mut out = template.replace("{context}", context.unwrap_or(""));
    for (name, value) in params {
        out = out.replace(&format!("{{{name}}}"), &param_text(value));
    }
    out
}

fn param_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Agent for PromptAgent {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn handles(&self, command: &str) -> bool {
        self.spec
            .command(command)
            .is_some_and(|c| c.prompt.is_some())
    }

    async fn handle(
        &self,
        command: &str,
        params: &Params,
        context: Option<&str>,
    ) -> Result<Value, AgentFault> {
        let spec = self.command(command)?;
        let template = spec
            .prompt
            .as_deref()
            .ok_or_else(|| AgentFault::UnknownCommand(command.to_string()))?;
        let prompt = fill_template(template, params, context);
        Ok(self.ask(command, prompt).await)
    }

    fn supports_run_command(&self) -> bool {
        true
    }

    async fn run_command(&self, command: &str, params: &Params) -> Result<Value, AgentFault> {
        let spec = self.command(command)?;
        let prompt = self.generic_prompt(spec, params);
        Ok(self.ask(command, prompt).await)
    }
}
