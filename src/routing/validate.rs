//! 参数校验：三元组对照注册表
//!
//! 依次检查 Agent 存在、命令存在、声明参数名是已提供参数名的子集。多余参数不算错误。

use crate::core::{AgentCall, ValidationFailure};
use crate::registry::CapabilityRegistry;

/// 校验结果：失败时把调用原样带回，供修复层使用
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Valid(AgentCall),
    Invalid {
        call: AgentCall,
        failure: ValidationFailure,
    },
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// 校验调用
pub fn validate(call: AgentCall, registry: &CapabilityRegistry) -> ValidationOutcome {
    match check(&call, registry) {
        Ok(()) => ValidationOutcome::Valid(call),
        Err(failure) => ValidationOutcome::Invalid { call, failure },
    }
}

/// 只检查不转移所有权
pub fn check(call: &AgentCall, registry: &CapabilityRegistry) -> Result<(), ValidationFailure> {
    let agent = registry
        .agent(&call.agent)
        .ok_or_else(|| ValidationFailure::UnknownAgent(call.agent.clone()))?;
    let command = agent
        .command(&call.command)
        .ok_or_else(|| ValidationFailure::UnknownCommand {
            agent: call.agent.clone(),
            command: call.command.clone(),
        })?;
    let missing: Vec<String> = command
        .param_names()
        .filter(|name| !call.params.contains_key(*name))
        .map(str::to_string)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationFailure::MissingParams(missing))
    }
}

/// 类型不符的参数名（仅 /tools 直连接口使用；路由流程只看参数名）
pub fn type_mismatches(call: &AgentCall, registry: &CapabilityRegistry) -> Vec<String> {
    let Some(command) = registry.command(&call.agent, &call.command) else {
        return Vec::new();
    };
    command
        .params
        .iter()
        .filter(|p| {
            call.params
                .get(&p.name)
                .is_some_and(|v| !p.param_type.accepts(v))
        })
        .map(|p| format!("{} (expected {})", p.name, p.param_type.as_str()))
        .collect()
}
