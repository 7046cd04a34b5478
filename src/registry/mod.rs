//! 能力注册表
//!
//! Agent 名 -> {描述, 命令 -> {有序参数名, 描述, 可选 prompt 模板}}。启动时构建一次，之后只读，
//! 可在并发请求间通过 Arc 共享。迭代顺序即声明顺序（命令推断依赖这一点）。

pub mod loader;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::RegistryError;

pub use loader::{load_registry, RegistryLoader};

/// 参数类型：固定枚举 + 安全查表，不对配置中的类型名做任何动态求值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Str,
    Int,
    Float,
    Bool,
    List,
    Dict,
    Any,
}

impl ParamType {
    pub fn lookup(name: &str) -> Option<Self> {
        Some(match name.trim().to_ascii_lowercase().as_str() {
            "str" | "string" => Self::Str,
            "int" | "integer" => Self::Int,
            "float" | "number" => Self::Float,
            "bool" | "boolean" => Self::Bool,
            "list" | "array" => Self::List,
            "dict" | "object" => Self::Dict,
            "any" => Self::Any,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Any => "any",
        }
    }

    /// 值是否符合该类型（/tools 接口的参数检查用）
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Str => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::List => value.is_array(),
            Self::Dict => value.is_object(),
            Self::Any => true,
        }
    }
}

/// 单个参数声明
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub description: Option<String>,
}

/// 单个命令声明
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    /// Prompt Agent 使用的模板（{param} / {context} 占位）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl CommandSpec {
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }
}

/// 单个 Agent 声明
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSpec {
    pub name: String,
    pub description: String,
    pub commands: Vec<CommandSpec>,
}

impl AgentSpec {
    pub fn command(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.iter().find(|c| c.name == name)
    }
}

/// 声明文件的原始形状：{name, description, functions: {cmd: {params: {p: {type, description?}}, description, prompt?}}}
#[derive(Debug, Clone, Deserialize)]
pub struct AgentDeclaration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub functions: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct FunctionDeclaration {
    #[serde(default)]
    params: Map<String, Value>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParamDeclaration {
    #[serde(rename = "type", default = "default_param_type")]
    type_name: String,
    #[serde(default)]
    description: Option<String>,
}

fn default_param_type() -> String {
    "str".to_string()
}

impl AgentDeclaration {
    /// 解析为强类型 AgentSpec；未知类型名直接报错
    pub fn into_spec(self, source: &str) -> Result<AgentSpec, RegistryError> {
        let mut commands = Vec::with_capacity(self.functions.len());
        for (command, raw) in self.functions {
            let func: FunctionDeclaration =
                serde_json::from_value(raw).map_err(|e| RegistryError::Parse {
                    path: source.to_string(),
                    message: format!("{}.{command}: {e}", self.name),
                })?;
            let mut params = Vec::with_capacity(func.params.len());
            for (param, raw) in func.params {
                // 允许简写 `symptom = "str"`
                let decl = match raw {
                    Value::String(type_name) => ParamDeclaration {
                        type_name,
                        description: None,
                    },
                    other => serde_json::from_value(other).map_err(|e| RegistryError::Parse {
                        path: source.to_string(),
                        message: format!("{}.{command}.{param}: {e}", self.name),
                    })?,
                };
                let param_type = ParamType::lookup(&decl.type_name).ok_or_else(|| {
                    RegistryError::UnknownParamType {
                        agent: self.name.clone(),
                        command: command.clone(),
                        param: param.clone(),
                        type_name: decl.type_name.clone(),
                    }
                })?;
                params.push(ParamSpec {
                    name: param,
                    param_type,
                    description: decl.description,
                });
            }
            commands.push(CommandSpec {
                name: command,
                description: func.description,
                params,
                prompt: func.prompt,
            });
        }
        Ok(AgentSpec {
            name: self.name,
            description: self.description,
            commands,
        })
    }
}

/// 能力注册表（不可变）
#[derive(Debug, Clone, Default, Serialize)]
pub struct CapabilityRegistry {
    agents: Vec<AgentSpec>,
}

impl CapabilityRegistry {
    /// 从已解析的 AgentSpec 构建；重名 Agent 视为配置错误
    pub fn from_specs(specs: Vec<AgentSpec>) -> Result<Self, RegistryError> {
        let mut agents: Vec<AgentSpec> = Vec::with_capacity(specs.len());
        for spec in specs {
            if agents.iter().any(|a| a.name == spec.name) {
                return Err(RegistryError::DuplicateAgent(spec.name));
            }
            agents.push(spec);
        }
        Ok(Self { agents })
    }

    /// 从 JSON 文本（单个声明对象或声明数组）构建，测试与内嵌声明使用
    pub fn from_json(text: &str) -> Result<Self, RegistryError> {
        let value: Value = serde_json::from_str(text).map_err(|e| RegistryError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        let decls: Vec<AgentDeclaration> = match value {
            Value::Array(_) => serde_json::from_value(value),
            other => serde_json::from_value(other).map(|d| vec![d]),
        }
        .map_err(|e| RegistryError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        let specs = decls
            .into_iter()
            .map(|d| d.into_spec("<inline>"))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_specs(specs)
    }

    pub fn agent(&self, name: &str) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn command(&self, agent: &str, command: &str) -> Option<&CommandSpec> {
        self.agent(agent)?.command(command)
    }

    pub fn contains(&self, agent: &str) -> bool {
        self.agent(agent).is_some()
    }

    pub fn agents(&self) -> &[AgentSpec] {
        &self.agents
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
