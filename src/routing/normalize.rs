//! 调用规范化：把形状不定的载荷转成规范三元组 {agent, command, params}
//!
//! 支持的形状：
//! - 规范三元组（可能包在一层 `response` 里）：原样接受
//! - 单键 `{agent_name: data}`：键为 Agent 名，data（或其中的 `response`）为参数，命令由注册表推断
//! - 其它：NormalizationError

use serde_json::{Map, Value};

use crate::core::{AgentCall, NormalizationError, Params};
use crate::registry::{AgentSpec, CapabilityRegistry, CommandSpec};
use crate::routing::fallback;

/// 注册表声明了但载荷缺失的参数，用此哨兵值补齐
pub const NO_VALUE: &str = "no value";

/// 未知 Agent 且无默认命令时，标量参数挂在此键下
const SCALAR_PARAM_KEY: &str = "query";

/// 载荷形状
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// 已含 agent / command / params
    CanonicalTriple(AgentCall),
    /// 单键：Agent 名 -> 参数数据
    SingleKeyWrapped { agent: String, data: Value },
    /// 无法识别（附原因）
    Unrecognized(String),
}

impl Payload {
    /// 识别形状；`response` 信封只拆一层
    pub fn classify(value: Value) -> Self {
        let value = match value {
            Value::Object(mut obj) if obj.contains_key("response") => {
                obj.remove("response").unwrap_or(Value::Null)
            }
            other => other,
        };
        let Value::Object(obj) = value else {
            return Self::Unrecognized("payload is not a mapping".to_string());
        };

        if ["agent", "command", "params"].iter().all(|k| obj.contains_key(*k)) {
            return Self::canonical(obj);
        }

        match obj.len() {
            1 => match obj.into_iter().next() {
                Some((agent, _)) if agent.trim().is_empty() => {
                    Self::Unrecognized("empty agent name".to_string())
                }
                Some((agent, data)) => Self::SingleKeyWrapped { agent, data },
                None => Self::Unrecognized("unexpected shape with 0 keys".to_string()),
            },
            len => Self::Unrecognized(format!("unexpected shape with {len} keys")),
        }
    }

    fn canonical(mut obj: Map<String, Value>) -> Self {
        let agent = match obj.remove("agent") {
            Some(Value::String(s)) if !s.trim().is_empty() => s,
            _ => return Self::Unrecognized("agent is not a non-empty string".to_string()),
        };
        let command = match obj.remove("command") {
            Some(Value::String(s)) => s,
            _ => return Self::Unrecognized("command is not a string".to_string()),
        };
        let params = match obj.remove("params") {
            Some(Value::Object(p)) => p,
            Some(Value::Null) => Params::new(),
            _ => return Self::Unrecognized("params is not a mapping".to_string()),
        };
        Self::CanonicalTriple(AgentCall::new(agent, command, params))
    }
}

/// 规范化入口
pub fn normalize(
    payload: Value,
    registry: Option<&CapabilityRegistry>,
) -> Result<AgentCall, NormalizationError> {
    match Payload::classify(payload) {
        Payload::CanonicalTriple(call) => Ok(call),
        Payload::SingleKeyWrapped { agent, data } => Ok(from_single_key(agent, data, registry)),
        Payload::Unrecognized(reason) => Err(NormalizationError::new(reason)),
    }
}

fn from_single_key(agent: String, data: Value, registry: Option<&CapabilityRegistry>) -> AgentCall {
    let data = match data {
        Value::Object(mut obj) if obj.contains_key("response") => {
            obj.remove("response").unwrap_or(Value::Null)
        }
        other => other,
    };

    match registry
        .and_then(|r| r.agent(&agent))
        .and_then(|spec| infer_command(spec, &data))
    {
        Some(command) => {
            let first_param = command.params.first().map(|p| p.name.as_str());
            let params = backfill(bind_params(data, first_param), command);
            AgentCall::new(agent, command.name.clone(), params)
        }
        None => {
            let command = fallback::default_command(&agent);
            tracing::debug!(agent = %agent, command, "agent not in registry, using fallback command");
            AgentCall::new(agent, command, bind_params(data, Some(SCALAR_PARAM_KEY)))
        }
    }
}

/// 单命令直接选中；否则取第一个参数个数与载荷一致的命令；都不匹配则取第一个声明的命令
/// 未声明任何命令的 Agent 返回 None，按未知 Agent 处理
fn infer_command<'a>(spec: &'a AgentSpec, data: &Value) -> Option<&'a CommandSpec> {
    let first = spec.commands.first()?;
    if spec.commands.len() == 1 {
        return Some(first);
    }
    let provided = data.as_object().map(Map::len);
    let matched = spec.commands.iter().find(|c| Some(c.params.len()) == provided);
    Some(matched.unwrap_or(first))
}

/// 载荷数据转参数表：对象原样使用，null 为空表，其它标量挂到 `scalar_key` 下
fn bind_params(data: Value, scalar_key: Option<&str>) -> Params {
    match data {
        Value::Object(obj) => obj,
        Value::Null => Params::new(),
        scalar => {
            let mut params = Params::new();
            if let Some(key) = scalar_key {
                params.insert(key.to_string(), scalar);
            }
            params
        }
    }
}

/// 为缺失的声明参数补哨兵值，保证调用仍可尝试
fn backfill(mut params: Params, command: &CommandSpec) -> Params {
    for name in command.param_names() {
        if !params.contains_key(name) {
            params.insert(name.to_string(), Value::String(NO_VALUE.to_string()));
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::sample_registry;
    use crate::routing::fallback::DIRECT_RESPONSE;
    use serde_json::json;

    #[test]
    fn test_canonical_payload_is_identity() {
        let registry = sample_registry();
        let payloads = [
            json!({"agent": "fitness_agent", "command": "suggest_plan", "params": {"goal": "5k"}}),
            json!({"agent": "nobody", "command": "whatever", "params": {}}),
            json!({"agent": "travel_agent", "command": "compare_trips", "params": {"origin": "Oslo", "extra": 1}}),
        ];
        for payload in payloads {
            let expected: AgentCall = serde_json::from_value(payload.clone()).unwrap();
            assert_eq!(normalize(payload, Some(&registry)).unwrap(), expected);
        }
    }

    #[test]
    fn test_single_key_known_agent_selects_command() {
        let registry = sample_registry();
        let call = normalize(json!({"healthcare_agent": {"symptom": "headache"}}), Some(&registry)).unwrap();
        assert_eq!(
            call,
            AgentCall::new(
                "healthcare_agent",
                "suggest_advice",
                json!({"symptom": "headache"}).as_object().unwrap().clone()
            )
        );
    }

    #[test]
    fn test_single_command_agent_backfills_missing_params() {
        let registry = sample_registry();
        let call = normalize(json!({"fitness_agent": {"response": {}}}), Some(&registry)).unwrap();
        assert_eq!(call.command, "suggest_plan");
        assert_eq!(call.params.get("goal"), Some(&json!(NO_VALUE)));
    }

    #[test]
    fn test_command_inferred_by_param_count() {
        let registry = sample_registry();
        let call = normalize(
            json!({"travel_agent": {"origin": "Oslo", "destination": "Rome"}}),
            Some(&registry),
        )
        .unwrap();
        assert_eq!(call.command, "compare_trips");

        // 没有参数个数匹配时取第一个命令并补齐
        let call = normalize(json!({"travel_agent": {}}), Some(&registry)).unwrap();
        assert_eq!(call.command, "suggest_itinerary");
        assert_eq!(call.params.get("destination"), Some(&json!(NO_VALUE)));
    }

    #[test]
    fn test_scalar_agent_data_binds_first_param() {
        let registry = sample_registry();
        let call = normalize(json!({"healthcare_agent": "fever"}), Some(&registry)).unwrap();
        assert_eq!(call.params.get("symptom"), Some(&json!("fever")));
    }

    #[test]
    fn test_unknown_agent_defers_to_fallback_command() {
        let registry = sample_registry();
        let call = normalize(json!({"unknown_agent_x": {"foo": "bar"}}), Some(&registry)).unwrap();
        assert_eq!(call.agent, "unknown_agent_x");
        assert_eq!(call.command, DIRECT_RESPONSE);
        assert_eq!(call.params.get("foo"), Some(&json!("bar")));

        let call = normalize(json!({"food_agent": {"diet": "vegan"}}), Some(&registry)).unwrap();
        assert_eq!(call.command, "suggest_meal");
    }

    #[test]
    fn test_without_registry_uses_fallback_table() {
        let call = normalize(json!({"fitness_agent": {"goal": "strength"}}), None).unwrap();
        assert_eq!(call.command, "suggest_plan");
    }

    #[test]
    fn test_response_envelope_unwrapped_once() {
        let registry = sample_registry();
        let call = normalize(
            json!({"response": {"agent": "fitness_agent", "command": "suggest_plan", "params": {}}}),
            Some(&registry),
        )
        .unwrap();
        assert_eq!(call.agent, "fitness_agent");
        assert!(call.params.is_empty());

        // 第二层 response 不再拆：成为单键 Agent 名 "response"
        let call = normalize(json!({"response": {"response": {"x": 1}}}), Some(&registry)).unwrap();
        assert_eq!(call.agent, "response");
    }

    #[test]
    fn test_unrecognized_shapes_fail() {
        let registry = sample_registry();
        for payload in [
            json!({}),
            json!({"agent": "fitness_agent", "goal": "x"}),
            json!({"a": 1, "b": 2, "c": 3}),
            json!(["fitness_agent"]),
            json!("fitness_agent"),
            json!({"agent": "", "command": "c", "params": {}}),
            json!({"agent": "a", "command": "c", "params": "oops"}),
        ] {
            assert!(normalize(payload.clone(), Some(&registry)).is_err(), "{payload}");
        }
    }

    #[test]
    fn test_classify_reports_key_count() {
        assert_eq!(
            Payload::classify(json!({})),
            Payload::Unrecognized("unexpected shape with 0 keys".to_string())
        );
        assert_eq!(
            Payload::classify(json!({"a": 1, "b": 2})),
            Payload::Unrecognized("unexpected shape with 2 keys".to_string())
        );
        assert_eq!(
            Payload::classify(json!({" ": {"x": 1}})),
            Payload::Unrecognized("empty agent name".to_string())
        );
        assert_eq!(
            Payload::classify(json!({"law_agent": "contract"})),
            Payload::SingleKeyWrapped {
                agent: "law_agent".to_string(),
                data: json!("contract"),
            }
        );
    }
}
