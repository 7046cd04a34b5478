//! 路由 Pipeline 集成测试：脚本化模型 + 内存上下文，端到端覆盖四个典型场景

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use beeline::agents::{Agent, AgentFault, AgentTable};
use beeline::context::{ContextLimits, ContextStore, MemoryContextStore};
use beeline::core::{AgentCall, Params, Resolution, Stage};
use beeline::llm::{LlmError, MockLlmClient};
use beeline::registry::CapabilityRegistry;
use beeline::routing::{
    extract_payload, normalize, PipelineSettings, RouteRequest, RoutingPipeline, DIRECT_RESPONSE,
};

const REGISTRY: &str = r#"[
    {"name": "healthcare_agent", "description": "Health advice",
     "functions": {"suggest_advice": {"params": {"symptom": {"type": "str"}}, "description": "Advice for a symptom"}}},
    {"name": "fitness_agent", "description": "Workout plans",
     "functions": {"suggest_plan": {"params": {"goal": {"type": "str"}}, "description": "Plan for a goal"}}},
    {"name": "finance_agent", "description": "Money questions",
     "functions": {"suggest_budget": {"params": {"query": {"type": "str"}}, "description": "Budget advice"}}}
]"#;

/// 记录收到的参数并按固定方式应答的 Agent
struct Recording {
    name: &'static str,
    reply: Value,
    seen: Mutex<Vec<Params>>,
}

impl Recording {
    fn new(name: &'static str, reply: Value) -> Arc<Self> {
        Arc::new(Self {
            name,
            reply,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<Params> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for Recording {
    fn name(&self) -> &str {
        self.name
    }

    fn supports_run_command(&self) -> bool {
        true
    }

    async fn run_command(&self, _command: &str, params: &Params) -> Result<Value, AgentFault> {
        self.seen.lock().unwrap().push(params.clone());
        Ok(self.reply.clone())
    }
}

/// 直接 panic 的 Agent（模拟实现缺陷）
struct Broken;

#[async_trait]
impl Agent for Broken {
    fn name(&self) -> &str {
        "finance_agent"
    }

    fn handles(&self, _command: &str) -> bool {
        true
    }

    async fn handle(&self, _: &str, _: &Params, _: Option<&str>) -> Result<Value, AgentFault> {
        panic!("index out of range")
    }
}

struct Harness {
    llm: Arc<MockLlmClient>,
    store: Arc<MemoryContextStore>,
    pipeline: RoutingPipeline,
}

fn harness(llm: MockLlmClient, agents: Vec<Arc<dyn Agent>>) -> Harness {
    let llm = Arc::new(llm);
    let store = Arc::new(MemoryContextStore::new(ContextLimits::default()));
    let mut table = AgentTable::new();
    for agent in agents {
        table.register_arc(agent);
    }
    let pipeline = RoutingPipeline::new(
        llm.clone(),
        Arc::new(CapabilityRegistry::from_json(REGISTRY).unwrap()),
        table,
        store.clone(),
        PipelineSettings::default(),
    );
    Harness {
        llm,
        store,
        pipeline,
    }
}

fn ok_reply(text: &str) -> Value {
    json!({"success": true, "data": text})
}

#[tokio::test]
async fn scenario_a_single_key_payload_is_routed() {
    let health = Recording::new("healthcare_agent", ok_reply("Rest in a dark room."));
    let h = harness(
        MockLlmClient::with_replies([r#"Routing to health: {"healthcare_agent":{"symptom":"headache"}}"#]),
        vec![health.clone() as Arc<dyn Agent>],
    );

    let outcome = h
        .pipeline
        .route(RouteRequest::new("I have a headache").with_conversation("conv-a"))
        .await;

    assert!(outcome.result.success);
    assert_eq!(outcome.resolution, Resolution::Routed);
    assert_eq!(outcome.result.agent, "healthcare_agent");
    assert_eq!(outcome.result.command, "suggest_advice");
    assert_eq!(health.seen(), vec![json!({"symptom": "headache"}).as_object().unwrap().clone()]);

    let context = h.store.get_formatted("general", "conv-a", true).await.unwrap();
    assert!(context.contains("User: I have a headache\n"));
    assert!(context.contains("Agent: Rest in a dark room.\n"));
}

#[tokio::test]
async fn scenario_b_missing_param_is_repaired_once_with_user_query() {
    let fitness = Recording::new("fitness_agent", ok_reply("Run three times a week."));
    let h = harness(
        MockLlmClient::with_replies([
            r#"{"response": {"agent":"fitness_agent","command":"suggest_plan","params":{}}}"#,
        ]),
        vec![fitness.clone() as Arc<dyn Agent>],
    );

    let outcome = h.pipeline.route(RouteRequest::new("help me run a 5k")).await;

    assert!(outcome.result.success);
    assert_eq!(outcome.resolution, Resolution::Repaired);
    assert_eq!(outcome.result.note.as_deref(), Some("repaired"));
    assert_eq!(fitness.seen()[0].get("goal"), Some(&json!("help me run a 5k")));
    assert_eq!(
        outcome.trace,
        vec![
            Stage::Routing,
            Stage::Extracting,
            Stage::Normalizing,
            Stage::Validating,
            Stage::Repairing,
            Stage::Validating,
            Stage::Dispatching,
            Stage::Done,
        ]
    );
    assert_eq!(h.llm.call_count(), 1);
}

#[tokio::test]
async fn scenario_c_unknown_agent_gets_general_fallback() {
    let h = harness(
        MockLlmClient::with_replies([r#"{"unknown_agent_x": {"foo":"bar"}}"#, "Here is what I know."]),
        vec![],
    );

    let outcome = h.pipeline.route(RouteRequest::new("tell me something")).await;

    assert!(outcome.result.success);
    assert_eq!(outcome.resolution, Resolution::Fallback);
    assert_eq!(outcome.result.agent, "general_fallback");
    assert_eq!(outcome.result.command, DIRECT_RESPONSE);
    assert_eq!(outcome.result.data, json!("Here is what I know."));
    let (model, prompt) = &h.llm.calls()[1];
    assert_eq!(model, "gemma3:12b-it-qat");
    assert!(prompt.contains("Agent: unknown_agent_x"));
    assert!(prompt.contains("User question: tell me something"));
}

#[tokio::test]
async fn scenario_c_unreachable_backend_yields_structured_failure() {
    let h = harness(MockLlmClient::failing(LlmError::Timeout(30)), vec![]);

    let outcome = h
        .pipeline
        .route(RouteRequest::new("tell me something").with_conversation("conv-c"))
        .await;

    assert!(!outcome.result.success);
    assert_eq!(outcome.result.agent, "general_fallback");
    assert_eq!(outcome.result.command, DIRECT_RESPONSE);
    assert!(outcome.result.error.as_deref().unwrap().contains("timed out"));
    // 用户问题照常写入，失败结果不写
    assert_eq!(h.store.len("general", "conv-c"), 1);
}

#[tokio::test]
async fn scenario_d_reported_failure_escalates_with_agent_detail() {
    let health = Recording::new(
        "healthcare_agent",
        json!({"success": false, "error": "symptom database offline"}),
    );
    let h = harness(
        MockLlmClient::with_replies([
            r#"{"agent": "healthcare_agent", "command": "suggest_advice", "params": {"symptom": "cough"}}"#,
            "Drink warm fluids.",
        ]),
        vec![health as Arc<dyn Agent>],
    );

    let outcome = h.pipeline.route(RouteRequest::new("I keep coughing")).await;

    assert!(outcome.result.success);
    assert_eq!(outcome.resolution, Resolution::Fallback);
    assert!(outcome.result.agent.ends_with("_fallback"));
    assert_eq!(outcome.result.agent, "healthcare_agent_fallback");
    assert!(outcome.trace.contains(&Stage::Dispatching));
    assert!(h.llm.calls()[1].1.contains("symptom database offline"));
}

#[tokio::test]
async fn panicking_agent_never_escapes_the_pipeline() {
    let h = harness(
        MockLlmClient::with_replies([
            r#"{"agent": "finance_agent", "command": "suggest_budget", "params": {"query": "rent"}}"#,
        ]),
        vec![Arc::new(Broken)],
    );

    let outcome = h.pipeline.route(RouteRequest::new("how much rent can I afford")).await;

    assert_eq!(outcome.result.agent, "finance_agent_fallback");
    assert_eq!(outcome.result.command, DIRECT_RESPONSE);
    assert_eq!(outcome.trace.last(), Some(&Stage::Done));
}

#[tokio::test]
async fn registered_agent_missing_from_table_is_reported() {
    let h = harness(
        MockLlmClient::with_replies([r#"{"fitness_agent": {"goal": "strength"}}"#]),
        vec![],
    );

    let outcome = h.pipeline.route(RouteRequest::new("get stronger")).await;

    assert_eq!(outcome.resolution, Resolution::AgentMissing);
    assert_eq!(outcome.result.error.as_deref(), Some("Agent not found"));
    assert_eq!(h.llm.call_count(), 1);
}

#[test]
fn well_formed_triples_survive_prose_round_trip() {
    let registry = CapabilityRegistry::from_json(REGISTRY).unwrap();
    let triples = [
        AgentCall::new(
            "healthcare_agent",
            "suggest_advice",
            json!({"symptom": "sore throat"}).as_object().unwrap().clone(),
        ),
        AgentCall::new(
            "fitness_agent",
            "suggest_plan",
            json!({"goal": "marathon", "weeks": 16, "nested": {"a": [1, 2]}})
                .as_object()
                .unwrap()
                .clone(),
        ),
        AgentCall::new("finance_agent", "suggest_budget", Params::new()),
    ];
    for triple in triples {
        let text = format!(
            "Let me think about this.\n```json\n{}\n```\nThat should work.",
            serde_json::to_string(&triple).unwrap()
        );
        let payload = extract_payload(&text).unwrap();
        assert_eq!(normalize(payload, Some(&registry)).unwrap(), triple);
    }
}
