//! HTTP 接口（axum，feature `web`）
//!
//! - `POST /ask`：路由一次自由文本请求
//! - `POST /tools/:agent/run`：跳过路由，直接校验并执行一次 Agent 调用
//! - `GET /context/:topic?conversation_id=`：格式化后的会话上下文
//! - `GET /agents`：能力注册表
//! - `GET /health`：后端 / 数据库 / Agent 状态
//!
//! 客户端断开时 /ask 的请求被取消，不写入任何上下文。

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::core::{AgentCall, AgentResult, Params, Resolution};
use crate::registry::AgentSpec;
use crate::routing::{check, validate::type_mismatches, RouteRequest, RoutingPipeline};

/// 共享状态
pub struct AppState {
    pub pipeline: Arc<RoutingPipeline>,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub user_query: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub response: AgentResult,
    pub conversation_id: String,
    pub topic: String,
    pub resolution: Resolution,
}

#[derive(Debug, Deserialize)]
pub struct ToolRunRequest {
    pub command: String,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    pub conversation_id: Option<String>,
}

type ApiError = (StatusCode, String);

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ask", post(ask))
        .route("/tools/:agent/run", post(run_tool))
        .route("/context/:topic", get(get_context))
        .route("/agents", get(list_agents))
        .route("/health", get(health))
        .with_state(state)
}

async fn ask(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let query = req.user_query.trim();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "user_query is required".to_string()));
    }
    let mut request = RouteRequest::new(query);
    request.conversation_id = req.conversation_id.filter(|s| !s.is_empty());
    request.topic = req.topic.filter(|s| !s.is_empty());

    // 处理器被丢弃（客户端断开）时 guard 触发取消
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let pipeline = Arc::clone(&state.pipeline);
    let task = tokio::spawn(async move { pipeline.route_cancellable(request, cancel).await });

    match task.await {
        Ok(Some(outcome)) => Ok(Json(AskResponse {
            response: outcome.result,
            conversation_id: outcome.conversation_id,
            topic: outcome.topic,
            resolution: outcome.resolution,
        })),
        Ok(None) => Err((StatusCode::SERVICE_UNAVAILABLE, "request cancelled".to_string())),
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

async fn run_tool(
    State(state): State<Arc<AppState>>,
    Path(agent): Path<String>,
    Json(req): Json<ToolRunRequest>,
) -> (StatusCode, Json<AgentResult>) {
    tracing::info!(agent = %agent, command = %req.command, "running agent tool");
    let call = AgentCall::new(agent, req.command, req.params);
    let registry = state.pipeline.registry();
    if let Err(failure) = check(&call, registry) {
        let result = AgentResult::failure(&call.agent, &call.command, failure.to_string());
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(result));
    }
    let mismatches = type_mismatches(&call, registry);
    if !mismatches.is_empty() {
        let error = format!("invalid parameter types: {}", mismatches.join(", "));
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(AgentResult::failure(&call.agent, &call.command, error)),
        );
    }

    let query = Value::Object(call.params.clone()).to_string();
    let context = req.context.unwrap_or_default();
    let dispatched = state
        .pipeline
        .dispatcher()
        .dispatch(&call, Some(&context), &query)
        .await;
    (StatusCode::OK, Json(dispatched.result))
}

async fn get_context(
    State(state): State<Arc<AppState>>,
    Path(topic): Path<String>,
    Query(q): Query<ContextQuery>,
) -> Result<Json<Value>, ApiError> {
    let conversation_id = q
        .conversation_id
        .filter(|s| !s.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "conversation_id is required".to_string()))?;
    let store = state.pipeline.context_store();
    let exclude = state.pipeline.settings().exclude_main_model;
    let internal = |e: crate::core::ContextError| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    let context = store
        .get_formatted(&topic, &conversation_id, exclude)
        .await
        .map_err(internal)?;
    let last_user_query = store
        .last_user_query(&topic, &conversation_id)
        .await
        .map_err(internal)?;
    Ok(Json(json!({
        "topic": topic,
        "conversation_id": conversation_id,
        "context": context,
        "last_user_query": last_user_query,
    })))
}

async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<AgentSpec>> {
    Json(state.pipeline.registry().agents().to_vec())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let pipeline = &state.pipeline;
    let mut components = serde_json::Map::new();

    let start = Instant::now();
    let backend_ok = match pipeline
        .llm()
        .complete(&pipeline.settings().routing_model, "test")
        .await
    {
        Ok(_) => {
            components.insert(
                pipeline.llm().backend_name().to_string(),
                json!({"status": "healthy", "response_time_ms": start.elapsed().as_millis() as u64}),
            );
            true
        }
        Err(e) => {
            components.insert(
                pipeline.llm().backend_name().to_string(),
                json!({"status": "unhealthy", "error": e.to_string()}),
            );
            false
        }
    };

    let database_ok = match pipeline.context_store().ping().await {
        Ok(()) => {
            components.insert("database".into(), json!({"status": "healthy"}));
            true
        }
        Err(e) => {
            components.insert("database".into(), json!({"status": "unhealthy", "error": e.to_string()}));
            false
        }
    };

    let mut agents_ok = true;
    for name in pipeline.registry().agent_names() {
        let loaded = pipeline.dispatcher().agents().contains(&name);
        agents_ok &= loaded;
        let status = if loaded { "healthy" } else { "unhealthy" };
        components.insert(name, json!({"status": status, "registered": loaded}));
    }

    let overall = if !backend_ok || !database_ok {
        "unhealthy"
    } else if !agents_ok {
        "degraded"
    } else {
        "healthy"
    };
    Json(json!({
        "timestamp": chrono::Local::now().to_rfc3339(),
        "overall_status": overall,
        "components": components,
    }))
}
