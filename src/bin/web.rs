//! Beeline HTTP 服务
//!
//! 启动: cargo run --bin beeline-web --features web
//! 默认监听 127.0.0.1:8000（`[server].bind` 或 `BEELINE__SERVER__BIND` 覆盖）

#![cfg(feature = "web")]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use beeline::{
    observability,
    server::{router, AppState},
    PipelineBuilder,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let builder =
        PipelineBuilder::from_config_path(config_path).context("Failed to load configuration")?;
    let bind = builder.config().server.bind.clone();
    let pipeline = builder.build().context("Failed to build routing pipeline")?;

    let state = Arc::new(AppState {
        pipeline: Arc::new(pipeline),
    });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    tracing::info!("Beeline web listening on http://{bind}");
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
