//! Beeline 命令行
//!
//! 入口：初始化日志、装配 RoutingPipeline，从标准输入逐行读取问题并打印结果；输入 `/bye` 退出。
//! 整个会话共用一个 conversation_id，前几轮问答会作为上下文参与后续路由。

use std::path::PathBuf;

use anyhow::Context;
use beeline::{observability, PipelineBuilder, RouteRequest};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let pipeline = PipelineBuilder::from_config_path(config_path)
        .context("Failed to load configuration")?
        .build()
        .context("Failed to build routing pipeline")?;

    let conversation_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conversation_id = %conversation_id, "session started");

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"\nYou: ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query == "/bye" {
            break;
        }

        let outcome = pipeline
            .route(RouteRequest::new(query).with_conversation(conversation_id.clone()))
            .await;
        let result = &outcome.result;
        let text = match (&result.data, result.success) {
            (serde_json::Value::String(s), true) => s.clone(),
            (_, true) => serde_json::to_string_pretty(&result.data)?,
            (_, false) => format!(
                "[{}] {}",
                result.agent,
                result.error.as_deref().unwrap_or("request failed")
            ),
        };
        stdout
            .write_all(format!("\n{} ({}): {}\n", result.agent, result.command, text).as_bytes())
            .await?;
    }

    stdout.write_all(b"Bye!\n").await?;
    Ok(())
}
