//! Jarvis 命令行入口
//!
//! 初始化日志与配置、构建编排器，然后逐行读取 stdin，把每轮的回答流式打印出来。
//! 第一个参数作为 thread id（缺省时随机生成），同一 thread 的多轮共享记忆。

use std::sync::Arc;

use anyhow::Context;
use futures_util::StreamExt;
use jarvis::config::{load_config, AppConfig};
use jarvis::{observability, OrchestratorBuilder};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let dry_run = cfg.tools.dry_run;
    let orchestrator = Arc::new(
        OrchestratorBuilder::new(cfg)
            .build()
            .context("Failed to build orchestrator")?,
    );

    let thread_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut stdout = tokio::io::stdout();
    if dry_run {
        stdout
            .write_all(b"*** DRY RUN: tools return mock data ***\n")
            .await?;
    }
    stdout
        .write_all(format!("Jarvis ready (thread {thread_id}). Type a request, Ctrl-D to quit.\n").as_bytes())
        .await?;
    stdout.flush().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut stream = Box::pin(orchestrator.interact(line.to_string(), thread_id.clone()));
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) if chunk.is_end() => break,
                Ok(chunk) => {
                    if let Some(answer) = chunk.answer {
                        stdout.write_all(format!("{answer}\n").as_bytes()).await?;
                    }
                    if chunk.metadata.is_some_and(|m| m.requires_user_input) {
                        stdout.write_all(b"(waiting for your input)\n").await?;
                    }
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    stdout.write_all(format!("Error: {e}\n").as_bytes()).await?;
                }
            }
            stdout.flush().await?;
        }
    }
    Ok(())
}
