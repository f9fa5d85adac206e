//! Concierge - Rust 客服编排与工具执行网关
//!
//! 入口：初始化日志与编排器，逐行读取标准输入，每行作为一轮用户消息，结果以 JSON 输出。
//!
//! 用法：`concierge [user_id] [session_id] [--events]`
//! - user_id 默认 user_123
//! - 配置了 app.state_dir 时按 session_id 恢复 / 保存会话
//! - --events 把过程事件（意图、工具调用、观察……）逐条写到 stderr

use anyhow::Context;
use concierge::core::create_orchestrator_builder;
use concierge::react::TurnEvent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

fn short_id(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &id[..12])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    concierge::observability::init("info");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let show_events = args.iter().any(|a| a == "--events");
    let mut positional = args.into_iter().filter(|a| !a.starts_with("--"));
    let user_id = positional.next().unwrap_or_else(|| "user_123".to_string());
    let session_id = positional.next().unwrap_or_else(|| short_id("sess"));

    let orchestrator = create_orchestrator_builder(None).build();
    tracing::info!(user_id = %user_id, session_id = %session_id, "Concierge ready, reading messages from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == "/quit" || message == "/exit" {
            break;
        }

        let request_id = short_id("req");
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<TurnEvent>();
        let outcome = orchestrator
            .run_session_turn(
                &session_id,
                &user_id,
                &request_id,
                message,
                show_events.then_some(&event_tx),
            )
            .await;
        drop(event_tx);

        while let Ok(ev) = event_rx.try_recv() {
            eprintln!(
                "{}",
                serde_json::to_string(&ev).context("Failed to serialize event")?
            );
        }
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?
        );
    }

    Ok(())
}
