//! Quill - Rust 写作编排引擎
//!
//! 入口：加载配置、初始化日志、构建引擎，运行一个最小的命令行对话循环。
//! 输入任务文本开始新任务；引擎等待回答时输入即作为回答。`/status` 查看状态，`/cancel` 取消，`/quit` 退出。
//! 任务运行中按 Ctrl+C 取消当前任务。

use std::sync::Arc;

use anyhow::Context;
use quill::config::load_config;
use quill::core::{AgentStage, EngineBuilder};
use quill::observability;
use quill::react::{ChannelSink, EngineEvent};
use tokio::io::{AsyncBufReadExt, BufReader};

fn print_event(event: &EngineEvent) {
    match event {
        EngineEvent::StageChanged { stage } => println!("  [stage] {}", stage),
        EngineEvent::Thinking { text } => println!("  [think] {}", text),
        EngineEvent::Message { text } => println!("{}", text),
        EngineEvent::ToolCall { tool, args } => println!("  [tool] {} {}", tool, args),
        EngineEvent::Observation { tool, preview } => println!("  [{}] {}", tool, preview),
        EngineEvent::ToolFailure { tool, code, reason } => {
            println!("  [{} failed: {}] {}", tool, code.as_str(), reason)
        }
        EngineEvent::ToolSkipped { tool } => println!("  [{}] skipped (duplicate)", tool),
        EngineEvent::InteractionRequested { message, .. } => println!("? {}", message),
        EngineEvent::PlanProgress { specialist, detail } => {
            println!("  [{}] {}", specialist, detail)
        }
        EngineEvent::Error { text, hint } => println!("! {}\n  {}", text, hint),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config(None).context("Failed to load config")?;
    observability::init(&config.app.log_filter);

    let (sink, mut events) = ChannelSink::channel();
    let mut engine = EngineBuilder::new(config)
        .with_system_prompt_from_file()
        .with_sink(Arc::new(sink))
        .build()
        .context("Failed to build engine")?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let supervisor = engine.cancel_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received, cancelling current task");
            supervisor.cancel();
        }
    });

    println!("Quill ready. /status, /cancel, /quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match input {
            "/quit" | "/exit" => break,
            "/status" => {
                let status = engine.status();
                println!(
                    "stage={} turn={} iteration={}/{} history={}",
                    status.stage,
                    status.turn,
                    status.iteration,
                    status.max_iterations,
                    status.history_len
                );
                continue;
            }
            "/cancel" => {
                engine.cancel().await;
                continue;
            }
            _ => {}
        }

        let result = if engine.stage() == AgentStage::AwaitingUser {
            engine.submit_user_answer(input).await
        } else {
            engine.run_task(input).await
        };
        match result {
            Ok(stage) => tracing::debug!(%stage, "engine idle"),
            Err(e) => println!("! {}\n  {}", e, e.next_action_hint()),
        }
    }
    Ok(())
}
