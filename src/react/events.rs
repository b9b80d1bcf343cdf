//! 引擎过程事件：宿主界面的单向输出
//!
//! 引擎只往 HostSink 推事件，不消费任何返回值。TracingSink 写日志，ChannelSink 转发给 UI / SSE。

use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::AgentStage;
use crate::react::InteractionKind;
use crate::tools::ToolErrorCode;

/// 单个过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    StageChanged { stage: AgentStage },
    /// Planner 的内部推理
    Thinking { text: String },
    /// 给用户看的叙述或回复
    Message { text: String },
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation { tool: String, preview: String },
    ToolFailure {
        tool: String,
        code: ToolErrorCode,
        reason: String,
    },
    /// 重复调用被跳过
    ToolSkipped { tool: String },
    InteractionRequested {
        kind: InteractionKind,
        message: String,
        options: Vec<String>,
    },
    /// 多步计划进度
    PlanProgress { specialist: String, detail: String },
    Error { text: String, hint: String },
}

/// 宿主输出端
pub trait HostSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// 只写日志的输出端
#[derive(Debug, Default)]
pub struct TracingSink;

impl HostSink for TracingSink {
    fn emit(&self, event: EngineEvent) {
        match &event {
            EngineEvent::Error { text, .. } => tracing::error!("{}", text),
            EngineEvent::ToolFailure { tool, reason, .. } => {
                tracing::warn!(tool = %tool, "tool failed: {}", reason)
            }
            EngineEvent::Message { text } => tracing::info!("{}", text),
            other => tracing::debug!(event = ?other, "engine event"),
        }
    }
}

/// 通过无界 mpsc 转发事件；接收端关闭后静默丢弃
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl HostSink for ChannelSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let v = serde_json::to_value(EngineEvent::StageChanged {
            stage: AgentStage::AwaitingUser,
        })
        .unwrap();
        assert_eq!(v["type"], "stage_changed");
        assert_eq!(v["stage"], "awaiting_user");
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_and_survives_closed_receiver() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.emit(EngineEvent::Message { text: "hi".into() });
        assert_eq!(
            rx.recv().await,
            Some(EngineEvent::Message { text: "hi".into() })
        );
        drop(rx);
        sink.emit(EngineEvent::Message { text: "ignored".into() });
    }
}
