//! 执行历史的唯一写入口
//!
//! 所有事件都经 `record_execution` 写入 ExecutionHistory（轮次编号在那里推导），
//! 其中业务上重要的一部分（用户交互、专家调用、里程碑）再旁路同步到会话存储。
//! 旁路失败只记日志。

use std::sync::Arc;

use serde_json::json;

use crate::memory::{ExecutionHistory, ExecutionStep, StepKind, StepRecord};
use crate::session::{log_best_effort, LogEntry, LogEntryKind, SessionStore};

pub struct ExecutionRecorder {
    store: Arc<dyn SessionStore>,
    specialist_tool: String,
}

impl ExecutionRecorder {
    pub fn new(store: Arc<dyn SessionStore>, specialist_tool: impl Into<String>) -> Self {
        Self {
            store,
            specialist_tool: specialist_tool.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// 决定是否同步到会话存储
    fn audit_kind(&self, record: &StepRecord) -> Option<LogEntryKind> {
        if record.audit.is_some() {
            return record.audit;
        }
        match record.step_kind() {
            StepKind::UserInteraction => Some(LogEntryKind::UserInteraction),
            StepKind::PlanExecution => Some(LogEntryKind::PlanExecution),
            StepKind::ForcedResponse => Some(LogEntryKind::Milestone),
            StepKind::ToolCall if record.tool_name.as_deref() == Some(self.specialist_tool.as_str()) => {
                Some(LogEntryKind::SpecialistInvocation)
            }
            _ if record.milestone => Some(LogEntryKind::Milestone),
            _ => None,
        }
    }

    /// 追加一条记录，返回写入后的副本
    pub async fn record_execution(
        &self,
        history: &mut ExecutionHistory,
        record: StepRecord,
    ) -> ExecutionStep {
        let audit = self.audit_kind(&record);
        let step = history.push(record).clone();
        tracing::debug!(
            kind = ?step.kind,
            turn = step.iteration,
            tool = step.tool_name.as_deref().unwrap_or(""),
            "history step"
        );

        if let Some(kind) = audit {
            let entry = LogEntry::new(kind, step.content.clone()).with_data(json!({
                "turn": step.iteration,
                "tool": step.tool_name,
                "success": step.success,
                "duration_ms": step.duration_ms,
                "error_code": step.error_code,
                "retry_count": step.retry_count,
                "args": step.args,
            }));
            log_best_effort(&self.store, entry).await;
        }
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{InMemorySessionStore, SessionError, SessionSnapshot};
    use async_trait::async_trait;

    fn recorder() -> (ExecutionRecorder, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::default());
        (ExecutionRecorder::new(store.clone(), "invoke_specialist"), store)
    }

    #[tokio::test]
    async fn test_only_significant_events_forwarded() {
        let (rec, store) = recorder();
        let mut h = ExecutionHistory::new();
        rec.record_execution(&mut h, StepRecord::turn_start("write intro")).await;
        rec.record_execution(&mut h, StepRecord::new(StepKind::Thought, "hmm")).await;
        rec.record_execution(
            &mut h,
            StepRecord::new(StepKind::ToolCall, "search")
                .tool("search", serde_json::json!({}))
                .outcome(true, None),
        )
        .await;
        rec.record_execution(
            &mut h,
            StepRecord::new(StepKind::ToolCall, "specialist")
                .tool("invoke_specialist", serde_json::json!({}))
                .outcome(true, None),
        )
        .await;
        rec.record_execution(&mut h, StepRecord::new(StepKind::System, "plan saved").milestone())
            .await;

        assert_eq!(h.len(), 5);
        let kinds: Vec<LogEntryKind> = store.entries().await.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LogEntryKind::UserInteraction,
                LogEntryKind::SpecialistInvocation,
                LogEntryKind::Milestone
            ]
        );
    }

    struct FailingStore;

    #[async_trait]
    impl SessionStore for FailingStore {
        async fn current_session(&self) -> Result<SessionSnapshot, SessionError> {
            Err(SessionError::Unavailable("offline".into()))
        }

        async fn update_with_log_entry(&self, _entry: LogEntry) -> Result<(), SessionError> {
            Err(SessionError::Unavailable("offline".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_does_not_block_history() {
        let rec = ExecutionRecorder::new(Arc::new(FailingStore), "invoke_specialist");
        let mut h = ExecutionHistory::new();
        let step = rec
            .record_execution(&mut h, StepRecord::turn_start("hello"))
            .await;
        assert_eq!(step.iteration, 1);
        assert_eq!(h.len(), 1);
    }
}
