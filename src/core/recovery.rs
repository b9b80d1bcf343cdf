//! 计划中断恢复
//!
//! 多步计划中途失败时先分类：结构化失败码优先；没有失败码时按有序的主动失败规则表匹配错误文本，
//! 命中即为主动失败（直接 error），其余一律视为被动中断（包括空文本和从未见过的错误），
//! 保存 PlanInterruptionState 并让用户在「继续执行计划 / 结束计划」之间选择。

use chrono::Utc;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde_json::json;

use crate::config::RecoverySection;
use crate::core::{AgentError, AgentStage};
use crate::memory::{StepKind, StepRecord};
use crate::plan::{ExecutionPlan, PlanFailure, PlanInterruptionState};
use crate::react::{DispatchContext, EngineEvent, InteractionRequest};
use crate::session::{log_best_effort, LogEntry, LogEntryKind};

/// 中断类别
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionKind {
    /// 瞬时 / 基础设施故障，可恢复
    Passive,
    /// 业务或校验错误，不提供恢复
    Active,
}

#[derive(Debug, Clone)]
struct FailureRule {
    pattern: String,
    regex: Regex,
}

/// 主动失败规则表（有序、带版本）
#[derive(Debug, Clone)]
pub struct InterruptionClassifier {
    version: u32,
    rules: Vec<FailureRule>,
}

impl InterruptionClassifier {
    /// 编译 [recovery] 段的规则；任何一条无法编译都是配置错误
    pub fn from_config(cfg: &RecoverySection) -> Result<Self, AgentError> {
        let rules = cfg
            .active_patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|regex| FailureRule {
                        pattern: pattern.clone(),
                        regex,
                    })
                    .map_err(|e| AgentError::InvalidRule {
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            version: cfg.rules_version,
            rules,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// 第一条命中的规则
    pub fn matching_rule(&self, text: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|r| r.regex.is_match(text))
            .map(|r| r.pattern.as_str())
    }

    /// 按错误文本分类；空文本或 None 为被动
    pub fn classify_text(&self, error: Option<&str>) -> InterruptionKind {
        match error.map(str::trim).filter(|e| !e.is_empty()) {
            Some(text) if self.matching_rule(text).is_some() => InterruptionKind::Active,
            _ => InterruptionKind::Passive,
        }
    }

    pub fn classify(&self, failure: &PlanFailure) -> InterruptionKind {
        let kind = match failure.code {
            Some(code) if code.is_recoverable() => InterruptionKind::Passive,
            Some(_) => InterruptionKind::Active,
            None => self.classify_text(failure.error.as_deref()),
        };
        tracing::debug!(
            rules_version = self.version,
            code = ?failure.code,
            ?kind,
            "plan failure classified"
        );
        kind
    }
}

impl Default for InterruptionClassifier {
    fn default() -> Self {
        // 内置规则均为合法正则
        Self::from_config(&RecoverySection::default()).unwrap_or(Self {
            version: 0,
            rules: Vec::new(),
        })
    }
}

/// 计划中断 / 恢复管理
#[derive(Debug, Clone, Default)]
pub struct PlanRecoveryManager {
    classifier: InterruptionClassifier,
}

impl PlanRecoveryManager {
    pub fn new(classifier: InterruptionClassifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &InterruptionClassifier {
        &self.classifier
    }

    pub fn snapshot(
        plan: &ExecutionPlan,
        failure: &PlanFailure,
        session_snapshot: &str,
        original_input: &str,
    ) -> PlanInterruptionState {
        PlanInterruptionState {
            plan_id: plan.id.clone(),
            plan_description: plan.description.clone(),
            plan: plan.clone(),
            failed_step: failure.failed_step,
            completed: failure.completed.clone(),
            session_snapshot: session_snapshot.to_string(),
            original_input: original_input.to_string(),
            interruption_reason: failure
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
            timestamp: Utc::now(),
            can_resume: true,
        }
    }

    /// 处理计划失败：被动中断挂起等待选择，主动失败进入 error
    pub async fn handle_failure(
        &self,
        ctx: &mut DispatchContext<'_>,
        plan: &ExecutionPlan,
        failure: &PlanFailure,
        session_snapshot: &str,
        original_input: &str,
    ) -> InterruptionKind {
        let reason = failure.error.as_deref().unwrap_or("unknown error");
        let kind = self.classifier.classify(failure);

        match kind {
            InterruptionKind::Active => {
                tracing::error!(step = failure.failed_step, "plan failed: {}", reason);
                ctx.record(
                    StepRecord::new(
                        StepKind::System,
                        format!(
                            "计划「{}」在第 {} 步失败：{}",
                            plan.description, failure.failed_step, reason
                        ),
                    )
                    .outcome(false, Some(json!(reason)))
                    .milestone(),
                )
                .await;
                ctx.sink.emit(EngineEvent::Error {
                    text: format!("计划在第 {} 步失败：{}", failure.failed_step, reason),
                    hint: "请检查任务要求后重新开始该任务。".to_string(),
                });
                ctx.state.plan_interruption = None;
                ctx.state.stage = AgentStage::Error;
            }
            InterruptionKind::Passive => {
                tracing::warn!(step = failure.failed_step, "plan interrupted: {}", reason);
                let interruption = Self::snapshot(plan, failure, session_snapshot, original_input);
                let data = serde_json::to_value(&interruption).unwrap_or_default();
                log_best_effort(
                    ctx.recorder.store(),
                    LogEntry::new(LogEntryKind::PlanInterrupted, reason).with_data(data),
                )
                .await;
                let message = format!(
                    "计划「{}」在第 {}/{} 步中断（{}），已完成 {} 步。要继续执行计划吗？",
                    plan.description,
                    failure.failed_step,
                    plan.len(),
                    reason,
                    interruption.completed.len()
                );
                ctx.record(
                    StepRecord::new(StepKind::System, format!("计划中断：{}", reason))
                        .outcome(false, Some(json!(reason))),
                )
                .await;
                ctx.state.plan_interruption = Some(interruption);
                ctx.suspend(InteractionRequest::plan_recovery(message)).await;
            }
        }
        kind
    }

    /// 用户选择结束计划
    pub async fn terminate(&self, ctx: &mut DispatchContext<'_>) {
        let Some(interruption) = ctx.state.plan_interruption.take() else {
            ctx.state.stage = AgentStage::Completed;
            return;
        };
        let completed = interruption.completed.len();
        log_best_effort(
            ctx.recorder.store(),
            LogEntry::new(
                LogEntryKind::PlanTerminated,
                format!("plan '{}' terminated by user", interruption.plan_description),
            )
            .with_data(json!({
                "plan_id": interruption.plan_id,
                "failed_step": interruption.failed_step,
                "completed_steps": completed,
            })),
        )
        .await;
        let text = format!(
            "已结束计划「{}」，保留已完成的 {} 步。",
            interruption.plan_description, completed
        );
        ctx.record(StepRecord::new(StepKind::System, text.clone())).await;
        ctx.sink.emit(EngineEvent::Message { text });
        ctx.state.stage = AgentStage::Completed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentState;
    use crate::memory::ExecutionRecorder;
    use crate::plan::{FailureCode, StepResults};
    use crate::react::{InteractionKind, TracingSink};
    use crate::session::InMemorySessionStore;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn classifier() -> InterruptionClassifier {
        InterruptionClassifier::from_config(&RecoverySection::default()).unwrap()
    }

    #[test]
    fn test_unmatched_and_empty_text_is_passive() {
        let c = classifier();
        for text in [
            "network error",
            "connection reset by peer",
            "HTTP 503 upstream unavailable",
            "something nobody has seen before",
        ] {
            assert_eq!(c.classify_text(Some(text)), InterruptionKind::Passive, "{text}");
        }
        assert_eq!(c.classify_text(Some("   ")), InterruptionKind::Passive);
        assert_eq!(c.classify_text(None), InterruptionKind::Passive);
    }

    #[test]
    fn test_active_patterns_match_case_insensitively() {
        let c = classifier();
        for text in [
            "Business rule violated: chapter limit",
            "Missing required parameter 'title'",
            "Permission denied for /book",
            "User declined the edit",
            "Invalid specialist output: not JSON",
            "ENOENT: no such file or directory",
        ] {
            assert_eq!(c.classify_text(Some(text)), InterruptionKind::Active, "{text}");
        }
    }

    #[test]
    fn test_failure_code_takes_precedence() {
        let c = classifier();
        let f = PlanFailure::new("permission denied", 2).with_code(FailureCode::Transient);
        assert_eq!(c.classify(&f), InterruptionKind::Passive);
        let f = PlanFailure::new("network error", 2).with_code(FailureCode::BusinessRule);
        assert_eq!(c.classify(&f), InterruptionKind::Active);
    }

    #[test]
    fn test_invalid_rule_is_config_error() {
        let cfg = RecoverySection {
            rules_version: 2,
            active_patterns: vec!["(unclosed".into()],
        };
        let err = InterruptionClassifier::from_config(&cfg).unwrap_err();
        assert!(matches!(err, AgentError::InvalidRule { .. }));
    }

    #[tokio::test]
    async fn test_passive_failure_offers_two_choices_and_persists() {
        let store = Arc::new(InMemorySessionStore::default());
        let recorder = ExecutionRecorder::new(store.clone(), "invoke_specialist");
        let mut state = AgentState::new(20);
        let cancel = CancellationToken::new();
        let plan = ExecutionPlan::new(
            "book",
            (1..=4)
                .map(|i| ("writer".to_string(), format!("chapter {i}"), json!({})))
                .collect(),
        );
        let mut completed = StepResults::new();
        completed.insert(1, json!("chapter 1 text"));
        let failure = PlanFailure::new("network error", 2).with_completed(completed);

        let mut ctx = DispatchContext {
            state: &mut state,
            recorder: &recorder,
            sink: &TracingSink,
            cancel: &cancel,
        };
        let manager = PlanRecoveryManager::default();
        let kind = manager
            .handle_failure(&mut ctx, &plan, &failure, "{}", "write a book")
            .await;

        assert_eq!(kind, InterruptionKind::Passive);
        assert_eq!(state.stage, AgentStage::AwaitingUser);
        let pending = state.pending_interaction.clone().unwrap();
        assert_eq!(pending.kind, InteractionKind::Choice);
        assert_eq!(pending.options.len(), 2);
        let interruption = state.plan_interruption.clone().unwrap();
        assert_eq!(interruption.failed_step, 2);
        assert!(interruption.can_resume);
        assert!(interruption.completed.contains_key(&1));
        assert!(store
            .entries()
            .await
            .iter()
            .any(|e| e.kind == LogEntryKind::PlanInterrupted));
    }

    #[tokio::test]
    async fn test_terminate_completes_and_logs() {
        let store = Arc::new(InMemorySessionStore::default());
        let recorder = ExecutionRecorder::new(store.clone(), "invoke_specialist");
        let mut state = AgentState::new(20);
        let plan = ExecutionPlan::new("doc", vec![("w".into(), "a".into(), json!({}))]);
        state.plan_interruption = Some(PlanRecoveryManager::snapshot(
            &plan,
            &PlanFailure::new("timeout", 1),
            "{}",
            "x",
        ));
        let cancel = CancellationToken::new();
        let mut ctx = DispatchContext {
            state: &mut state,
            recorder: &recorder,
            sink: &TracingSink,
            cancel: &cancel,
        };
        PlanRecoveryManager::default().terminate(&mut ctx).await;
        assert_eq!(state.stage, AgentStage::Completed);
        assert!(state.plan_interruption.is_none());
        let entries = store.entries().await;
        assert_eq!(entries.last().map(|e| e.kind), Some(LogEntryKind::PlanTerminated));
        assert_eq!(entries.last().unwrap().data["completed_steps"], 0);
    }
}
