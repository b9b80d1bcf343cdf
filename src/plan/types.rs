//! 多步计划与可恢复续传对象
//!
//! ResumeContext（专家级暂停，继续同一步）与 PlanInterruptionState（计划级中断，可能重跑失败步）
//! 都是显式可序列化的续传对象，而不是挂起的调用栈；持久化它们即可在重启后恢复。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 计划中的一步：交给某个专家完成
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// 从 1 开始编号
    pub number: usize,
    pub specialist: String,
    pub description: String,
    #[serde(default)]
    pub input: Value,
}

/// 有名步骤组成的多步执行计划
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: String,
    pub description: String,
    pub steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    /// 新建计划，步骤按顺序编号
    pub fn new(description: impl Into<String>, steps: Vec<(String, String, Value)>) -> Self {
        let steps = steps
            .into_iter()
            .enumerate()
            .map(|(i, (specialist, description, input))| PlanStep {
                number: i + 1,
                specialist,
                description,
                input,
            })
            .collect();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            description: description.into(),
            steps,
        }
    }

    pub fn step(&self, number: usize) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.number == number)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// 步骤编号 -> 该步结果
pub type StepResults = BTreeMap<usize, Value>;

/// PlanRunner 给出的结构化失败码；存在时优先于文本分类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    Transient,
    BusinessRule,
    InvalidArguments,
    Permission,
    Configuration,
    UserDeclined,
    MalformedOutput,
    Filesystem,
}

impl FailureCode {
    /// 只有瞬时故障可恢复
    pub fn is_recoverable(self) -> bool {
        matches!(self, FailureCode::Transient)
    }
}

/// 多步计划中途失败
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanFailure {
    pub error: Option<String>,
    #[serde(default)]
    pub code: Option<FailureCode>,
    pub failed_step: usize,
    /// 运行器进度记录中已完成的步骤结果
    #[serde(default)]
    pub completed: StepResults,
}

impl PlanFailure {
    pub fn new(error: impl Into<String>, failed_step: usize) -> Self {
        Self {
            error: Some(error.into()),
            code: None,
            failed_step,
            completed: StepResults::new(),
        }
    }

    pub fn with_code(mut self, code: FailureCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_completed(mut self, completed: StepResults) -> Self {
        self.completed = completed;
        self
    }
}

/// PlanRunner 的运行结果
#[derive(Clone, Debug, PartialEq)]
pub enum PlanOutcome {
    Completed { summary: String },
    Failed(PlanFailure),
    /// 专家需要用户回答后才能继续同一步
    InteractionRequired {
        question: String,
        resume: ResumeContext,
    },
}

/// 专家内部循环快照
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecialistSnapshot {
    pub specialist_id: String,
    pub iteration: usize,
    /// 有界的内部历史
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default)]
    pub looping: bool,
}

impl SpecialistSnapshot {
    pub const MAX_HISTORY: usize = 20;

    /// 追加内部历史并保持上限
    pub fn push_history(&mut self, entry: impl Into<String>) {
        self.history.push(entry.into());
        if self.history.len() > Self::MAX_HISTORY {
            let drop = self.history.len() - Self::MAX_HISTORY;
            self.history.drain(..drop);
        }
    }
}

/// 计划运行器快照：重新进入被暂停的专家及其外层运行器所需的全部信息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanRunnerSnapshot {
    pub plan: ExecutionPlan,
    pub current_step: usize,
    #[serde(default)]
    pub step_results: StepResults,
    /// 序列化后的会话快照
    pub session_snapshot: String,
    pub original_input: String,
    pub specialist: SpecialistSnapshot,
}

/// 续传提示
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeHints {
    #[serde(default)]
    pub guidance: Vec<String>,
    /// 专家再次暂停时的最新内部状态
    #[serde(default)]
    pub latest_specialist: Option<SpecialistSnapshot>,
}

/// 专家级暂停的续传上下文
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResumeContext {
    pub plan_runner: Option<PlanRunnerSnapshot>,
    /// 导致暂停的问题
    pub question: String,
    /// 用户对该问题的回答（恢复时填入）
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub hints: ResumeHints,
}

impl ResumeContext {
    pub fn new(question: impl Into<String>, plan_runner: Option<PlanRunnerSnapshot>) -> Self {
        Self {
            plan_runner,
            question: question.into(),
            answer: None,
            hints: ResumeHints::default(),
        }
    }

    /// 将专家新给出的续传信息合并进已存的上下文。
    /// 计划、会话快照与原始输入永远取已存的；同一步再次暂停时运行器快照整体保留，
    /// 暂停来自后续步骤时采用新的当前步、步骤结果与专家状态。
    pub fn merge(stored: Option<ResumeContext>, fresh: ResumeContext) -> ResumeContext {
        let Some(stored) = stored else {
            return fresh;
        };
        let advanced = match (&stored.plan_runner, &fresh.plan_runner) {
            (Some(old), Some(new)) => new.current_step != old.current_step,
            _ => false,
        };
        if advanced {
            let plan_runner = match (stored.plan_runner, fresh.plan_runner) {
                (Some(old), Some(new)) => Some(PlanRunnerSnapshot {
                    plan: old.plan,
                    session_snapshot: old.session_snapshot,
                    original_input: old.original_input,
                    current_step: new.current_step,
                    step_results: new.step_results,
                    specialist: new.specialist,
                }),
                (old, new) => old.or(new),
            };
            // 上一步的提示不带入新的一步
            return ResumeContext {
                plan_runner,
                question: fresh.question,
                answer: None,
                hints: fresh.hints,
            };
        }

        let mut guidance = stored.hints.guidance;
        for g in fresh.hints.guidance {
            if !guidance.contains(&g) {
                guidance.push(g);
            }
        }
        let latest_specialist = fresh
            .hints
            .latest_specialist
            .or_else(|| fresh.plan_runner.as_ref().map(|p| p.specialist.clone()))
            .or(stored.hints.latest_specialist);
        ResumeContext {
            plan_runner: stored.plan_runner.or(fresh.plan_runner),
            question: fresh.question,
            answer: None,
            hints: ResumeHints {
                guidance,
                latest_specialist,
            },
        }
    }

    /// 恢复时使用的专家状态：优先最新的，其次快照里的
    pub fn specialist_state(&self) -> Option<&SpecialistSnapshot> {
        self.hints
            .latest_specialist
            .as_ref()
            .or_else(|| self.plan_runner.as_ref().map(|p| &p.specialist))
    }
}

/// 计划级中断状态：瞬时故障导致多步计划停止时创建
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanInterruptionState {
    pub plan_id: String,
    pub plan_description: String,
    pub plan: ExecutionPlan,
    pub failed_step: usize,
    pub completed: StepResults,
    pub session_snapshot: String,
    pub original_input: String,
    pub interruption_reason: String,
    pub timestamp: DateTime<Utc>,
    pub can_resume: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(step: usize) -> PlanRunnerSnapshot {
        PlanRunnerSnapshot {
            plan: ExecutionPlan::new(
                "two sections",
                vec![
                    ("writer".into(), "intro".into(), json!({})),
                    ("writer".into(), "body".into(), json!({})),
                ],
            ),
            current_step: step,
            step_results: StepResults::new(),
            session_snapshot: "{}".into(),
            original_input: "write".into(),
            specialist: SpecialistSnapshot {
                specialist_id: "writer".into(),
                iteration: 1,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_plan_steps_numbered_from_one() {
        let plan = snapshot(1).plan;
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.step(1).map(|s| s.description.as_str()), Some("intro"));
        assert!(plan.step(0).is_none());
    }

    #[test]
    fn test_merge_same_step_keeps_stored_runner_snapshot() {
        let first = ResumeContext::new("tone?", Some(snapshot(1)));
        let mut again = snapshot(1);
        again.specialist.iteration = 2;
        let mut fresh = ResumeContext::new("length?", Some(again.clone()));
        fresh.hints.guidance.push("be brief".into());

        let merged = ResumeContext::merge(Some(first.clone()), fresh);
        assert_eq!(merged.plan_runner, first.plan_runner);
        assert_eq!(merged.question, "length?");
        assert_eq!(merged.hints.guidance, vec!["be brief".to_string()]);
        assert_eq!(merged.specialist_state(), Some(&again.specialist));
        assert!(merged.answer.is_none());
    }

    #[test]
    fn test_merge_later_step_takes_fresh_progress() {
        let first = ResumeContext::new("tone?", Some(snapshot(1)));
        let mut later = snapshot(2);
        later.step_results.insert(1, json!("intro done"));
        later.session_snapshot = "{\"changed\":true}".into();
        later.specialist.specialist_id = "editor".into();

        let merged = ResumeContext::merge(Some(first.clone()), ResumeContext::new("body?", Some(later)));
        let runner = merged.plan_runner.as_ref().unwrap();
        let stored = first.plan_runner.as_ref().unwrap();
        assert_eq!(runner.current_step, 2);
        assert_eq!(runner.step_results.get(&1), Some(&json!("intro done")));
        assert_eq!(runner.plan, stored.plan);
        assert_eq!(runner.session_snapshot, stored.session_snapshot);
        assert_eq!(merged.specialist_state().map(|s| s.specialist_id.as_str()), Some("editor"));
        assert_eq!(merged.question, "body?");
    }

    #[test]
    fn test_merge_without_stored_takes_fresh() {
        let fresh = ResumeContext::new("q", None);
        assert_eq!(ResumeContext::merge(None, fresh.clone()), fresh);
    }

    #[test]
    fn test_specialist_history_bounded() {
        let mut s = SpecialistSnapshot::default();
        for i in 0..30 {
            s.push_history(format!("entry {i}"));
        }
        assert_eq!(s.history.len(), SpecialistSnapshot::MAX_HISTORY);
        assert_eq!(s.history[0], "entry 10");
    }

    #[test]
    fn test_resume_context_serializes() {
        let ctx = ResumeContext::new("tone?", Some(snapshot(1)));
        let text = serde_json::to_string(&ctx).unwrap();
        let back: ResumeContext = serde_json::from_str(&text).unwrap();
        assert_eq!(back, ctx);
    }
}
