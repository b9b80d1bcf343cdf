//! 计划运行器接口与参考实现
//!
//! PlanRunner 是外部协作方：run / resume_from_step / resume_specialist 三个入口，
//! 进度通过 ProgressCallback 上报。暂停与恢复前后必须复用同一个回调实例。
//! ToolPlanRunner 是参考实现：每一步调用与专家同名的工具。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::plan::{
    ExecutionPlan, FailureCode, PlanFailure, PlanOutcome, PlanRunnerSnapshot, PlanStep,
    ResumeContext, SpecialistSnapshot, StepResults,
};
use crate::tools::{ToolError, ToolExecutor};

/// 计划执行进度回调
#[async_trait]
pub trait ProgressCallback: Send + Sync {
    async fn on_specialist_start(&self, _step: &PlanStep) {}

    async fn on_iteration_start(&self, _specialist: &str, _iteration: usize) {}

    async fn on_tools_start(&self, _specialist: &str, _tools: &[String]) {}

    async fn on_tools_complete(&self, _specialist: &str, _tools: &[String], _success: bool) {}

    async fn on_task_complete(&self, _summary: &str) {}
}

/// 多步计划运行器
#[async_trait]
pub trait PlanRunner: Send + Sync {
    async fn run(
        &self,
        plan: &ExecutionPlan,
        session_snapshot: &str,
        input: &str,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<PlanOutcome, AgentError>;

    /// 从失败步重新开始，已完成步骤的结果原样带入
    async fn resume_from_step(
        &self,
        plan: &ExecutionPlan,
        failed_step: usize,
        completed: &StepResults,
        session_snapshot: &str,
        input: &str,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<PlanOutcome, AgentError>;

    /// 用户回答后继续被暂停的专家（同一步）
    async fn resume_specialist(
        &self,
        resume: &ResumeContext,
        answer: &str,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<PlanOutcome, AgentError>;
}

/// 参考运行器：每一步用专家名作为工具名调用 ToolExecutor
pub struct ToolPlanRunner {
    executor: Arc<dyn ToolExecutor>,
}

impl ToolPlanRunner {
    pub fn new(executor: Arc<dyn ToolExecutor>) -> Self {
        Self { executor }
    }

    fn failure_code(err: &ToolError) -> Option<FailureCode> {
        match err {
            ToolError::Timeout(_) | ToolError::Network(_) => Some(FailureCode::Transient),
            ToolError::PermissionDenied(_) => Some(FailureCode::Permission),
            ToolError::NotFound(_) => Some(FailureCode::Configuration),
            // 泛化失败交给引擎按文本分类
            ToolError::Failed(_) => None,
        }
    }

    fn step_args(step: &PlanStep, input: &str, completed: &StepResults, answer: Option<&str>) -> Value {
        let mut args = match &step.input {
            Value::Object(map) => map.clone(),
            Value::Null => serde_json::Map::new(),
            other => {
                let mut m = serde_json::Map::new();
                m.insert("input".to_string(), other.clone());
                m
            }
        };
        args.insert("task".to_string(), json!(input));
        args.insert("step".to_string(), json!(step.description));
        if let Some(prev) = completed.range(..step.number).next_back() {
            args.insert("previous_result".to_string(), prev.1.clone());
        }
        if let Some(answer) = answer {
            args.insert("user_answer".to_string(), json!(answer));
        }
        Value::Object(args)
    }

    /// 从 start 步开始顺序执行；first_answer 只注入第一步（专家恢复时使用）
    #[allow(clippy::too_many_arguments)]
    async fn execute_from(
        &self,
        plan: &ExecutionPlan,
        start: usize,
        mut completed: StepResults,
        session_snapshot: &str,
        input: &str,
        progress: Arc<dyn ProgressCallback>,
        mut first_answer: Option<(String, SpecialistSnapshot)>,
    ) -> Result<PlanOutcome, AgentError> {
        for step in plan.steps.iter().filter(|s| s.number >= start) {
            if completed.contains_key(&step.number) {
                continue;
            }
            let resumed = first_answer.take();
            let mut specialist = resumed
                .as_ref()
                .map(|(_, s)| s.clone())
                .unwrap_or_else(|| SpecialistSnapshot {
                    specialist_id: step.specialist.clone(),
                    ..Default::default()
                });
            specialist.iteration += 1;

            if resumed.is_none() {
                progress.on_specialist_start(step).await;
            }
            progress
                .on_iteration_start(&step.specialist, specialist.iteration)
                .await;
            let tools = vec![step.specialist.clone()];
            progress.on_tools_start(&step.specialist, &tools).await;

            let answer = resumed.as_ref().map(|(a, _)| a.as_str());
            let args = Self::step_args(step, input, &completed, answer);
            match self.executor.execute(&step.specialist, args).await {
                Ok(out) => {
                    progress.on_tools_complete(&step.specialist, &tools, true).await;
                    if let Some(question) = out.user_prompt {
                        specialist.push_history(format!("asked: {}", question));
                        let snapshot = PlanRunnerSnapshot {
                            plan: plan.clone(),
                            current_step: step.number,
                            step_results: completed,
                            session_snapshot: session_snapshot.to_string(),
                            original_input: input.to_string(),
                            specialist,
                        };
                        return Ok(PlanOutcome::InteractionRequired {
                            resume: ResumeContext::new(question.clone(), Some(snapshot)),
                            question,
                        });
                    }
                    completed.insert(step.number, out.content);
                }
                Err(e) => {
                    progress.on_tools_complete(&step.specialist, &tools, false).await;
                    let mut failure =
                        PlanFailure::new(e.to_string(), step.number).with_completed(completed);
                    failure.code = Self::failure_code(&e);
                    return Ok(PlanOutcome::Failed(failure));
                }
            }
        }

        let summary = format!(
            "计划「{}」已完成，共 {} 步。",
            plan.description,
            completed.len()
        );
        progress.on_task_complete(&summary).await;
        Ok(PlanOutcome::Completed { summary })
    }
}

#[async_trait]
impl PlanRunner for ToolPlanRunner {
    async fn run(
        &self,
        plan: &ExecutionPlan,
        session_snapshot: &str,
        input: &str,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<PlanOutcome, AgentError> {
        self.execute_from(plan, 1, StepResults::new(), session_snapshot, input, progress, None)
            .await
    }

    async fn resume_from_step(
        &self,
        plan: &ExecutionPlan,
        failed_step: usize,
        completed: &StepResults,
        session_snapshot: &str,
        input: &str,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<PlanOutcome, AgentError> {
        self.execute_from(
            plan,
            failed_step,
            completed.clone(),
            session_snapshot,
            input,
            progress,
            None,
        )
        .await
    }

    async fn resume_specialist(
        &self,
        resume: &ResumeContext,
        answer: &str,
        progress: Arc<dyn ProgressCallback>,
    ) -> Result<PlanOutcome, AgentError> {
        let snapshot = resume.plan_runner.as_ref().ok_or_else(|| {
            AgentError::PlanRunner("resume context carries no plan runner snapshot".to_string())
        })?;
        let specialist = resume
            .specialist_state()
            .cloned()
            .unwrap_or_else(|| snapshot.specialist.clone());
        self.execute_from(
            &snapshot.plan,
            snapshot.current_step,
            snapshot.step_results.clone(),
            &snapshot.session_snapshot,
            &snapshot.original_input,
            progress,
            Some((answer.to_string(), specialist)),
        )
        .await
    }
}
