//! Agent 状态机：主控循环
//!
//! AgentEngine 是 AgentState 的唯一所有者。`run_task` 开新任务并驱动「规划 → 执行」循环，
//! 直到完成、出错或挂起等待用户；`submit_user_answer` 在挂起后恢复；`cancel` 随时可调用。
//! 所有异步协作（Planner、工具、计划运行器）按顺序 await，并与当前任务的取消 token 竞争。

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::EngineSection;
use crate::core::{
    AgentError, AgentStage, AgentState, PlanRecoveryManager, SessionSupervisor, StatusSnapshot,
};
use crate::memory::{render_narrative, ExecutionRecorder, StepKind, StepRecord, ToolResultWindow};
use crate::plan::{
    ExecutionPlan, PlanOutcome, PlanRunner, PlanStep, ProgressCallback, ResumeContext,
};
use crate::react::{
    forced_summary, resolve, DispatchContext, DispatchOutcome, EngineEvent, HostSink,
    InteractionKind, InteractionRequest, LoopDetector, LoopReason, Plan, PlanRequest, PlanShape,
    Planner, Resolution, ToolCall, ToolDispatcher,
};
use crate::session::{current_or_default, log_best_effort, LogEntry, LogEntryKind, SessionStore};

/// 借出分发上下文（字段级借用，便于同时使用 dispatcher / recovery）
macro_rules! ctx {
    ($engine:expr) => {
        DispatchContext {
            state: &mut $engine.state,
            recorder: &$engine.recorder,
            sink: $engine.sink.as_ref(),
            cancel: &$engine.cancel,
        }
    };
}

/// 计划运行的来源
#[derive(Clone, Debug)]
enum PlanOrigin {
    /// Planner 给出的多步计划，或恢复后的计划
    Planner,
    /// 经确认通道调用的专家，包装成单步计划
    Specialist(ToolCall),
}

/// 引擎进度回调：引擎生命周期内只有一个实例，暂停前后传给运行器的都是它
pub struct EngineProgress {
    sink: Arc<dyn HostSink>,
    store: Arc<dyn SessionStore>,
}

impl EngineProgress {
    pub fn new(sink: Arc<dyn HostSink>, store: Arc<dyn SessionStore>) -> Self {
        Self { sink, store }
    }
}

#[async_trait]
impl ProgressCallback for EngineProgress {
    async fn on_specialist_start(&self, step: &PlanStep) {
        self.sink.emit(EngineEvent::PlanProgress {
            specialist: step.specialist.clone(),
            detail: format!("第 {} 步：{}", step.number, step.description),
        });
        log_best_effort(
            &self.store,
            LogEntry::new(
                LogEntryKind::SpecialistInvocation,
                format!("{} started step {}", step.specialist, step.number),
            )
            .with_data(json!({"step": step.number, "description": step.description})),
        )
        .await;
    }

    async fn on_iteration_start(&self, specialist: &str, iteration: usize) {
        tracing::debug!(specialist, iteration, "specialist iteration");
    }

    async fn on_tools_start(&self, specialist: &str, tools: &[String]) {
        self.sink.emit(EngineEvent::PlanProgress {
            specialist: specialist.to_string(),
            detail: format!("调用工具：{}", tools.join(", ")),
        });
    }

    async fn on_tools_complete(&self, specialist: &str, tools: &[String], success: bool) {
        self.sink.emit(EngineEvent::PlanProgress {
            specialist: specialist.to_string(),
            detail: format!(
                "工具{}：{}",
                if success { "完成" } else { "失败" },
                tools.join(", ")
            ),
        });
    }

    async fn on_task_complete(&self, summary: &str) {
        tracing::info!("plan complete");
        self.sink.emit(EngineEvent::PlanProgress {
            specialist: "plan".to_string(),
            detail: summary.to_string(),
        });
        log_best_effort(&self.store, LogEntry::new(LogEntryKind::Milestone, summary)).await;
    }
}

/// 引擎的组成部分，由 EngineBuilder 组装
pub(crate) struct EngineParts {
    pub settings: EngineSection,
    pub planner: Arc<dyn Planner>,
    pub runner: Arc<dyn PlanRunner>,
    pub dispatcher: ToolDispatcher,
    pub recorder: ExecutionRecorder,
    pub recovery: PlanRecoveryManager,
    pub detector: LoopDetector,
    pub window: ToolResultWindow,
    pub sink: Arc<dyn HostSink>,
}

pub struct AgentEngine {
    state: AgentState,
    settings: EngineSection,
    planner: Arc<dyn Planner>,
    runner: Arc<dyn PlanRunner>,
    dispatcher: ToolDispatcher,
    recorder: ExecutionRecorder,
    recovery: PlanRecoveryManager,
    detector: LoopDetector,
    window: ToolResultWindow,
    sink: Arc<dyn HostSink>,
    progress: Arc<dyn ProgressCallback>,
    supervisor: SessionSupervisor,
    /// 当前任务的取消 token
    cancel: CancellationToken,
    status_tx: watch::Sender<StatusSnapshot>,
    last_stage: AgentStage,
}

impl AgentEngine {
    pub(crate) fn new(parts: EngineParts) -> Self {
        let state = AgentState::new(parts.settings.max_iterations);
        let (status_tx, _) = watch::channel(state.snapshot());
        let progress: Arc<dyn ProgressCallback> = Arc::new(EngineProgress::new(
            parts.sink.clone(),
            parts.recorder.store().clone(),
        ));
        let supervisor = SessionSupervisor::new();
        let cancel = supervisor.token();
        Self {
            last_stage: state.stage,
            state,
            settings: parts.settings,
            planner: parts.planner,
            runner: parts.runner,
            dispatcher: parts.dispatcher,
            recorder: parts.recorder,
            recovery: parts.recovery,
            detector: parts.detector,
            window: parts.window,
            sink: parts.sink,
            progress,
            supervisor,
            cancel,
            status_tx,
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn stage(&self) -> AgentStage {
        self.state.stage
    }

    pub fn status(&self) -> StatusSnapshot {
        self.state.snapshot()
    }

    /// 只读观察者订阅状态投影
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    /// 外部取消句柄
    pub fn cancel_handle(&self) -> SessionSupervisor {
        self.supervisor.clone()
    }

    /// 开始新任务；挂起等待用户时拒绝（不排队）
    pub async fn run_task(&mut self, text: impl Into<String>) -> Result<AgentStage, AgentError> {
        if self.state.stage == AgentStage::AwaitingUser {
            return Err(AgentError::Busy {
                stage: self.state.stage,
            });
        }
        let text = text.into();
        // 只在任务之间裁剪历史
        self.state.history.trim_to(self.settings.history_retention);
        self.state.current_task = text.clone();
        self.state.iteration_count = 0;
        self.state.empty_plan_streak = 0;
        self.state.cancelled = false;
        self.state.pending_interaction = None;
        self.state.resume_context = None;
        self.state.resume_origin = None;
        self.state.plan_interruption = None;
        self.cancel = self.supervisor.begin_task();

        tracing::info!(task = %text, "task started");
        self.record(StepRecord::turn_start(text)).await;
        self.state.stage = AgentStage::Planning;
        self.publish();
        self.drive().await;
        Ok(self.state.stage)
    }

    /// 提交用户对挂起请求的回答
    pub async fn submit_user_answer(
        &mut self,
        text: impl Into<String>,
    ) -> Result<AgentStage, AgentError> {
        if self.state.stage != AgentStage::AwaitingUser {
            return Err(AgentError::NotAwaitingUser {
                stage: self.state.stage,
            });
        }
        let answer = text.into();
        // 无论如何先清掉；重新询问必须来自新的请求
        let pending = self.state.pending_interaction.take();

        if self.cancel_requested() {
            self.finish_cancel().await;
            return Ok(self.state.stage);
        }

        if pending.as_ref().map(|p| p.kind) == Some(InteractionKind::ContinueConversation) {
            self.open_turn(answer).await;
        } else {
            self.record(StepRecord::new(StepKind::UserInteraction, answer.clone()))
                .await;
            if self.state.resume_context.is_some() {
                self.resume_specialist(&answer).await;
            } else if let Some(request) = pending {
                self.apply_resolution(request, &answer).await;
            } else {
                self.state.stage = AgentStage::Planning;
            }
        }
        self.drive().await;
        Ok(self.state.stage)
    }

    /// 取消当前任务；任何时候都可调用
    pub async fn cancel(&mut self) -> AgentStage {
        self.supervisor.cancel();
        self.finish_cancel().await;
        self.state.stage
    }

    fn cancel_requested(&self) -> bool {
        self.state.cancelled || self.cancel.is_cancelled()
    }

    fn publish(&mut self) {
        let snapshot = self.state.snapshot();
        if snapshot.stage != self.last_stage {
            tracing::info!(from = %self.last_stage, to = %snapshot.stage, "stage changed");
            self.sink.emit(EngineEvent::StageChanged {
                stage: snapshot.stage,
            });
            self.last_stage = snapshot.stage;
        }
        self.status_tx.send_replace(snapshot);
    }

    async fn record(&mut self, record: StepRecord) {
        self.recorder
            .record_execution(&mut self.state.history, record)
            .await;
    }

    async fn reply(&mut self, text: &str) {
        self.record(StepRecord::new(StepKind::Result, text)).await;
        self.sink.emit(EngineEvent::Message {
            text: text.to_string(),
        });
    }

    /// continue_conversation：新的一轮，同一个任务上下文
    async fn open_turn(&mut self, text: String) {
        self.state.current_task = text.clone();
        self.state.iteration_count = 0;
        self.state.empty_plan_streak = 0;
        self.record(StepRecord::turn_start(text)).await;
        self.state.stage = AgentStage::Planning;
    }

    /// 迭代循环：直到终态、挂起或取消
    async fn drive(&mut self) {
        while self.state.stage.is_active() {
            if self.cancel_requested() {
                self.finish_cancel().await;
                break;
            }
            self.state.stage = AgentStage::Planning;
            self.publish();

            let session = current_or_default(self.recorder.store()).await;
            let history = render_narrative(self.state.history.steps(), &self.state.current_task);
            let tool_results = self
                .window
                .render(self.state.history.steps(), self.dispatcher.names());
            let request = PlanRequest {
                task: &self.state.current_task,
                session: &session,
                history: &history,
                tool_results: &tool_results,
                iteration: self.state.iteration_count,
            };
            let planned = tokio::select! {
                r = self.planner.plan(request) => Some(r),
                _ = self.cancel.cancelled() => None,
            };
            let Some(planned) = planned else {
                self.finish_cancel().await;
                break;
            };

            self.state.iteration_count += 1;
            let plan = match planned {
                Ok(plan) => plan,
                Err(e) => {
                    self.fatal(e).await;
                    break;
                }
            };
            if let Some(reason) = self.detector.detect(&self.state) {
                self.force_direct_response(reason).await;
                break;
            }
            self.act_on_plan(plan).await;
        }
        self.publish();
    }

    async fn act_on_plan(&mut self, plan: Plan) {
        let shape = plan.shape();
        tracing::debug!(?shape, iteration = self.state.iteration_count, "plan received");

        if let Some(thought) = plan.thought.filter(|t| !t.trim().is_empty()) {
            self.sink.emit(EngineEvent::Thinking {
                text: thought.clone(),
            });
            self.record(StepRecord::new(StepKind::Thought, thought)).await;
        }
        if shape != PlanShape::Empty {
            self.state.empty_plan_streak = 0;
        }

        match shape {
            PlanShape::MultiStep => {
                if let Some(execution_plan) = plan.execution_plan {
                    self.run_plan(execution_plan, PlanOrigin::Planner).await;
                }
            }
            PlanShape::DirectAnswer => {
                let reply = plan.response.unwrap_or_default();
                self.reply(&reply).await;
                let mut ctx = ctx!(self);
                ctx.suspend(InteractionRequest::continue_conversation(
                    "请继续对话，或提出新的要求。",
                ))
                .await;
            }
            PlanShape::AnswerWithTools => {
                let reply = plan.response.unwrap_or_default();
                self.reply(&reply).await;
                self.execute_tools(plan.tool_calls).await;
            }
            PlanShape::ToolsOnly => self.execute_tools(plan.tool_calls).await,
            PlanShape::Empty => self.on_empty_plan().await,
        }
    }

    async fn on_empty_plan(&mut self) {
        self.state.empty_plan_streak += 1;
        let streak = self.state.empty_plan_streak;
        tracing::warn!(streak, "planner returned an empty plan");
        self.record(StepRecord::new(
            StepKind::System,
            format!("Planner 返回了空计划（连续第 {} 次）", streak),
        ))
        .await;
        if streak >= self.settings.empty_plan_threshold {
            self.fatal(AgentError::Planner(format!(
                "planner returned {} empty plans in a row",
                streak
            )))
            .await;
        }
    }

    async fn execute_tools(&mut self, calls: Vec<ToolCall>) {
        self.state.stage = AgentStage::Executing;
        self.publish();
        for call in calls {
            if self.cancel_requested() {
                self.finish_cancel().await;
                return;
            }
            let outcome = {
                let mut ctx = ctx!(self);
                self.dispatcher.dispatch(&mut ctx, call).await
            };
            if !self.after_dispatch(outcome).await {
                break;
            }
        }
        if self.state.stage == AgentStage::Executing {
            self.state.stage = AgentStage::Planning;
        }
    }

    /// 返回是否继续处理同一批的后续调用
    async fn after_dispatch(&mut self, outcome: DispatchOutcome) -> bool {
        match outcome {
            DispatchOutcome::Continue => true,
            DispatchOutcome::Suspended | DispatchOutcome::Finished => false,
            DispatchOutcome::Specialist(call) => {
                self.run_specialist_call(call).await;
                false
            }
            DispatchOutcome::Cancelled => {
                self.finish_cancel().await;
                false
            }
        }
    }

    async fn apply_resolution(&mut self, request: InteractionRequest, answer: &str) {
        match resolve(&request, answer) {
            Resolution::Execute(call) => {
                self.state.stage = AgentStage::Executing;
                self.publish();
                let outcome = {
                    let mut ctx = ctx!(self);
                    self.dispatcher.run_approved(&mut ctx, call).await
                };
                self.after_dispatch(outcome).await;
                if self.state.stage == AgentStage::Executing {
                    self.state.stage = AgentStage::Planning;
                }
            }
            Resolution::Declined => {
                let tool = request
                    .tool_call
                    .map(|c| c.tool)
                    .unwrap_or_else(|| "操作".to_string());
                tracing::info!(tool = %tool, "user declined");
                let text = format!("已取消 {}，未执行。", tool);
                self.record(StepRecord::new(StepKind::System, text.clone()))
                    .await;
                self.sink.emit(EngineEvent::Message { text });
                self.state.stage = AgentStage::Completed;
            }
            Resolution::Reask(prompt) => {
                self.sink.emit(EngineEvent::Message { text: prompt });
                self.sink.emit(EngineEvent::InteractionRequested {
                    kind: request.kind,
                    message: request.prompt_text(),
                    options: request.options.clone(),
                });
                self.state.pending_interaction = Some(request);
            }
            Resolution::AlreadyExecuted | Resolution::Acknowledged => {
                self.state.stage = AgentStage::Planning;
            }
            Resolution::ContinuePlan => self.continue_plan().await,
            Resolution::TerminatePlan => {
                let mut ctx = ctx!(self);
                self.recovery.terminate(&mut ctx).await;
            }
            Resolution::NewTurn(text) => self.open_turn(text).await,
        }
    }

    async fn serialized_session(&self) -> String {
        let snapshot = current_or_default(self.recorder.store()).await;
        snapshot.serialize().unwrap_or_else(|e| {
            tracing::warn!("Session snapshot not serializable ({}), using empty", e);
            "{}".to_string()
        })
    }

    async fn run_plan(&mut self, plan: ExecutionPlan, origin: PlanOrigin) {
        let session = self.serialized_session().await;
        let input = self.state.current_task.clone();
        if matches!(origin, PlanOrigin::Planner) {
            let mut record = StepRecord::new(
                StepKind::PlanExecution,
                format!("执行计划「{}」（{} 步）", plan.description, plan.len()),
            );
            record.args = serde_json::to_value(&plan).ok();
            self.record(record).await;
        }
        tracing::info!(plan = %plan.description, steps = plan.len(), "running plan");
        self.state.stage = AgentStage::Executing;
        self.publish();

        let started = Instant::now();
        let result = tokio::select! {
            r = self.runner.run(&plan, &session, &input, self.progress.clone()) => Some(r),
            _ = self.cancel.cancelled() => None,
        };
        let Some(result) = result else {
            self.finish_cancel().await;
            return;
        };
        let elapsed = started.elapsed().as_millis() as u64;
        self.handle_plan_outcome(&plan, &session, &input, result, origin, elapsed)
            .await;
    }

    /// 专家调用包装成单步计划，走同一个运行器
    async fn run_specialist_call(&mut self, call: ToolCall) {
        let specialist = call
            .args
            .get("specialist")
            .and_then(Value::as_str)
            .unwrap_or(&call.tool)
            .to_string();
        let description = ["task", "description", "instruction"]
            .iter()
            .find_map(|k| call.args.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| format!("调用专家 {}", specialist));
        let plan = ExecutionPlan::new(
            format!("专家调用：{}", specialist),
            vec![(specialist, description, call.args.clone())],
        );
        self.run_plan(plan, PlanOrigin::Specialist(call)).await;
    }

    async fn handle_plan_outcome(
        &mut self,
        plan: &ExecutionPlan,
        session: &str,
        input: &str,
        result: Result<PlanOutcome, AgentError>,
        origin: PlanOrigin,
        elapsed_ms: u64,
    ) {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fatal(e).await;
                return;
            }
        };
        match outcome {
            PlanOutcome::Completed { summary } => {
                self.state.plan_interruption = None;
                self.state.resume_context = None;
                self.state.resume_origin = None;
                match origin {
                    PlanOrigin::Planner => {
                        self.record(StepRecord::new(StepKind::Result, summary.clone()).milestone())
                            .await;
                        self.sink.emit(EngineEvent::Message { text: summary });
                        self.state.stage = AgentStage::Completed;
                    }
                    PlanOrigin::Specialist(call) => {
                        self.record(
                            StepRecord::new(StepKind::ToolCall, call.tool.clone())
                                .tool(call.tool.clone(), call.args)
                                .outcome(true, Some(json!(summary)))
                                .duration_ms(elapsed_ms),
                        )
                        .await;
                        self.sink.emit(EngineEvent::Observation {
                            tool: call.tool,
                            preview: summary,
                        });
                        self.state.stage = AgentStage::Planning;
                    }
                }
            }
            PlanOutcome::Failed(failure) => {
                if let PlanOrigin::Specialist(call) = origin {
                    let reason = failure.error.clone().unwrap_or_default();
                    self.record(
                        StepRecord::new(StepKind::ToolCall, call.tool.clone())
                            .tool(call.tool, call.args)
                            .outcome(false, Some(json!(reason)))
                            .duration_ms(elapsed_ms),
                    )
                    .await;
                }
                let mut ctx = ctx!(self);
                self.recovery
                    .handle_failure(&mut ctx, plan, &failure, session, input)
                    .await;
            }
            PlanOutcome::InteractionRequired { question, resume } => {
                // 同一步再次暂停时保留已存的运行器快照；推进到后续步骤时采用新的进度
                let merged = ResumeContext::merge(self.state.resume_context.take(), resume);
                self.state.resume_context = Some(merged);
                self.state.resume_origin = match origin {
                    PlanOrigin::Specialist(call) => Some(call),
                    PlanOrigin::Planner => None,
                };
                tracing::info!("specialist paused for user input");
                let mut ctx = ctx!(self);
                ctx.suspend(InteractionRequest::input(question, None, None))
                    .await;
            }
        }
    }

    /// 专家级暂停后的恢复：继续同一步
    async fn resume_specialist(&mut self, answer: &str) {
        let Some(mut resume) = self.state.resume_context.clone() else {
            return;
        };
        resume.answer = Some(answer.to_string());
        let Some(snapshot) = resume.plan_runner.clone() else {
            self.fatal(AgentError::PlanRunner(
                "resume context carries no plan runner snapshot".to_string(),
            ))
            .await;
            return;
        };
        let origin = match self.state.resume_origin.take() {
            Some(call) => PlanOrigin::Specialist(call),
            None => PlanOrigin::Planner,
        };
        self.state.stage = AgentStage::Executing;
        self.publish();

        let started = Instant::now();
        let result = tokio::select! {
            r = self.runner.resume_specialist(&resume, answer, self.progress.clone()) => Some(r),
            _ = self.cancel.cancelled() => None,
        };
        let Some(result) = result else {
            self.finish_cancel().await;
            return;
        };
        if !matches!(result, Ok(PlanOutcome::InteractionRequired { .. })) {
            self.state.resume_context = None;
        }
        let elapsed = started.elapsed().as_millis() as u64;
        self.handle_plan_outcome(
            &snapshot.plan,
            &snapshot.session_snapshot,
            &snapshot.original_input,
            result,
            origin,
            elapsed,
        )
        .await;
    }

    /// 用户选择继续执行中断的计划：从失败步重跑
    async fn continue_plan(&mut self) {
        let Some(interruption) = self.state.plan_interruption.take() else {
            self.fatal(AgentError::PlanRunner("no interrupted plan to resume".to_string()))
                .await;
            return;
        };
        // 同一计划此前已续跑的次数
        let plan_id = json!(interruption.plan_id);
        let earlier = self
            .state
            .history
            .steps()
            .iter()
            .filter(|s| {
                s.retry_count.is_some()
                    && s.args.as_ref().and_then(|a| a.get("plan_id")) == Some(&plan_id)
            })
            .count() as u32;
        let mut record = StepRecord::new(
            StepKind::System,
            format!(
                "从第 {} 步继续执行计划「{}」",
                interruption.failed_step, interruption.plan_description
            ),
        )
        .retry_count(earlier + 1)
        .audit(LogEntryKind::PlanResumed);
        record.args = Some(json!({
            "plan_id": plan_id,
            "failed_step": interruption.failed_step,
            "completed_steps": interruption.completed.len(),
        }));
        self.record(record).await;
        self.state.stage = AgentStage::Executing;
        self.publish();

        let started = Instant::now();
        let result = tokio::select! {
            r = self.runner.resume_from_step(
                &interruption.plan,
                interruption.failed_step,
                &interruption.completed,
                &interruption.session_snapshot,
                &interruption.original_input,
                self.progress.clone(),
            ) => Some(r),
            _ = self.cancel.cancelled() => None,
        };
        let Some(result) = result else {
            self.finish_cancel().await;
            return;
        };
        // 运行器未带回的早前步骤结果以中断快照为准
        let result = result.map(|outcome| match outcome {
            PlanOutcome::Failed(mut failure) => {
                for (step, value) in &interruption.completed {
                    failure.completed.entry(*step).or_insert_with(|| value.clone());
                }
                PlanOutcome::Failed(failure)
            }
            other => other,
        });
        let elapsed = started.elapsed().as_millis() as u64;
        self.handle_plan_outcome(
            &interruption.plan,
            &interruption.session_snapshot,
            &interruption.original_input,
            result,
            PlanOrigin::Planner,
            elapsed,
        )
        .await;
    }

    async fn force_direct_response(&mut self, reason: LoopReason) {
        tracing::warn!(%reason, "loop detected, forcing a direct response");
        let text = forced_summary(&self.state.history);
        self.record(StepRecord::new(StepKind::ForcedResponse, text.clone()))
            .await;
        self.sink.emit(EngineEvent::Message { text });
        self.state.pending_interaction = None;
        self.state.stage = AgentStage::Completed;
    }

    /// 致命错误：只结束当前任务
    async fn fatal(&mut self, err: AgentError) {
        tracing::error!("task failed: {}", err);
        self.record(
            StepRecord::new(StepKind::System, format!("错误：{}", err))
                .outcome(false, None)
                .milestone(),
        )
        .await;
        self.sink.emit(EngineEvent::Error {
            text: err.to_string(),
            hint: err.next_action_hint().to_string(),
        });
        self.state.pending_interaction = None;
        self.state.resume_context = None;
        self.state.resume_origin = None;
        self.state.plan_interruption = None;
        self.state.stage = AgentStage::Error;
    }

    async fn finish_cancel(&mut self) {
        self.cancel.cancel();
        self.state.cancelled = true;
        self.state.pending_interaction = None;
        self.state.resume_context = None;
        self.state.resume_origin = None;
        self.state.plan_interruption = None;
        tracing::info!("task cancelled");
        self.record(StepRecord::new(StepKind::System, "任务已取消")).await;
        self.sink.emit(EngineEvent::Message {
            text: "任务已取消。".to_string(),
        });
        self.state.stage = AgentStage::Completed;
        self.publish();
    }
}
