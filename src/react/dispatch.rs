//! 工具调用分发：按 RiskPolicy 分类后执行或挂起
//!
//! - autonomous：立即执行，记录耗时、成败与错误码；每次调用只写一条历史
//! - interactive：总是挂起，按参数推断确认 / 选择 / 输入
//! - confirmation：低风险等同 autonomous；中高风险先确认，专家调用走多步计划通道
//! - final_answer：总是执行并结束任务

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::core::{AgentStage, AgentState};
use crate::memory::{truncate_chars, ExecutionRecorder, StepKind, StepRecord};
use crate::react::loop_detector::find_recent_duplicate;
use crate::react::{EngineEvent, HostSink, InteractionKind, InteractionRequest, ToolCall};
use crate::tools::{
    display_value, DispatchMode, FinalAnswerArgs, RiskPolicy, ToolErrorCode, ToolExecutor,
    ToolKind, ToolNames,
};

const PREVIEW_CHARS: usize = 500;

/// 分发一次调用（或处理一次计划结果）所需的引擎上下文
pub struct DispatchContext<'a> {
    pub state: &'a mut AgentState,
    pub recorder: &'a ExecutionRecorder,
    pub sink: &'a dyn HostSink,
    pub cancel: &'a CancellationToken,
}

impl DispatchContext<'_> {
    pub async fn record(&mut self, record: StepRecord) {
        self.recorder
            .record_execution(&mut self.state.history, record)
            .await;
    }

    /// 挂起并展示交互请求
    pub async fn suspend(&mut self, request: InteractionRequest) {
        let mut record = StepRecord::new(StepKind::System, format!("等待用户：{}", request.message));
        if let Some(call) = &request.tool_call {
            record = record.tool(call.tool.clone(), call.args.clone());
        }
        self.record(record).await;
        self.sink.emit(EngineEvent::InteractionRequested {
            kind: request.kind,
            message: request.prompt_text(),
            options: request.options.clone(),
        });
        self.state.pending_interaction = Some(request);
        self.state.stage = AgentStage::AwaitingUser;
    }
}

/// 分发结果
#[derive(Clone, Debug, PartialEq)]
pub enum DispatchOutcome {
    /// 已执行或已跳过，继续下一个调用
    Continue,
    /// 已挂起等待用户
    Suspended,
    /// final_answer 已结束任务
    Finished,
    /// 需要经由 PlanRunner 调用专家
    Specialist(ToolCall),
    Cancelled,
}

pub struct ToolDispatcher {
    executor: Arc<dyn ToolExecutor>,
    policy: Arc<dyn RiskPolicy>,
    names: ToolNames,
    duplicate_window: Duration,
}

fn arg_str<'a>(args: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| args.get(*k).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
}

/// 从交互类工具的参数推断请求类型
pub fn infer_interaction(call: &ToolCall) -> InteractionRequest {
    let message = arg_str(&call.args, &["message", "question", "prompt"])
        .map(str::to_string)
        .unwrap_or_else(|| format!("工具 {} 需要你的输入", call.tool));
    let options: Vec<String> = call
        .args
        .get("options")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(display_value).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    let declared = arg_str(&call.args, &["type", "kind"]).map(str::to_lowercase);
    let kind = match declared.as_deref() {
        Some("choice") => InteractionKind::Choice,
        Some("confirmation") | Some("confirm") => InteractionKind::Confirmation,
        Some("input") => InteractionKind::Input,
        _ if !options.is_empty() => InteractionKind::Choice,
        _ if call.tool.contains("confirm") => InteractionKind::Confirmation,
        _ => InteractionKind::Input,
    };
    match kind {
        InteractionKind::Choice if !options.is_empty() => {
            InteractionRequest::choice(message, options, Some(call.clone()))
        }
        InteractionKind::Confirmation => InteractionRequest::confirmation(message, call.clone()),
        _ => InteractionRequest::input(message, Some(call.clone()), None),
    }
}

impl ToolDispatcher {
    pub fn new(
        executor: Arc<dyn ToolExecutor>,
        policy: Arc<dyn RiskPolicy>,
        names: ToolNames,
        duplicate_window: Duration,
    ) -> Self {
        Self {
            executor,
            policy,
            names,
            duplicate_window,
        }
    }

    pub fn names(&self) -> &ToolNames {
        &self.names
    }

    /// 分类并处理 Planner 提出的一个调用
    pub async fn dispatch(&self, ctx: &mut DispatchContext<'_>, call: ToolCall) -> DispatchOutcome {
        let kind = self.names.kind(&call.tool);
        if kind == ToolKind::FinalAnswer {
            return self.final_answer(ctx, call).await;
        }
        let class = self.policy.classify(&call);
        tracing::debug!(tool = %call.tool, mode = ?class.mode, risk = ?class.risk, "dispatch");

        match class.mode {
            DispatchMode::Autonomous => self.execute(ctx, call).await,
            DispatchMode::Interactive => {
                ctx.suspend(infer_interaction(&call)).await;
                DispatchOutcome::Suspended
            }
            DispatchMode::Confirmation if !class.requires_confirmation => self.execute(ctx, call).await,
            DispatchMode::Confirmation if kind == ToolKind::Specialist => DispatchOutcome::Specialist(call),
            DispatchMode::Confirmation => {
                let message = format!(
                    "即将执行 {}（风险：{:?}），参数：{}。是否继续？(yes/no)",
                    call.tool,
                    class.risk,
                    truncate_chars(&call.args.to_string(), 200)
                );
                ctx.suspend(InteractionRequest::confirmation(message, call)).await;
                DispatchOutcome::Suspended
            }
        }
    }

    /// 用户确认或回答之后执行，不再分类
    pub async fn run_approved(&self, ctx: &mut DispatchContext<'_>, call: ToolCall) -> DispatchOutcome {
        match self.names.kind(&call.tool) {
            ToolKind::FinalAnswer => self.final_answer(ctx, call).await,
            ToolKind::Specialist => DispatchOutcome::Specialist(call),
            _ => self.execute(ctx, call).await,
        }
    }

    /// 直接执行：重复拦截、超时 / 取消竞争、单条历史记录
    async fn execute(&self, ctx: &mut DispatchContext<'_>, call: ToolCall) -> DispatchOutcome {
        if find_recent_duplicate(&ctx.state.history, &call, self.duplicate_window).is_some() {
            tracing::info!(tool = %call.tool, "duplicate tool call skipped");
            ctx.record(
                StepRecord::new(
                    StepKind::ToolCallSkipped,
                    format!("{} 刚以相同参数成功执行过，已跳过", call.tool),
                )
                .tool(call.tool.clone(), call.args.clone()),
            )
            .await;
            ctx.sink.emit(EngineEvent::ToolSkipped { tool: call.tool });
            return DispatchOutcome::Continue;
        }
        if ctx.cancel.is_cancelled() {
            return DispatchOutcome::Cancelled;
        }

        ctx.sink.emit(EngineEvent::ToolCall {
            tool: call.tool.clone(),
            args: call.args.clone(),
        });
        let start = Instant::now();
        let result = tokio::select! {
            r = self.executor.execute(&call.tool, call.args.clone()) => r,
            _ = ctx.cancel.cancelled() => return DispatchOutcome::Cancelled,
        };
        let elapsed = start.elapsed().as_millis() as u64;

        match result {
            Ok(out) => {
                let text = out.display();
                ctx.record(
                    StepRecord::new(StepKind::ToolCall, call.tool.clone())
                        .tool(call.tool.clone(), call.args.clone())
                        .outcome(true, Some(out.content.clone()))
                        .duration_ms(elapsed),
                )
                .await;
                ctx.sink.emit(EngineEvent::Observation {
                    tool: call.tool.clone(),
                    preview: truncate_chars(&text, PREVIEW_CHARS),
                });
                match out.user_prompt {
                    // 工具已执行但需要补充信息：不算失败，回答后也不重跑
                    Some(question) => {
                        let partial = Some(out.content);
                        ctx.suspend(InteractionRequest::input(question, Some(call), partial))
                            .await;
                        DispatchOutcome::Suspended
                    }
                    None => DispatchOutcome::Continue,
                }
            }
            Err(e) => {
                let code = ToolErrorCode::classify(&e);
                ctx.record(
                    StepRecord::new(StepKind::ToolCall, call.tool.clone())
                        .tool(call.tool.clone(), call.args.clone())
                        .outcome(false, Some(json!(e.to_string())))
                        .duration_ms(elapsed)
                        .error_code(code),
                )
                .await;
                ctx.sink.emit(EngineEvent::ToolFailure {
                    tool: call.tool,
                    code,
                    reason: e.to_string(),
                });
                DispatchOutcome::Continue
            }
        }
    }

    /// final_answer：执行、渲染结构化结果并结束任务（执行失败也结束）
    async fn final_answer(&self, ctx: &mut DispatchContext<'_>, call: ToolCall) -> DispatchOutcome {
        let start = Instant::now();
        let result = tokio::select! {
            r = self.executor.execute(&call.tool, call.args.clone()) => r,
            _ = ctx.cancel.cancelled() => return DispatchOutcome::Cancelled,
        };
        let elapsed = start.elapsed().as_millis() as u64;

        let mut record = StepRecord::new(StepKind::ToolCall, call.tool.clone())
            .tool(call.tool.clone(), call.args.clone())
            .duration_ms(elapsed)
            .milestone();
        let answer = match result {
            Ok(out) => {
                record = record.outcome(true, Some(out.content.clone()));
                if out.content.is_object() {
                    FinalAnswerArgs::from_args(&out.content)
                } else {
                    FinalAnswerArgs::from_args(&call.args)
                }
            }
            Err(e) => {
                tracing::warn!(tool = %call.tool, "final answer tool failed: {}", e);
                record = record
                    .outcome(false, Some(json!(e.to_string())))
                    .error_code(ToolErrorCode::classify(&e));
                FinalAnswerArgs::from_args(&call.args)
            }
        };
        ctx.record(record).await;

        let text = answer.render();
        ctx.record(StepRecord::new(StepKind::Result, text.clone())).await;
        ctx.sink.emit(EngineEvent::Message { text });
        ctx.state.stage = AgentStage::Completed;
        DispatchOutcome::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolsSection;
    use crate::react::TracingSink;
    use crate::session::InMemorySessionStore;
    use crate::tools::{ConfigRiskPolicy, ToolError, ToolOutput};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ToolExecutor for Scripted {
        async fn execute(&self, name: &str, args: Value) -> Result<ToolOutput, ToolError> {
            self.calls.lock().unwrap().push(name.to_string());
            match name {
                "fetch" => Err(ToolError::Network("connection reset".into())),
                "clarify" => Ok(ToolOutput::ask_user("which section?", json!({"draft": 1}))),
                "final_answer" => Ok(ToolOutput::json(args)),
                _ => Ok(ToolOutput::text(format!("{name} ok"))),
            }
        }
    }

    struct Fixture {
        dispatcher: ToolDispatcher,
        tools: Arc<Scripted>,
        state: AgentState,
        recorder: ExecutionRecorder,
        cancel: CancellationToken,
    }

    impl Fixture {
        fn new() -> Self {
            let tools = Arc::new(Scripted {
                calls: Mutex::new(Vec::new()),
            });
            let mut state = AgentState::new(20);
            state.history.push(StepRecord::turn_start("task"));
            Self {
                dispatcher: ToolDispatcher::new(
                    tools.clone(),
                    Arc::new(ConfigRiskPolicy::from_config(&ToolsSection::default())),
                    ToolNames::default(),
                    Duration::from_secs(30),
                ),
                tools,
                state,
                recorder: ExecutionRecorder::new(
                    Arc::new(InMemorySessionStore::default()),
                    "invoke_specialist",
                ),
                cancel: CancellationToken::new(),
            }
        }

        async fn dispatch(&mut self, call: ToolCall) -> DispatchOutcome {
            let mut ctx = DispatchContext {
                state: &mut self.state,
                recorder: &self.recorder,
                sink: &TracingSink,
                cancel: &self.cancel,
            };
            self.dispatcher.dispatch(&mut ctx, call).await
        }
    }

    #[tokio::test]
    async fn test_autonomous_writes_one_record_with_duration() {
        let mut f = Fixture::new();
        let out = f.dispatch(ToolCall::new("search", json!({"q": "x"}))).await;
        assert_eq!(out, DispatchOutcome::Continue);
        let calls: Vec<_> = f.state.history.tool_calls().collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].success, Some(true));
        assert!(calls[0].duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_failure_records_error_code() {
        let mut f = Fixture::new();
        f.dispatch(ToolCall::new("fetch", json!({}))).await;
        let step = f.state.history.last().unwrap();
        assert_eq!(step.success, Some(false));
        assert_eq!(step.error_code, Some(ToolErrorCode::NetworkError));
    }

    #[tokio::test]
    async fn test_duplicate_call_executes_once() {
        let mut f = Fixture::new();
        f.dispatch(ToolCall::new("search", json!({"q": "x"}))).await;
        f.dispatch(ToolCall::new("search", json!({"q": "x"}))).await;
        assert_eq!(f.tools.calls.lock().unwrap().len(), 1);
        assert_eq!(f.state.history.count_kind(StepKind::ToolCallSkipped), 1);
    }

    #[tokio::test]
    async fn test_tool_asking_user_suspends_with_original_result() {
        let mut f = Fixture::new();
        let out = f.dispatch(ToolCall::new("clarify", json!({}))).await;
        assert_eq!(out, DispatchOutcome::Suspended);
        assert_eq!(f.state.stage, AgentStage::AwaitingUser);
        let pending = f.state.pending_interaction.clone().unwrap();
        assert_eq!(pending.kind, InteractionKind::Input);
        assert_eq!(pending.original_result, Some(json!({"draft": 1})));
        assert_eq!(f.state.history.tool_calls().count(), 1);
    }

    #[tokio::test]
    async fn test_high_risk_requires_confirmation_without_executing() {
        let mut f = Fixture::new();
        let out = f.dispatch(ToolCall::new("delete_document", json!({"id": 1}))).await;
        assert_eq!(out, DispatchOutcome::Suspended);
        assert!(f.tools.calls.lock().unwrap().is_empty());
        assert_eq!(
            f.state.pending_interaction.as_ref().map(|p| p.kind),
            Some(InteractionKind::Confirmation)
        );
    }

    #[tokio::test]
    async fn test_interactive_choice_inferred_from_options() {
        let mut f = Fixture::new();
        f.dispatch(ToolCall::new(
            "request_choice",
            json!({"question": "Tone?", "options": ["formal", "casual"]}),
        ))
        .await;
        let pending = f.state.pending_interaction.clone().unwrap();
        assert_eq!(pending.kind, InteractionKind::Choice);
        assert_eq!(pending.options, vec!["formal".to_string(), "casual".to_string()]);
        assert_eq!(pending.message, "Tone?");
    }

    #[tokio::test]
    async fn test_specialist_routed_to_plan_path() {
        let mut f = Fixture::new();
        let call = ToolCall::new("invoke_specialist", json!({"specialist": "writer"}));
        assert_eq!(f.dispatch(call.clone()).await, DispatchOutcome::Specialist(call));
    }

    #[tokio::test]
    async fn test_final_answer_completes() {
        let mut f = Fixture::new();
        let out = f
            .dispatch(ToolCall::new("final_answer", json!({"summary": "done", "result": "text"})))
            .await;
        assert_eq!(out, DispatchOutcome::Finished);
        assert_eq!(f.state.stage, AgentStage::Completed);
        let last = f.state.history.last().unwrap();
        assert_eq!(last.kind, StepKind::Result);
        assert!(last.content.contains("done"));
    }

    #[tokio::test]
    async fn test_cancelled_before_execution_records_nothing() {
        let mut f = Fixture::new();
        f.cancel.cancel();
        let out = f.dispatch(ToolCall::new("search", json!({}))).await;
        assert_eq!(out, DispatchOutcome::Cancelled);
        assert_eq!(f.state.history.tool_calls().count(), 0);
    }
}
