//! 状态定义：AgentState 与供观察者使用的 StatusSnapshot 投影
//!
//! AgentState 只由状态机及其委托组件修改；状态上报器、UI 等只读观察者通过 watch 通道拿到
//! 轻量的 StatusSnapshot，不直接接触 AgentState。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::memory::ExecutionHistory;
use crate::plan::{PlanInterruptionState, ResumeContext};
use crate::react::{InteractionKind, InteractionRequest, ToolCall};

/// 引擎阶段：任一时刻恰好一个取值
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStage {
    Planning,
    Executing,
    /// 挂起等待用户回答，不是终态
    AwaitingUser,
    Completed,
    Error,
}

impl AgentStage {
    /// 当前任务的终态
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentStage::Completed | AgentStage::Error)
    }

    /// 迭代循环是否应该继续
    pub fn is_active(self) -> bool {
        matches!(self, AgentStage::Planning | AgentStage::Executing)
    }
}

impl fmt::Display for AgentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStage::Planning => "planning",
            AgentStage::Executing => "executing",
            AgentStage::AwaitingUser => "awaiting_user",
            AgentStage::Completed => "completed",
            AgentStage::Error => "error",
        };
        f.write_str(s)
    }
}

/// 引擎完整状态：进程生命周期内只有一份，跨任务存活
#[derive(Debug, Clone)]
pub struct AgentState {
    pub stage: AgentStage,
    /// 当前用户请求；新任务开始时替换，任务内的恢复不改变
    pub current_task: String,
    pub history: ExecutionHistory,
    pub iteration_count: usize,
    pub max_iterations: usize,
    pub cancelled: bool,
    /// 仅在 stage == AwaitingUser 时存在
    pub pending_interaction: Option<InteractionRequest>,
    /// 专家级暂停进行中时存在
    pub resume_context: Option<ResumeContext>,
    /// 暂停的专家若经确认通道调用，这里保存原始调用；恢复后按工具调用记账
    pub resume_origin: Option<ToolCall>,
    /// 多步计划因瞬时故障中断时存在
    pub plan_interruption: Option<PlanInterruptionState>,
    /// 连续空计划计数，超过阈值即视为 Planner 故障
    pub empty_plan_streak: usize,
}

impl AgentState {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            stage: AgentStage::Planning,
            current_task: String::new(),
            history: ExecutionHistory::new(),
            iteration_count: 0,
            max_iterations,
            cancelled: false,
            pending_interaction: None,
            resume_context: None,
            resume_origin: None,
            plan_interruption: None,
            empty_plan_streak: 0,
        }
    }

    /// 投影为只读快照
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            stage: self.stage,
            current_task: self.current_task.clone(),
            iteration: self.iteration_count,
            max_iterations: self.max_iterations,
            pending: self.pending_interaction.as_ref().map(|p| p.kind),
            history_len: self.history.len(),
            turn: self.history.current_turn(),
            plan_recovery_pending: self.plan_interruption.is_some(),
            specialist_paused: self.resume_context.is_some(),
        }
    }
}

/// 观察者看到的状态投影，轻量且可序列化
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub stage: AgentStage,
    pub current_task: String,
    pub iteration: usize,
    pub max_iterations: usize,
    pub pending: Option<InteractionKind>,
    pub history_len: usize,
    pub turn: usize,
    pub plan_recovery_pending: bool,
    pub specialist_paused: bool,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        AgentState::new(0).snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_flags() {
        assert!(AgentStage::Planning.is_active());
        assert!(AgentStage::Executing.is_active());
        assert!(!AgentStage::AwaitingUser.is_active());
        assert!(!AgentStage::AwaitingUser.is_terminal());
        assert!(AgentStage::Completed.is_terminal());
        assert!(AgentStage::Error.is_terminal());
    }

    #[test]
    fn test_snapshot_of_fresh_state() {
        let state = AgentState::new(20);
        let snap = state.snapshot();
        assert_eq!(snap.stage, AgentStage::Planning);
        assert_eq!(snap.max_iterations, 20);
        assert_eq!(snap.history_len, 0);
        assert!(snap.pending.is_none());
        assert_eq!(AgentStage::AwaitingUser.to_string(), "awaiting_user");
    }
}
