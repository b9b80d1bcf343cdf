//! 引擎错误类型
//!
//! 只有契约违规（忙碌时提交新任务、非等待状态下提交回答）会以 Err 返回给调用方；
//! Planner / PlanRunner 异常在循环边界被吸收，转为 `stage = error` 并写入执行历史。

use thiserror::Error;

use crate::core::AgentStage;

/// 引擎级错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// 正在等待用户回答时又收到新任务（引擎不可重入，不排队）
    #[error("Engine is busy (stage: {stage}); answer the pending request or cancel first")]
    Busy { stage: AgentStage },

    #[error("No pending interaction (stage: {stage})")]
    NotAwaitingUser { stage: AgentStage },

    #[error("Planner error: {0}")]
    Planner(String),

    #[error("Plan runner error: {0}")]
    PlanRunner(String),

    #[error("Session store error: {0}")]
    Session(String),

    #[error("Config error: {0}")]
    Config(String),

    /// 主动失败规则表中的正则无法编译
    #[error("Invalid failure rule '{pattern}': {reason}")]
    InvalidRule { pattern: String, reason: String },

    #[error("Cancelled")]
    Cancelled,
}

impl AgentError {
    /// 致命错误时附带给用户的下一步建议
    pub fn next_action_hint(&self) -> &'static str {
        match self {
            AgentError::Planner(_) => "请换一种说法重新描述任务。",
            AgentError::PlanRunner(_) => "请重新开始该任务。",
            AgentError::Busy { .. } => "请先回答当前问题，或取消任务。",
            AgentError::NotAwaitingUser { .. } => "当前没有待回答的问题，请直接提交新任务。",
            _ => "请重新开始该任务。",
        }
    }
}
