//! 死循环检测与重复调用拦截
//!
//! 检测只看当前轮次内的工具调用：同名连续 3 次、A-B-A-B 交替、最近 5 次里有 3 次以上
//! 「建议下一步」自省，或迭代数已达上限。命中后由引擎用最近的成功操作强制收尾。

use std::fmt;
use std::time::Duration;

use chrono::Utc;

use crate::core::AgentState;
use crate::memory::{truncate_chars, ExecutionHistory, ExecutionStep, StepKind};
use crate::react::ToolCall;

const REPEAT_RUN: usize = 3;
const SELF_REFLECTION_WINDOW: usize = 5;
const SELF_REFLECTION_LIMIT: usize = 3;
const MAX_SUMMARY_ACTIONS: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopReason {
    IterationCap { max: usize },
    Repetition { tool: String },
    Alternation { first: String, second: String },
    SelfReflection,
}

impl fmt::Display for LoopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopReason::IterationCap { max } => write!(f, "reached iteration cap ({})", max),
            LoopReason::Repetition { tool } => write!(f, "tool '{}' repeated {} times", tool, REPEAT_RUN),
            LoopReason::Alternation { first, second } => {
                write!(f, "alternating between '{}' and '{}'", first, second)
            }
            LoopReason::SelfReflection => write!(f, "repeated next-action suggestions"),
        }
    }
}

fn is_tool_attempt(step: &ExecutionStep) -> bool {
    matches!(step.kind, StepKind::ToolCall | StepKind::ToolCallSkipped)
}

#[derive(Clone, Debug)]
pub struct LoopDetector {
    suggest_tool: String,
}

impl LoopDetector {
    pub fn new(suggest_tool: impl Into<String>) -> Self {
        Self {
            suggest_tool: suggest_tool.into(),
        }
    }

    /// 当前轮次内的工具调用名称（含被拦截的重复调用），按时间顺序
    fn current_turn_tools(history: &ExecutionHistory) -> Vec<&str> {
        let turn = history.current_turn();
        history
            .steps()
            .iter()
            .filter(|s| s.iteration == turn && is_tool_attempt(s))
            .filter_map(|s| s.tool_name.as_deref())
            .collect()
    }

    pub fn detect(&self, state: &AgentState) -> Option<LoopReason> {
        if state.max_iterations > 0 && state.iteration_count >= state.max_iterations {
            return Some(LoopReason::IterationCap {
                max: state.max_iterations,
            });
        }
        let names = Self::current_turn_tools(&state.history);

        if names.len() >= REPEAT_RUN {
            let tail = &names[names.len() - REPEAT_RUN..];
            if tail.iter().all(|n| *n == tail[0]) {
                return Some(LoopReason::Repetition {
                    tool: tail[0].to_string(),
                });
            }
        }

        if names.len() >= 4 {
            let t = &names[names.len() - 4..];
            if t[0] != t[1] && t[0] == t[2] && t[1] == t[3] {
                return Some(LoopReason::Alternation {
                    first: t[0].to_string(),
                    second: t[1].to_string(),
                });
            }
        }

        let recent = &names[names.len().saturating_sub(SELF_REFLECTION_WINDOW)..];
        if recent.iter().filter(|n| **n == self.suggest_tool).count() >= SELF_REFLECTION_LIMIT {
            return Some(LoopReason::SelfReflection);
        }
        None
    }
}

fn preview(step: &ExecutionStep) -> String {
    let text = match &step.result {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
        None => String::new(),
    };
    truncate_chars(&text, 120)
}

/// 强制收尾的回复：总结最近（至多 10 个）成功的工具操作；历史为空也能给出文本
pub fn forced_summary(history: &ExecutionHistory) -> String {
    let mut recent: Vec<&ExecutionStep> = history
        .tool_calls()
        .rev()
        .filter(|s| s.is_successful_tool_call())
        .take(MAX_SUMMARY_ACTIONS)
        .collect();
    recent.reverse();

    if recent.is_empty() {
        return "我已尽力处理该任务，但没有可以总结的成功操作。请补充信息或换一种方式描述任务。"
            .to_string();
    }
    let mut s = String::from("根据以下最近完成的操作，该任务已处理完毕：\n");
    for (i, step) in recent.iter().enumerate() {
        let name = step.tool_name.as_deref().unwrap_or("unknown");
        let p = preview(step);
        if p.is_empty() {
            s.push_str(&format!("{}. {}\n", i + 1, name));
        } else {
            s.push_str(&format!("{}. {}: {}\n", i + 1, name, p));
        }
    }
    s.trim_end().to_string()
}

/// 窗口内成功执行过的同名同参数调用
pub fn find_recent_duplicate<'a>(
    history: &'a ExecutionHistory,
    call: &ToolCall,
    window: Duration,
) -> Option<&'a ExecutionStep> {
    let args = serde_json::to_string(&call.args).ok()?;
    let window = chrono::Duration::from_std(window).ok()?;
    let now = Utc::now();
    history.tool_calls().rev().find(|s| {
        s.success == Some(true)
            && s.tool_name.as_deref() == Some(call.tool.as_str())
            && now.signed_duration_since(s.timestamp) <= window
            && s.args
                .as_ref()
                .and_then(|a| serde_json::to_string(a).ok())
                .is_some_and(|a| a == args)
    })
}
