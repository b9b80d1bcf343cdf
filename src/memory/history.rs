//! 执行历史：带类型的事件日志
//!
//! 每个事件一条不可变 ExecutionStep；任务进行中只追加，只在任务之间裁剪（保留最近 N 条）。
//! `iteration` 字段是对话「轮次」编号，由之前出现过的开轮标记数量推导，而非内层循环计数。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::LogEntryKind;
use crate::tools::ToolErrorCode;

/// 事件类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Agent 的内部推理
    Thought,
    ToolCall,
    /// 重复调用被拦截
    ToolCallSkipped,
    /// 给用户的回复
    Result,
    UserInteraction,
    PlanExecution,
    ForcedResponse,
    System,
}

/// 单条历史记录，写入后不再修改
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub kind: StepKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ToolErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    /// 是否为开轮标记（新的用户输入）
    #[serde(default)]
    pub opens_turn: bool,
    /// 所属轮次；出现在任何开轮标记之前的事件为 0
    pub iteration: usize,
}

impl ExecutionStep {
    pub fn is_successful_tool_call(&self) -> bool {
        self.kind == StepKind::ToolCall && self.success == Some(true)
    }
}

/// 写入历史前的草稿；轮次与时间戳由 ExecutionHistory 统一补齐
#[derive(Clone, Debug, Default)]
pub struct StepRecord {
    pub kind: Option<StepKind>,
    pub content: String,
    pub success: Option<bool>,
    pub tool_name: Option<String>,
    pub args: Option<Value>,
    pub result: Option<Value>,
    pub duration_ms: Option<u64>,
    pub error_code: Option<ToolErrorCode>,
    pub retry_count: Option<u32>,
    pub opens_turn: bool,
    /// 关键里程碑：会同步到会话存储
    pub milestone: bool,
    /// 显式指定同步到会话存储时的日志类别
    pub audit: Option<LogEntryKind>,
}

impl StepRecord {
    pub fn new(kind: StepKind, content: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            content: content.into(),
            ..Default::default()
        }
    }

    /// 开轮标记：一条新的用户输入
    pub fn turn_start(user_input: impl Into<String>) -> Self {
        Self {
            opens_turn: true,
            ..Self::new(StepKind::UserInteraction, user_input)
        }
    }

    pub fn tool(mut self, name: impl Into<String>, args: Value) -> Self {
        self.tool_name = Some(name.into());
        self.args = Some(args);
        self
    }

    pub fn outcome(mut self, success: bool, result: Option<Value>) -> Self {
        self.success = Some(success);
        self.result = result;
        self
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    pub fn error_code(mut self, code: ToolErrorCode) -> Self {
        self.error_code = Some(code);
        self
    }

    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = Some(n);
        self
    }

    pub fn milestone(mut self) -> Self {
        self.milestone = true;
        self
    }

    pub fn audit(mut self, kind: LogEntryKind) -> Self {
        self.audit = Some(kind);
        self
    }

    pub fn step_kind(&self) -> StepKind {
        self.kind.unwrap_or(StepKind::System)
    }
}

/// 追加式执行历史
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExecutionHistory {
    steps: Vec<ExecutionStep>,
    /// 累计接受过的开轮标记数，裁剪后仍然保留，保证轮次单调
    turns_opened: usize,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条记录：轮次 = 之前所有开轮标记的数量（自身是标记时 +1）
    pub fn push(&mut self, record: StepRecord) -> &ExecutionStep {
        if record.opens_turn {
            self.turns_opened += 1;
        }
        let step = ExecutionStep {
            kind: record.step_kind(),
            content: record.content,
            timestamp: Utc::now(),
            success: record.success,
            tool_name: record.tool_name,
            args: record.args,
            result: record.result,
            duration_ms: record.duration_ms,
            error_code: record.error_code,
            retry_count: record.retry_count,
            opens_turn: record.opens_turn,
            iteration: self.turns_opened,
        };
        self.steps.push(step);
        &self.steps[self.steps.len() - 1]
    }

    pub fn steps(&self) -> &[ExecutionStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&ExecutionStep> {
        self.steps.last()
    }

    /// 当前轮次编号（尚无任何用户输入时为 0）
    pub fn current_turn(&self) -> usize {
        self.turns_opened
    }

    /// 所有工具调用记录（按时间顺序）
    pub fn tool_calls(&self) -> impl DoubleEndedIterator<Item = &ExecutionStep> + '_ {
        self.steps.iter().filter(|s| s.kind == StepKind::ToolCall)
    }

    /// 最近 n 个工具调用的名称，按时间顺序
    pub fn recent_tool_names(&self, n: usize) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .tool_calls()
            .rev()
            .take(n)
            .filter_map(|s| s.tool_name.as_deref())
            .collect();
        names.reverse();
        names
    }

    pub fn count_kind(&self, kind: StepKind) -> usize {
        self.steps.iter().filter(|s| s.kind == kind).count()
    }

    /// 任务之间调用：只保留最近 keep 条
    pub fn trim_to(&mut self, keep: usize) {
        if self.steps.len() > keep {
            let drop = self.steps.len() - keep;
            self.steps.drain(..drop);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_turn_numbers_follow_markers() {
        let mut h = ExecutionHistory::new();
        h.push(StepRecord::new(StepKind::Thought, "early"));
        h.push(StepRecord::turn_start("hello"));
        h.push(StepRecord::new(StepKind::Thought, "thinking"));
        h.push(StepRecord::turn_start("again"));
        h.push(StepRecord::new(StepKind::ToolCall, "search").tool("search", json!({})));

        let turns: Vec<usize> = h.steps().iter().map(|s| s.iteration).collect();
        assert_eq!(turns, vec![0, 1, 1, 2, 2]);
        assert_eq!(h.current_turn(), 2);
    }

    #[test]
    fn test_turn_numbers_monotonic_after_trim() {
        let mut h = ExecutionHistory::new();
        for i in 0..5 {
            h.push(StepRecord::turn_start(format!("task {i}")));
            h.push(StepRecord::new(StepKind::Result, "ok"));
        }
        h.trim_to(3);
        assert_eq!(h.len(), 3);
        h.push(StepRecord::turn_start("task 5"));
        let turns: Vec<usize> = h.steps().iter().map(|s| s.iteration).collect();
        assert!(turns.windows(2).all(|w| w[0] <= w[1]), "{turns:?}");
        assert_eq!(h.last().map(|s| s.iteration), Some(6));
    }

    #[test]
    fn test_recent_tool_names_in_order() {
        let mut h = ExecutionHistory::new();
        for name in ["a", "b", "c", "d"] {
            h.push(StepRecord::new(StepKind::ToolCall, name).tool(name, json!({})));
            h.push(StepRecord::new(StepKind::Thought, "between"));
        }
        assert_eq!(h.recent_tool_names(3), vec!["b", "c", "d"]);
        assert_eq!(h.recent_tool_names(10).len(), 4);
    }

    #[test]
    fn test_step_serializes_snake_case_kind() {
        let mut h = ExecutionHistory::new();
        let step = h
            .push(StepRecord::new(StepKind::ToolCallSkipped, "dup").tool("edit", json!({"x": 1})))
            .clone();
        let v = serde_json::to_value(&step).unwrap();
        assert_eq!(v["kind"], "tool_call_skipped");
        assert!(v.get("duration_ms").is_none());
    }
}
