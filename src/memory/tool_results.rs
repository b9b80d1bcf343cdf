//! 工具结果窗口：给 Planner 的有界工具结果上下文
//!
//! 先保留最近 K 轮内带结果的工具调用，再截取最近 M 条；每条带轮次标签，
//! 并按工具类别格式化（编辑类给出成功/失败计数与成功率，未知工具走通用截断）。

use serde_json::Value;

use crate::config::ContextSection;
use crate::memory::{ExecutionStep, StepKind};
use crate::tools::{ToolKind, ToolNames};

/// 窗口参数
#[derive(Clone, Debug)]
pub struct ToolResultWindow {
    pub turn_window: usize,
    pub max_results: usize,
    pub max_chars: usize,
}

impl Default for ToolResultWindow {
    fn default() -> Self {
        Self::from_config(&ContextSection::default())
    }
}

impl ToolResultWindow {
    pub fn from_config(cfg: &ContextSection) -> Self {
        Self {
            turn_window: cfg.turn_window.max(1),
            max_results: cfg.max_tool_results,
            max_chars: cfg.max_result_chars,
        }
    }

    /// 选出窗口内的工具调用，按时间顺序
    pub fn select<'a>(&self, steps: &'a [ExecutionStep]) -> Vec<&'a ExecutionStep> {
        let with_result: Vec<&ExecutionStep> = steps
            .iter()
            .filter(|s| s.kind == StepKind::ToolCall && s.result.is_some())
            .collect();
        let Some(latest) = with_result.iter().map(|s| s.iteration).max() else {
            return Vec::new();
        };
        let oldest = latest.saturating_sub(self.turn_window.saturating_sub(1));
        let in_window: Vec<&ExecutionStep> = with_result
            .into_iter()
            .filter(|s| s.iteration >= oldest)
            .collect();
        let skip = in_window.len().saturating_sub(self.max_results);
        in_window.into_iter().skip(skip).collect()
    }

    pub fn render(&self, steps: &[ExecutionStep], names: &ToolNames) -> String {
        self.select(steps)
            .into_iter()
            .map(|s| self.render_one(s, names))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render_one(&self, step: &ExecutionStep, names: &ToolNames) -> String {
        let name = step.tool_name.as_deref().unwrap_or("unknown");
        let status = match (step.success, step.error_code) {
            (Some(false), Some(code)) => format!("failed, {}", code.as_str()),
            (Some(false), None) => "failed".to_string(),
            _ => "ok".to_string(),
        };
        let body = step
            .result
            .as_ref()
            .map(|r| format_result(&names.kind(name), r, self.max_chars))
            .unwrap_or_default();
        format!("[Turn {}] {} ({}): {}", step.iteration, name, status, body)
    }
}

/// 计数字段：数字直接取值，数组取长度
fn count_of(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::Array(items) => Some(items.len() as u64),
        _ => None,
    }
}

/// 按字符数截断，超出部分以 `...` 结尾
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

fn generic(result: &Value, max_chars: usize) -> String {
    let text = match result {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    truncate_chars(&text, max_chars)
}

/// 按工具类别格式化结果
pub fn format_result(kind: &ToolKind, result: &Value, max_chars: usize) -> String {
    match kind {
        ToolKind::Edit => {
            let applied = count_of(result.get("applied"));
            let failed = count_of(result.get("failed"));
            match (applied, failed) {
                (None, None) => generic(result, max_chars),
                (applied, failed) => {
                    let (a, f) = (applied.unwrap_or(0), failed.unwrap_or(0));
                    let total = a + f;
                    let rate = if total == 0 { 0 } else { a * 100 / total };
                    format!("applied {}, failed {} ({}% success)", a, f, rate)
                }
            }
        }
        ToolKind::Search => {
            let hits = result
                .get("results")
                .or_else(|| result.get("hits"))
                .and_then(Value::as_array);
            match hits {
                Some(items) => {
                    let titles: Vec<String> = items
                        .iter()
                        .take(3)
                        .map(|h| match h {
                            Value::String(s) => s.clone(),
                            other => other
                                .get("title")
                                .and_then(Value::as_str)
                                .map(str::to_string)
                                .unwrap_or_else(|| other.to_string()),
                        })
                        .collect();
                    truncate_chars(
                        &format!("{} hits: {}", items.len(), titles.join("; ")),
                        max_chars,
                    )
                }
                None => generic(result, max_chars),
            }
        }
        ToolKind::FinalAnswer | ToolKind::Specialist => {
            match result
                .get("summary")
                .or_else(|| result.get("result"))
                .and_then(Value::as_str)
            {
                Some(s) => truncate_chars(s, max_chars),
                None => generic(result, max_chars),
            }
        }
        ToolKind::SuggestNextAction | ToolKind::Other(_) => generic(result, max_chars),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ExecutionHistory, StepRecord};
    use serde_json::json;

    fn tool(h: &mut ExecutionHistory, name: &str, result: Value) {
        h.push(
            StepRecord::new(StepKind::ToolCall, name)
                .tool(name, json!({}))
                .outcome(true, Some(result)),
        );
    }

    #[test]
    fn test_window_limits_turns_then_count() {
        let mut h = ExecutionHistory::new();
        for turn in 0..6 {
            h.push(StepRecord::turn_start(format!("task {turn}")));
            tool(&mut h, "lookup", json!(format!("turn {turn} a")));
            tool(&mut h, "lookup", json!(format!("turn {turn} b")));
        }
        let window = ToolResultWindow {
            turn_window: 2,
            max_results: 3,
            max_chars: 100,
        };
        let picked = window.select(h.steps());
        assert_eq!(picked.len(), 3);
        assert!(picked.iter().all(|s| s.iteration >= 5));
        assert_eq!(picked[2].result, Some(json!("turn 5 b")));
    }

    #[test]
    fn test_zero_turn_window_keeps_latest_turn() {
        let mut h = ExecutionHistory::new();
        for turn in 0..3 {
            h.push(StepRecord::turn_start(format!("task {turn}")));
            tool(&mut h, "lookup", json!(format!("turn {turn}")));
        }
        let window = ToolResultWindow {
            turn_window: 0,
            max_results: 5,
            max_chars: 100,
        };
        let picked = window.select(h.steps());
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].result, Some(json!("turn 2")));
    }

    #[test]
    fn test_steps_without_result_are_ignored() {
        let mut h = ExecutionHistory::new();
        h.push(StepRecord::turn_start("x"));
        h.push(StepRecord::new(StepKind::ToolCall, "a").tool("a", json!({})));
        assert!(ToolResultWindow::default().select(h.steps()).is_empty());
    }

    #[test]
    fn test_edit_formatter_reports_success_rate() {
        let text = format_result(
            &ToolKind::Edit,
            &json!({"applied": ["e1", "e2", "e3"], "failed": 1}),
            200,
        );
        assert_eq!(text, "applied 3, failed 1 (75% success)");
    }

    #[test]
    fn test_search_and_default_formatters() {
        let text = format_result(
            &ToolKind::Search,
            &json!({"results": [{"title": "Intro"}, "Body"]}),
            200,
        );
        assert_eq!(text, "2 hits: Intro; Body");

        let long = "x".repeat(50);
        let text = format_result(&ToolKind::Other("misc".into()), &json!(long), 10);
        assert_eq!(text, format!("{}...", "x".repeat(10)));
    }

    #[test]
    fn test_render_tags_turn_and_failure() {
        let mut h = ExecutionHistory::new();
        h.push(StepRecord::turn_start("x"));
        h.push(
            StepRecord::new(StepKind::ToolCall, "search")
                .tool("search", json!({}))
                .outcome(false, Some(json!("connection reset")))
                .error_code(crate::tools::ToolErrorCode::NetworkError),
        );
        let text = ToolResultWindow::default().render(h.steps(), &ToolNames::default());
        assert_eq!(text, "[Turn 1] search (failed, network_error): connection reset");
    }
}
