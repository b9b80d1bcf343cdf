//! Planner：外部规划组件的接口与 LLM 适配
//!
//! 引擎每轮调用一次 `plan(request)`，得到 Plan：直接回复、一组 tool call、或多步执行计划（可组合）。
//! LlmPlanner 把规划输入渲染成对话消息交给 LlmClient，再用 parse_plan 从输出中提取 JSON。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::plan::ExecutionPlan;
use crate::session::SessionSnapshot;

/// 单个工具调用（`{"tool": "search", "args": {...}}`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }

    /// 向参数对象注入字段；参数不是对象时包一层
    pub fn with_arg(mut self, key: &str, value: Value) -> Self {
        if !self.args.is_object() {
            let original = std::mem::take(&mut self.args);
            let mut map = serde_json::Map::new();
            if !original.is_null() {
                map.insert("value".to_string(), original);
            }
            self.args = Value::Object(map);
        }
        if let Value::Object(map) = &mut self.args {
            map.insert(key.to_string(), value);
        }
        self
    }
}

/// Planner 的一次输出
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    /// 内部推理（不直接展示给用户）
    pub thought: Option<String>,
    /// 给用户的回复
    pub response: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub execution_plan: Option<ExecutionPlan>,
}

/// 引擎据此决定下一步动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanShape {
    MultiStep,
    DirectAnswer,
    AnswerWithTools,
    ToolsOnly,
    Empty,
}

impl Plan {
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            response: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn tools(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Default::default()
        }
    }

    pub fn multi_step(plan: ExecutionPlan) -> Self {
        Self {
            execution_plan: Some(plan),
            ..Default::default()
        }
    }

    pub fn with_thought(mut self, thought: impl Into<String>) -> Self {
        self.thought = Some(thought.into());
        self
    }

    fn has_response(&self) -> bool {
        self.response.as_deref().is_some_and(|r| !r.trim().is_empty())
    }

    pub fn shape(&self) -> PlanShape {
        if self.execution_plan.as_ref().is_some_and(|p| !p.is_empty()) {
            PlanShape::MultiStep
        } else {
            match (self.has_response(), self.tool_calls.is_empty()) {
                (true, true) => PlanShape::DirectAnswer,
                (true, false) => PlanShape::AnswerWithTools,
                (false, false) => PlanShape::ToolsOnly,
                (false, true) => PlanShape::Empty,
            }
        }
    }
}

/// 规划输入
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub task: &'a str,
    pub session: &'a SessionSnapshot,
    /// 按轮次组织的历史叙述
    pub history: &'a str,
    /// 有界的工具结果窗口
    pub tool_results: &'a str,
    pub iteration: usize,
}

/// 外部 Planner
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: PlanRequest<'_>) -> Result<Plan, AgentError>;
}

#[derive(Deserialize)]
struct RawStep {
    specialist: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    input: Value,
}

#[derive(Deserialize)]
struct RawExecutionPlan {
    #[serde(default)]
    description: String,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Deserialize)]
struct RawPlan {
    thought: Option<String>,
    response: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
    plan: Option<RawExecutionPlan>,
    tool: Option<String>,
    #[serde(default)]
    args: Value,
}

/// 从 LLM 文本中提取 JSON 块（```json ... ``` 或首个 { 到末个 }）
fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// 解析 LLM 输出：含 JSON 则按结构解析，否则整段视为直接回复
pub fn parse_plan(output: &str) -> Result<Plan, AgentError> {
    let trimmed = output.trim();
    let Some(json_str) = extract_json(trimmed) else {
        return Ok(if trimmed.is_empty() {
            Plan::default()
        } else {
            Plan::answer(trimmed)
        });
    };

    let raw: RawPlan = serde_json::from_str(json_str)
        .map_err(|e| AgentError::Planner(format!("JSON parse error: {}: {}", e, json_str)))?;

    let mut tool_calls = raw.tool_calls;
    if let Some(tool) = raw.tool.filter(|t| !t.is_empty()) {
        tool_calls.push(ToolCall::new(tool, raw.args));
    }
    let execution_plan = raw.plan.map(|p| {
        ExecutionPlan::new(
            p.description,
            p.steps
                .into_iter()
                .map(|s| (s.specialist, s.description, s.input))
                .collect(),
        )
    });

    Ok(Plan {
        thought: raw.thought,
        response: raw.response,
        tool_calls,
        execution_plan,
    })
}

/// 基于 LlmClient 的 Planner：持有 LLM 与 system prompt
pub struct LlmPlanner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    fn render(request: &PlanRequest<'_>) -> String {
        let mut s = format!("## Task\n{}\n\n", request.task);
        if let Some(project) = &request.session.project {
            s.push_str(&format!("## Project\n{}\n\n", project));
        }
        if !request.history.is_empty() {
            s.push_str(&format!("## Conversation so far\n{}\n\n", request.history));
        }
        if !request.tool_results.is_empty() {
            s.push_str(&format!("## Recent tool results\n{}\n\n", request.tool_results));
        }
        s.push_str(&format!("(iteration {})", request.iteration));
        s
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, request: PlanRequest<'_>) -> Result<Plan, AgentError> {
        let messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(Self::render(&request)),
        ];
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(AgentError::Planner)?;
        tracing::debug!(chars = output.len(), "planner output");
        parse_plan(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use serde_json::json;

    #[test]
    fn test_plain_text_is_direct_answer() {
        let plan = parse_plan("Hello there").unwrap();
        assert_eq!(plan.shape(), PlanShape::DirectAnswer);
        assert_eq!(plan.response.as_deref(), Some("Hello there"));
    }

    #[test]
    fn test_compact_tool_call() {
        let plan = parse_plan(r#"{"tool": "search", "args": {"q": "rust"}}"#).unwrap();
        assert_eq!(plan.shape(), PlanShape::ToolsOnly);
        assert_eq!(plan.tool_calls[0].tool, "search");
        assert_eq!(plan.tool_calls[0].args["q"], "rust");
    }

    #[test]
    fn test_fenced_full_plan() {
        let text = "thinking...\n```json\n{\"thought\": \"need two sections\", \"plan\": {\"description\": \"doc\", \"steps\": [{\"specialist\": \"writer\", \"description\": \"intro\"}, {\"specialist\": \"writer\", \"description\": \"body\"}]}}\n```";
        let plan = parse_plan(text).unwrap();
        assert_eq!(plan.shape(), PlanShape::MultiStep);
        assert_eq!(plan.thought.as_deref(), Some("need two sections"));
        let steps = &plan.execution_plan.unwrap().steps;
        assert_eq!(steps[1].number, 2);
        assert_eq!(steps[1].description, "body");
    }

    #[test]
    fn test_answer_with_tools_and_empty() {
        let plan = parse_plan(r#"{"response": "on it", "tool_calls": [{"tool": "search"}]}"#).unwrap();
        assert_eq!(plan.shape(), PlanShape::AnswerWithTools);
        assert_eq!(parse_plan("   ").unwrap().shape(), PlanShape::Empty);
        assert_eq!(parse_plan(r#"{"response": "  "}"#).unwrap().shape(), PlanShape::Empty);
    }

    #[test]
    fn test_broken_json_is_planner_error() {
        let err = parse_plan(r#"{"tool": "search", "args": }"#).unwrap_err();
        assert!(matches!(err, AgentError::Planner(_)));
    }

    #[test]
    fn test_with_arg_wraps_non_object() {
        let call = ToolCall::new("pick", json!("raw")).with_arg("userChoice", json!("A"));
        assert_eq!(call.args, json!({"value": "raw", "userChoice": "A"}));
        let call = ToolCall::new("pick", Value::Null).with_arg("userInput", json!("x"));
        assert_eq!(call.args, json!({"userInput": "x"}));
    }

    #[tokio::test]
    async fn test_llm_planner_with_mock() {
        let planner = LlmPlanner::new(Arc::new(MockLlmClient), "system");
        let session = SessionSnapshot::default();
        let plan = planner
            .plan(PlanRequest {
                task: "draft a summary",
                session: &session,
                history: "",
                tool_results: "",
                iteration: 0,
            })
            .await
            .unwrap();
        assert_eq!(plan.tool_calls[0].tool, "final_answer");
    }
}
