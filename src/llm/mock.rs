//! Mock LLM 客户端（用于演示与测试，无需 API）
//!
//! 取最后一条 User 消息中的任务，回复一个 final_answer Tool Call，便于本地跑通整个循环。

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::{Message, Role};

/// Mock 客户端：把任务原样作为最终结果
#[derive(Debug, Default)]
pub struct MockLlmClient;

/// 从 LlmPlanner 渲染的消息中取出任务段
fn task_of(content: &str) -> &str {
    let Some(rest) = content.split("## Task\n").nth(1) else {
        return content.trim();
    };
    rest.split("\n\n").next().unwrap_or(rest).trim()
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| task_of(&m.content))
            .unwrap_or("(no input)");

        let call = serde_json::json!({
            "thought": "Mock planner answers directly.",
            "tool": crate::tools::DEFAULT_FINAL_ANSWER_TOOL,
            "args": {
                "summary": "Echo from Mock",
                "result": last_user,
            }
        });
        Ok(call.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_of_rendered_prompt() {
        assert_eq!(task_of("## Task\nwrite intro\n\n## Project\nbook"), "write intro");
        assert_eq!(task_of("  plain  "), "plain");
    }

    #[tokio::test]
    async fn test_mock_returns_final_answer_call() {
        let out = MockLlmClient
            .complete(&[Message::user("## Task\nhi \"there\"\n\n(iteration 0)")])
            .await
            .unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["tool"], "final_answer");
        assert_eq!(v["args"]["result"], "hi \"there\"");
    }
}
