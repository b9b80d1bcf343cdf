//! 交互类内置工具（ask_user / request_choice / confirm_action）
//!
//! 引擎先挂起向用户提问，用户回答后才真正执行；执行只是把回答作为观察结果带回给 Planner。

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::{Tool, ToolError, ToolOutput};

pub struct UserPromptTool {
    name: String,
}

impl UserPromptTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Tool for UserPromptTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Ask the user. Args: {\"question\"}, optionally \"options\": [] for a choice. \
         The observation carries the user's answer."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": {"type": "string"},
                "options": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        // 确认类问题在用户同意后才会执行，没有额外回答
        let answer = args
            .get("userInput")
            .or_else(|| args.get("userChoice"))
            .cloned()
            .unwrap_or(Value::Bool(true));
        Ok(ToolOutput::json(json!({
            "question": args.get("question").cloned().unwrap_or(Value::Null),
            "answer": answer,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_answer_comes_back_as_observation() {
        let tool = UserPromptTool::new("ask_user");
        let out = tool
            .execute(json!({"question": "Tone?", "userInput": "formal"}))
            .await
            .unwrap();
        assert_eq!(out.content["answer"], "formal");

        let out = UserPromptTool::new("confirm_action")
            .execute(json!({"question": "Publish?"}))
            .await
            .unwrap();
        assert_eq!(out.content["answer"], true);
    }
}
