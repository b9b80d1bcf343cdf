//! final_answer 工具：结束任务并返回结构化结果

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::schema::{final_answer_schema, FinalAnswerArgs};
use crate::tools::{Tool, ToolError, ToolOutput};

pub struct FinalAnswerTool {
    name: String,
}

impl FinalAnswerTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for FinalAnswerTool {
    fn default() -> Self {
        Self::new(crate::tools::DEFAULT_FINAL_ANSWER_TOOL)
    }
}

#[async_trait]
impl Tool for FinalAnswerTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Finish the task. Args: {\"summary\", \"result\", \"achievements\": [], \"next_steps\": []}"
    }

    fn parameters_schema(&self) -> Value {
        final_answer_schema()
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let parsed = FinalAnswerArgs::from_args(&args);
        serde_json::to_value(&parsed)
            .map(ToolOutput::json)
            .map_err(|e| ToolError::Failed(e.to_string()))
    }
}
