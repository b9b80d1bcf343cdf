//! echo 工具：本地演示与测试用，不接触任何文档

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::{Tool, ToolError, ToolOutput};

/// 回显 `text`；缺参数视为调用错误
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text back unchanged. Useful to check the tool loop."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {"type": "string", "description": "text to echo"}
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        match args.get("text").and_then(Value::as_str) {
            Some(text) => Ok(ToolOutput::text(text)),
            None => Err(ToolError::Failed(
                "invalid argument: missing required field 'text'".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_text_is_invalid_argument() {
        let err = EchoTool.execute(json!({})).await.unwrap_err();
        assert!(err.to_string().contains("invalid argument"));
    }
}
