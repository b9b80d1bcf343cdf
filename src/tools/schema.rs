//! 工具参数 Schema（schemars 自动生成）
//!
//! 已知工具使用带类型的参数结构；未知工具保持 serde_json::Value，走默认格式化。

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// 工具调用请求格式：`{"tool": "...", "args": {...}}`（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，如 search、edit_document、final_answer
    pub tool: String,
    /// 工具参数，依工具不同而不同
    pub args: HashMap<String, Value>,
}

/// final_answer 工具的结构化参数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FinalAnswerArgs {
    /// 一句话总结
    pub summary: String,
    /// 最终结果正文
    pub result: String,
    /// 完成的事项
    pub achievements: Vec<String>,
    /// 建议的后续步骤
    pub next_steps: Vec<String>,
}

impl FinalAnswerArgs {
    /// 宽松解析：字段缺失用默认值，整体不是对象时把文本当作 result
    pub fn from_args(args: &Value) -> Self {
        match args {
            Value::Object(_) => serde_json::from_value(args.clone()).unwrap_or_default(),
            Value::String(s) => Self {
                result: s.clone(),
                ..Default::default()
            },
            _ => Self::default(),
        }
    }

    /// 渲染给用户的文本
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.summary.is_empty() {
            out.push_str(&format!("## 总结\n{}\n\n", self.summary));
        }
        if !self.result.is_empty() {
            out.push_str(&format!("## 结果\n{}\n\n", self.result));
        }
        if !self.achievements.is_empty() {
            out.push_str("## 已完成\n");
            for a in &self.achievements {
                out.push_str(&format!("- {}\n", a));
            }
            out.push('\n');
        }
        if !self.next_steps.is_empty() {
            out.push_str("## 后续建议\n");
            for n in &self.next_steps {
                out.push_str(&format!("- {}\n", n));
            }
        }
        out.trim_end().to_string()
    }
}

/// 返回工具调用的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

/// final_answer 参数的 JSON Schema
pub fn final_answer_schema() -> Value {
    serde_json::to_value(schema_for!(FinalAnswerArgs)).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_final_answer_lenient_parse() {
        let args = json!({"summary": "done", "achievements": ["a", "b"]});
        let parsed = FinalAnswerArgs::from_args(&args);
        assert_eq!(parsed.summary, "done");
        assert_eq!(parsed.achievements.len(), 2);
        assert!(parsed.result.is_empty());

        let rendered = parsed.render();
        assert!(rendered.contains("## 总结"));
        assert!(rendered.contains("- b"));
        assert!(!rendered.contains("## 结果"));
    }

    #[test]
    fn test_final_answer_from_plain_text() {
        let parsed = FinalAnswerArgs::from_args(&json!("all good"));
        assert_eq!(parsed.result, "all good");
    }

    #[test]
    fn test_schemas_mention_fields() {
        assert!(final_answer_schema().to_string().contains("next_steps"));
        assert!(tool_call_schema_json().contains("tool"));
    }
}
