//! 工具层：Tool trait、注册表、执行器、风险策略与内置工具
//!
//! 具体的文档编辑 / 检索工具是外部实现；这里只保留引擎运行所需的 final_answer、交互类工具与演示用 echo。

pub mod ask_user;
pub mod echo;
pub mod executor;
pub mod final_answer;
pub mod policy;
pub mod registry;
pub mod schema;

pub use ask_user::UserPromptTool;
pub use echo::EchoTool;
pub use executor::{
    display_value, RegistryToolExecutor, ToolError, ToolErrorCode, ToolExecutor, ToolOutput,
};
pub use final_answer::FinalAnswerTool;
pub use policy::{ConfigRiskPolicy, DispatchMode, RiskLevel, RiskPolicy, ToolClassification};
pub use registry::{Tool, ToolRegistry};
pub use schema::{tool_call_schema_json, FinalAnswerArgs};

pub const DEFAULT_FINAL_ANSWER_TOOL: &str = "final_answer";
pub const DEFAULT_SUGGEST_TOOL: &str = "suggest_next_action";
pub const DEFAULT_SPECIALIST_TOOL: &str = "invoke_specialist";

/// 已知工具的标签联合；未知名称落到 Other，使用默认格式化
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolKind {
    FinalAnswer,
    SuggestNextAction,
    Specialist,
    Edit,
    Search,
    Other(String),
}

/// 引擎需要识别的特殊工具名（可配置）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolNames {
    pub final_answer: String,
    pub suggest_next_action: String,
    pub specialist: String,
}

impl Default for ToolNames {
    fn default() -> Self {
        Self {
            final_answer: DEFAULT_FINAL_ANSWER_TOOL.to_string(),
            suggest_next_action: DEFAULT_SUGGEST_TOOL.to_string(),
            specialist: DEFAULT_SPECIALIST_TOOL.to_string(),
        }
    }
}

impl ToolNames {
    pub fn kind(&self, name: &str) -> ToolKind {
        if name == self.final_answer {
            ToolKind::FinalAnswer
        } else if name == self.suggest_next_action {
            ToolKind::SuggestNextAction
        } else if name == self.specialist {
            ToolKind::Specialist
        } else {
            match name {
                "edit" | "edit_document" | "apply_edits" => ToolKind::Edit,
                "search" | "search_documents" | "grep" => ToolKind::Search,
                other => ToolKind::Other(other.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_kind_routing() {
        let names = ToolNames::default();
        assert_eq!(names.kind("final_answer"), ToolKind::FinalAnswer);
        assert_eq!(names.kind("suggest_next_action"), ToolKind::SuggestNextAction);
        assert_eq!(names.kind("apply_edits"), ToolKind::Edit);
        assert_eq!(names.kind("search"), ToolKind::Search);
        assert_eq!(names.kind("mystery"), ToolKind::Other("mystery".to_string()));
    }
}
