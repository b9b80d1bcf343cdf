//! 用户交互请求与回答解析
//!
//! 对 confirmation / choice / input 三类请求，把用户的原始文本解析成下一步动作；
//! continue_conversation 不在这里解析，由状态机当作新一轮输入处理。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::react::ToolCall;

/// 计划恢复选择使用的内部工具名，解析器据此路由到继续 / 终止分支
pub const PLAN_RECOVERY_TOOL: &str = "__plan_recovery__";
pub const CONTINUE_PLAN_OPTION: &str = "继续执行计划 (continue)";
pub const END_PLAN_OPTION: &str = "结束计划 (end)";

const AFFIRMATIVE: &[&str] = &[
    "yes", "y", "yeah", "yep", "ok", "okay", "sure", "confirm", "proceed", "go", "si", "sí",
    "oui", "ja", "da", "是", "是的", "好", "好的", "确认", "对", "可以", "行", "继续",
];

const NEGATIVE: &[&str] = &[
    "no", "n", "nope", "cancel", "stop", "abort", "non", "nein", "否", "不", "不要", "取消",
    "算了", "不用", "不行",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Confirmation,
    Choice,
    Input,
    /// Agent 给出了自由回复，等待用户继续对话
    ContinueConversation,
}

/// 等待中的交互请求
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionRequest {
    pub kind: InteractionKind,
    pub message: String,
    #[serde(default)]
    pub options: Vec<String>,
    /// 回答后要继续执行的调用
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    /// 发起请求的工具已经执行过时的结果；存在时回答后不得重跑
    #[serde(default)]
    pub original_result: Option<Value>,
}

impl InteractionRequest {
    fn new(kind: InteractionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            options: Vec::new(),
            tool_call: None,
            original_result: None,
        }
    }

    pub fn confirmation(message: impl Into<String>, call: ToolCall) -> Self {
        Self {
            tool_call: Some(call),
            ..Self::new(InteractionKind::Confirmation, message)
        }
    }

    pub fn choice(message: impl Into<String>, options: Vec<String>, call: Option<ToolCall>) -> Self {
        Self {
            options,
            tool_call: call,
            ..Self::new(InteractionKind::Choice, message)
        }
    }

    pub fn input(
        message: impl Into<String>,
        call: Option<ToolCall>,
        original_result: Option<Value>,
    ) -> Self {
        Self {
            tool_call: call,
            original_result,
            ..Self::new(InteractionKind::Input, message)
        }
    }

    pub fn continue_conversation(message: impl Into<String>) -> Self {
        Self::new(InteractionKind::ContinueConversation, message)
    }

    /// 计划中断后的二选一
    pub fn plan_recovery(message: impl Into<String>) -> Self {
        Self::choice(
            message,
            vec![CONTINUE_PLAN_OPTION.to_string(), END_PLAN_OPTION.to_string()],
            Some(ToolCall::new(PLAN_RECOVERY_TOOL, Value::Null)),
        )
    }

    pub fn is_plan_recovery(&self) -> bool {
        self.tool_call
            .as_ref()
            .is_some_and(|c| c.tool == PLAN_RECOVERY_TOOL)
    }

    /// 展示给用户的提示（带编号选项）
    pub fn prompt_text(&self) -> String {
        let mut s = self.message.clone();
        for (i, opt) in self.options.iter().enumerate() {
            s.push_str(&format!("\n  {}. {}", i + 1, opt));
        }
        s
    }
}

/// 解析结果
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// 执行（可能已注入参数的）延迟调用
    Execute(ToolCall),
    /// 用户拒绝
    Declined,
    /// 回答无法识别，用给定提示重新询问
    Reask(String),
    /// 发起请求的工具已执行，回答只需记录
    AlreadyExecuted,
    /// 回答已记录，没有需要执行的调用
    Acknowledged,
    ContinuePlan,
    TerminatePlan,
    /// continue_conversation：用这段文本开始新一轮
    NewTurn(String),
}

fn normalize(answer: &str) -> String {
    answer
        .trim()
        .trim_end_matches(['.', '!', '。', '！', ',', '，'])
        .to_lowercase()
}

/// 是否为肯定 / 否定回答；都不是返回 None
pub fn parse_yes_no(answer: &str) -> Option<bool> {
    let text = normalize(answer);
    let first = text.split_whitespace().next().unwrap_or("");
    for candidate in [text.as_str(), first] {
        if AFFIRMATIVE.contains(&candidate) {
            return Some(true);
        }
        if NEGATIVE.contains(&candidate) {
            return Some(false);
        }
    }
    None
}

/// 选项匹配：1 起编号，或大小写不敏感的模糊子串匹配
pub fn match_choice(answer: &str, options: &[String]) -> Option<usize> {
    let text = normalize(answer);
    if text.is_empty() {
        return None;
    }
    if let Ok(n) = text.parse::<usize>() {
        return (1..=options.len()).contains(&n).then(|| n - 1);
    }
    let lowered: Vec<String> = options.iter().map(|o| o.to_lowercase()).collect();
    if let Some(i) = lowered
        .iter()
        .position(|o| o.contains(&text) || text.contains(o.as_str()))
    {
        return Some(i);
    }
    // 逐词匹配，只接受唯一命中
    let hits: Vec<usize> = lowered
        .iter()
        .enumerate()
        .filter(|(_, o)| {
            text.split_whitespace()
                .filter(|w| w.chars().count() >= 2)
                .any(|w| o.contains(w))
        })
        .map(|(i, _)| i)
        .collect();
    (hits.len() == 1).then(|| hits[0])
}

/// 解析用户对 request 的回答
pub fn resolve(request: &InteractionRequest, answer: &str) -> Resolution {
    match request.kind {
        InteractionKind::Confirmation => match parse_yes_no(answer) {
            Some(true) => request
                .tool_call
                .clone()
                .map(Resolution::Execute)
                .unwrap_or(Resolution::Acknowledged),
            Some(false) => Resolution::Declined,
            None => Resolution::Reask(format!("请回答 yes 或 no：{}", request.message)),
        },
        InteractionKind::Choice => match match_choice(answer, &request.options) {
            None => Resolution::Reask(format!("无法识别的选项，请重新选择：\n{}", request.prompt_text())),
            Some(index) if request.is_plan_recovery() => {
                if index == 0 {
                    Resolution::ContinuePlan
                } else {
                    Resolution::TerminatePlan
                }
            }
            Some(index) => match &request.tool_call {
                Some(call) => Resolution::Execute(
                    call.clone()
                        .with_arg("userChoice", json!(request.options[index]))
                        .with_arg("userChoiceIndex", json!(index)),
                ),
                None => Resolution::Acknowledged,
            },
        },
        InteractionKind::Input => {
            let text = answer.trim();
            if text.is_empty() {
                return Resolution::Reask(request.message.clone());
            }
            if request.original_result.is_some() {
                return Resolution::AlreadyExecuted;
            }
            match &request.tool_call {
                Some(call) => Resolution::Execute(call.clone().with_arg("userInput", json!(text))),
                None => Resolution::Acknowledged,
            }
        }
        InteractionKind::ContinueConversation => Resolution::NewTurn(answer.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call() -> ToolCall {
        ToolCall::new("delete_document", json!({"id": 7}))
    }

    #[test]
    fn test_yes_no_vocabulary() {
        for yes in ["Yes", "y", "OK!", "sure thing", "是的", "好", "确认"] {
            assert_eq!(parse_yes_no(yes), Some(true), "{yes}");
        }
        for no in ["NO", "n", "cancel", "否", "不", "取消。"] {
            assert_eq!(parse_yes_no(no), Some(false), "{no}");
        }
        assert_eq!(parse_yes_no("maybe later"), None);
    }

    #[test]
    fn test_confirmation_branches() {
        let req = InteractionRequest::confirmation("Delete?", call());
        assert_eq!(resolve(&req, "yes"), Resolution::Execute(call()));
        assert_eq!(resolve(&req, "no"), Resolution::Declined);
        assert!(matches!(resolve(&req, "hmm"), Resolution::Reask(_)));
    }

    #[test]
    fn test_choice_index_and_fuzzy() {
        let req = InteractionRequest::choice(
            "Pick tone",
            vec!["Formal".into(), "Casual".into()],
            Some(ToolCall::new("set_tone", json!({}))),
        );
        let Resolution::Execute(c) = resolve(&req, "2") else {
            panic!("expected execute");
        };
        assert_eq!(c.args["userChoice"], "Casual");
        assert_eq!(c.args["userChoiceIndex"], 1);

        let Resolution::Execute(c) = resolve(&req, "form") else {
            panic!("expected execute");
        };
        assert_eq!(c.args["userChoiceIndex"], 0);

        assert!(matches!(resolve(&req, "3"), Resolution::Reask(_)));
        assert!(matches!(resolve(&req, "bold"), Resolution::Reask(_)));
    }

    #[test]
    fn test_plan_recovery_routing() {
        let req = InteractionRequest::plan_recovery("Plan interrupted");
        assert_eq!(req.options.len(), 2);
        assert_eq!(resolve(&req, "1"), Resolution::ContinuePlan);
        assert_eq!(resolve(&req, "continue the plan"), Resolution::ContinuePlan);
        assert_eq!(resolve(&req, "end"), Resolution::TerminatePlan);
        assert_eq!(resolve(&req, "结束"), Resolution::TerminatePlan);
    }

    #[test]
    fn test_input_branches() {
        let req = InteractionRequest::input("Title?", Some(ToolCall::new("set_title", json!({}))), None);
        assert!(matches!(resolve(&req, "   "), Resolution::Reask(_)));
        let Resolution::Execute(c) = resolve(&req, " Rust Book ") else {
            panic!("expected execute");
        };
        assert_eq!(c.args["userInput"], "Rust Book");

        let ran = InteractionRequest::input("Which file?", Some(call()), Some(json!("partial")));
        assert_eq!(resolve(&ran, "a.md"), Resolution::AlreadyExecuted);
    }

    #[test]
    fn test_continue_conversation_is_new_turn() {
        let req = InteractionRequest::continue_conversation("Anything else?");
        assert_eq!(resolve(&req, " shorter please "), Resolution::NewTurn("shorter please".into()));
    }
}
