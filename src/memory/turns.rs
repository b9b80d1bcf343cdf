//! 轮次叙述：把扁平的执行历史按对话轮次分组，渲染给 Planner
//!
//! 每轮包含用户输入、内部推理、给用户的回复、调用过的工具（名称 + 成败 + 耗时）和启动的多步计划。
//! 出现在任何开轮标记之前的事件先缓存，挂到第一个打开的轮次上；始终没有标记时，
//! 用当前任务合成一轮，避免推理内容被丢掉。尚未写完的最后一轮不会出现在叙述里。

use crate::memory::{ExecutionStep, StepKind};

/// 轮次中的一次工具调用摘要
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSummary {
    pub name: String,
    pub success: Option<bool>,
    pub duration_ms: Option<u64>,
    pub skipped: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Turn {
    pub number: usize,
    pub user_input: Option<String>,
    pub thoughts: Vec<String>,
    pub replies: Vec<String>,
    pub tools: Vec<ToolSummary>,
    pub plans: Vec<String>,
    /// 用户对确认 / 选择 / 输入请求的回答
    pub answers: Vec<String>,
    pub notes: Vec<String>,
}

impl Turn {
    fn new(number: usize) -> Self {
        Self {
            number,
            ..Default::default()
        }
    }

    /// 已有用户输入且已有推理或回复
    pub fn is_complete(&self) -> bool {
        self.user_input.is_some() && (!self.thoughts.is_empty() || !self.replies.is_empty())
    }

    fn absorb(&mut self, step: &ExecutionStep) {
        let content = step.content.clone();
        match step.kind {
            StepKind::UserInteraction if step.opens_turn => self.user_input = Some(content),
            StepKind::UserInteraction => self.answers.push(content),
            StepKind::Thought => self.thoughts.push(content),
            StepKind::Result | StepKind::ForcedResponse => self.replies.push(content),
            StepKind::ToolCall | StepKind::ToolCallSkipped => self.tools.push(ToolSummary {
                name: step.tool_name.clone().unwrap_or_else(|| "unknown".to_string()),
                success: step.success,
                duration_ms: step.duration_ms,
                skipped: step.kind == StepKind::ToolCallSkipped,
            }),
            StepKind::PlanExecution => self.plans.push(content),
            StepKind::System => self.notes.push(content),
        }
    }

    fn absorb_all(&mut self, steps: Vec<&ExecutionStep>) {
        for s in steps {
            self.absorb(s);
        }
    }

    pub fn render(&self) -> String {
        let mut s = format!("### Turn {}\n", self.number);
        match &self.user_input {
            Some(input) => s.push_str(&format!("User: {}\n", input)),
            None => s.push_str("User: (earlier input no longer in history)\n"),
        }
        for t in &self.thoughts {
            s.push_str(&format!("Thought: {}\n", t));
        }
        for r in &self.replies {
            s.push_str(&format!("Reply: {}\n", r));
        }
        if !self.tools.is_empty() {
            let tools: Vec<String> = self
                .tools
                .iter()
                .map(|t| {
                    let status = if t.skipped {
                        "skipped"
                    } else {
                        match t.success {
                            Some(true) => "ok",
                            Some(false) => "failed",
                            None => "pending",
                        }
                    };
                    match t.duration_ms {
                        Some(ms) => format!("{} ({}, {}ms)", t.name, status, ms),
                        None => format!("{} ({})", t.name, status),
                    }
                })
                .collect();
            s.push_str(&format!("Tools: {}\n", tools.join(", ")));
        }
        for p in &self.plans {
            s.push_str(&format!("Plan: {}\n", p));
        }
        for a in &self.answers {
            s.push_str(&format!("User answered: {}\n", a));
        }
        for n in &self.notes {
            s.push_str(&format!("Note: {}\n", n));
        }
        s
    }
}

/// 将历史分组为轮次（包含进行中的最后一轮）
pub fn build_turns(steps: &[ExecutionStep], current_task: &str) -> Vec<Turn> {
    let mut turns: Vec<Turn> = Vec::new();
    let mut orphans: Vec<&ExecutionStep> = Vec::new();

    for step in steps {
        if step.opens_turn {
            let mut turn = Turn::new(step.iteration);
            turn.absorb(step);
            // 第一个轮次接收之前缓存的孤儿事件
            if turns.is_empty() {
                turn.absorb_all(std::mem::take(&mut orphans));
            }
            turns.push(turn);
            continue;
        }
        match turns.last_mut() {
            Some(turn) if turn.number == step.iteration => turn.absorb(step),
            // 标记已被裁剪掉的旧轮次残留
            _ if step.iteration > 0 => {
                let mut turn = Turn::new(step.iteration);
                turn.absorb(step);
                turns.push(turn);
            }
            _ => orphans.push(step),
        }
    }

    if !orphans.is_empty() {
        let mut turn = Turn::new(0);
        if !current_task.is_empty() {
            turn.user_input = Some(current_task.to_string());
        }
        turn.absorb_all(orphans);
        turns.insert(0, turn);
    }
    turns
}

/// 渲染叙述；最后一轮未写完时不展示
pub fn render_narrative(steps: &[ExecutionStep], current_task: &str) -> String {
    let mut turns = build_turns(steps, current_task);
    if turns.last().is_some_and(|t| !t.is_complete()) {
        turns.pop();
    }
    turns
        .iter()
        .map(Turn::render)
        .collect::<Vec<_>>()
        .join("\n")
}
