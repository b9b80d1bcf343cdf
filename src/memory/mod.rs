//! 记忆层：执行历史、唯一写入口、轮次叙述与工具结果窗口

pub mod history;
pub mod message;
pub mod recorder;
pub mod tool_results;
pub mod turns;

pub use history::{ExecutionHistory, ExecutionStep, StepKind, StepRecord};
pub use message::{Message, Role};
pub use recorder::ExecutionRecorder;
pub use tool_results::{format_result, truncate_chars, ToolResultWindow};
pub use turns::{build_turns, render_narrative, Turn};
