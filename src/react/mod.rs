//! 认知层：Planner、工具分发、用户交互解析、死循环检测与过程事件

pub mod dispatch;
pub mod events;
pub mod interaction;
pub mod loop_detector;
pub mod planner;

pub use dispatch::{DispatchContext, DispatchOutcome, ToolDispatcher};
pub use events::{ChannelSink, EngineEvent, HostSink, TracingSink};
pub use interaction::{resolve, InteractionKind, InteractionRequest, Resolution};
pub use loop_detector::{forced_summary, LoopDetector, LoopReason};
pub use planner::{parse_plan, LlmPlanner, Plan, PlanRequest, PlanShape, Planner, ToolCall};
