//! 核心编排层：错误、状态投影、会话监管、中断恢复与主控循环

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session_supervisor;
pub mod state;

pub use builder::EngineBuilder;
pub use error::AgentError;
pub use orchestrator::{AgentEngine, EngineProgress};
pub use recovery::{InterruptionClassifier, InterruptionKind, PlanRecoveryManager};
pub use session_supervisor::SessionSupervisor;
pub use state::{AgentStage, AgentState, StatusSnapshot};
