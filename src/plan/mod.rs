//! 多步计划：数据类型、运行器接口与参考运行器

pub mod runner;
pub mod types;

pub use runner::{PlanRunner, ProgressCallback, ToolPlanRunner};
pub use types::{
    ExecutionPlan, FailureCode, PlanFailure, PlanInterruptionState, PlanOutcome,
    PlanRunnerSnapshot, PlanStep, ResumeContext, ResumeHints, SpecialistSnapshot, StepResults,
};
