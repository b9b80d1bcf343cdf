//! Quill - Rust 写作编排引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 主控状态机、状态投影、中断恢复、会话监管、构建器
//! - **llm**: LLM 客户端抽象与 Mock 实现
//! - **memory**: 执行历史、轮次叙述、工具结果窗口、执行记录器
//! - **observability**: tracing 初始化
//! - **plan**: 多步计划类型与计划运行器
//! - **react**: Planner、工具分发、用户交互解析、死循环检测、过程事件
//! - **session**: 项目会话存储接口
//! - **tools**: 工具 trait、注册表、执行器、风险策略

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod plan;
pub mod react;
pub mod session;
pub mod tools;

pub use crate::core::{AgentEngine, AgentError, AgentStage, EngineBuilder};
