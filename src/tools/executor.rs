//! 工具执行器
//!
//! ToolExecutor 是引擎消费的外部能力：`execute(name, args) -> {success, output|error}`。
//! RegistryToolExecutor 持有 ToolRegistry 与全局超时，超时转为 ToolError::Timeout；
//! 每次调用输出结构化审计日志（JSON）。重复调用的拦截由引擎负责，不在这里做。

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::timeout;

use crate::memory::truncate_chars;
use crate::tools::ToolRegistry;

/// 工具失败的结构化类别
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Tool timeout: {0}")]
    Timeout(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Tool execution failed: {0}")]
    Failed(String),
}

/// 写入历史的错误码
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorCode {
    ToolNotFound,
    PermissionDenied,
    Timeout,
    NetworkError,
    ExecutionFailed,
}

impl ToolErrorCode {
    /// 结构化错误直接映射；泛化的 Failed 再按文本嗅探一次，兼容只返回字符串的执行器
    pub fn classify(err: &ToolError) -> Self {
        match err {
            ToolError::NotFound(_) => ToolErrorCode::ToolNotFound,
            ToolError::PermissionDenied(_) => ToolErrorCode::PermissionDenied,
            ToolError::Timeout(_) => ToolErrorCode::Timeout,
            ToolError::Network(_) => ToolErrorCode::NetworkError,
            ToolError::Failed(msg) => Self::from_message(msg),
        }
    }

    fn from_message(msg: &str) -> Self {
        let lower = msg.to_lowercase();
        if lower.contains("unknown tool") || lower.contains("not found") {
            ToolErrorCode::ToolNotFound
        } else if lower.contains("permission") || lower.contains("denied") || lower.contains("forbidden") {
            ToolErrorCode::PermissionDenied
        } else if lower.contains("timeout") || lower.contains("timed out") {
            ToolErrorCode::Timeout
        } else if lower.contains("network")
            || lower.contains("connection")
            || lower.contains("dns")
            || lower.contains("unreachable")
        {
            ToolErrorCode::NetworkError
        } else {
            ToolErrorCode::ExecutionFailed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ToolErrorCode::ToolNotFound => "tool_not_found",
            ToolErrorCode::PermissionDenied => "permission_denied",
            ToolErrorCode::Timeout => "timeout",
            ToolErrorCode::NetworkError => "network_error",
            ToolErrorCode::ExecutionFailed => "execution_failed",
        }
    }
}

/// 工具成功输出；user_prompt 非空表示工具执行中途需要用户补充信息
#[derive(Clone, Debug, PartialEq)]
pub struct ToolOutput {
    pub content: Value,
    pub user_prompt: Option<String>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Value::String(text.into()),
            user_prompt: None,
        }
    }

    pub fn json(content: Value) -> Self {
        Self {
            content,
            user_prompt: None,
        }
    }

    /// 工具已执行，但需要用户回答问题；partial 为已得到的部分结果
    pub fn ask_user(question: impl Into<String>, partial: Value) -> Self {
        Self {
            content: partial,
            user_prompt: Some(question.into()),
        }
    }

    /// 展示给用户的文本
    pub fn display(&self) -> String {
        display_value(&self.content)
    }
}

/// 字符串原样输出，其它结构序列化
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// 引擎依赖的工具执行能力
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, name: &str, args: Value) -> Result<ToolOutput, ToolError>;
}

/// 基于 ToolRegistry 的执行器：对每次调用施加超时
pub struct RegistryToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl RegistryToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self::with_timeout(registry, Duration::from_secs(timeout_secs))
    }

    pub fn with_timeout(registry: ToolRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }
}

#[async_trait]
impl ToolExecutor for RegistryToolExecutor {
    async fn execute(&self, name: &str, args: Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.execute(name, args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(e)) => (false, ToolErrorCode::classify(e).as_str()),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(r) => r,
            Err(_) => Err(ToolError::Timeout(name.to_string())),
        }
    }
}

fn args_preview(args: &Value) -> String {
    truncate_chars(&args.to_string(), 200)
}
