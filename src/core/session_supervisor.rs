//! 会话监管：协作式取消
//!
//! 持有当前任务的 CancellationToken，每个新任务换一个新 token。克隆出的句柄可交给外部观察者
//! （Ctrl+C 处理、状态上报器）；引擎在循环边界轮询，并让 Planner / 工具 / 计划运行器的等待与之竞争。

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

/// 可克隆的取消句柄
#[derive(Debug, Clone, Default)]
pub struct SessionSupervisor {
    current: Arc<Mutex<CancellationToken>>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_token<R>(&self, f: impl FnOnce(&mut CancellationToken) -> R) -> R {
        let mut guard = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    /// 新任务开始：换上新 token 并返回
    pub fn begin_task(&self) -> CancellationToken {
        self.with_token(|t| {
            *t = CancellationToken::new();
            t.clone()
        })
    }

    /// 当前任务的 token
    pub fn token(&self) -> CancellationToken {
        self.with_token(|t| t.clone())
    }

    /// 触发取消（用户 Ctrl+C / /cancel）
    pub fn cancel(&self) {
        self.with_token(|t| t.cancel());
    }
}
