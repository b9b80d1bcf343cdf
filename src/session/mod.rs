//! 会话存储抽象层
//!
//! 引擎只需要两项能力：读取当前会话快照、追加一条审计日志。存储是尽力而为的旁路，
//! 任何失败都只记日志，不能中断主流程。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Session unavailable: {0}")]
    Unavailable(String),
    #[error("Session serialization failed: {0}")]
    Serialization(String),
}

/// 当前会话（项目）快照
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl SessionSnapshot {
    pub fn new(project: Option<String>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            project,
            data: Value::Null,
        }
    }

    /// 传给 PlanRunner / 存入续传对象的序列化形式
    pub fn serialize(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(|e| SessionError::Serialization(e.to_string()))
    }
}

/// 业务上重要的事件类别
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryKind {
    UserInteraction,
    SpecialistInvocation,
    PlanExecution,
    PlanInterrupted,
    PlanResumed,
    PlanTerminated,
    Milestone,
}

/// 一条审计日志
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: LogEntryKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
}

impl LogEntry {
    pub fn new(kind: LogEntryKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: Utc::now(),
            data: Value::Null,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// 会话存储接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn current_session(&self) -> Result<SessionSnapshot, SessionError>;

    async fn update_with_log_entry(&self, entry: LogEntry) -> Result<(), SessionError>;
}

/// 读取会话快照；失败时退回空快照，保证引擎继续运行
pub async fn current_or_default(store: &Arc<dyn SessionStore>) -> SessionSnapshot {
    match store.current_session().await {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Session snapshot unavailable ({}), using empty session", e);
            SessionSnapshot::default()
        }
    }
}

/// 追加审计日志；失败只记 warn
pub async fn log_best_effort(store: &Arc<dyn SessionStore>, entry: LogEntry) {
    let kind = entry.kind;
    if let Err(e) = store.update_with_log_entry(entry).await {
        tracing::warn!(?kind, "Session log entry dropped: {}", e);
    }
}

/// 内存会话存储
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    snapshot: RwLock<SessionSnapshot>,
    entries: RwLock<Vec<LogEntry>>,
}

impl InMemorySessionStore {
    pub fn new(snapshot: SessionSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(snapshot),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub async fn entries(&self) -> Vec<LogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn current_session(&self) -> Result<SessionSnapshot, SessionError> {
        Ok(self.snapshot.read().await.clone())
    }

    async fn update_with_log_entry(&self, entry: LogEntry) -> Result<(), SessionError> {
        self.entries.write().await.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn current_session(&self) -> Result<SessionSnapshot, SessionError> {
            Err(SessionError::Unavailable("disk gone".into()))
        }

        async fn update_with_log_entry(&self, _entry: LogEntry) -> Result<(), SessionError> {
            Err(SessionError::Unavailable("disk gone".into()))
        }
    }

    #[tokio::test]
    async fn test_memory_store_appends() {
        let store = InMemorySessionStore::new(SessionSnapshot::new(Some("book".into())));
        store
            .update_with_log_entry(LogEntry::new(LogEntryKind::Milestone, "started"))
            .await
            .unwrap();
        let entries = store.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, LogEntryKind::Milestone);
        assert_eq!(
            store.current_session().await.unwrap().project.as_deref(),
            Some("book")
        );
    }

    #[tokio::test]
    async fn test_best_effort_helpers_swallow_errors() {
        let store: Arc<dyn SessionStore> = Arc::new(BrokenStore);
        log_best_effort(&store, LogEntry::new(LogEntryKind::Milestone, "x")).await;
        let snap = current_or_default(&store).await;
        assert_eq!(snap, SessionSnapshot::default());
    }
}
