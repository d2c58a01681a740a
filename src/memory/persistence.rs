//! SQLite 检查点持久化
//!
//! 每个 thread 一行：状态序列化为 JSON 文本，附 RFC 3339 更新时间。跨进程重启保留会话。
//! rusqlite 是同步 API，所有读写放在 spawn_blocking 中执行。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};

use crate::core::ConversationState;
use crate::memory::{CheckpointError, Checkpointer};

fn storage(e: impl std::fmt::Display) -> CheckpointError {
    CheckpointError::Storage(e.to_string())
}

/// SQLite 检查点
#[derive(Debug, Clone)]
pub struct SqliteCheckpointer {
    db_path: PathBuf,
}

impl SqliteCheckpointer {
    /// 打开数据库并确保表存在；父目录不存在时自动创建
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(storage)?;
        }
        let conn = rusqlite::Connection::open(&db_path).map_err(storage)?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .map_err(storage)?;
        tracing::info!("SQLite checkpoint store at {}", db_path.display());
        Ok(Self { db_path })
    }

    /// thread 最近一次写入的时间（RFC 3339）
    pub async fn updated_at(&self, thread_id: &str) -> Result<Option<String>, CheckpointError> {
        let db_path = self.db_path.clone();
        let thread_id = thread_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path).map_err(storage)?;
            conn.query_row(
                "SELECT updated_at FROM checkpoints WHERE thread_id = ?1",
                params![thread_id],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(storage)
        })
        .await
        .map_err(storage)?
    }
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    async fn get(&self, thread_id: &str) -> Result<Option<ConversationState>, CheckpointError> {
        if thread_id.is_empty() {
            return Err(CheckpointError::ThreadIdRequired);
        }
        let db_path = self.db_path.clone();
        let thread_id = thread_id.to_string();

        let raw = tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path).map_err(storage)?;
            conn.query_row(
                "SELECT state FROM checkpoints WHERE thread_id = ?1",
                params![thread_id],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(storage)
        })
        .await
        .map_err(storage)??;

        match raw {
            Some(s) => serde_json::from_str(&s)
                .map(Some)
                .map_err(|e| CheckpointError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn put(&self, thread_id: &str, state: &ConversationState) -> Result<(), CheckpointError> {
        if thread_id.is_empty() {
            return Err(CheckpointError::ThreadIdRequired);
        }
        let value = serde_json::to_string(state)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        let db_path = self.db_path.clone();
        let thread_id = thread_id.to_string();
        let updated_at = chrono::Utc::now().to_rfc3339();

        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path).map_err(storage)?;
            conn.execute(
                "INSERT OR REPLACE INTO checkpoints (thread_id, state, updated_at) VALUES (?1, ?2, ?3)",
                params![thread_id, value, updated_at],
            )
            .map_err(storage)?;
            Ok::<(), CheckpointError>(())
        })
        .await
        .map_err(storage)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AgentKind, Next};
    use crate::memory::Message;

    #[tokio::test]
    async fn test_sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("checkpoints.db");

        let mut state = ConversationState::default();
        state.messages.push(Message::user("list my PRs"));
        state
            .messages
            .push(Message::assistant("none open").from_agent(AgentKind::Github));
        state.next = Next::End;
        state.counters.turns = 1;

        SqliteCheckpointer::new(&path)
            .unwrap()
            .put("thread-a", &state)
            .await
            .unwrap();

        let reopened = SqliteCheckpointer::new(&path).unwrap();
        assert_eq!(reopened.get("thread-a").await.unwrap(), Some(state));
        assert!(reopened.get("thread-b").await.unwrap().is_none());
        assert!(reopened.updated_at("thread-a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sqlite_put_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteCheckpointer::new(dir.path().join("c.db")).unwrap();
        let mut state = ConversationState::default();
        store.put("t", &state).await.unwrap();
        state.messages.push(Message::user("again"));
        store.put("t", &state).await.unwrap();
        let loaded = store.get("t").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
    }
}
