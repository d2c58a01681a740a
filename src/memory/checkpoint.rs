//! 会话检查点
//!
//! 按 thread_id 保存与加载 ConversationState；编排器在每个节点执行后写入一次，
//! 下一轮开始时读回，实现跨轮记忆。

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::core::ConversationState;

/// 检查点错误
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("thread_id required")]
    ThreadIdRequired,
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("storage: {0}")]
    Storage(String),
}

/// 检查点存储
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// 读取 thread 的最新状态；从未写入过返回 None
    async fn get(&self, thread_id: &str) -> Result<Option<ConversationState>, CheckpointError>;

    /// 覆盖写入 thread 的最新状态
    async fn put(&self, thread_id: &str, state: &ConversationState) -> Result<(), CheckpointError>;
}

/// 进程内检查点（重启即丢失）
#[derive(Debug, Default)]
pub struct MemoryCheckpointer {
    threads: RwLock<HashMap<String, ConversationState>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn thread_count(&self) -> usize {
        self.threads.read().await.len()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn get(&self, thread_id: &str) -> Result<Option<ConversationState>, CheckpointError> {
        if thread_id.is_empty() {
            return Err(CheckpointError::ThreadIdRequired);
        }
        Ok(self.threads.read().await.get(thread_id).cloned())
    }

    async fn put(&self, thread_id: &str, state: &ConversationState) -> Result<(), CheckpointError> {
        if thread_id.is_empty() {
            return Err(CheckpointError::ThreadIdRequired);
        }
        self.threads
            .write()
            .await
            .insert(thread_id.to_string(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;

    #[tokio::test]
    async fn test_memory_roundtrip_per_thread() {
        let store = MemoryCheckpointer::new();
        let mut state = ConversationState::default();
        state.messages.push(Message::user("hi"));
        store.put("t1", &state).await.unwrap();

        assert_eq!(store.get("t1").await.unwrap(), Some(state));
        assert!(store.get("t2").await.unwrap().is_none());
        assert_eq!(store.thread_count().await, 1);
    }

    #[tokio::test]
    async fn test_empty_thread_id_rejected() {
        let store = MemoryCheckpointer::new();
        assert!(matches!(
            store.get("").await,
            Err(CheckpointError::ThreadIdRequired)
        ));
    }
}
