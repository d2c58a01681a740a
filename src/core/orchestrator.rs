//! 编排器：图解释器
//!
//! 一次 interact 调用 = 一轮：载入 thread 的检查点、追加用户消息，从 Supervisor 开始按 Next 逐个执行节点，
//! 每个节点之后应用 StateUpdate 并写回检查点，把用户可见的新消息以流的形式推给调用方，最后推送空的结束标记。
//!
//! 同一 thread 的各轮串行执行（按 thread 加锁），不同 thread 并发互不影响。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures_util::Stream;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};

use crate::core::recovery::SERVICE_UNAVAILABLE;
use crate::core::{
    AgentError, AgentKind, ConversationState, Next, RecoveryAction, RecoveryEngine,
    ResponseMetadata, StateUpdate,
};
use crate::graph::{AgentNode, ReflectionNode, SupervisorNode, ToolNode, WhatCanYouDoNode};
use crate::memory::{Checkpointer, Message, Role};

/// 流中的一条输出；answer 与 metadata 都为空时即本轮结束标记（序列化为 `{}`）
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct InteractionChunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
}

impl InteractionChunk {
    pub fn answer(answer: impl Into<String>, metadata: ResponseMetadata) -> Self {
        Self {
            answer: Some(answer.into()),
            metadata: Some(metadata),
        }
    }

    pub fn end() -> Self {
        Self::default()
    }

    pub fn is_end(&self) -> bool {
        self.answer.is_none() && self.metadata.is_none()
    }
}

/// 一个领域 Agent 的两个节点（Agent 与其 Tools）
pub(crate) struct AgentLane {
    pub agent: AgentNode,
    pub tools: ToolNode,
}

pub struct Orchestrator {
    supervisor: SupervisorNode,
    lanes: BTreeMap<AgentKind, AgentLane>,
    reflection: ReflectionNode,
    what_can_you_do: WhatCanYouDoNode,
    checkpointer: Arc<dyn Checkpointer>,
    recursion_limit: usize,
    recovery: RecoveryEngine,
    thread_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

type ChunkSender = mpsc::Sender<Result<InteractionChunk, AgentError>>;

impl Orchestrator {
    pub(crate) fn new(
        supervisor: SupervisorNode,
        lanes: BTreeMap<AgentKind, AgentLane>,
        reflection: ReflectionNode,
        what_can_you_do: WhatCanYouDoNode,
        checkpointer: Arc<dyn Checkpointer>,
        recursion_limit: usize,
    ) -> Self {
        Self {
            supervisor,
            lanes,
            reflection,
            what_can_you_do,
            checkpointer,
            recursion_limit: recursion_limit.max(1),
            recovery: RecoveryEngine::new(),
            thread_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    /// 已配置的 Agent
    pub fn agents(&self) -> Vec<AgentKind> {
        self.lanes.keys().copied().collect()
    }

    /// 当前检查点中的状态（未知 thread 返回 None）
    pub async fn state(&self, thread_id: &str) -> Result<Option<ConversationState>, AgentError> {
        Ok(self.checkpointer.get(thread_id).await?)
    }

    /// 处理一条用户消息，返回本轮输出流。
    ///
    /// 流以 `InteractionChunk::end()` 结束；检查点存储失败以 `Err` 交给调用方，其余错误都降级为普通回复。
    pub fn interact(
        self: &Arc<Self>,
        message: impl Into<String>,
        thread_id: impl Into<String>,
    ) -> impl Stream<Item = Result<InteractionChunk, AgentError>> + Send + 'static {
        let (tx, rx) = mpsc::channel(32);
        let this = Arc::clone(self);
        let message = message.into();
        let thread_id = thread_id.into();
        tokio::spawn(async move {
            this.run_turn(message, thread_id, tx).await;
        });
        futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
    }

    /// 收集一轮的全部输出（不含结束标记）；测试与非流式调用方使用
    pub async fn interact_collect(
        self: &Arc<Self>,
        message: impl Into<String>,
        thread_id: impl Into<String>,
    ) -> Result<Vec<InteractionChunk>, AgentError> {
        use futures_util::StreamExt;

        let mut stream = Box::pin(self.interact(message, thread_id));
        let mut chunks = Vec::new();
        while let Some(item) = stream.next().await {
            let chunk = item?;
            if chunk.is_end() {
                break;
            }
            chunks.push(chunk);
        }
        Ok(chunks)
    }

    async fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.thread_locks.lock().await;
        locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 本轮结束后释放 thread 锁；map 与本轮各持一份时说明没有其他轮次在等待，移除条目
    async fn release_thread_lock(&self, thread_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.thread_locks.lock().await;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(thread_id);
        }
    }

    #[cfg(test)]
    async fn tracked_threads(&self) -> usize {
        self.thread_locks.lock().await.len()
    }

    async fn run_turn(&self, message: String, thread_id: String, tx: ChunkSender) {
        let lock = self.thread_lock(&thread_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.drive(message, &thread_id, &tx).await
        };
        self.release_thread_lock(&thread_id, lock).await;

        if let Err(e) = outcome {
            match self.recovery.handle(&e) {
                RecoveryAction::Propagate => {
                    tracing::error!(thread_id = %thread_id, "{}", e);
                    let _ = tx.send(Err(e)).await;
                    return;
                }
                RecoveryAction::ServiceUnavailable => {
                    tracing::error!(thread_id = %thread_id, "Session failure: {}", e);
                    let _ = tx
                        .send(Ok(InteractionChunk::answer(
                            SERVICE_UNAVAILABLE,
                            ResponseMetadata::default(),
                        )))
                        .await;
                }
            }
        }
        let _ = tx.send(Ok(InteractionChunk::end())).await;
    }

    async fn drive(&self, message: String, thread_id: &str, tx: &ChunkSender) -> Result<(), AgentError> {
        let mut state = self.checkpointer.get(thread_id).await?.unwrap_or_default();
        let closed = state.close_dangling_tool_calls();
        if closed > 0 {
            tracing::warn!(thread_id, "Closed {} unanswered tool calls from a previous turn", closed);
        }
        state.counters.turns += 1;
        state.apply(StateUpdate::goto(Next::Supervisor).with_message(Message::user(message)));
        self.checkpointer.put(thread_id, &state).await?;

        let mut steps = 0usize;
        while !state.next.is_end() {
            if steps >= self.recursion_limit {
                return Err(AgentError::RecursionLimit(self.recursion_limit));
            }
            steps += 1;
            let node = state.next;
            tracing::debug!(thread_id, step = steps, node = %node.node_name(), "Visiting node");

            let update = self.step(node, &state).await?;
            let visible = user_visible(node, &update);
            state.apply(update);
            self.checkpointer.put(thread_id, &state).await?;

            for chunk in visible {
                if tx.send(Ok(chunk)).await.is_err() {
                    tracing::debug!(thread_id, "Stream receiver dropped");
                }
            }
        }
        tracing::info!(
            thread_id,
            steps,
            tool_calls = state.counters.tool_calls,
            "Turn finished"
        );
        Ok(())
    }

    async fn step(&self, node: Next, state: &ConversationState) -> Result<StateUpdate, AgentError> {
        match node {
            Next::Supervisor => Ok(self.supervisor.run(state).await),
            Next::Agent(kind) => Ok(self.lane(kind)?.agent.run(state).await),
            Next::Tools(kind) => self.lane(kind)?.tools.run(kind, state).await,
            Next::Reflection(kind) => Ok(self.reflection.run(kind, state).await),
            Next::WhatCanYouDo => Ok(self.what_can_you_do.run(state).await),
            Next::End => Ok(StateUpdate::goto(Next::End)),
        }
    }

    fn lane(&self, kind: AgentKind) -> Result<&AgentLane, AgentError> {
        self.lanes
            .get(&kind)
            .ok_or_else(|| AgentError::ConfigError(format!("agent {kind} is not configured")))
    }
}

/// 节点产出中用户可见的部分：非空、非 system、非 tool 消息，附上本次更新中最新的元数据
fn user_visible(node: Next, update: &StateUpdate) -> Vec<InteractionChunk> {
    if matches!(node, Next::Tools(_)) {
        return Vec::new();
    }
    let metadata = update.metadata.last().cloned().unwrap_or_default();
    update
        .messages
        .iter()
        .filter(|m| !matches!(m.role, Role::System | Role::Tool | Role::User))
        .filter(|m| !m.content.trim().is_empty())
        .map(|m| InteractionChunk::answer(m.content.clone(), metadata.clone()))
        .collect()
}
