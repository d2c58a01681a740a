//! 编排错误类型与恢复动作
//!
//! 节点内部的错误在节点边界就地降级；越过节点边界的错误交给 RecoveryEngine，决定回复「暂不可用」还是对外报错。

use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::CheckpointError;

/// 编排过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// Supervisor 的路由调用失败
    #[error("Routing failure: {0}")]
    RoutingFailure(String),

    /// 模型既没有给出工具调用，也没有给出结构化回答
    #[error("Need either tool calls or structured response: {0}")]
    AgentProtocolViolation(String),

    /// 模型调用了 Agent 注册表中不存在的工具
    #[error("Invalid tool: {0}")]
    InvalidToolReference(String),

    #[error("Reflection failure: {0}")]
    ReflectionFailure(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Recursion limit of {0} reached without hitting a stop condition")]
    RecursionLimit(usize),

    /// Tools 节点被调度时最新消息不含工具调用
    #[error("Latest message carries no tool calls")]
    MissingToolCalls,

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl AgentError {
    /// 稳定的错误类型名，用于降级回复（如 "AgentProtocolViolation: ..."）
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::RoutingFailure(_) => "RoutingFailure",
            AgentError::AgentProtocolViolation(_) => "AgentProtocolViolation",
            AgentError::InvalidToolReference(_) => "InvalidToolReference",
            AgentError::ReflectionFailure(_) => "ReflectionFailure",
            AgentError::Llm(_) => "ModelError",
            AgentError::RecursionLimit(_) => "GraphRecursionError",
            AgentError::MissingToolCalls => "MissingToolCalls",
            AgentError::Checkpoint(_) => "CheckpointError",
            AgentError::ConfigError(_) => "ConfigError",
        }
    }

    /// 带类型名的一行描述（用于写入 assistant 消息）
    pub fn describe(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

/// 恢复引擎根据错误类型给出的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 会话级失败：返回通用「暂不可用」回复
    ServiceUnavailable,
    /// 传输级失败（如 checkpoint 存储不可用）：作为显式错误交给调用方
    Propagate,
}
