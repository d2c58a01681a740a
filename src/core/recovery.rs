//! 错误恢复引擎
//!
//! 节点内部的失败（路由、幻觉工具、反思、单个工具调用）在节点边界就地降级；
//! 越过节点边界、到达编排器的错误由这里决定本轮如何收场。

use crate::core::{AgentError, RecoveryAction};

/// 服务暂不可用时返回给调用方的通用回复
pub const SERVICE_UNAVAILABLE: &str =
    "Jarvis Agent is not available right now. Please try again later!";

/// 会话级错误恢复：将错误映射为可执行动作
#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::Checkpoint(_) => RecoveryAction::Propagate,
            AgentError::RoutingFailure(_)
            | AgentError::AgentProtocolViolation(_)
            | AgentError::InvalidToolReference(_)
            | AgentError::ReflectionFailure(_)
            | AgentError::Llm(_)
            | AgentError::RecursionLimit(_)
            | AgentError::MissingToolCalls
            | AgentError::ConfigError(_) => RecoveryAction::ServiceUnavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::memory::CheckpointError;

    #[test]
    fn test_recovery_checkpoint_propagates() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Checkpoint(CheckpointError::Storage("disk full".to_string()));
        assert_eq!(engine.handle(&err), RecoveryAction::Propagate);
    }

    #[test]
    fn test_recovery_recursion_limit_unavailable() {
        let engine = RecoveryEngine::new();
        let err = AgentError::RecursionLimit(30);
        assert_eq!(engine.handle(&err), RecoveryAction::ServiceUnavailable);
    }

    #[test]
    fn test_recovery_escaped_node_errors_unavailable() {
        let engine = RecoveryEngine::new();
        for err in [
            AgentError::MissingToolCalls,
            AgentError::ConfigError("agent jira is not configured".to_string()),
            AgentError::Llm(LlmError::Network("reset".to_string())),
        ] {
            assert_eq!(engine.handle(&err), RecoveryAction::ServiceUnavailable);
        }
    }
}
