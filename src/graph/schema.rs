//! 结构化输出 schema
//!
//! Supervisor、Reflection、Agent / 「what can you do」节点各自要求模型按固定结构作答，
//! schema 由 schemars 从下面的类型派生。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::{ResponseMetadata, RouteAction};
use crate::llm::StructuredOutput;

pub const SUPERVISOR_ACTION: &str = "SupervisorAction";
pub const SHOULD_CONTINUE: &str = "ShouldContinue";
pub const AGENT_ANSWER: &str = "AgentAnswer";

/// Supervisor 的路由选择
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SupervisorAction {
    /// The action you will take to service the user
    pub action: RouteAction,
}

/// Reflection 的继续 / 停止判定
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ShouldContinue {
    /// Whether to continue processing the request.
    pub should_continue: bool,
    /// Reason for decision whether to continue the request.
    pub reason: String,
}

/// Agent 的最终回答
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AgentAnswer {
    /// The answer to the user, in markdown.
    pub answer: String,
    /// Whether the answer waits for user input, and which inputs.
    #[serde(default)]
    pub metadata: ResponseMetadata,
}

pub fn supervisor_format() -> StructuredOutput {
    StructuredOutput::of::<SupervisorAction>(SUPERVISOR_ACTION)
}

pub fn reflection_format() -> StructuredOutput {
    StructuredOutput::of::<ShouldContinue>(SHOULD_CONTINUE)
}

pub fn answer_format() -> StructuredOutput {
    StructuredOutput::of::<AgentAnswer>(AGENT_ANSWER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supervisor_schema_lists_actions() {
        let schema = supervisor_format().schema.to_string();
        for action in ["argocd", "backstage", "github", "jira", "pagerduty", "what can you do"] {
            assert!(schema.contains(action), "missing {action}");
        }
    }

    #[test]
    fn test_agent_answer_metadata_defaults() {
        let answer: AgentAnswer = serde_json::from_str(r#"{"answer": "done"}"#).unwrap();
        assert!(!answer.metadata.requires_user_input);
        assert!(answer.metadata.input_fields.is_empty());
    }
}
