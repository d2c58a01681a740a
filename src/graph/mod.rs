//! 编排图的节点
//!
//! Supervisor -> Agent <-> Tools，Agent -> Reflection -> Supervisor | END，
//! Supervisor -> what can you do -> END。每个节点读取状态快照，返回 StateUpdate。

pub mod agent_node;
pub mod prompts;
pub mod reflection;
pub mod schema;
pub mod supervisor;
pub mod tool_node;
pub mod what_can_you_do;

pub use agent_node::AgentNode;
pub use prompts::Prompts;
pub use reflection::ReflectionNode;
pub use schema::{AgentAnswer, ShouldContinue, SupervisorAction};
pub use supervisor::SupervisorNode;
pub use tool_node::ToolNode;
pub use what_can_you_do::WhatCanYouDoNode;
