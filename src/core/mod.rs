//! 核心编排层：错误与恢复、路由、会话状态、编排器与构建器

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod routing;
pub mod state;

pub use builder::{create_checkpointer, create_llm_from_config, OrchestratorBuilder};
pub use error::{AgentError, RecoveryAction};
pub use orchestrator::{InteractionChunk, Orchestrator};
pub use recovery::{RecoveryEngine, SERVICE_UNAVAILABLE};
pub use routing::{AgentKind, Next, RouteAction, RoutingDecision};
pub use state::{ConversationState, InputField, ResponseMetadata, SessionCounters, StateUpdate};
