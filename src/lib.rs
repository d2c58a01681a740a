//! Jarvis - 多智能体 SRE 助手编排层
//!
//! 一个 Supervisor 把用户请求路由给领域 Agent（ArgoCD / Backstage / GitHub / Jira / PagerDuty），
//! Agent 调用工具后给出回答，Reflection 判断本轮是否继续。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、路由、会话状态、编排器与构建器
//! - **graph**: 图中各节点（Supervisor / Agent / Tools / Reflection / what can you do）与提示词
//! - **integrations**: 各 SaaS 的工具表
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock / 脚本化）
//! - **memory**: 对话消息、历史裁剪、检查点
//! - **observability**: 日志初始化
//! - **tools**: Tool trait、注册表、执行器、HTTP 会话、dry-run

pub mod config;
pub mod core;
pub mod graph;
pub mod integrations;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;

pub use crate::core::{InteractionChunk, Orchestrator, OrchestratorBuilder};
