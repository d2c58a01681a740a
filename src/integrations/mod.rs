//! 外部 SaaS 集成：每个领域 Agent 一组工具
//!
//! 各集成把操作声明为 Operation 枚举，共享同一个 HttpSession；
//! dry-run 开启时所有工具被替换为返回固定数据的版本。

pub mod argocd;
pub mod backstage;
pub mod github;
pub mod jira;
pub mod pagerduty;

use std::sync::Arc;

use crate::config::ToolsSection;
use crate::core::AgentKind;
use crate::tools::{dry_run_registry, HttpSession, ToolError, ToolRegistry};

/// 某个 Agent 的工具注册表
pub fn registry_for(
    kind: AgentKind,
    session: Arc<HttpSession>,
    cfg: &ToolsSection,
) -> Result<ToolRegistry, ToolError> {
    let registry = match kind {
        AgentKind::Argocd => argocd::registry(session, &cfg.argocd)?,
        AgentKind::Backstage => backstage::registry(session, &cfg.backstage)?,
        AgentKind::Github => github::registry(session, &cfg.github)?,
        AgentKind::Jira => jira::registry(session, &cfg.jira)?,
        AgentKind::Pagerduty => pagerduty::registry(session, &cfg.pagerduty)?,
    };
    Ok(if cfg.dry_run {
        dry_run_registry(registry)
    } else {
        registry
    })
}
