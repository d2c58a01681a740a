//! 路由：领域 Agent 的封闭枚举、Supervisor 的路由决策与图中的下一跳
//!
//! 图的节点集合是固定的，所有分派都是对这些枚举的穷尽 match，不按字符串查找节点。

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 领域 Agent（每个对应一组外部 SaaS 工具）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Argocd,
    Backstage,
    Github,
    Jira,
    Pagerduty,
}

impl AgentKind {
    pub const ALL: [AgentKind; 5] = [
        AgentKind::Argocd,
        AgentKind::Backstage,
        AgentKind::Github,
        AgentKind::Jira,
        AgentKind::Pagerduty,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Argocd => "argocd",
            AgentKind::Backstage => "backstage",
            AgentKind::Github => "github",
            AgentKind::Jira => "jira",
            AgentKind::Pagerduty => "pagerduty",
        }
    }

    /// 展示名（用于 prompt 标题与日志）
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentKind::Argocd => "ArgoCD",
            AgentKind::Backstage => "Backstage",
            AgentKind::Github => "GitHub",
            AgentKind::Jira => "Jira",
            AgentKind::Pagerduty => "PagerDuty",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supervisor 的结构化输出中可选的动作（模型看到的字符串取值）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RouteAction {
    #[serde(rename = "argocd")]
    Argocd,
    #[serde(rename = "backstage")]
    Backstage,
    #[serde(rename = "github")]
    Github,
    #[serde(rename = "jira")]
    Jira,
    #[serde(rename = "pagerduty")]
    Pagerduty,
    #[serde(rename = "what can you do")]
    WhatCanYouDo,
}

/// Supervisor 的路由决策：交给某个 Agent，或走「what can you do」兜底
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoutingDecision {
    Agent(AgentKind),
    WhatCanYouDo,
}

impl From<RouteAction> for RoutingDecision {
    fn from(action: RouteAction) -> Self {
        match action {
            RouteAction::Argocd => RoutingDecision::Agent(AgentKind::Argocd),
            RouteAction::Backstage => RoutingDecision::Agent(AgentKind::Backstage),
            RouteAction::Github => RoutingDecision::Agent(AgentKind::Github),
            RouteAction::Jira => RoutingDecision::Agent(AgentKind::Jira),
            RouteAction::Pagerduty => RoutingDecision::Agent(AgentKind::Pagerduty),
            RouteAction::WhatCanYouDo => RoutingDecision::WhatCanYouDo,
        }
    }
}

impl From<RoutingDecision> for Next {
    fn from(decision: RoutingDecision) -> Self {
        match decision {
            RoutingDecision::Agent(kind) => Next::Agent(kind),
            RoutingDecision::WhatCanYouDo => Next::WhatCanYouDo,
        }
    }
}

/// 图中的下一跳。Tools / Reflection 携带产生它的 Agent，
/// 保证工具结果回到同一个 Agent、反思只比较该 Agent 的回答。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", content = "agent", rename_all = "snake_case")]
pub enum Next {
    #[default]
    Supervisor,
    Agent(AgentKind),
    Tools(AgentKind),
    Reflection(AgentKind),
    WhatCanYouDo,
    End,
}

impl Next {
    pub fn is_end(&self) -> bool {
        matches!(self, Next::End)
    }

    /// 节点名（日志用）
    pub fn node_name(&self) -> String {
        match self {
            Next::Supervisor => "supervisor_agent".to_string(),
            Next::Agent(kind) => format!("{}_agent", kind),
            Next::Tools(kind) => format!("{}_tools", kind),
            Next::Reflection(_) => "reflection_agent".to_string(),
            Next::WhatCanYouDo => "what_can_you_do_agent".to_string(),
            Next::End => "__end__".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_action_wire_names() {
        let action: RouteAction = serde_json::from_str("\"what can you do\"").unwrap();
        assert_eq!(RoutingDecision::from(action), RoutingDecision::WhatCanYouDo);
        let action: RouteAction = serde_json::from_str("\"github\"").unwrap();
        assert_eq!(
            RoutingDecision::from(action),
            RoutingDecision::Agent(AgentKind::Github)
        );
        assert!(serde_json::from_str::<RouteAction>("\"nothing\"").is_err());
    }

    #[test]
    fn test_next_serde_roundtrip_keeps_agent() {
        let next = Next::Tools(AgentKind::Jira);
        let json = serde_json::to_string(&next).unwrap();
        assert_eq!(serde_json::from_str::<Next>(&json).unwrap(), next);
        assert_eq!(next.node_name(), "jira_tools");
    }
}
