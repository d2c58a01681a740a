//! 系统提示词
//!
//! 每个 Agent 一段能力说明；Supervisor 提示词拼接全部能力说明，
//! Reflection 提示词在其前面加上继续 / 停止的判定要求。
//! 可用 `<dir>/supervisor.md`、`<dir>/reflection.md`、`<dir>/<agent>.md` 覆盖默认值。

use std::collections::BTreeMap;
use std::path::Path;

use crate::core::AgentKind;

const ARGOCD: &str = "## ArgoCD
- Deploy an application to the common cluster using ArgoCD.";

const BACKSTAGE: &str = "## Backstage
- Get Backstage catalog entities for a user.
- Get the Backstage groups a user belongs to.
- Get the Backstage projects owned by the groups of a user.";

const GITHUB: &str = "## Github:
- Create a new GitHub repository.
- List Github Actions CI workflows
- Retrieve Github Actions CI status or logs
- List pull requests
- Read a pull request
- Update a pull request
- Add a pull request comment
- Read the latest pull request comments
- Get repository description
- Get repository topics
- Get repository members";

const JIRA: &str = "## Jira
- Find Jira Account ID for a given email.
- Create Jira issues.
- Assign Jira issues.
- Comment on Jira issues
- Get Jira issue details
- Transition Jira issues
- Search for multiple Jira issues using JQL

Jira only LLM Instructions:
- Always convert email to account_id before using it in Jira API calls.
- If the assignee or reporter is an email, convert it to account_id before using it in Jira API calls.";

const PAGERDUTY: &str = "## PagerDuty
- Find who is currently on-call for SRE / platform support.
- List PagerDuty on-call schedules.";

fn default_agent_prompt(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::Argocd => ARGOCD,
        AgentKind::Backstage => BACKSTAGE,
        AgentKind::Github => GITHUB,
        AgentKind::Jira => JIRA,
        AgentKind::Pagerduty => PAGERDUTY,
    }
}

fn default_supervisor(agents: &BTreeMap<AgentKind, String>) -> String {
    let capabilities = agents.values().cloned().collect::<Vec<_>>().join("\n");
    format!(
        "You are a helpful AI Platform/SRE Engineer tasked with performing SRE tasks.

Supervisor LLM Instructions:
- Use defaults where possible.
- DO NOT CREATE Service Desk tickets unless it is explicitly requested.
- On Platform docs, after receiving tool output, do not reprocess the output of the tool, return the output as is.

You can assist with the following operations:
{capabilities}
"
    )
}

fn default_reflection(supervisor: &str) -> String {
    format!(
        "Decide whether the user query has been satisifed or if we need to continue.
Do not continue if the last message is a question or requires user input.
{supervisor}"
    )
}

/// 全部节点的系统提示词
#[derive(Clone, Debug)]
pub struct Prompts {
    pub supervisor: String,
    pub reflection: String,
    agents: BTreeMap<AgentKind, String>,
}

impl Prompts {
    /// 从目录加载覆盖；文件不存在或读取失败时使用默认值
    pub fn load(dir: Option<&Path>) -> Self {
        let read = |name: &str| -> Option<String> {
            let path = dir?.join(format!("{name}.md"));
            match std::fs::read_to_string(&path) {
                Ok(s) if !s.trim().is_empty() => {
                    tracing::info!("Loaded prompt override from {}", path.display());
                    Some(s)
                }
                Ok(_) => None,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => {
                    tracing::warn!("Failed to read prompt {}: {}", path.display(), e);
                    None
                }
            }
        };

        let agents: BTreeMap<AgentKind, String> = AgentKind::ALL
            .iter()
            .map(|kind| {
                let prompt = read(kind.as_str())
                    .unwrap_or_else(|| default_agent_prompt(*kind).to_string());
                (*kind, prompt)
            })
            .collect();
        let supervisor = read("supervisor").unwrap_or_else(|| default_supervisor(&agents));
        let reflection = read("reflection").unwrap_or_else(|| default_reflection(&supervisor));

        Self {
            supervisor,
            reflection,
            agents,
        }
    }

    pub fn agent(&self, kind: AgentKind) -> &str {
        self.agents
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| default_agent_prompt(kind))
    }
}

impl Default for Prompts {
    fn default() -> Self {
        Self::load(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supervisor_lists_every_agent() {
        let prompts = Prompts::default();
        for kind in AgentKind::ALL {
            assert!(prompts.supervisor.contains(default_agent_prompt(kind)));
        }
        assert!(prompts.reflection.starts_with("Decide whether"));
        assert!(prompts.reflection.contains(&prompts.supervisor));
    }

    #[test]
    fn test_file_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("jira.md"), "custom jira prompt").unwrap();
        let prompts = Prompts::load(Some(dir.path()));
        assert_eq!(prompts.agent(AgentKind::Jira), "custom jira prompt");
        assert!(prompts.supervisor.contains("custom jira prompt"));
        assert_eq!(prompts.agent(AgentKind::Github), GITHUB);
    }
}
