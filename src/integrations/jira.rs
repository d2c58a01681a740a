//! Jira 集成（Cloud REST v3，Basic 认证：账号邮箱 + API token）
//!
//! 工单链接统一输出为 `[KEY](<server>/browse/KEY)`，评论与描述使用 ADF 文档格式。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::ServiceSection;
use crate::tools::{
    parse_args, registry_of, schema_of, Auth, Endpoint, HttpSession, Operation, ToolError,
    ToolRegistry,
};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct IssueArgs {
    /// Issue key, e.g. OPENSD-1234
    pub issue_key: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct JqlArgs {
    pub jql_query: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_max_results() -> u32 {
    20
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateIssueArgs {
    /// Project key
    pub project: String,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    /// Issue type name, e.g. Task or Bug
    #[serde(default = "default_issue_type")]
    pub issue_type: String,
    /// Reporter account id (convert emails with get_account_id_from_email first)
    #[serde(default)]
    pub reporter_account_id: Option<String>,
}

fn default_issue_type() -> String {
    "Task".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CommentArgs {
    pub issue_key: String,
    pub comment: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TransitionArgs {
    pub issue_key: String,
    /// Transition name as returned by get_jira_transitions
    pub transition_name: String,
    /// Resolution id, only for transitions that require a resolution
    #[serde(default)]
    pub resolution_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AssignArgs {
    pub issue_key: String,
    pub account_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EmailArgs {
    pub email: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JiraOp {
    GetIssueDetails,
    SearchUsingJql,
    CreateIssue,
    AddComment,
    GetTransitions,
    PerformTransition,
    Assign,
    AccountIdFromEmail,
}

impl JiraOp {
    pub const ALL: [JiraOp; 8] = [
        JiraOp::GetIssueDetails,
        JiraOp::SearchUsingJql,
        JiraOp::CreateIssue,
        JiraOp::AddComment,
        JiraOp::GetTransitions,
        JiraOp::PerformTransition,
        JiraOp::Assign,
        JiraOp::AccountIdFromEmail,
    ];
}

pub struct JiraApi {
    endpoint: Endpoint,
}

/// 纯文本包装为一段 ADF 文档
pub fn adf_paragraph(text: &str) -> Value {
    json!({
        "type": "doc",
        "version": 1,
        "content": [{
            "type": "paragraph",
            "content": [{ "type": "text", "text": text }]
        }]
    })
}

impl JiraApi {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    pub fn issue_link(&self, key: &str) -> String {
        format!("[{key}]({})", self.endpoint.url(&format!("/browse/{key}")))
    }

    async fn get_issue_details(&self, args: IssueArgs) -> Result<Value, ToolError> {
        let issue = self
            .endpoint
            .get(&format!("/rest/api/3/issue/{}", args.issue_key), &[])
            .await?;
        let fields = &issue["fields"];
        Ok(json!({
            "key": self.issue_link(&args.issue_key),
            "summary": fields["summary"],
            "status": fields["status"]["name"],
            "assignee": fields["assignee"]["displayName"],
            "reporter": fields["reporter"]["displayName"],
            "priority": fields["priority"]["name"],
            "created": fields["created"],
            "updated": fields["updated"],
        }))
    }

    async fn search_using_jql(&self, args: JqlArgs) -> Result<Value, ToolError> {
        let body = self
            .endpoint
            .get(
                "/rest/api/3/search",
                &[
                    ("jql", args.jql_query),
                    ("maxResults", args.max_results.to_string()),
                    ("fields", "summary,status".to_string()),
                ],
            )
            .await?;
        let issues = body["issues"].as_array().map(Vec::as_slice).unwrap_or_default();
        if issues.is_empty() {
            return Ok(json!("Seems like there are no tickets to display with your query."));
        }
        let lines: Vec<String> = issues
            .iter()
            .filter_map(|issue| {
                let key = issue["key"].as_str()?;
                Some(format!(
                    "- {}: {} ({})",
                    self.issue_link(key),
                    issue["fields"]["summary"].as_str().unwrap_or_default(),
                    issue["fields"]["status"]["name"].as_str().unwrap_or("unknown"),
                ))
            })
            .collect();
        Ok(json!(lines.join("\n")))
    }

    async fn create_issue(&self, args: CreateIssueArgs) -> Result<Value, ToolError> {
        let mut fields = json!({
            "project": { "key": args.project },
            "summary": args.summary,
            "description": adf_paragraph(&args.description),
            "issuetype": { "name": args.issue_type },
        });
        if let Some(reporter) = args.reporter_account_id {
            fields["reporter"] = json!({ "id": reporter });
        }
        let created = self
            .endpoint
            .post("/rest/api/3/issue", &json!({ "fields": fields }))
            .await?;
        let key = created["key"].as_str().unwrap_or_default();
        tracing::info!("Created new Jira issue: {}", key);
        Ok(json!(self.issue_link(key)))
    }

    async fn add_comment(&self, args: CommentArgs) -> Result<Value, ToolError> {
        self.endpoint
            .post(
                &format!("/rest/api/3/issue/{}/comment", args.issue_key),
                &json!({ "body": adf_paragraph(&args.comment) }),
            )
            .await?;
        Ok(json!(format!(
            "Comment added successfully on Jira {}.",
            self.issue_link(&args.issue_key)
        )))
    }

    async fn transitions(&self, issue_key: &str) -> Result<Vec<Value>, ToolError> {
        let body = self
            .endpoint
            .get(&format!("/rest/api/3/issue/{issue_key}/transitions"), &[])
            .await?;
        Ok(body["transitions"].as_array().cloned().unwrap_or_default())
    }

    async fn get_transitions(&self, args: IssueArgs) -> Result<Value, ToolError> {
        let names: Vec<Value> = self
            .transitions(&args.issue_key)
            .await?
            .iter()
            .map(|t| json!({ "id": t["id"], "name": t["name"] }))
            .collect();
        Ok(Value::Array(names))
    }

    async fn perform_transition(&self, args: TransitionArgs) -> Result<Value, ToolError> {
        let transitions = self.transitions(&args.issue_key).await?;
        let Some(transition) = transitions
            .iter()
            .find(|t| t["name"].as_str().is_some_and(|n| n.eq_ignore_ascii_case(&args.transition_name)))
        else {
            return Ok(json!(format!(
                "Failed to transition JIRA ticket to {}: no such transition.",
                args.transition_name
            )));
        };
        let mut payload = json!({ "transition": { "id": transition["id"] } });
        if let Some(resolution) = args.resolution_id {
            payload["fields"] = json!({ "resolution": { "id": resolution } });
        }
        self.endpoint
            .post(&format!("/rest/api/3/issue/{}/transitions", args.issue_key), &payload)
            .await?;
        Ok(json!(format!(
            "JIRA ticket transitioned to {} successfully.",
            args.transition_name
        )))
    }

    async fn assign(&self, args: AssignArgs) -> Result<Value, ToolError> {
        self.endpoint
            .put(
                &format!("/rest/api/3/issue/{}/assignee", args.issue_key),
                &json!({ "accountId": args.account_id }),
            )
            .await?;
        Ok(json!(format!(
            "JIRA ticket assigned successfully {}.",
            self.issue_link(&args.issue_key)
        )))
    }

    async fn account_id_from_email(&self, args: EmailArgs) -> Result<Value, ToolError> {
        let users = self
            .endpoint
            .get("/rest/api/3/user/search", &[("query", args.email.clone())])
            .await?;
        match users.as_array().and_then(|u| u.first()) {
            Some(user) => Ok(user["accountId"].clone()),
            None => Err(ToolError::Execution(format!(
                "No Jira user found for email: {}",
                args.email
            ))),
        }
    }
}

#[async_trait]
impl Operation for JiraOp {
    type Api = JiraApi;

    fn name(&self) -> &'static str {
        match self {
            JiraOp::GetIssueDetails => "get_jira_issue_details",
            JiraOp::SearchUsingJql => "search_jira_using_jql",
            JiraOp::CreateIssue => "create_jira_issue",
            JiraOp::AddComment => "add_comment_string_to_jira_ticket",
            JiraOp::GetTransitions => "get_jira_transitions",
            JiraOp::PerformTransition => "perform_jira_transition",
            JiraOp::Assign => "assign_jira",
            JiraOp::AccountIdFromEmail => "get_account_id_from_email",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            JiraOp::GetIssueDetails => "Get the details of a Jira issue.",
            JiraOp::SearchUsingJql => "Search for multiple Jira issues using a JQL query.",
            JiraOp::CreateIssue => "Create a Jira issue and return its link.",
            JiraOp::AddComment => "Add a plain-text comment to a Jira issue.",
            JiraOp::GetTransitions => "List the transitions available for a Jira issue.",
            JiraOp::PerformTransition => "Move a Jira issue through the named transition.",
            JiraOp::Assign => "Assign a Jira issue to an account id.",
            JiraOp::AccountIdFromEmail => "Find the Jira account id for an email address.",
        }
    }

    fn parameters(&self) -> Value {
        match self {
            JiraOp::GetIssueDetails | JiraOp::GetTransitions => schema_of::<IssueArgs>(),
            JiraOp::SearchUsingJql => schema_of::<JqlArgs>(),
            JiraOp::CreateIssue => schema_of::<CreateIssueArgs>(),
            JiraOp::AddComment => schema_of::<CommentArgs>(),
            JiraOp::PerformTransition => schema_of::<TransitionArgs>(),
            JiraOp::Assign => schema_of::<AssignArgs>(),
            JiraOp::AccountIdFromEmail => schema_of::<EmailArgs>(),
        }
    }

    fn mock_response(&self) -> Value {
        match self {
            JiraOp::GetIssueDetails => json!({
                "key": "OPENSD-1",
                "summary": "Mock issue",
                "status": "To Do",
                "assignee": null,
            }),
            JiraOp::SearchUsingJql => json!("- OPENSD-1: Mock issue (To Do)"),
            JiraOp::CreateIssue => json!("OPENSD-1"),
            JiraOp::AddComment => json!("Comment added successfully on Jira OPENSD-1."),
            JiraOp::GetTransitions => json!([{ "id": "11", "name": "In Progress" }, { "id": "31", "name": "Done" }]),
            JiraOp::PerformTransition => json!("JIRA ticket transitioned successfully."),
            JiraOp::Assign => json!("JIRA ticket assigned successfully OPENSD-1."),
            JiraOp::AccountIdFromEmail => json!("mock-account-id"),
        }
    }

    async fn run(&self, api: &JiraApi, args: Value) -> Result<Value, ToolError> {
        let name = self.name();
        match self {
            JiraOp::GetIssueDetails => api.get_issue_details(parse_args(name, args)?).await,
            JiraOp::SearchUsingJql => api.search_using_jql(parse_args(name, args)?).await,
            JiraOp::CreateIssue => api.create_issue(parse_args(name, args)?).await,
            JiraOp::AddComment => api.add_comment(parse_args(name, args)?).await,
            JiraOp::GetTransitions => api.get_transitions(parse_args(name, args)?).await,
            JiraOp::PerformTransition => api.perform_transition(parse_args(name, args)?).await,
            JiraOp::Assign => api.assign(parse_args(name, args)?).await,
            JiraOp::AccountIdFromEmail => api.account_id_from_email(parse_args(name, args)?).await,
        }
    }
}

pub fn registry(session: Arc<HttpSession>, cfg: &ServiceSection) -> Result<ToolRegistry, ToolError> {
    let auth = match (cfg.username(), cfg.token()) {
        (Some(username), Some(password)) => Auth::Basic { username, password },
        _ => {
            tracing::warn!("Jira credentials are not set; requests will be unauthenticated");
            Auth::None
        }
    };
    let endpoint = Endpoint::new("jira", session, cfg.base_url.clone(), auth);
    registry_of(&JiraOp::ALL, Arc::new(JiraApi::new(endpoint)))
}
