//! GitHub 集成：CI 工作流、Pull Request、仓库信息与建仓
//!
//! REST v3，Bearer token；每个操作一个参数类型，schema 由 schemars 派生。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::ServiceSection;
use crate::tools::{parse_args, registry_of, schema_of, Auth, Endpoint, HttpSession, Operation, ToolError, ToolRegistry};

const ACCEPT: &str = "application/vnd.github+json";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RepoArgs {
    /// Repository name
    pub repo_name: String,
    /// GitHub organization that owns the repository
    pub org_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WorkflowArgs {
    pub repo_name: String,
    pub org_name: String,
    /// Workflow name as shown in the Actions tab
    pub workflow_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CiLogsArgs {
    pub repo_name: String,
    pub org_name: String,
    /// Number of most recent runs to report
    #[serde(default = "default_last_n")]
    pub last_n_logs: usize,
}

fn default_last_n() -> usize {
    1
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListPullRequestsArgs {
    pub repo_name: String,
    pub org_name: String,
    /// open, closed or all
    #[serde(default = "default_pr_state")]
    pub state: String,
}

fn default_pr_state() -> String {
    "open".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PullRequestArgs {
    pub repo_name: String,
    pub org_name: String,
    pub pull_number: u64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdatePullRequestArgs {
    pub repo_name: String,
    pub org_name: String,
    pub pull_number: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    /// open or closed
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CommentArgs {
    pub repo_name: String,
    pub org_name: String,
    pub pull_number: u64,
    pub comment: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LatestCommentsArgs {
    pub repo_name: String,
    pub org_name: String,
    pub pull_number: u64,
    #[serde(default = "default_comment_limit")]
    pub limit: usize,
}

fn default_comment_limit() -> usize {
    5
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateRepoArgs {
    pub repo_name: String,
    pub org_name: String,
    /// Backstage project the repository belongs to; added as a topic
    pub project_name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Template repository in the same organization, if any
    #[serde(default)]
    pub repo_template: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GithubOp {
    ListCiWorkflows,
    RetrieveCiStatus,
    RetrieveCiLogs,
    ListPullRequests,
    ReadPullRequest,
    UpdatePullRequest,
    AddPullRequestComment,
    ReadLatestPullRequestComments,
    GetRepoDescription,
    GetRepoTopics,
    GetRepoMembers,
    CreateGithubRepo,
}

impl GithubOp {
    pub const ALL: [GithubOp; 12] = [
        GithubOp::ListCiWorkflows,
        GithubOp::RetrieveCiStatus,
        GithubOp::RetrieveCiLogs,
        GithubOp::ListPullRequests,
        GithubOp::ReadPullRequest,
        GithubOp::UpdatePullRequest,
        GithubOp::AddPullRequestComment,
        GithubOp::ReadLatestPullRequestComments,
        GithubOp::GetRepoDescription,
        GithubOp::GetRepoTopics,
        GithubOp::GetRepoMembers,
        GithubOp::CreateGithubRepo,
    ];
}

pub struct GithubApi {
    endpoint: Endpoint,
}

impl GithubApi {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    async fn workflows(&self, org: &str, repo: &str) -> Result<Vec<Value>, ToolError> {
        let body = self
            .endpoint
            .get(&format!("/repos/{org}/{repo}/actions/workflows"), &[])
            .await?;
        Ok(items(&body, "workflows"))
    }

    async fn latest_runs(&self, org: &str, repo: &str, workflow_id: &Value, n: usize) -> Result<Vec<Value>, ToolError> {
        let body = self
            .endpoint
            .get(
                &format!("/repos/{org}/{repo}/actions/workflows/{workflow_id}/runs"),
                &[("per_page", n.max(1).to_string())],
            )
            .await?;
        Ok(items(&body, "workflow_runs"))
    }

    async fn list_ci_workflows(&self, args: RepoArgs) -> Result<Value, ToolError> {
        let names: Vec<Value> = self
            .workflows(&args.org_name, &args.repo_name)
            .await?
            .iter()
            .map(|w| w["name"].clone())
            .collect();
        Ok(Value::Array(names))
    }

    async fn retrieve_ci_status(&self, args: WorkflowArgs) -> Result<Value, ToolError> {
        let workflows = self.workflows(&args.org_name, &args.repo_name).await?;
        let Some(workflow) = workflows.iter().find(|w| w["name"] == args.workflow_name.as_str()) else {
            return Ok(json!(format!(
                "Workflow '{}' not found in repo '{}'.",
                args.workflow_name, args.repo_name
            )));
        };
        let runs = self
            .latest_runs(&args.org_name, &args.repo_name, &workflow["id"], 1)
            .await?;
        let Some(run) = runs.first() else {
            return Ok(json!(format!(
                "No runs found for workflow '{}' in repo '{}'.",
                args.workflow_name, args.repo_name
            )));
        };
        let status = run["conclusion"]
            .as_str()
            .or_else(|| run["status"].as_str())
            .unwrap_or("unknown");
        Ok(json!(format!(
            "The last run of workflow '{}' in repo '{}' concluded with status: {}",
            args.workflow_name, args.repo_name, status
        )))
    }

    /// 每个工作流最近 N 次运行的结论与失败步骤
    async fn retrieve_ci_logs(&self, args: CiLogsArgs) -> Result<Value, ToolError> {
        let (org, repo) = (&args.org_name, &args.repo_name);
        let workflows = self.workflows(org, repo).await?;
        if workflows.is_empty() {
            return Ok(json!("No workflows found."));
        }
        let mut report = Vec::new();
        for workflow in &workflows {
            for run in self.latest_runs(org, repo, &workflow["id"], args.last_n_logs).await? {
                let jobs = self
                    .endpoint
                    .get(&format!("/repos/{org}/{repo}/actions/runs/{}/jobs", run["id"]), &[])
                    .await?;
                let failed_steps: Vec<Value> = items(&jobs, "jobs")
                    .iter()
                    .flat_map(|job| {
                        let job_name = job["name"].clone();
                        job["steps"]
                            .as_array()
                            .cloned()
                            .unwrap_or_default()
                            .into_iter()
                            .filter(|s| s["conclusion"] == "failure")
                            .map(move |s| json!({ "job": job_name, "step": s["name"] }))
                    })
                    .collect();
                report.push(json!({
                    "workflow": workflow["name"],
                    "run_id": run["id"],
                    "status": run["status"],
                    "conclusion": run["conclusion"],
                    "html_url": run["html_url"],
                    "logs_url": run["logs_url"],
                    "failed_steps": failed_steps,
                }));
            }
        }
        Ok(Value::Array(report))
    }

    async fn list_pull_requests(&self, args: ListPullRequestsArgs) -> Result<Value, ToolError> {
        let body = self
            .endpoint
            .get(
                &format!("/repos/{}/{}/pulls", args.org_name, args.repo_name),
                &[("state", args.state)],
            )
            .await?;
        let pulls: Vec<Value> = body
            .as_array()
            .map(|prs| {
                prs.iter()
                    .map(|pr| json!({ "title": pr["title"], "link": pr["html_url"] }))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Value::Array(pulls))
    }

    async fn read_pull_request(&self, args: PullRequestArgs) -> Result<Value, ToolError> {
        self.endpoint
            .get(
                &format!("/repos/{}/{}/pulls/{}", args.org_name, args.repo_name, args.pull_number),
                &[],
            )
            .await
    }

    async fn update_pull_request(&self, args: UpdatePullRequestArgs) -> Result<Value, ToolError> {
        let mut patch = serde_json::Map::new();
        for (key, value) in [("title", args.title), ("body", args.body), ("state", args.state)] {
            if let Some(v) = value {
                patch.insert(key.to_string(), Value::String(v));
            }
        }
        if patch.is_empty() {
            return Err(ToolError::InvalidArguments {
                tool: "update_pull_request".to_string(),
                message: "nothing to update: set title, body or state".to_string(),
            });
        }
        self.endpoint
            .patch(
                &format!("/repos/{}/{}/pulls/{}", args.org_name, args.repo_name, args.pull_number),
                &Value::Object(patch),
            )
            .await?;
        Ok(json!(format!(
            "Successfully updated pull request {} in repo {} in org {}",
            args.pull_number, args.repo_name, args.org_name
        )))
    }

    async fn add_pull_request_comment(&self, args: CommentArgs) -> Result<Value, ToolError> {
        let comment = self
            .endpoint
            .post(
                &format!(
                    "/repos/{}/{}/issues/{}/comments",
                    args.org_name, args.repo_name, args.pull_number
                ),
                &json!({ "body": args.comment }),
            )
            .await?;
        Ok(json!({ "id": comment["id"], "html_url": comment["html_url"] }))
    }

    async fn read_latest_pull_request_comments(&self, args: LatestCommentsArgs) -> Result<Value, ToolError> {
        let body = self
            .endpoint
            .get(
                &format!(
                    "/repos/{}/{}/issues/{}/comments",
                    args.org_name, args.repo_name, args.pull_number
                ),
                &[],
            )
            .await?;
        let comments: Vec<Value> = body
            .as_array()
            .map(|all| {
                all.iter()
                    .rev()
                    .take(args.limit)
                    .map(|c| json!({ "user": c["user"]["login"], "body": c["body"], "created_at": c["created_at"] }))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Value::Array(comments))
    }

    async fn repo(&self, args: &RepoArgs) -> Result<Value, ToolError> {
        self.endpoint
            .get(&format!("/repos/{}/{}", args.org_name, args.repo_name), &[])
            .await
    }

    async fn get_repo_description(&self, args: RepoArgs) -> Result<Value, ToolError> {
        let repo = self.repo(&args).await?;
        Ok(json!(repo["description"].as_str().unwrap_or_default()))
    }

    async fn get_repo_topics(&self, args: RepoArgs) -> Result<Value, ToolError> {
        let body = self
            .endpoint
            .get(&format!("/repos/{}/{}/topics", args.org_name, args.repo_name), &[])
            .await?;
        Ok(body.get("names").cloned().unwrap_or_else(|| json!([])))
    }

    /// 按权限分组的协作者
    async fn get_repo_members(&self, args: RepoArgs) -> Result<Value, ToolError> {
        let body = self
            .endpoint
            .get(
                &format!("/repos/{}/{}/collaborators", args.org_name, args.repo_name),
                &[],
            )
            .await?;
        let mut members: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for collaborator in body.as_array().map(Vec::as_slice).unwrap_or_default() {
            let role = collaborator["role_name"].as_str().unwrap_or("unknown").to_string();
            if let Some(login) = collaborator["login"].as_str() {
                members.entry(role).or_default().push(login.to_string());
            }
        }
        Ok(json!(members))
    }

    async fn create_github_repo(&self, args: CreateRepoArgs) -> Result<Value, ToolError> {
        let probe = RepoArgs {
            repo_name: args.repo_name.clone(),
            org_name: args.org_name.clone(),
        };
        match self.repo(&probe).await {
            Ok(_) => {
                return Ok(json!(format!(
                    "Repository '{}' already exists in organization '{}'.",
                    args.repo_name, args.org_name
                )))
            }
            Err(ToolError::Http { status: 404, .. }) => {}
            Err(e) => return Err(e),
        }

        let description = args
            .description
            .unwrap_or_else(|| format!("Repository for {}", args.repo_name));
        let template = args
            .repo_template
            .filter(|t| !t.trim().is_empty() && !t.eq_ignore_ascii_case("none"));
        tracing::info!(repo = %args.repo_name, org = %args.org_name, ?template, "Creating GitHub repo");
        let created = match template {
            Some(template) => {
                self.endpoint
                    .post(
                        &format!("/repos/{}/{}/generate", args.org_name, template),
                        &json!({
                            "owner": args.org_name,
                            "name": args.repo_name,
                            "description": description,
                            "private": true,
                        }),
                    )
                    .await?
            }
            None => {
                self.endpoint
                    .post(
                        &format!("/orgs/{}/repos", args.org_name),
                        &json!({ "name": args.repo_name, "description": description, "private": true }),
                    )
                    .await?
            }
        };
        self.endpoint
            .put(
                &format!("/repos/{}/{}/topics", args.org_name, args.repo_name),
                &json!({ "names": [args.project_name.to_lowercase()] }),
            )
            .await?;
        Ok(json!({ "html_url": created["html_url"], "full_name": created["full_name"] }))
    }
}

/// 取列表字段；缺失时为空
fn items(body: &Value, key: &str) -> Vec<Value> {
    body.get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

#[async_trait]
impl Operation for GithubOp {
    type Api = GithubApi;

    fn name(&self) -> &'static str {
        match self {
            GithubOp::ListCiWorkflows => "list_ci_workflows",
            GithubOp::RetrieveCiStatus => "retrieve_ci_status",
            GithubOp::RetrieveCiLogs => "retrieve_ci_logs",
            GithubOp::ListPullRequests => "list_pull_requests",
            GithubOp::ReadPullRequest => "read_pull_request",
            GithubOp::UpdatePullRequest => "update_pull_request",
            GithubOp::AddPullRequestComment => "add_pull_request_comment",
            GithubOp::ReadLatestPullRequestComments => "read_latest_pull_request_comments",
            GithubOp::GetRepoDescription => "get_repo_description",
            GithubOp::GetRepoTopics => "get_repo_topics",
            GithubOp::GetRepoMembers => "get_repo_members",
            GithubOp::CreateGithubRepo => "create_github_repo",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            GithubOp::ListCiWorkflows => "List the GitHub Actions CI workflows of a repository.",
            GithubOp::RetrieveCiStatus => "Retrieve the conclusion of the latest run of a GitHub Actions workflow.",
            GithubOp::RetrieveCiLogs => "Retrieve recent GitHub Actions runs with their failed steps and log URLs.",
            GithubOp::ListPullRequests => "List pull requests of a repository, returning title and link.",
            GithubOp::ReadPullRequest => "Read the details of a pull request.",
            GithubOp::UpdatePullRequest => "Update the title, body or state of a pull request.",
            GithubOp::AddPullRequestComment => "Add a comment to a pull request.",
            GithubOp::ReadLatestPullRequestComments => "Read the latest comments of a pull request.",
            GithubOp::GetRepoDescription => "Get the description of a repository.",
            GithubOp::GetRepoTopics => "Get the topics of a repository.",
            GithubOp::GetRepoMembers => "Get the collaborators of a repository grouped by role.",
            GithubOp::CreateGithubRepo => "Create a new GitHub repository, optionally from a template repository.",
        }
    }

    fn parameters(&self) -> Value {
        match self {
            GithubOp::ListCiWorkflows
            | GithubOp::GetRepoDescription
            | GithubOp::GetRepoTopics
            | GithubOp::GetRepoMembers => schema_of::<RepoArgs>(),
            GithubOp::RetrieveCiStatus => schema_of::<WorkflowArgs>(),
            GithubOp::RetrieveCiLogs => schema_of::<CiLogsArgs>(),
            GithubOp::ListPullRequests => schema_of::<ListPullRequestsArgs>(),
            GithubOp::ReadPullRequest => schema_of::<PullRequestArgs>(),
            GithubOp::UpdatePullRequest => schema_of::<UpdatePullRequestArgs>(),
            GithubOp::AddPullRequestComment => schema_of::<CommentArgs>(),
            GithubOp::ReadLatestPullRequestComments => schema_of::<LatestCommentsArgs>(),
            GithubOp::CreateGithubRepo => schema_of::<CreateRepoArgs>(),
        }
    }

    fn mock_response(&self) -> Value {
        match self {
            GithubOp::ListCiWorkflows => json!(["build", "release"]),
            GithubOp::RetrieveCiStatus => json!(["completed", "succeeded"]),
            GithubOp::RetrieveCiLogs => json!(["Log message 1", "Log message 2", "Log message 3"]),
            GithubOp::ListPullRequests => json!([
                { "title": "Mock pull request", "link": "https://github.com/example/repo/pull/1" }
            ]),
            GithubOp::ReadPullRequest => json!({ "number": 1, "title": "Mock pull request", "state": "open" }),
            GithubOp::UpdatePullRequest => json!("Successfully updated pull request 1 (dry run)"),
            GithubOp::AddPullRequestComment => json!({ "id": 1, "html_url": "https://github.com/example/repo/pull/1#issuecomment-1" }),
            GithubOp::ReadLatestPullRequestComments => json!([{ "user": "octocat", "body": "LGTM" }]),
            GithubOp::GetRepoDescription => json!("Mock repository description"),
            GithubOp::GetRepoTopics => json!(["mock"]),
            GithubOp::GetRepoMembers => json!({ "admin": ["octocat"] }),
            GithubOp::CreateGithubRepo => json!({ "html_url": "https://github.com/example/mock-repo", "full_name": "example/mock-repo" }),
        }
    }

    async fn run(&self, api: &GithubApi, args: Value) -> Result<Value, ToolError> {
        let name = self.name();
        match self {
            GithubOp::ListCiWorkflows => api.list_ci_workflows(parse_args(name, args)?).await,
            GithubOp::RetrieveCiStatus => api.retrieve_ci_status(parse_args(name, args)?).await,
            GithubOp::RetrieveCiLogs => api.retrieve_ci_logs(parse_args(name, args)?).await,
            GithubOp::ListPullRequests => api.list_pull_requests(parse_args(name, args)?).await,
            GithubOp::ReadPullRequest => api.read_pull_request(parse_args(name, args)?).await,
            GithubOp::UpdatePullRequest => api.update_pull_request(parse_args(name, args)?).await,
            GithubOp::AddPullRequestComment => api.add_pull_request_comment(parse_args(name, args)?).await,
            GithubOp::ReadLatestPullRequestComments => {
                api.read_latest_pull_request_comments(parse_args(name, args)?).await
            }
            GithubOp::GetRepoDescription => api.get_repo_description(parse_args(name, args)?).await,
            GithubOp::GetRepoTopics => api.get_repo_topics(parse_args(name, args)?).await,
            GithubOp::GetRepoMembers => api.get_repo_members(parse_args(name, args)?).await,
            GithubOp::CreateGithubRepo => api.create_github_repo(parse_args(name, args)?).await,
        }
    }
}

pub fn registry(session: Arc<HttpSession>, cfg: &ServiceSection) -> Result<ToolRegistry, ToolError> {
    let auth = cfg.token().map(Auth::Bearer).unwrap_or_default();
    let endpoint = Endpoint::new("github", session, cfg.base_url.clone(), auth).with_accept(ACCEPT);
    registry_of(&GithubOp::ALL, Arc::new(GithubApi::new(endpoint)))
}
