//! PagerDuty 集成：值班查询
//!
//! 认证头为 `Token token=<key>`，Accept 固定为 v2 媒体类型。
//! 值班人 = 排班表在 [now-1h, now+1h] 窗口内的第一个用户。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::ServiceSection;
use crate::tools::{
    parse_args, registry_of, schema_of, Auth, Endpoint, HttpSession, Operation, ToolError,
    ToolRegistry,
};

const ACCEPT: &str = "application/vnd.pagerduty+json;version=2";

/// (展示标题, 排班表名称)
pub const SRE_SCHEDULES: [(&str, &str); 4] = [
    ("Platform Primary Oncall", "ETI SRE - Primary"),
    ("Platform Secondary Oncall", "ETI SRE - Secondary"),
    ("Platform Service Desk US", "Outshift Platform Service Desk Support US"),
    ("Platform Service Desk Europe", "Outshift Platform Service Desk Support Europe"),
];

#[derive(Debug, Deserialize, JsonSchema)]
pub struct NoArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ScheduleQueryArgs {
    /// Filter schedules by name
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PagerdutyOp {
    WhoIsOnSreOncall,
    ListOncallSchedules,
}

impl PagerdutyOp {
    pub const ALL: [PagerdutyOp; 2] = [PagerdutyOp::WhoIsOnSreOncall, PagerdutyOp::ListOncallSchedules];
}

/// 一个排班表当前的值班人
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnCall {
    pub name: String,
    pub html_url: String,
    pub email: String,
}

pub struct PagerdutyApi {
    endpoint: Endpoint,
}

impl PagerdutyApi {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    async fn schedules(&self, query: Option<String>) -> Result<Vec<Value>, ToolError> {
        let params: Vec<(&str, String)> = query.map(|q| ("query", q)).into_iter().collect();
        let body = self.endpoint.get("/schedules", &params).await?;
        Ok(body["schedules"].as_array().cloned().unwrap_or_default())
    }

    pub async fn current_oncall(&self, schedule_name: &str) -> Result<OnCall, ToolError> {
        let schedules = self.schedules(Some(schedule_name.to_string())).await?;
        let schedule_id = schedules
            .first()
            .and_then(|s| s["id"].as_str())
            .ok_or_else(|| {
                ToolError::Execution(format!("No schedule found for schedule name: {schedule_name}"))
            })?
            .to_string();
        tracing::info!("Found schedule ID: {} for schedule name: {}", schedule_id, schedule_name);

        let now = Utc::now();
        let window = [
            ("since", (now - Duration::hours(1)).to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("until", (now + Duration::hours(1)).to_rfc3339_opts(SecondsFormat::Secs, true)),
        ];
        let body = self
            .endpoint
            .get(&format!("/schedules/{schedule_id}/users"), &window)
            .await?;
        let user = body["users"]
            .as_array()
            .and_then(|users| users.iter().find(|u| u["self"].is_string()))
            .ok_or_else(|| {
                ToolError::Execution(format!("No on-call users found for schedule ID: {schedule_id}"))
            })?;

        let email = match user["email"].as_str() {
            Some(email) => email.to_string(),
            None => {
                let self_url = user["self"].as_str().unwrap_or_default();
                let detail = self.endpoint.get(self_url, &[]).await?;
                detail["user"]["email"].as_str().unwrap_or_default().to_string()
            }
        };
        Ok(OnCall {
            name: user["summary"].as_str().unwrap_or_default().to_string(),
            html_url: user["html_url"].as_str().unwrap_or_default().to_string(),
            email,
        })
    }

    async fn who_is_on_sre_oncall(&self) -> Result<Value, ToolError> {
        let mut markdown = String::from("## Platform On-Call Persons\n\n");
        for (title, schedule) in SRE_SCHEDULES {
            let oncall = self.current_oncall(schedule).await?;
            tracing::info!("Found {}: {} - {}", title, oncall.name, oncall.email);
            markdown.push_str(&format!(
                "**{}:**\n[{}]({}) - {}\n\n",
                title, oncall.name, oncall.html_url, oncall.email
            ));
        }
        Ok(json!(markdown.trim_end()))
    }

    async fn list_oncall_schedules(&self, args: ScheduleQueryArgs) -> Result<Value, ToolError> {
        let schedules: Vec<Value> = self
            .schedules(args.query)
            .await?
            .iter()
            .map(|s| json!({ "id": s["id"], "name": s["name"], "html_url": s["html_url"] }))
            .collect();
        Ok(Value::Array(schedules))
    }
}

#[async_trait]
impl Operation for PagerdutyOp {
    type Api = PagerdutyApi;

    fn name(&self) -> &'static str {
        match self {
            PagerdutyOp::WhoIsOnSreOncall => "who_is_on_sre_oncall",
            PagerdutyOp::ListOncallSchedules => "list_oncall_schedules",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            PagerdutyOp::WhoIsOnSreOncall => {
                "Retrieve the current SRE and platform service desk on-call persons."
            }
            PagerdutyOp::ListOncallSchedules => "List PagerDuty on-call schedules, optionally filtered by name.",
        }
    }

    fn parameters(&self) -> Value {
        match self {
            PagerdutyOp::WhoIsOnSreOncall => schema_of::<NoArgs>(),
            PagerdutyOp::ListOncallSchedules => schema_of::<ScheduleQueryArgs>(),
        }
    }

    fn mock_response(&self) -> Value {
        match self {
            PagerdutyOp::WhoIsOnSreOncall => json!(
                "## Platform On-Call Persons\n\n**Platform Primary Oncall:**\n[Mock Oncall](https://example.pagerduty.com/users/P1) - oncall@example.com"
            ),
            PagerdutyOp::ListOncallSchedules => json!([{ "id": "P1", "name": "ETI SRE - Primary" }]),
        }
    }

    async fn run(&self, api: &PagerdutyApi, args: Value) -> Result<Value, ToolError> {
        match self {
            PagerdutyOp::WhoIsOnSreOncall => api.who_is_on_sre_oncall().await,
            PagerdutyOp::ListOncallSchedules => {
                api.list_oncall_schedules(parse_args(self.name(), args)?).await
            }
        }
    }
}

pub fn registry(session: Arc<HttpSession>, cfg: &ServiceSection) -> Result<ToolRegistry, ToolError> {
    let auth = cfg
        .token()
        .map(|key| Auth::Header(format!("Token token={key}")))
        .unwrap_or_default();
    let endpoint = Endpoint::new("pagerduty", session, cfg.base_url.clone(), auth).with_accept(ACCEPT);
    registry_of(&PagerdutyOp::ALL, Arc::new(PagerdutyApi::new(endpoint)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Arc<HttpSession> {
        Arc::new(HttpSession::new(std::time::Duration::from_secs(5)).unwrap())
    }

    #[test]
    fn test_registry() {
        let registry = registry(session(), &ServiceSection::default()).unwrap();
        assert_eq!(registry.tool_names(), vec!["list_oncall_schedules", "who_is_on_sre_oncall"]);
    }

    #[test]
    fn test_oncall_takes_no_arguments() {
        let schema = PagerdutyOp::WhoIsOnSreOncall.parameters();
        assert_eq!(schema["type"], "object");
        assert!(schema.get("required").is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_lookup_errors() {
        let endpoint = Endpoint::new("pagerduty", session(), "", Auth::None);
        let api = PagerdutyApi::new(endpoint);
        let err = api.current_oncall("ETI SRE - Primary").await.unwrap_err();
        assert!(matches!(err, ToolError::NotConfigured(_)));
    }
}
