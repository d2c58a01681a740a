//! Backstage 集成：按用户查询目录实体、所属组与组拥有的项目（system）

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

const BY_QUERY: &str = "/api/catalog/entities/by-query";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UserArgs {
    /// Backstage user name (the email local part)
    pub user_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackstageOp {
    CatalogEntities,
    GroupsByUser,
    ProjectsByUser,
}

impl BackstageOp {
    pub const ALL: [BackstageOp; 3] = [
        BackstageOp::CatalogEntities,
        BackstageOp::GroupsByUser,
        BackstageOp::ProjectsByUser,
    ];
}

pub struct BackstageApi {
    endpoint: Endpoint,
}

/// 邮箱只取 @ 之前的部分
fn user_name(user_id: &str) -> &str {
    user_id.split('@').next().unwrap_or(user_id)
}

fn entity_names(body: &Value) -> Vec<String> {
    body["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|e| e["metadata"]["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

impl BackstageApi {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    async fn catalog_entities(&self, args: UserArgs) -> Result<Value, ToolError> {
        let filter = format!("kind=user,metadata.name={}", user_name(&args.user_id));
        self.endpoint.get(BY_QUERY, &[("filter", filter)]).await
    }

    async fn group_names(&self, user_id: &str) -> Result<Vec<String>, ToolError> {
        let body = self
            .endpoint
            .get(
                BY_QUERY,
                &[
                    ("filter", format!("kind=group,spec.members={}", user_name(user_id))),
                    ("fields", "metadata.name".to_string()),
                ],
            )
            .await?;
        let names = entity_names(&body);
        tracing::info!("Groups found for the user: {:?}", names);
        Ok(names)
    }

    async fn groups_by_user(&self, args: UserArgs) -> Result<Value, ToolError> {
        let names = self.group_names(&args.user_id).await?;
        if names.is_empty() {
            return Ok(json!("No groups found for the user"));
        }
        Ok(json!(names))
    }

    async fn projects_by_user(&self, args: UserArgs) -> Result<Value, ToolError> {
        let groups = self.group_names(&args.user_id).await?;
        let mut projects = serde_json::Map::new();
        for group in groups {
            let body = self
                .endpoint
                .get(
                    BY_QUERY,
                    &[
                        ("filter", format!("kind=system,relations.ownedBy=group:default/{group}")),
                        ("fields", "metadata.name".to_string()),
                    ],
                )
                .await?;
            projects.insert(group, json!(entity_names(&body)));
        }
        Ok(Value::Object(projects))
    }
}

#[async_trait]
impl Operation for BackstageOp {
    type Api = BackstageApi;

    fn name(&self) -> &'static str {
        match self {
            BackstageOp::CatalogEntities => "get_backstage_catalog_entities",
            BackstageOp::GroupsByUser => "get_backstage_groups_by_user",
            BackstageOp::ProjectsByUser => "get_backstage_projects_by_user",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            BackstageOp::CatalogEntities => "Fetch the Backstage catalog entities of a user.",
            BackstageOp::GroupsByUser => "List the Backstage groups a user is a member of.",
            BackstageOp::ProjectsByUser => {
                "Fetch the projects owned by the groups the user is a member of, keyed by group."
            }
        }
    }

    fn parameters(&self) -> Value {
        schema_of::<UserArgs>()
    }

    fn mock_response(&self) -> Value {
        match self {
            BackstageOp::CatalogEntities => json!([{
                "id": "1",
                "name": "Catalog Entry 1",
                "description": "Description for Catalog Entry 1",
                "owner": "Owner 1"
            }]),
            BackstageOp::GroupsByUser | BackstageOp::ProjectsByUser => json!([{
                "id": "1",
                "name": "Group 1",
                "description": "Description for Group 1",
                "owner": "Owner 1"
            }]),
        }
    }

    async fn run(&self, api: &BackstageApi, args: Value) -> Result<Value, ToolError> {
        let args: UserArgs = parse_args(self.name(), args)?;
        match self {
            BackstageOp::CatalogEntities => api.catalog_entities(args).await,
            BackstageOp::GroupsByUser => api.groups_by_user(args).await,
            BackstageOp::ProjectsByUser => api.projects_by_user(args).await,
        }
    }
}

pub fn registry(session: Arc<HttpSession>, cfg: &ServiceSection) -> Result<ToolRegistry, ToolError> {
    let auth = cfg.token().map(Auth::Bearer).unwrap_or_default();
    let endpoint = Endpoint::new("backstage", session, cfg.base_url.clone(), auth);
    registry_of(&BackstageOp::ALL, Arc::new(BackstageApi::new(endpoint)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_name_strips_domain() {
        assert_eq!(user_name("jdoe@example.com"), "jdoe");
        assert_eq!(user_name("jdoe"), "jdoe");
    }

    #[test]
    fn test_entity_names() {
        let body = json!({"items": [
            {"metadata": {"name": "platform"}},
            {"metadata": {}},
            {"metadata": {"name": "sre"}}
        ]});
        assert_eq!(entity_names(&body), vec!["platform", "sre"]);
        assert!(entity_names(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn test_missing_user_id_is_invalid() {
        let session = Arc::new(HttpSession::new(std::time::Duration::from_secs(5)).unwrap());
        let registry = registry(session, &ServiceSection::default()).unwrap();
        let tool = registry.get("get_backstage_groups_by_user").unwrap();
        let err = tool.execute(json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }
}
