//! ArgoCD 集成：把应用部署（同步）到公共集群

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
pub struct DeployArgs {
    /// Name of the ArgoCD application
    pub app_name: String,
    /// Email of the requesting user, recorded in the sync request
    pub user_email: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgocdOp {
    DeployToCommonCluster,
}

pub struct ArgocdApi {
    endpoint: Endpoint,
}

impl ArgocdApi {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    async fn deploy(&self, args: DeployArgs) -> Result<Value, ToolError> {
        let path = format!("/api/v1/applications/{}", args.app_name);
        // 应用不存在时这里返回 404
        let app = self.endpoint.get(&path, &[]).await?;
        tracing::info!(
            app = %args.app_name,
            requested_by = %args.user_email,
            "Syncing ArgoCD application"
        );
        let synced = self
            .endpoint
            .post(
                &format!("{path}/sync"),
                &json!({ "prune": false, "dryRun": false, "infos": [{ "name": "requested_by", "value": args.user_email }] }),
            )
            .await?;
        Ok(json!({
            "app_name": args.app_name,
            "destination": app["spec"]["destination"],
            "sync_status": synced["status"]["sync"]["status"],
            "health": synced["status"]["health"]["status"],
            "operation": synced["status"]["operationState"]["phase"],
        }))
    }
}

#[async_trait]
impl Operation for ArgocdOp {
    type Api = ArgocdApi;

    fn name(&self) -> &'static str {
        "deploy_app_to_common_cluster_using_argocd"
    }

    fn description(&self) -> &'static str {
        "Deploys an application to the common cluster using ArgoCD."
    }

    fn parameters(&self) -> Value {
        schema_of::<DeployArgs>()
    }

    fn mock_response(&self) -> Value {
        json!({
            "app_name": "mock-app",
            "sync_status": "Synced",
            "health": "Healthy",
            "operation": "Succeeded",
            "message": "Mock deployment to the common cluster completed"
        })
    }

    async fn run(&self, api: &ArgocdApi, args: Value) -> Result<Value, ToolError> {
        api.deploy(parse_args(self.name(), args)?).await
    }
}

pub fn registry(session: Arc<HttpSession>, cfg: &ServiceSection) -> Result<ToolRegistry, ToolError> {
    let auth = cfg.token().map(Auth::Bearer).unwrap_or_default();
    let endpoint = Endpoint::new("argocd", session, cfg.base_url.clone(), auth);
    registry_of(&[ArgocdOp::DeployToCommonCluster], Arc::new(ArgocdApi::new(endpoint)))
}
