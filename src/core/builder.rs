//! 编排器构建器：统一的初始化逻辑
//!
//! 从 AppConfig 组装 LLM、检查点存储、提示词与各 Agent 的工具注册表；
//! 每一项都可以显式注入（测试用脚本化 LLM 与计数工具）。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::orchestrator::AgentLane;
use crate::core::{AgentError, AgentKind, Orchestrator};
use crate::graph::{
    AgentNode, Prompts, ReflectionNode, SupervisorNode, ToolNode, WhatCanYouDoNode,
};
use crate::integrations;
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::{Checkpointer, HistoryTrimmer, MemoryCheckpointer, SqliteCheckpointer};
use crate::tools::{dry_run_registry, HttpSession, ToolExecutor, ToolRegistry};

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / DeepSeek / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let llm = &cfg.llm;
    let provider = llm.provider.to_lowercase();
    let key = |name: &str| std::env::var(name).ok().filter(|k| !k.trim().is_empty());
    let timeout = Duration::from_secs(llm.request_timeout_secs);

    let client = match provider.as_str() {
        "mock" => None,
        "deepseek" => key("DEEPSEEK_API_KEY").map(|k| {
            tracing::info!("Using DeepSeek LLM ({})", llm.model);
            create_deepseek_client(llm.base_url.as_deref(), &llm.model, k)
        }),
        _ => key("OPENAI_API_KEY").map(|k| {
            tracing::info!("Using OpenAI-compatible LLM ({})", llm.model);
            OpenAiClient::new(llm.base_url.as_deref(), &llm.model, k)
        }),
    };
    match client {
        Some(client) => Arc::new(
            client
                .with_temperature(llm.temperature)
                .with_timeout(timeout),
        ),
        None => {
            if provider != "mock" {
                tracing::warn!("No API key set for provider '{}', using Mock LLM", provider);
            }
            Arc::new(MockLlmClient)
        }
    }
}

/// 按配置创建检查点存储
pub fn create_checkpointer(cfg: &AppConfig) -> Result<Arc<dyn Checkpointer>, AgentError> {
    match cfg.checkpoint.backend.to_lowercase().as_str() {
        "sqlite" => {
            tracing::info!("Using SQLite checkpoints at {}", cfg.checkpoint.path.display());
            Ok(Arc::new(SqliteCheckpointer::new(&cfg.checkpoint.path)?))
        }
        "memory" => Ok(Arc::new(MemoryCheckpointer::new())),
        other => Err(AgentError::ConfigError(format!(
            "unknown checkpoint backend: {other}"
        ))),
    }
}

/// 编排器构建器
pub struct OrchestratorBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    prompts: Option<Prompts>,
    registries: BTreeMap<AgentKind, ToolRegistry>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            checkpointer: None,
            prompts: None,
            registries: BTreeMap::new(),
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = Some(prompts);
        self
    }

    /// 替换某个 Agent 的工具注册表（dry-run 开启时同样会被包装）
    pub fn with_registry(mut self, kind: AgentKind, registry: ToolRegistry) -> Self {
        self.registries.insert(kind, registry);
        self
    }

    pub fn build(self) -> Result<Orchestrator, AgentError> {
        let cfg = self.config;
        let llm = self.llm.unwrap_or_else(|| create_llm_from_config(&cfg));
        let checkpointer = match self.checkpointer {
            Some(c) => c,
            None => create_checkpointer(&cfg)?,
        };
        let prompts = self
            .prompts
            .unwrap_or_else(|| Prompts::load(cfg.app.prompts_dir.as_deref()));

        if cfg.tools.dry_run {
            tracing::warn!("Dry-run mode: tools return mock data and never contact external systems");
        }
        let session = Arc::new(
            HttpSession::new(Duration::from_secs(cfg.tools.http_timeout_secs))
                .map_err(|e| AgentError::ConfigError(e.to_string()))?,
        );

        let mut injected = self.registries;
        let mut lanes = BTreeMap::new();
        for kind in AgentKind::ALL {
            let registry = match injected.remove(&kind) {
                Some(r) if cfg.tools.dry_run => dry_run_registry(r),
                Some(r) => r,
                None => integrations::registry_for(kind, Arc::clone(&session), &cfg.tools)
                    .map_err(|e| AgentError::ConfigError(format!("{kind} tools: {e}")))?,
            };
            tracing::info!(agent = %kind, tools = ?registry.tool_names(), "Agent ready");
            let lane = AgentLane {
                agent: AgentNode::new(kind, Arc::clone(&llm), prompts.agent(kind), registry.clone()),
                tools: ToolNode::new(ToolExecutor::new(kind, registry, cfg.tools.max_result_chars)),
            };
            lanes.insert(kind, lane);
        }

        let supervisor = SupervisorNode::new(
            Arc::clone(&llm),
            prompts.supervisor.clone(),
            HistoryTrimmer::new(cfg.graph.max_messages),
        );
        let reflection = ReflectionNode::new(Arc::clone(&llm), prompts.reflection.clone());
        let what_can_you_do = WhatCanYouDoNode::new(llm, prompts.supervisor.clone());

        Ok(Orchestrator::new(
            supervisor,
            lanes,
            reflection,
            what_can_you_do,
            checkpointer,
            cfg.graph.recursion_limit,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_provider_needs_no_key() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".to_string();
        let llm = create_llm_from_config(&cfg);
        assert_eq!(llm.token_usage(), (0, 0, 0));
    }

    #[test]
    fn test_unknown_checkpoint_backend() {
        let mut cfg = AppConfig::default();
        cfg.checkpoint.backend = "redis".to_string();
        assert!(matches!(
            create_checkpointer(&cfg),
            Err(AgentError::ConfigError(_))
        ));
    }

    #[test]
    fn test_build_configures_every_agent() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".to_string();
        cfg.app.prompts_dir = None;
        let orchestrator = OrchestratorBuilder::new(cfg).build().unwrap();
        assert_eq!(orchestrator.agents(), AgentKind::ALL.to_vec());
        assert_eq!(orchestrator.recursion_limit(), 30);
    }
}
