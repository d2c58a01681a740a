//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `JARVIS__*` 覆盖（双下划线表示嵌套，如 `JARVIS__GRAPH__MAX_MESSAGES=10`），
//! 最后应用部署沿用的扁平变量（`JARVIS_MAX_MESSAGES`、`JARVIS_RECURSION_LIMIT`、`JARVIS_DRYRUN`、`JARVIS_LLM_MODEL_NAME`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub graph: GraphSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub checkpoint: CheckpointSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 提示词覆盖目录（supervisor.md / reflection.md / <agent>.md）
    pub prompts_dir: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "jarvis".to_string(),
            prompts_dir: Some(PathBuf::from("config/prompts")),
        }
    }
}

/// [graph] 段：历史窗口与每轮步数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphSection {
    /// Supervisor 每次调用前保留的最近消息数
    pub max_messages: usize,
    /// 单轮最多执行的节点数
    pub recursion_limit: usize,
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            max_messages: 20,
            recursion_limit: 30,
        }
    }
}

/// [llm] 段：后端选择与请求参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / deepseek / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            temperature: 0.0,
            request_timeout_secs: 60,
        }
    }
}

/// 单个 SaaS 集成：服务地址与存放凭证的环境变量名
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServiceSection {
    pub base_url: String,
    /// 凭证所在的环境变量名（不在配置文件中写明文）
    pub token_env: String,
    /// Basic 认证的用户名（Jira 使用账号邮箱）
    pub username_env: Option<String>,
}

impl ServiceSection {
    fn new(base_url: &str, token_env: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            token_env: token_env.to_string(),
            username_env: None,
        }
    }

    /// 从环境变量读取凭证；未设置或为空时返回 None
    pub fn token(&self) -> Option<String> {
        read_env(&self.token_env)
    }

    pub fn username(&self) -> Option<String> {
        self.username_env.as_deref().and_then(read_env)
    }
}

fn read_env(name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// [tools] 段：dry-run、HTTP 超时、结果截断与各集成
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 所有工具返回固定的模拟结果，不访问外部系统
    pub dry_run: bool,
    pub http_timeout_secs: u64,
    /// 单个工具结果写入对话前的最大字符数
    pub max_result_chars: usize,
    pub argocd: ServiceSection,
    pub backstage: ServiceSection,
    pub github: ServiceSection,
    pub jira: ServiceSection,
    pub pagerduty: ServiceSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            dry_run: false,
            http_timeout_secs: 30,
            max_result_chars: 8000,
            argocd: ServiceSection::new("", "ARGOCD_TOKEN"),
            backstage: ServiceSection::new("", "BACKSTAGE_TOKEN"),
            github: ServiceSection::new("https://api.github.com", "GITHUB_TOKEN"),
            jira: ServiceSection {
                username_env: Some("JIRA_USER_EMAIL".to_string()),
                ..ServiceSection::new("", "JIRA_API_TOKEN")
            },
            pagerduty: ServiceSection::new("https://api.pagerduty.com", "PAGERDUTY_API_KEY"),
        }
    }
}

/// [checkpoint] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckpointSection {
    /// memory / sqlite
    pub backend: String,
    /// SQLite 文件路径
    pub path: PathBuf,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            path: PathBuf::from("data/checkpoints.db"),
        }
    }
}

/// 从 config 目录加载配置，环境变量 JARVIS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 叠加环境变量 JARVIS__*（双下划线表示嵌套键）
/// 4. 应用扁平的 JARVIS_* 变量
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("JARVIS")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let mut cfg: AppConfig = builder.build()?.try_deserialize()?;
    apply_flat_env(&mut cfg, |name| std::env::var(name).ok())?;
    Ok(cfg)
}

/// 扁平环境变量覆盖；`lookup` 便于测试注入
fn apply_flat_env(
    cfg: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), config::ConfigError> {
    let parse_usize = |name: &str, raw: String| {
        raw.trim()
            .parse::<usize>()
            .map_err(|e| config::ConfigError::Message(format!("{name}: {e}")))
    };
    if let Some(raw) = lookup("JARVIS_MAX_MESSAGES") {
        cfg.graph.max_messages = parse_usize("JARVIS_MAX_MESSAGES", raw)?;
    }
    if let Some(raw) = lookup("JARVIS_RECURSION_LIMIT") {
        cfg.graph.recursion_limit = parse_usize("JARVIS_RECURSION_LIMIT", raw)?;
    }
    if let Some(raw) = lookup("JARVIS_DRYRUN") {
        cfg.tools.dry_run = raw.trim().eq_ignore_ascii_case("true");
    }
    if let Some(model) = lookup("JARVIS_LLM_MODEL_NAME").filter(|m| !m.trim().is_empty()) {
        cfg.llm.model = model;
    }
    Ok(())
}
