//! 共享 HTTP 会话
//!
//! 进程内只建一个 reqwest Client（连接池 + 全局超时），由各集成以 Arc 注入；
//! Endpoint 在其上绑定 base_url 与认证方式，提供 JSON 请求的便捷方法。

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;

use crate::tools::ToolError;

/// 共享 HTTP 会话
#[derive(Clone, Debug)]
pub struct HttpSession {
    client: Client,
}

impl HttpSession {
    pub fn new(timeout: Duration) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("jarvis/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::Network(e.to_string()))?;
        tracing::info!("HTTP session created with a global timeout of {:?}", timeout);
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// 认证方式
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Auth {
    #[default]
    None,
    Bearer(String),
    Basic {
        username: String,
        password: String,
    },
    /// 原样写入 Authorization 头（如 PagerDuty 的 `Token token=...`）
    Header(String),
}

impl Auth {
    fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::None => req,
            Auth::Bearer(token) => req.bearer_auth(token),
            Auth::Basic { username, password } => req.basic_auth(username, Some(password)),
            Auth::Header(value) => req.header(reqwest::header::AUTHORIZATION, value),
        }
    }
}

/// 绑定 base_url 与认证的服务端点
#[derive(Clone, Debug)]
pub struct Endpoint {
    service: &'static str,
    session: Arc<HttpSession>,
    base_url: String,
    auth: Auth,
    accept: &'static str,
}

impl Endpoint {
    pub fn new(
        service: &'static str,
        session: Arc<HttpSession>,
        base_url: impl Into<String>,
        auth: Auth,
    ) -> Self {
        Self {
            service,
            session,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            accept: "application/json",
        }
    }

    pub fn with_accept(mut self, accept: &'static str) -> Self {
        self.accept = accept;
        self
    }

    /// 绝对 URL 原样使用，否则拼在 base_url 之后
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// 发送请求并解析 JSON；空响应体返回 Null，非 JSON 响应体按字符串返回
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, ToolError> {
        if self.base_url.is_empty() {
            return Err(ToolError::NotConfigured(format!(
                "{} base URL is not set",
                self.service
            )));
        }
        let url = self.url(path);
        tracing::debug!(service = self.service, %method, %url, "HTTP request");

        let mut req = self
            .session
            .client()
            .request(method, &url)
            .header(reqwest::header::ACCEPT, self.accept);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        let response = self.auth.apply(req).send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Network(format!("{} request timed out: {e}", self.service))
            } else {
                ToolError::Network(format!("{} request failed: {e}", self.service))
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ToolError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(ToolError::Http {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ToolError> {
        self.send(Method::GET, path, query, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ToolError> {
        self.send(Method::POST, path, &[], Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, ToolError> {
        self.send(Method::PUT, path, &[], Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value, ToolError> {
        self.send(Method::PATCH, path, &[], Some(body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(base: &str) -> Endpoint {
        let session = Arc::new(HttpSession::new(Duration::from_secs(5)).unwrap());
        Endpoint::new("github", session, base, Auth::None)
    }

    #[test]
    fn test_url_joining() {
        let ep = endpoint("https://api.github.com/");
        assert_eq!(ep.url("/repos/a/b"), "https://api.github.com/repos/a/b");
        assert_eq!(ep.url("repos/a/b"), "https://api.github.com/repos/a/b");
        assert_eq!(
            ep.url("https://api.pagerduty.com/users/1"),
            "https://api.pagerduty.com/users/1"
        );
    }

    #[tokio::test]
    async fn test_missing_base_url_is_not_configured() {
        let err = endpoint("").get("/anything", &[]).await.unwrap_err();
        assert!(matches!(err, ToolError::NotConfigured(_)));
    }
}
