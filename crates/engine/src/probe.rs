use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// 2xx with a JSON body. Carries the body's `status` field when present.
    Alive { status: Option<String> },
    /// Anything else, including refusal and timeouts. Not fatal on its own.
    NotAlive(String),
}

impl ProbeResult {
    pub fn is_alive(&self) -> bool {
        matches!(self, ProbeResult::Alive { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            ProbeResult::Alive { status: Some(s) } => format!("HTTP probe ok ({})", s),
            ProbeResult::Alive { status: None } => "HTTP probe ok".to_string(),
            ProbeResult::NotAlive(reason) => format!("HTTP probe failed: {}", reason),
        }
    }
}

/// Local health endpoint of the engine.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    token: Option<String>,
    client: Client,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            url: url.into(),
            token,
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn check(&self) -> ProbeResult {
        let mut req = self
            .client
            .get(&self.url)
            .header("Accept", "application/json");
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            req = req.bearer_auth(token);
        }

        let response = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(url = %self.url, error = %e, "Health probe request failed");
                let reason = if e.is_timeout() {
                    "timed out".to_string()
                } else if e.is_connect() {
                    "connection refused".to_string()
                } else {
                    e.to_string()
                };
                return ProbeResult::NotAlive(reason);
            }
        };

        let status = response.status();
        if !status.is_success() {
            return ProbeResult::NotAlive(format!("HTTP {}", status.as_u16()));
        }

        match response.json::<Value>().await {
            Ok(body) => ProbeResult::Alive {
                status: body
                    .get("status")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            Err(_) => ProbeResult::NotAlive("response was not JSON".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/health", addr)
    }

    #[tokio::test]
    async fn test_alive_with_bearer() {
        let router = Router::new().route(
            "/health",
            get(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if auth != "Bearer tok" {
                    return Err(StatusCode::UNAUTHORIZED);
                }
                Ok(Json(serde_json::json!({"status": "ok"})))
            }),
        );
        let url = serve(router).await;

        let ok = HttpProbe::new(url.clone(), Some("tok".to_string())).check().await;
        assert_eq!(ok, ProbeResult::Alive { status: Some("ok".to_string()) });

        let denied = HttpProbe::new(url, None).check().await;
        assert_eq!(denied, ProbeResult::NotAlive("HTTP 401".to_string()));
    }

    #[tokio::test]
    async fn test_html_fallback_is_not_alive() {
        let router = Router::new().route("/health", get(|| async { "<html>app</html>" }));
        let url = serve(router).await;
        let result = HttpProbe::new(url, None).check().await;
        assert!(!result.is_alive());
    }

    #[tokio::test]
    async fn test_refused_is_not_alive() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let result = HttpProbe::new(format!("http://127.0.0.1:{}/health", port), None)
            .check()
            .await;
        assert!(matches!(result, ProbeResult::NotAlive(_)));
        assert!(result.describe().starts_with("HTTP probe failed"));
    }
}
