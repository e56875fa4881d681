use async_trait::async_trait;
use gatewarden_core::config::FeishuConfig;
use gatewarden_core::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::{CredentialCheck, UpstreamStatus};

const FEISHU_OPEN_API: &str = "https://open.feishu.cn/open-apis";
const LARK_OPEN_API: &str = "https://open.larksuite.com/open-apis";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    code: i32,
    msg: String,
    tenant_access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BotInfoResponse {
    code: i32,
    msg: String,
    #[serde(default)]
    bot: Option<BotInfo>,
}

#[derive(Debug, Deserialize)]
struct BotInfo {
    #[serde(default)]
    app_name: Option<String>,
    #[serde(default)]
    open_id: Option<String>,
}

/// Talks to the Feishu/Lark open platform directly, bypassing the engine, to
/// tell "credentials rejected" apart from "engine connector never came up".
pub struct FeishuProbe {
    app_id: String,
    app_secret: String,
    api_base: String,
    client: Client,
}

impl FeishuProbe {
    pub fn new(config: &FeishuConfig) -> Self {
        let api_base = if config.domain.eq_ignore_ascii_case("lark") {
            LARK_OPEN_API
        } else {
            FEISHU_OPEN_API
        };
        Self::with_base_url(config, api_base)
    }

    pub fn with_base_url(config: &FeishuConfig, api_base: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            app_id: config.app_id.trim().to_string(),
            app_secret: config.app_secret.trim().to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn get_tenant_access_token(&self) -> Result<String> {
        #[derive(Serialize)]
        struct TokenRequest<'a> {
            app_id: &'a str,
            app_secret: &'a str,
        }

        let request = TokenRequest {
            app_id: &self.app_id,
            app_secret: &self.app_secret,
        };

        let response = self
            .client
            .post(format!("{}/auth/v3/tenant_access_token/internal", self.api_base))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Failed to get access token: {}", e)))?;

        let token_resp: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Channel(format!("Failed to parse token response: {}", e)))?;

        if token_resp.code != 0 {
            return Err(Error::Validation(format!(
                "Feishu token error {}: {}",
                token_resp.code, token_resp.msg
            )));
        }

        token_resp
            .tenant_access_token
            .ok_or_else(|| Error::Channel("No access token in response".to_string()))
    }

    async fn get_bot_info(&self, token: &str) -> Result<BotInfo> {
        let response = self
            .client
            .get(format!("{}/bot/v3/info", self.api_base))
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Failed to get bot info: {}", e)))?;

        let info: BotInfoResponse = response
            .json()
            .await
            .map_err(|e| Error::Channel(format!("Failed to parse bot info: {}", e)))?;

        if info.code != 0 {
            return Err(Error::Validation(format!(
                "Feishu bot info error {}: {}",
                info.code, info.msg
            )));
        }

        info.bot
            .ok_or_else(|| Error::Channel("No bot in response".to_string()))
    }
}

#[async_trait]
impl CredentialCheck for FeishuProbe {
    async fn check(&self) -> UpstreamStatus {
        if self.app_id.is_empty() || self.app_secret.is_empty() {
            return UpstreamStatus::NotConfigured;
        }

        let token = match self.get_tenant_access_token().await {
            Ok(token) => token,
            Err(Error::Validation(msg)) => return UpstreamStatus::CredentialsInvalid(msg),
            Err(e) => {
                debug!(error = %e, "Feishu token request failed");
                return UpstreamStatus::Unreachable(e.to_string());
            }
        };

        match self.get_bot_info(&token).await {
            Ok(bot) => {
                debug!(bot = ?bot.app_name, open_id = ?bot.open_id, "Feishu bot info fetched");
                UpstreamStatus::CredentialsValid {
                    bot_name: bot.app_name,
                }
            }
            // The token grant already proved the credentials; the bot capability may
            // simply not be enabled on the app yet.
            Err(Error::Validation(msg)) => UpstreamStatus::BotUnavailable(msg),
            Err(e) => UpstreamStatus::Unreachable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn creds() -> FeishuConfig {
        FeishuConfig {
            enabled: true,
            app_id: "cli_test".to_string(),
            app_secret: "secret".to_string(),
            domain: "feishu".to_string(),
        }
    }

    #[tokio::test]
    async fn test_not_configured_without_credentials() {
        let probe = FeishuProbe::new(&FeishuConfig::default());
        assert_eq!(probe.check().await, UpstreamStatus::NotConfigured);
    }

    #[tokio::test]
    async fn test_valid_credentials_and_bot() {
        let router = Router::new()
            .route(
                "/auth/v3/tenant_access_token/internal",
                post(|| async { Json(json!({"code": 0, "msg": "ok", "tenant_access_token": "t-1"})) }),
            )
            .route(
                "/bot/v3/info",
                get(|| async { Json(json!({"code": 0, "msg": "ok", "bot": {"app_name": "Helper", "open_id": "ou_1"}})) }),
            );
        let base = serve(router).await;
        let probe = FeishuProbe::with_base_url(&creds(), &base);
        assert_eq!(
            probe.check().await,
            UpstreamStatus::CredentialsValid {
                bot_name: Some("Helper".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let router = Router::new().route(
            "/auth/v3/tenant_access_token/internal",
            post(|| async { Json(json!({"code": 10014, "msg": "app secret invalid"})) }),
        );
        let base = serve(router).await;
        let probe = FeishuProbe::with_base_url(&creds(), &base);
        match probe.check().await {
            UpstreamStatus::CredentialsInvalid(msg) => assert!(msg.contains("app secret invalid")),
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bot_error_after_token_grant_is_not_invalid_credentials() {
        let router = Router::new()
            .route(
                "/auth/v3/tenant_access_token/internal",
                post(|| async { Json(json!({"code": 0, "msg": "ok", "tenant_access_token": "t-1"})) }),
            )
            .route(
                "/bot/v3/info",
                get(|| async { Json(json!({"code": 99991663, "msg": "bot ability not enabled"})) }),
            );
        let base = serve(router).await;
        let probe = FeishuProbe::with_base_url(&creds(), &base);
        match probe.check().await {
            UpstreamStatus::BotUnavailable(msg) => assert!(msg.contains("99991663")),
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let probe = FeishuProbe::with_base_url(&creds(), "http://127.0.0.1:1");
        assert!(matches!(probe.check().await, UpstreamStatus::Unreachable(_)));
    }
}
