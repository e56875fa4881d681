use async_trait::async_trait;

#[cfg(feature = "feishu")]
pub mod feishu;

#[cfg(feature = "feishu")]
pub use feishu::FeishuProbe;

/// Result of asking the chat platform directly whether the configured app
/// credentials work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamStatus {
    /// Token grant and bot lookup both succeeded.
    CredentialsValid { bot_name: Option<String> },
    /// Token granted, so the credentials are good, but the app has no usable bot.
    BotUnavailable(String),
    /// The platform answered and refused the credentials.
    CredentialsInvalid(String),
    /// Network failure or malformed response; says nothing about the credentials.
    Unreachable(String),
    NotConfigured,
}

impl UpstreamStatus {
    pub fn describe(&self) -> String {
        match self {
            UpstreamStatus::CredentialsValid { bot_name: Some(name) } => {
                format!("credentials valid (bot: {})", name)
            }
            UpstreamStatus::CredentialsValid { bot_name: None } => "credentials valid".to_string(),
            UpstreamStatus::BotUnavailable(msg) => format!("credentials valid, bot unavailable: {}", msg),
            UpstreamStatus::CredentialsInvalid(msg) => format!("credentials rejected: {}", msg),
            UpstreamStatus::Unreachable(msg) => format!("platform unreachable: {}", msg),
            UpstreamStatus::NotConfigured => "no app credentials configured".to_string(),
        }
    }
}

/// Direct upstream check used as the last evidence channel.
#[async_trait]
pub trait CredentialCheck: Send + Sync {
    async fn check(&self) -> UpstreamStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_valid_with_bot() {
        let status = UpstreamStatus::CredentialsValid {
            bot_name: Some("Helper".to_string()),
        };
        assert_eq!(status.describe(), "credentials valid (bot: Helper)");
    }

    #[test]
    fn test_describe_invalid() {
        let status = UpstreamStatus::CredentialsInvalid("bad secret".to_string());
        assert!(status.describe().contains("bad secret"));
    }

    #[test]
    fn test_describe_bot_unavailable_keeps_credentials_valid() {
        let status = UpstreamStatus::BotUnavailable("bot capability disabled".to_string());
        let text = status.describe();
        assert!(text.starts_with("credentials valid"));
        assert!(!text.contains("rejected"));
    }
}
