use crate::{env_optional, env_required, ConfigError, FromEnv};

/// WhatsApp gateway (Evolution API) configuration
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Base URL of the Evolution API deployment
    pub base_url: String,
    /// API key sent as the `apikey` header on every outbound call
    pub api_key: String,
    /// Shared secret for inbound webhook HMAC validation.
    /// When unset, signature validation is skipped.
    pub webhook_secret: Option<String>,
}

impl GatewayConfig {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            webhook_secret: None,
        }
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }
}

impl FromEnv for GatewayConfig {
    /// Requires EVOLUTION_API_URL and EVOLUTION_API_KEY; WEBHOOK_SECRET is optional
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: env_required("EVOLUTION_API_URL")?,
            api_key: env_required("EVOLUTION_API_KEY")?,
            webhook_secret: env_optional("WEBHOOK_SECRET"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_config_from_env() {
        temp_env::with_vars(
            [
                ("EVOLUTION_API_URL", Some("http://gateway:8080")),
                ("EVOLUTION_API_KEY", Some("key-123")),
                ("WEBHOOK_SECRET", Some("s3cret")),
            ],
            || {
                let config = GatewayConfig::from_env().unwrap();
                assert_eq!(config.base_url, "http://gateway:8080");
                assert_eq!(config.api_key, "key-123");
                assert_eq!(config.webhook_secret.as_deref(), Some("s3cret"));
            },
        );
    }

    #[test]
    fn test_gateway_config_secret_optional() {
        temp_env::with_vars(
            [
                ("EVOLUTION_API_URL", Some("http://gateway:8080")),
                ("EVOLUTION_API_KEY", Some("key-123")),
                ("WEBHOOK_SECRET", None),
            ],
            || {
                let config = GatewayConfig::from_env().unwrap();
                assert!(config.webhook_secret.is_none());
            },
        );
    }

    #[test]
    fn test_gateway_config_missing_url() {
        temp_env::with_vars(
            [
                ("EVOLUTION_API_URL", None::<&str>),
                ("EVOLUTION_API_KEY", Some("key-123")),
            ],
            || {
                let result = GatewayConfig::from_env();
                assert!(result.is_err());
                assert!(result.unwrap_err().to_string().contains("EVOLUTION_API_URL"));
            },
        );
    }

    #[test]
    fn test_gateway_config_builder() {
        let config = GatewayConfig::new("http://gw".to_string(), "k".to_string())
            .with_webhook_secret("shh");
        assert_eq!(config.webhook_secret.as_deref(), Some("shh"));
    }
}
