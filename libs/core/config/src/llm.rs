use crate::{env_optional, env_or_default, ConfigError, FromEnv};

/// Chat completion provider configuration.
///
/// Any OpenAI-compatible endpoint works. When `api_key` is unset (or the
/// environment is development) callers fall back to the deterministic echo
/// model instead of a remote provider.
#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
}

impl LlmConfig {
    /// Whether a remote provider is usable with this configuration
    pub fn has_provider(&self) -> bool {
        self.api_key.is_some()
    }
}

impl FromEnv for LlmConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let temperature = env_or_default("LLM_TEMPERATURE", "0.1")
            .parse()
            .map_err(|e| ConfigError::ParseError {
                key: "LLM_TEMPERATURE".to_string(),
                details: format!("{}", e),
            })?;

        Ok(Self {
            api_url: env_or_default("LLM_API_URL", "https://api.openai.com/v1"),
            api_key: env_optional("LLM_API_KEY"),
            model: env_or_default("LLM_MODEL", "gpt-4"),
            temperature,
        })
    }
}
