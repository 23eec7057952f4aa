use crate::{env_or_default, ConfigError, FromEnv};

/// Endpoint and timeout for one backend agent
#[derive(Clone, Debug)]
pub struct AgentEndpoint {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl AgentEndpoint {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs,
        }
    }
}

/// Base URLs and timeouts for the agent fleet.
///
/// Timeouts are deliberately uneven: transcription downloads and decodes
/// media, web search scrapes external sites, memory and RAG answer from
/// local stores.
#[derive(Clone, Debug)]
pub struct AgentsConfig {
    pub transcription: AgentEndpoint,
    pub rag: AgentEndpoint,
    pub memory: AgentEndpoint,
    pub web_search: AgentEndpoint,
}

impl FromEnv for AgentsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            transcription: AgentEndpoint::new(
                env_or_default("TRANSCRIPTION_URL", "http://transcription:8000"),
                60,
            ),
            rag: AgentEndpoint::new(env_or_default("RAG_URL", "http://rag:8000"), 30),
            memory: AgentEndpoint::new(env_or_default("MEMORY_URL", "http://memory:8000"), 30),
            web_search: AgentEndpoint::new(
                env_or_default("WEB_SEARCH_URL", "http://web-search:8000"),
                45,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agents_config_defaults() {
        temp_env::with_vars(
            [
                ("TRANSCRIPTION_URL", None::<&str>),
                ("RAG_URL", None),
                ("MEMORY_URL", None),
                ("WEB_SEARCH_URL", None),
            ],
            || {
                let config = AgentsConfig::from_env().unwrap();
                assert_eq!(config.transcription.base_url, "http://transcription:8000");
                assert_eq!(config.transcription.timeout_secs, 60);
                assert_eq!(config.rag.timeout_secs, 30);
                assert_eq!(config.web_search.timeout_secs, 45);
            },
        );
    }

    #[test]
    fn test_agents_config_override() {
        temp_env::with_var("RAG_URL", Some("http://rag.internal:9000"), || {
            let config = AgentsConfig::from_env().unwrap();
            assert_eq!(config.rag.base_url, "http://rag.internal:9000");
        });
    }
}
