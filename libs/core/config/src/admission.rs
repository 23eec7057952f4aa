use crate::{env_or_default, env_optional, env_parse, ConfigError, FromEnv};

/// Admission layer configuration: backpressure gate, rate limiter and
/// adaptive throttle thresholds for the ingress HTTP surface.
#[derive(Clone, Debug)]
pub struct AdmissionConfig {
    /// Queue depth at which the system is considered critical
    pub queue_threshold: u64,
    /// Pending (delivered-but-unacked) entries threshold
    pub pending_threshold: u64,
    /// How often the load snapshot is refreshed, in seconds
    pub check_interval_secs: u64,
    /// Sliding-window rate limit per client
    pub requests_per_minute: u64,
    /// Allowed burst above the steady rate
    pub burst_size: u64,
    /// Rate-limit window length in seconds
    pub window_seconds: u64,
    /// Baseline advisory delay applied to every request, in milliseconds
    pub base_throttle_delay_ms: u64,
    /// Upper bound for the advisory delay, in milliseconds
    pub max_throttle_delay_ms: u64,
    /// Comma-separated list of allowed CORS origins, or "*"
    pub allowed_origins: Vec<String>,
}

impl AdmissionConfig {
    /// Whether all origins are allowed
    pub fn allow_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            queue_threshold: 1000,
            pending_threshold: 500,
            check_interval_secs: 5,
            requests_per_minute: 120,
            burst_size: 20,
            window_seconds: 60,
            base_throttle_delay_ms: 0,
            max_throttle_delay_ms: 1000,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl FromEnv for AdmissionConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let origins_raw = env_or_default("ALLOWED_ORIGINS", "*");
        let allowed_origins: Vec<String> = origins_raw
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        Ok(Self {
            queue_threshold: env_parse("QUEUE_THRESHOLD", 1000)?,
            pending_threshold: env_parse("PENDING_THRESHOLD", 500)?,
            check_interval_secs: env_parse("LOAD_CHECK_INTERVAL_SECS", 5)?,
            requests_per_minute: env_parse("RATE_LIMIT_PER_MINUTE", 120)?,
            burst_size: env_parse("RATE_LIMIT_BURST", 20)?,
            window_seconds: env_parse("RATE_LIMIT_WINDOW_SECS", 60)?,
            base_throttle_delay_ms: env_parse("BASE_THROTTLE_DELAY_MS", 0)?,
            max_throttle_delay_ms: env_parse("MAX_THROTTLE_DELAY_MS", 1000)?,
            allowed_origins: if allowed_origins.is_empty() {
                vec!["*".to_string()]
            } else {
                allowed_origins
            },
        })
    }
}

/// DLQ admin surface configuration
#[derive(Clone, Debug, Default)]
pub struct DlqAdminConfig {
    /// Static bearer token gating /admin/dlq endpoints.
    /// When unset, the admin surface rejects every request.
    pub admin_token: Option<String>,
}

impl FromEnv for DlqAdminConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            admin_token: env_optional("DLQ_ADMIN_TOKEN"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_config_defaults() {
        temp_env::with_vars(
            [
                ("QUEUE_THRESHOLD", None::<&str>),
                ("PENDING_THRESHOLD", None),
                ("RATE_LIMIT_PER_MINUTE", None),
                ("ALLOWED_ORIGINS", None),
            ],
            || {
                let config = AdmissionConfig::from_env().unwrap();
                assert_eq!(config.queue_threshold, 1000);
                assert_eq!(config.pending_threshold, 500);
                assert_eq!(config.check_interval_secs, 5);
                assert_eq!(config.requests_per_minute, 120);
                assert_eq!(config.window_seconds, 60);
                assert!(config.allow_any_origin());
            },
        );
    }

    #[test]
    fn test_admission_config_overrides() {
        temp_env::with_vars(
            [
                ("QUEUE_THRESHOLD", Some("100")),
                ("RATE_LIMIT_PER_MINUTE", Some("60")),
                ("MAX_THROTTLE_DELAY_MS", Some("2000")),
            ],
            || {
                let config = AdmissionConfig::from_env().unwrap();
                assert_eq!(config.queue_threshold, 100);
                assert_eq!(config.requests_per_minute, 60);
                assert_eq!(config.max_throttle_delay_ms, 2000);
            },
        );
    }

    #[test]
    fn test_admission_config_origin_list() {
        temp_env::with_var(
            "ALLOWED_ORIGINS",
            Some("https://a.example, https://b.example"),
            || {
                let config = AdmissionConfig::from_env().unwrap();
                assert_eq!(
                    config.allowed_origins,
                    vec!["https://a.example", "https://b.example"]
                );
                assert!(!config.allow_any_origin());
            },
        );
    }

    #[test]
    fn test_admission_config_invalid_threshold() {
        temp_env::with_var("QUEUE_THRESHOLD", Some("many"), || {
            assert!(AdmissionConfig::from_env().is_err());
        });
    }

    #[test]
    fn test_dlq_admin_config() {
        temp_env::with_var("DLQ_ADMIN_TOKEN", Some("tok"), || {
            let config = DlqAdminConfig::from_env().unwrap();
            assert_eq!(config.admin_token.as_deref(), Some("tok"));
        });

        temp_env::with_var_unset("DLQ_ADMIN_TOKEN", || {
            let config = DlqAdminConfig::from_env().unwrap();
            assert!(config.admin_token.is_none());
        });
    }
}
