use core_config::admission::{AdmissionConfig, DlqAdminConfig};
use core_config::gateway::GatewayConfig;
use core_config::redis::RedisConfig;
use core_config::server::ServerConfig;
use core_config::{app_info, AppInfo, FromEnv};

// Re-export Environment for use in other modules
pub use core_config::Environment;

/// Application-specific configuration
/// Composes shared config components from the `core_config` library
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub gateway: GatewayConfig,
    pub admission: AdmissionConfig,
    pub dlq_admin: DlqAdminConfig,
    pub environment: Environment,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let environment = Environment::from_env();
        let server = ServerConfig::from_env()?; // Uses defaults: HOST=0.0.0.0, PORT=8080
        let redis = RedisConfig::from_env()?; // Required - will fail if not set
        let gateway = GatewayConfig::from_env()?; // Required - will fail if not set
        let admission = AdmissionConfig::from_env()?;
        let dlq_admin = DlqAdminConfig::from_env()?;

        Ok(Self {
            app: app_info!(),
            server,
            redis,
            gateway,
            admission,
            dlq_admin,
            environment,
        })
    }
}
