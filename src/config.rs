use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, error};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins (comma separated, `*.domain` wildcards allowed)
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// JWT secret used to validate user tokens and sign service tokens
    pub auth_jwt_secret: Option<String>,

    /// Database URL
    pub db_url: Option<String>,

    /// Base URL of the profile service used to resolve display names
    pub profile_service_url: Option<String>,

    /// A session whose last heartbeat is older than this is stale
    #[serde(default = "default_session_stale_secs")]
    pub session_stale_secs: u64,

    #[serde(default = "default_session_sweep_secs")]
    pub session_sweep_secs: u64,

    /// A drag lock untouched for this long expires
    #[serde(default = "default_drag_lock_ttl_secs")]
    pub drag_lock_ttl_secs: u64,

    #[serde(default = "default_drag_lock_sweep_secs")]
    pub drag_lock_sweep_secs: u64,

    /// Maximum undelivered broadcast messages queued per member
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    /// Resolved proposals older than this are archived (deleted)
    #[serde(default = "default_proposal_archive_hours")]
    pub proposal_archive_hours: u64,

    #[serde(default = "default_proposal_archive_sweep_secs")]
    pub proposal_archive_sweep_secs: u64,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            dotenvy::dotenv().ok();
        }

        match envy::from_env::<Config>() {
            Ok(config) => {
                config.validate()?;
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session_sweep_secs == 0 || self.session_sweep_secs > 60 {
            return Err(ConfigError::Invalid(format!(
                "SESSION_SWEEP_SECS must be between 1 and 60, got {}",
                self.session_sweep_secs
            )));
        }
        if self.drag_lock_sweep_secs == 0 || self.proposal_archive_sweep_secs == 0 {
            return Err(ConfigError::Invalid("Sweep intervals must be positive".to_string()));
        }
        if self.broadcast_capacity == 0 {
            return Err(ConfigError::Invalid("BROADCAST_CAPACITY must be positive".to_string()));
        }
        Ok(())
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_secs)
    }

    pub fn drag_lock_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.drag_lock_sweep_secs)
    }

    pub fn proposal_archive_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.proposal_archive_sweep_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            service_name: default_service_name(),
            auth_jwt_secret: None,
            db_url: None,
            profile_service_url: None,
            session_stale_secs: default_session_stale_secs(),
            session_sweep_secs: default_session_sweep_secs(),
            drag_lock_ttl_secs: default_drag_lock_ttl_secs(),
            drag_lock_sweep_secs: default_drag_lock_sweep_secs(),
            broadcast_capacity: default_broadcast_capacity(),
            proposal_archive_hours: default_proposal_archive_hours(),
            proposal_archive_sweep_secs: default_proposal_archive_sweep_secs(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "route-coedit".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_session_stale_secs() -> u64 {
    5 * 60
}

fn default_session_sweep_secs() -> u64 {
    30
}

fn default_drag_lock_ttl_secs() -> u64 {
    30
}

fn default_drag_lock_sweep_secs() -> u64 {
    5
}

fn default_broadcast_capacity() -> usize {
    256
}

fn default_proposal_archive_hours() -> u64 {
    24
}

fn default_proposal_archive_sweep_secs() -> u64 {
    60 * 60
}
