use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Complete service configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub clear: ClearConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Settings database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "settings.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Upstream session-token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_session_token_url")]
    pub session_token_url: String,
    /// Upper bound for one exchange (seconds)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_session_token_url() -> String {
    "https://api.anam.ai/v1/auth/session-token".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("session-broker/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            session_token_url: default_session_token_url(),
            timeout_seconds: default_timeout_seconds(),
            user_agent: default_user_agent(),
        }
    }
}

/// Two-phase clear configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClearConfig {
    /// How long a requested clear can be confirmed (seconds)
    #[serde(default = "default_confirmation_ttl")]
    pub confirmation_ttl_seconds: i64,
    /// How often expired confirmations are pruned (seconds)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

fn default_confirmation_ttl() -> i64 {
    300
}

fn default_cleanup_interval() -> u64 {
    60
}

impl Default for ClearConfig {
    fn default() -> Self {
        Self {
            confirmation_ttl_seconds: default_confirmation_ttl(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

impl BrokerConfig {
    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.upstream.timeout_seconds == 0 {
            bail!("upstream.timeout_seconds must be greater than zero");
        }
        if self.clear.cleanup_interval_seconds == 0 {
            bail!("clear.cleanup_interval_seconds must be greater than zero");
        }
        let ttl = self.clear.confirmation_ttl_seconds;
        if ttl <= 0 || chrono::Duration::try_seconds(ttl).is_none() {
            bail!(
                "clear.confirmation_ttl_seconds must be a positive number of seconds, got {}",
                ttl
            );
        }
        Ok(())
    }

    /// Applies `SESSION_BROKER_*` environment overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok());
        self
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("SESSION_BROKER_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = var("SESSION_BROKER_DATABASE") {
            self.storage.database_path = v;
        }
        if let Some(v) = var("SESSION_BROKER_UPSTREAM_URL") {
            self.upstream.session_token_url = v;
        }
        if let Some(v) = var("SESSION_BROKER_UPSTREAM_TIMEOUT_SECONDS") {
            if let Ok(n) = v.parse::<u64>() {
                self.upstream.timeout_seconds = n;
            }
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<BrokerConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: BrokerConfig =
        toml::from_str(&contents).with_context(|| format!("Invalid config file {}", path))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.storage.database_path, "settings.db");
        assert_eq!(config.upstream.timeout_seconds, 30);
        assert!(config.upstream.session_token_url.starts_with("https://"));
        assert_eq!(config.clear.confirmation_ttl_seconds, 300);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            bind_addr = "127.0.0.1:8080"

            [storage]
            database_path = "/var/lib/session-broker/settings.db"

            [upstream]
            session_token_url = "https://staging.example.com/session-token"
            timeout_seconds = 10
            user_agent = "custom/1.0"

            [clear]
            confirmation_ttl_seconds = 60
            cleanup_interval_seconds = 15
        "#;

        let config: BrokerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.storage.database_path, "/var/lib/session-broker/settings.db");
        assert_eq!(config.upstream.timeout_seconds, 10);
        assert_eq!(config.upstream.user_agent, "custom/1.0");
        assert_eq!(config.clear.confirmation_ttl_seconds, 60);
        assert_eq!(config.clear.cleanup_interval_seconds, 15);
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [upstream]
            timeout_seconds = 5
        "#;

        let config: BrokerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.upstream.timeout_seconds, 5);
        assert_eq!(config.upstream.session_token_url, default_session_token_url());
        assert_eq!(config.server.bind_addr, "0.0.0.0:3000"); // Default
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SESSION_BROKER_BIND_ADDR", "127.0.0.1:9000"),
            ("SESSION_BROKER_DATABASE", ":memory:"),
            ("SESSION_BROKER_UPSTREAM_TIMEOUT_SECONDS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = BrokerConfig::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.server.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.storage.database_path, ":memory:");
        // Unparseable numbers keep the previous value
        assert_eq!(config.upstream.timeout_seconds, 30);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(BrokerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let mut config = BrokerConfig::default();
        config.upstream.timeout_seconds = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeout_seconds"));
    }

    #[test]
    fn test_zero_cleanup_interval_is_rejected() {
        let toml = r#"
            [clear]
            cleanup_interval_seconds = 0
        "#;

        let config: BrokerConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cleanup_interval_seconds"));
    }

    #[test]
    fn test_out_of_range_ttl_is_rejected() {
        for ttl in [0, -5, i64::MAX] {
            let mut config = BrokerConfig::default();
            config.clear.confirmation_ttl_seconds = ttl;
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("confirmation_ttl_seconds"), "ttl {}", ttl);
        }
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.toml");
        std::fs::write(&path, "[clear]\nconfirmation_ttl_seconds = 120\n").unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.clear.confirmation_ttl_seconds, 120);

        assert!(load_config("/nonexistent/broker.toml").is_err());
    }
}
