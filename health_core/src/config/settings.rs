use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::health::{ScheduleSettings, UnknownPolicy};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
    /// Schedule overrides keyed by check name.
    #[serde(default)]
    pub checks: HashMap<String, ScheduleSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub unknown_policy: UnknownPolicy,
    pub status_timeout_ms: u64,
    pub listener_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub log_requests: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            unknown_policy: UnknownPolicy::Exclude,
            status_timeout_ms: 1000,
            listener_timeout_ms: 5000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { log_requests: true }
    }
}

impl AppConfig {
    /// Defaults, then `health.toml` if present, then `HEALTH_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Path::new("health.toml");
        Self::load_from(path.exists().then_some(path))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("HEALTH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        app_config.validate()?;

        Ok(app_config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("Server port cannot be 0".to_string()));
        }

        if self.engine.status_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Status timeout must be greater than 0".to_string(),
            ));
        }

        if self.engine.listener_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Listener timeout must be greater than 0".to_string(),
            ));
        }

        for (name, settings) in &self.checks {
            if settings.has_negative_value() {
                return Err(ConfigError::Message(format!(
                    "Check '{}' has a negative delay, period or timeout",
                    name
                )));
            }
        }

        Ok(())
    }

    pub fn schedule_for(&self, name: &str) -> Option<&ScheduleSettings> {
        self.checks.get(name)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{check_fn, CheckConfig, Severity};
    use std::time::Duration;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.engine.unknown_policy, UnknownPolicy::Exclude);
        assert_eq!(config.engine.status_timeout_ms, 1000);
        assert!(config.checks.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();

        config.server.port = 0;
        assert!(config.validate().is_err());

        config = AppConfig::default();
        config.engine.status_timeout_ms = 0;
        assert!(config.validate().is_err());

        config = AppConfig::default();
        config.engine.listener_timeout_ms = 0;
        assert!(config.validate().is_err());

        config = AppConfig::default();
        config.checks.insert(
            "db".to_string(),
            ScheduleSettings {
                timeout_ms: Some(-5),
                ..Default::default()
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bind_address() {
        let config = AppConfig::default();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");

        let mut config = AppConfig::default();
        config.server.host = "0.0.0.0".to_string();
        config.server.port = 9000;
        assert_eq!(config.bind_address(), "0.0.0.0:9000");
    }

    #[test]
    fn test_config_loading_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090

[engine]
unknown_policy = "unhealthy"

[checks.database]
initial_delay_ms = 100
execution_period_ms = 2000
timeout_ms = 500
severity = "advisory"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(Some(file.path())).expect("Should load configuration");

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.engine.unknown_policy, UnknownPolicy::Unhealthy);
        assert_eq!(config.engine.listener_timeout_ms, 5000);

        let database = config.schedule_for("database").unwrap();
        assert_eq!(database.initial_delay_ms, Some(100));
        assert_eq!(database.execution_period_ms, Some(2000));
        assert_eq!(database.timeout_ms, Some(500));
        assert_eq!(database.severity, Some(Severity::Advisory));
        assert!(config.schedule_for("cache").is_none());
    }

    #[test]
    fn test_partial_override_keeps_schedule_from_code() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[checks.process]
severity = "advisory"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(Some(file.path())).expect("Should load configuration");
        let settings = config.schedule_for("process").unwrap();
        assert_eq!(settings.execution_period_ms, None);
        assert_eq!(settings.timeout_ms, None);

        let entry = CheckConfig::new("process")
            .check(check_fn(|_| async { Ok(serde_json::json!("ok")) }))
            .execution_period(Duration::from_secs(10))
            .timeout(Duration::from_secs(2))
            .with_settings(settings)
            .unwrap()
            .into_entry()
            .unwrap();

        assert_eq!(entry.execution_period, Some(Duration::from_secs(10)));
        assert_eq!(entry.timeout, Some(Duration::from_secs(2)));
        assert!(!entry.runs_once());
        assert_eq!(entry.severity, Severity::Advisory);
    }

    #[test]
    fn test_config_loading_rejects_negative_schedule() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[checks.database]
execution_period_ms = -1
"#
        )
        .unwrap();

        assert!(AppConfig::load_from(Some(file.path())).is_err());
    }
}
