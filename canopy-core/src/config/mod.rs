//! Configuration management for Canopy
//!
//! Configuration comes from defaults, a TOML file, or environment variables,
//! and is validated before use.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Store configuration
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Membership lifecycle policy
    pub membership: MembershipConfig,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file; None keeps everything in memory
    pub database_path: Option<PathBuf>,

    /// Connection pool size (forced to 1 for in-memory databases)
    pub max_connections: u32,

    /// How long a writer waits on a locked database
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,

    /// Enable WAL (Write-Ahead Log) journaling for file databases
    pub enable_wal: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

/// What `redeem` does with a membership that is already accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlreadyAcceptedPolicy {
    /// Succeed without writing anything or emitting events
    #[default]
    Ignore,
    /// Fail with `AlreadyProcessed`
    Reject,
}

impl FromStr for AlreadyAcceptedPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ignore" => Ok(AlreadyAcceptedPolicy::Ignore),
            "reject" => Ok(AlreadyAcceptedPolicy::Reject),
            other => Err(ConfigError::InvalidValue(format!(
                "Invalid already-accepted policy: {}",
                other
            ))),
        }
    }
}

/// Membership lifecycle policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipConfig {
    /// Handling of a second redemption of the same invitation
    pub already_accepted: AlreadyAcceptedPolicy,

    /// Only grant invited subgroups the inviter administers (directly or
    /// through an ancestor)
    pub require_inviter_admin: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            max_connections: 8,
            busy_timeout: Duration::from_secs(5),
            enable_wal: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

fn parse_env<T: FromStr>(key: &str, what: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", what, e))),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: CANOPY_<SECTION>_<KEY>
    /// Example: CANOPY_STORE_DATABASE_PATH=/var/lib/canopy/canopy.db
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment variables onto this configuration
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Store config
        if let Ok(path) = env::var("CANOPY_STORE_DATABASE_PATH") {
            self.store.database_path = Some(PathBuf::from(path));
        }
        if let Some(max) = parse_env("CANOPY_STORE_MAX_CONNECTIONS", "max connections")? {
            self.store.max_connections = max;
        }
        if let Ok(timeout) = env::var("CANOPY_STORE_BUSY_TIMEOUT") {
            self.store.busy_timeout = humantime_serde::re::humantime::parse_duration(&timeout)
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid busy timeout: {}", e)))?;
        }
        if let Some(wal) = parse_env("CANOPY_STORE_ENABLE_WAL", "WAL flag")? {
            self.store.enable_wal = wal;
        }

        // Logging config
        if let Ok(level) = env::var("CANOPY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = parse_env("CANOPY_LOG_JSON", "JSON flag")? {
            self.logging.json_format = json;
        }

        // Membership config
        if let Ok(policy) = env::var("CANOPY_MEMBERSHIP_ALREADY_ACCEPTED") {
            self.membership.already_accepted = policy.parse()?;
        }
        if let Some(require) =
            parse_env("CANOPY_MEMBERSHIP_REQUIRE_INVITER_ADMIN", "inviter admin flag")?
        {
            self.membership.require_inviter_admin = require;
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::FileReadError { path: path.to_path_buf(), source }
        })?;

        let config: Self = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.max_connections == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        if self.store.busy_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "busy_timeout must be greater than 0".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;

        std::fs::write(path, contents).map_err(|source| ConfigError::FileWriteError {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // process environment is global; tests touching it take this lock
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: [&str; 8] = [
        "CANOPY_STORE_DATABASE_PATH",
        "CANOPY_STORE_MAX_CONNECTIONS",
        "CANOPY_STORE_BUSY_TIMEOUT",
        "CANOPY_STORE_ENABLE_WAL",
        "CANOPY_LOG_LEVEL",
        "CANOPY_LOG_JSON",
        "CANOPY_MEMBERSHIP_ALREADY_ACCEPTED",
        "CANOPY_MEMBERSHIP_REQUIRE_INVITER_ADMIN",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_env_overrides_apply() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        env::set_var("CANOPY_STORE_DATABASE_PATH", "/tmp/canopy-env.db");
        env::set_var("CANOPY_STORE_MAX_CONNECTIONS", "3");
        env::set_var("CANOPY_STORE_BUSY_TIMEOUT", "750ms");
        env::set_var("CANOPY_STORE_ENABLE_WAL", "false");
        env::set_var("CANOPY_LOG_LEVEL", "debug");
        env::set_var("CANOPY_LOG_JSON", "true");
        env::set_var("CANOPY_MEMBERSHIP_ALREADY_ACCEPTED", "reject");
        env::set_var("CANOPY_MEMBERSHIP_REQUIRE_INVITER_ADMIN", "true");

        let config = Config::from_env();
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.store.database_path, Some(PathBuf::from("/tmp/canopy-env.db")));
        assert_eq!(config.store.max_connections, 3);
        assert_eq!(config.store.busy_timeout, Duration::from_millis(750));
        assert!(!config.store.enable_wal);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        assert_eq!(config.membership.already_accepted, AlreadyAcceptedPolicy::Reject);
        assert!(config.membership.require_inviter_admin);
    }

    #[test]
    fn test_env_overrides_keep_unset_fields() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        env::set_var("CANOPY_STORE_MAX_CONNECTIONS", "2");

        let mut config = Config::default();
        config.logging.level = "warn".to_string();
        let result = config.apply_env();
        clear_env();

        assert!(result.is_ok());
        assert_eq!(config.store.max_connections, 2);
        assert_eq!(config.logging.level, "warn");
        assert!(config.store.database_path.is_none());
    }

    #[test]
    fn test_malformed_env_values_are_invalid() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let cases = [
            ("CANOPY_STORE_MAX_CONNECTIONS", "many"),
            ("CANOPY_STORE_BUSY_TIMEOUT", "soon"),
            ("CANOPY_STORE_ENABLE_WAL", "maybe"),
            ("CANOPY_LOG_JSON", "yes please"),
            ("CANOPY_MEMBERSHIP_ALREADY_ACCEPTED", "sometimes"),
            ("CANOPY_MEMBERSHIP_REQUIRE_INVITER_ADMIN", "2"),
        ];

        for (key, value) in cases {
            clear_env();
            env::set_var(key, value);
            let result = Config::from_env();
            clear_env();
            assert!(
                matches!(result, Err(ConfigError::InvalidValue(_))),
                "{} = {} should be rejected",
                key,
                value
            );
        }
    }

    #[test]
    fn test_env_level_is_validated() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        env::set_var("CANOPY_LOG_LEVEL", "chatty");
        let result = Config::from_env();
        clear_env();
        assert!(matches!(result, Err(ConfigError::ValidationFailed(_))));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.store.database_path.is_none());
        assert_eq!(config.membership.already_accepted, AlreadyAcceptedPolicy::Ignore);
        assert!(!config.membership.require_inviter_admin);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.store.max_connections = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.store.busy_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = Config::default();

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("ignore".parse::<AlreadyAcceptedPolicy>().unwrap(), AlreadyAcceptedPolicy::Ignore);
        assert_eq!("REJECT".parse::<AlreadyAcceptedPolicy>().unwrap(), AlreadyAcceptedPolicy::Reject);
        assert!("sometimes".parse::<AlreadyAcceptedPolicy>().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [membership]
            already_accepted = "reject"

            [store]
            busy_timeout = "250ms"
            "#,
        )
        .unwrap();

        assert_eq!(config.membership.already_accepted, AlreadyAcceptedPolicy::Reject);
        assert_eq!(config.store.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.store.max_connections, 8);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canopy.toml");

        let mut config = Config::default();
        config.store.database_path = Some(dir.path().join("canopy.db"));
        config.membership.require_inviter_admin = true;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.store.database_path, config.store.database_path);
        assert!(loaded.membership.require_inviter_admin);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = Config::from_file("/definitely/not/here/canopy.toml");
        assert!(matches!(result, Err(ConfigError::FileReadError { .. })));
    }
}
