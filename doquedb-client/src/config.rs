//! Data source configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via DOQUEDB_CONFIG or an explicit path)
//! 3. Environment variables

use doquedb_protocol::{AuthMode, ProtocolVersion, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Sessions served per control connection before another one is opened.
pub const CONNECTION_THRESHOLD: usize = 20;

/// Idle channels kept before the reaper starts evicting.
pub const MAX_POOLED_CHANNELS: usize = 100;

/// Reaper period.
pub const CHECK_POOL_PERIOD_MS: u64 = 60_000;

/// Connection pool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSourceConfig {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Highest protocol version to request, written as `1`..`5`.
    #[serde(with = "protocol_version_serde")]
    pub protocol_version: ProtocolVersion,
    /// Authentication mode announced on open.
    pub auth_mode: AuthMode,
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Socket read timeout in milliseconds (0 = block).
    pub read_timeout_ms: u64,
    /// Live sessions per control connection before fan-out.
    pub connection_threshold: usize,
    /// Idle channel cap enforced by the reaper.
    pub max_pooled_channels: usize,
    /// Reaper period in milliseconds.
    pub check_pool_period_ms: u64,
    /// Send large strings and binaries compressed.
    pub compress_payloads: bool,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            protocol_version: ProtocolVersion::CURRENT,
            auth_mode: AuthMode::Password,
            connect_timeout_ms: 10_000,
            read_timeout_ms: 0,
            connection_threshold: CONNECTION_THRESHOLD,
            max_pooled_channels: MAX_POOLED_CHANNELS,
            check_pool_period_ms: CHECK_POOL_PERIOD_MS,
            compress_payloads: false,
        }
    }
}

impl DataSourceConfig {
    /// Creates a configuration for the given server.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("DOQUEDB_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: DataSourceConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Ok(())
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("DOQUEDB_HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("DOQUEDB_PORT") {
            if let Ok(parsed) = port.parse() {
                self.port = parsed;
            }
        }
        if let Ok(version) = std::env::var("DOQUEDB_PROTOCOL_VERSION") {
            if let Ok(parsed) = parse_protocol_version(&version) {
                self.protocol_version = parsed;
            }
        }
        if let Ok(threshold) = std::env::var("DOQUEDB_CONNECTION_THRESHOLD") {
            if let Ok(n) = threshold.parse() {
                self.connection_threshold = n;
            }
        }
        if let Ok(cap) = std::env::var("DOQUEDB_MAX_POOLED_CHANNELS") {
            if let Ok(n) = cap.parse() {
                self.max_pooled_channels = n;
            }
        }
        if let Ok(period) = std::env::var("DOQUEDB_CHECK_POOL_PERIOD_MS") {
            if let Ok(ms) = period.parse() {
                self.check_pool_period_ms = ms;
            }
        }
        if let Ok(compress) = std::env::var("DOQUEDB_COMPRESS") {
            self.compress_payloads = compress == "1" || compress.to_lowercase() == "true";
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Validation("host must not be empty".to_string()));
        }
        if self.connection_threshold == 0 {
            return Err(ConfigError::Validation(
                "connection_threshold must be at least 1".to_string(),
            ));
        }
        if self.check_pool_period_ms == 0 {
            return Err(ConfigError::Validation(
                "check_pool_period_ms must be positive".to_string(),
            ));
        }
        if self.protocol_version > ProtocolVersion::CURRENT {
            return Err(ConfigError::Validation(format!(
                "protocol version {} is newer than {}",
                self.protocol_version,
                ProtocolVersion::CURRENT
            )));
        }
        Ok(())
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn with_auth_mode(mut self, mode: AuthMode) -> Self {
        self.auth_mode = mode;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout_ms = timeout.map_or(0, |t| t.as_millis() as u64);
        self
    }

    pub fn with_connection_threshold(mut self, threshold: usize) -> Self {
        self.connection_threshold = threshold;
        self
    }

    pub fn with_pool_cap(mut self, cap: usize) -> Self {
        self.max_pooled_channels = cap;
        self
    }

    pub fn with_check_pool_period(mut self, period: Duration) -> Self {
        self.check_pool_period_ms = period.as_millis() as u64;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress_payloads = enabled;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn check_pool_period(&self) -> Duration {
        Duration::from_millis(self.check_pool_period_ms)
    }

    /// Authentication mode sent on open. A server expects password
    /// authentication when none is requested.
    pub fn effective_auth_mode(&self) -> AuthMode {
        match self.auth_mode {
            AuthMode::None => AuthMode::Password,
            other => other,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parses a protocol version written as `5` or `v5`.
pub fn parse_protocol_version(s: &str) -> Result<ProtocolVersion, ConfigError> {
    let digits = s.trim().trim_start_matches(['v', 'V']);
    let n: u16 = digits
        .parse()
        .map_err(|_| ConfigError::Validation(format!("invalid protocol version '{}'", s)))?;
    if n == 0 || n > ProtocolVersion::CURRENT.0 + 1 {
        return Err(ConfigError::Validation(format!(
            "protocol version '{}' out of range 1..={}",
            s,
            ProtocolVersion::CURRENT.0 + 1
        )));
    }
    Ok(ProtocolVersion(n - 1))
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    Parse(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Serializes protocol versions as the numbers users write (`5` for V5).
mod protocol_version_serde {
    use doquedb_protocol::ProtocolVersion;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(version: &ProtocolVersion, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u16(version.0 + 1)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ProtocolVersion, D::Error>
    where
        D: Deserializer<'de>,
    {
        let n = u16::deserialize(deserializer)?;
        super::parse_protocol_version(&n.to_string()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = DataSourceConfig::default();
        assert_eq!(config.port, 54321);
        assert_eq!(config.protocol_version, ProtocolVersion::V5);
        assert_eq!(config.connection_threshold, 20);
        assert_eq!(config.max_pooled_channels, 100);
        assert_eq!(config.check_pool_period(), Duration::from_secs(60));
        assert_eq!(config.read_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_auth_none_promoted_to_password() {
        let config = DataSourceConfig::default().with_auth_mode(AuthMode::None);
        assert_eq!(config.effective_auth_mode(), AuthMode::Password);
        let config = config.with_auth_mode(AuthMode::Trust);
        assert_eq!(config.effective_auth_mode(), AuthMode::Trust);
    }

    #[test]
    fn test_parse_protocol_version() {
        assert_eq!(parse_protocol_version("5").unwrap(), ProtocolVersion::V5);
        assert_eq!(parse_protocol_version("v3").unwrap(), ProtocolVersion::V3);
        assert_eq!(parse_protocol_version("1").unwrap(), ProtocolVersion::V1);
        assert!(parse_protocol_version("0").is_err());
        assert!(parse_protocol_version("6").is_err());
        assert!(parse_protocol_version("five").is_err());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = DataSourceConfig::new("db.example", 1234)
            .with_protocol_version(ProtocolVersion::V3)
            .with_pool_cap(8);
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("protocol_version: 3"));
        let parsed: DataSourceConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host: dbhost\nport: 4000\nauth_mode: trust\ncompress_payloads: true").unwrap();

        let config = DataSourceConfig::from_file(file.path()).unwrap();
        assert_eq!(config.host, "dbhost");
        assert_eq!(config.port, 4000);
        assert_eq!(config.auth_mode, AuthMode::Trust);
        assert!(config.compress_payloads);
        assert_eq!(config.max_pooled_channels, MAX_POOLED_CHANNELS);
    }

    #[test]
    fn test_from_file_errors() {
        let err = DataSourceConfig::from_file("/nonexistent/doquedb.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port: [not, a, port]").unwrap();
        let err = DataSourceConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(..)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.yaml");
        let config = DataSourceConfig::default().with_check_pool_period(Duration::from_millis(250));
        config.save(&path).unwrap();
        assert_eq!(DataSourceConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_validation() {
        let config = DataSourceConfig::default().with_connection_threshold(0);
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
        let config = DataSourceConfig::default().with_host("");
        assert!(config.validate().is_err());
    }
}
