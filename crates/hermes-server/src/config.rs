//! Configuration for the Hermes server.
//!
//! Sources, in increasing precedence: defaults, a TOML or JSON file, then
//! `HERMES_*` environment variables.
//!
//! ```toml
//! [server]
//! max_start_attempts = 3
//! request_timeout = "30s"
//! max_request_body_bytes = 10485760
//! max_concurrent_requests = 4
//!
//! [engine]
//! analyzer_property_keys = ["sonar.cs.analyzer.projectOutPaths"]
//!
//! [telemetry]
//! log_level = "info"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use hermes_telemetry::LogConfig;
use serde::{Deserialize, Serialize};

use crate::credentials::{ServerLimits, DEFAULT_PORT_RANGE_END, DEFAULT_PORT_RANGE_START};
use crate::error::{ServerError, ServerResult};

/// Hermes configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HermesConfig {
    /// Server settings.
    pub server: ServerSettings,
    /// Engine settings.
    pub engine: EngineSettings,
    /// Telemetry settings.
    pub telemetry: TelemetrySettings,
}

impl HermesConfig {
    /// Create a new configuration builder.
    pub fn builder() -> HermesConfigBuilder {
        HermesConfigBuilder::default()
    }

    /// Load configuration from a file.
    pub fn from_file(path: impl Into<PathBuf>) -> ServerResult<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ServerError::config(format!("failed to read config file: {e}")))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match extension {
            "toml" => toml::from_str(&content)
                .map_err(|e| ServerError::config(format!("invalid TOML: {e}"))),
            "json" => serde_json::from_str(&content)
                .map_err(|e| ServerError::config(format!("invalid JSON: {e}"))),
            _ => Err(ServerError::config(format!(
                "unsupported config format: {extension}"
            ))),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Unparsable values are ignored.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(attempts) = lookup("HERMES_MAX_START_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.server.max_start_attempts = attempts;
        }

        if let Some(ms) = lookup("HERMES_REQUEST_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.server.request_timeout = Duration::from_millis(ms);
        }

        if let Some(bytes) = lookup("HERMES_MAX_REQUEST_BODY_BYTES").and_then(|v| v.parse().ok()) {
            self.server.max_request_body_bytes = bytes;
        }

        if let Some(max) = lookup("HERMES_MAX_CONCURRENT_REQUESTS").and_then(|v| v.parse().ok()) {
            self.server.max_concurrent_requests = max;
        }

        if let Some(level) = lookup("HERMES_LOG_LEVEL") {
            self.telemetry.log_level = level;
        }

        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ServerResult<()> {
        if self
            .engine
            .analyzer_property_keys
            .iter()
            .any(|key| key.trim().is_empty())
        {
            return Err(ServerError::config(
                "analyzer_property_keys must not contain empty keys",
            ));
        }
        self.server_limits().validate()
    }

    /// Limits the server enforces.
    pub fn server_limits(&self) -> ServerLimits {
        ServerLimits {
            max_start_attempts: self.server.max_start_attempts,
            request_timeout: self.server.request_timeout,
            max_request_body_bytes: self.server.max_request_body_bytes,
            max_concurrent_requests: self.server.max_concurrent_requests,
            port_range: self.server.port_range_start..=self.server.port_range_end,
        }
    }

    /// Logging configuration for [`hermes_telemetry::init_logging`].
    pub fn log_config(&self) -> LogConfig {
        let base = if self.telemetry.json_logs {
            LogConfig::production()
        } else {
            LogConfig::development()
        };
        base.with_level(self.telemetry.log_level.clone())
            .with_service_name(self.telemetry.service_name.clone())
    }
}

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind attempts before the server faults.
    pub max_start_attempts: u32,
    /// Bound on body read, slot wait and engine run.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Maximum request body size in bytes.
    pub max_request_body_bytes: u64,
    /// Analyses run at once.
    pub max_concurrent_requests: usize,
    /// First port the provider may draw.
    pub port_range_start: u16,
    /// Last port the provider may draw.
    pub port_range_end: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let limits = ServerLimits::default();
        Self {
            max_start_attempts: limits.max_start_attempts,
            request_timeout: limits.request_timeout,
            max_request_body_bytes: limits.max_request_body_bytes,
            max_concurrent_requests: limits.max_concurrent_requests,
            port_range_start: DEFAULT_PORT_RANGE_START,
            port_range_end: DEFAULT_PORT_RANGE_END,
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Keys handed to the client in the launch configuration.
    pub analyzer_property_keys: Vec<String>,
}

/// Telemetry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Filter directive.
    pub log_level: String,
    /// Emit JSON instead of human-readable logs.
    pub json_logs: bool,
    /// Service name for telemetry.
    pub service_name: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
            service_name: "hermes".to_string(),
        }
    }
}

/// Builder for `HermesConfig`.
#[derive(Debug, Default)]
pub struct HermesConfigBuilder {
    config: HermesConfig,
}

impl HermesConfigBuilder {
    /// Set the number of start attempts.
    #[must_use]
    pub fn max_start_attempts(mut self, attempts: u32) -> Self {
        self.config.server.max_start_attempts = attempts;
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.server.request_timeout = timeout;
        self
    }

    /// Set the maximum request body size.
    #[must_use]
    pub fn max_request_body_bytes(mut self, bytes: u64) -> Self {
        self.config.server.max_request_body_bytes = bytes;
        self
    }

    /// Set the concurrency ceiling.
    #[must_use]
    pub fn max_concurrent_requests(mut self, max: usize) -> Self {
        self.config.server.max_concurrent_requests = max;
        self
    }

    /// Set the port range.
    #[must_use]
    pub fn port_range(mut self, start: u16, end: u16) -> Self {
        self.config.server.port_range_start = start;
        self.config.server.port_range_end = end;
        self
    }

    /// Add an analyzer property key.
    #[must_use]
    pub fn analyzer_property_key(mut self, key: impl Into<String>) -> Self {
        self.config.engine.analyzer_property_keys.push(key.into());
        self
    }

    /// Set the log level.
    #[must_use]
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.telemetry.log_level = level.into();
        self
    }

    /// Set the service name.
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.telemetry.service_name = name.into();
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ServerResult<HermesConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Serde adapter for durations written as `"250ms"`, `"30s"`, `"2m"` or `"1h"`.
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis();
        let s = if millis % 1000 == 0 {
            format!("{}s", millis / 1000)
        } else {
            format!("{millis}ms")
        };
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let invalid = || format!("invalid duration: {s:?}");
        let number = |digits: &str| digits.trim().parse::<u64>().map_err(|_| invalid());

        if let Some(stripped) = s.strip_suffix("ms") {
            Ok(Duration::from_millis(number(stripped)?))
        } else if let Some(stripped) = s.strip_suffix('s') {
            Ok(Duration::from_secs(number(stripped)?))
        } else if let Some(stripped) = s.strip_suffix('m') {
            let minutes = number(stripped)?;
            minutes.checked_mul(60).map(Duration::from_secs).ok_or_else(invalid)
        } else if let Some(stripped) = s.strip_suffix('h') {
            let hours = number(stripped)?;
            hours.checked_mul(3600).map(Duration::from_secs).ok_or_else(invalid)
        } else {
            // Assume seconds
            Ok(Duration::from_secs(number(s)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = HermesConfig::default();
        assert_eq!(config.server.max_start_attempts, 3);
        assert_eq!(config.server.request_timeout, Duration::from_secs(30));
        assert_eq!(config.server.max_request_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.server.max_concurrent_requests, 4);
        assert_eq!(config.server_limits(), ServerLimits::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = HermesConfig::builder()
            .max_start_attempts(5)
            .request_timeout(Duration::from_millis(1500))
            .max_concurrent_requests(2)
            .port_range(50000, 50100)
            .analyzer_property_key("sonar.cs.internal.someKey")
            .build()
            .unwrap();

        let limits = config.server_limits();
        assert_eq!(limits.max_start_attempts, 5);
        assert_eq!(limits.request_timeout, Duration::from_millis(1500));
        assert_eq!(limits.max_concurrent_requests, 2);
        assert_eq!(limits.port_range, 50000..=50100);
        assert_eq!(config.engine.analyzer_property_keys.len(), 1);
    }

    #[test]
    fn test_config_validation() {
        assert!(HermesConfig::builder().max_start_attempts(0).build().is_err());
        assert!(HermesConfig::builder().max_concurrent_requests(0).build().is_err());
        assert!(HermesConfig::builder().max_request_body_bytes(0).build().is_err());
        assert!(HermesConfig::builder().port_range(60000, 50000).build().is_err());
        assert!(HermesConfig::builder().port_range(80, 90).build().is_err());
        assert!(HermesConfig::builder()
            .analyzer_property_key("  ")
            .build()
            .is_err());
    }

    #[test]
    fn test_toml_config() {
        let toml = r#"
[server]
max_start_attempts = 5
request_timeout = "250ms"

[engine]
analyzer_property_keys = ["a", "b"]

[telemetry]
service_name = "test-service"
json_logs = false
"#;
        let config: HermesConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.max_start_attempts, 5);
        assert_eq!(config.server.request_timeout, Duration::from_millis(250));
        assert_eq!(config.server.max_concurrent_requests, 4);
        assert_eq!(config.engine.analyzer_property_keys, vec!["a", "b"]);
        assert_eq!(config.telemetry.service_name, "test-service");

        let log = config.log_config();
        assert!(!log.json_format);
        assert_eq!(log.service_name, "test-service");
    }

    #[test]
    fn test_json_round_trip_keeps_timeout() {
        let config = HermesConfig::builder()
            .request_timeout(Duration::from_millis(1500))
            .build()
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""request_timeout":"1500ms""#));
        let back: HermesConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_parse_duration() {
        use humantime_serde::parse_duration;
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("15"), Ok(Duration::from_secs(15)));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("HERMES_MAX_START_ATTEMPTS", "7"),
            ("HERMES_REQUEST_TIMEOUT_MS", "1200"),
            ("HERMES_MAX_REQUEST_BODY_BYTES", "2048"),
            ("HERMES_MAX_CONCURRENT_REQUESTS", "not-a-number"),
            ("HERMES_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let config =
            HermesConfig::default().with_overrides_from(|key| env.get(key).map(ToString::to_string));
        assert_eq!(config.server.max_start_attempts, 7);
        assert_eq!(config.server.request_timeout, Duration::from_millis(1200));
        assert_eq!(config.server.max_request_body_bytes, 2048);
        assert_eq!(config.server.max_concurrent_requests, 4);
        assert_eq!(config.telemetry.log_level, "debug");
    }

    #[test]
    fn test_from_file() {
        let dir = std::env::temp_dir().join(format!("hermes-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let toml_path = dir.join("hermes.toml");
        std::fs::write(&toml_path, "[server]\nmax_start_attempts = 9\n").unwrap();
        assert_eq!(
            HermesConfig::from_file(&toml_path).unwrap().server.max_start_attempts,
            9
        );

        let json_path = dir.join("hermes.json");
        std::fs::write(&json_path, r#"{"server":{"max_concurrent_requests":8}}"#).unwrap();
        assert_eq!(
            HermesConfig::from_file(&json_path).unwrap().server.max_concurrent_requests,
            8
        );

        let yaml_path = dir.join("hermes.yaml");
        std::fs::write(&yaml_path, "server: {}").unwrap();
        assert!(HermesConfig::from_file(&yaml_path).is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
