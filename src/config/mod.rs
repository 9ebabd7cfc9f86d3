//! Configuration module
//!
//! This module provides configuration loading and validation for dnsfence.
//! The configuration is a single YAML file with listen bindings, per-domain
//! rule lists and a few runtime sections.
//!
//! # Example
//!
//! ```rust,no_run
//! use dnsfence::config::Config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file("config.yaml")?;
//! println!("Configured domains: {:?}", config.rules.keys());
//! # Ok(())
//! # }
//! ```

pub mod loader;
pub mod reload;
pub mod types;
pub mod validation;

use crate::server::Protocol;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

// Re-export commonly used types
pub use reload::{ReloadCoordinator, ReloadOutcome, ReloadTrigger};
pub use types::{Binding, Bindings, ListenerConfig, RuleConfig, RulesConfig};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    /// Log level: trace|debug|info|warn|error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: text|json
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Optional file that receives a copy of the log stream
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

/// Upstream exchange settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Upper bound on a single upstream exchange, in milliseconds
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,

    /// Receive buffer for UDP replies
    #[serde(default = "default_udp_buffer_size")]
    pub udp_buffer_size: usize,
}

fn default_upstream_timeout_ms() -> u64 {
    2000
}

fn default_udp_buffer_size() -> usize {
    4096
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_upstream_timeout_ms(),
            udp_buffer_size: default_udp_buffer_size(),
        }
    }
}

impl UpstreamConfig {
    /// Exchange timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Rule reload settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReloadConfig {
    /// Interval between modification checks; 0 disables the timer
    #[serde(default = "default_reload_interval_secs")]
    pub interval_secs: u64,

    /// Apply rule sets whose bad rules were dropped instead of rejecting them
    #[serde(default)]
    pub allow_partial: bool,
}

fn default_reload_interval_secs() -> u64 {
    120
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reload_interval_secs(),
            allow_partial: false,
        }
    }
}

impl ReloadConfig {
    /// Timer interval, `None` when disabled
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

/// Listener runtime settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerSettings {
    /// Maximum accepted UDP datagram
    #[serde(default = "default_max_udp_size")]
    pub max_udp_size: usize,

    /// Maximum accepted TCP message
    #[serde(default = "default_max_tcp_size")]
    pub max_tcp_size: usize,

    /// Idle TCP connections are closed after this many milliseconds
    #[serde(default = "default_tcp_idle_timeout_ms")]
    pub tcp_idle_timeout_ms: u64,

    /// Time in-flight queries get to finish on shutdown
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_max_udp_size() -> usize {
    4096
}

fn default_max_tcp_size() -> usize {
    65535
}

fn default_tcp_idle_timeout_ms() -> u64 {
    10_000
}

fn default_shutdown_grace_ms() -> u64 {
    3000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            max_udp_size: default_max_udp_size(),
            max_tcp_size: default_max_tcp_size(),
            tcp_idle_timeout_ms: default_tcp_idle_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Listen bindings keyed by protocol (`udp`, `tcp`)
    #[serde(default)]
    pub listen: BTreeMap<String, Bindings>,

    /// Rule lists keyed by domain
    #[serde(default)]
    pub rules: RulesConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,

    /// Upstream exchange settings
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Reload settings
    #[serde(default)]
    pub reload: ReloadConfig,

    /// Listener settings
    #[serde(default)]
    pub server: ServerSettings,
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        loader::load_from_file(path)
    }

    /// Load configuration from a YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed or validated.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        loader::load_from_yaml(yaml)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Apply command line log overrides and validate the result
    ///
    /// # Errors
    ///
    /// Returns an error if an override is not a valid level or format.
    pub fn override_log(&mut self, level: Option<String>, format: Option<String>) -> Result<()> {
        if let Some(level) = level {
            self.log.level = level;
        }
        if let Some(format) = format {
            self.log.format = format;
        }
        self.validate()
    }

    /// Resolve every configured binding into a listener
    pub fn listeners(&self) -> Result<Vec<ListenerConfig>> {
        let mut out = Vec::new();
        for (proto, bindings) in &self.listen {
            let protocol: Protocol = proto.parse()?;
            for binding in bindings.as_slice() {
                out.push(ListenerConfig {
                    protocol,
                    addr: binding.socket_addr()?,
                });
            }
        }
        Ok(out)
    }

    /// True when two configs differ outside the `rules` section
    ///
    /// Reload only swaps rules; other sections need a restart.
    pub fn runtime_differs(&self, other: &Config) -> bool {
        self.listen != other.listen
            || self.log != other.log
            || self.upstream != other.upstream
            || self.reload != other.reload
            || self.server != other.server
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_overrides_are_validated() {
        let yaml = "listen: { udp: { address: 127.0.0.1, port: 5353 } }\n";

        let mut config = Config::from_yaml(yaml).unwrap();
        config
            .override_log(Some("debug".to_string()), Some("json".to_string()))
            .unwrap();
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");

        let mut config = Config::from_yaml(yaml).unwrap();
        assert!(config.override_log(None, Some("xml".to_string())).is_err());

        let mut config = Config::from_yaml(yaml).unwrap();
        assert!(config.override_log(Some("loud".to_string()), None).is_err());

        let mut config = Config::from_yaml(yaml).unwrap();
        config.override_log(None, None).unwrap();
        assert_eq!(config.log.format, "text");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log.level, "info");
        assert_eq!(config.upstream.timeout(), Duration::from_secs(2));
        assert_eq!(config.reload.interval(), Some(Duration::from_secs(120)));
        assert!(!config.reload.allow_partial);
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_reload_interval_disabled() {
        let reload = ReloadConfig {
            interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(reload.interval(), None);
    }

    #[test]
    fn test_from_yaml_full() {
        let yaml = r#"
listen:
  udp: { address: 127.0.0.1, port: 5353 }
  tcp:
    - { address: 127.0.0.1, port: 5353 }
    - { address: "::1", port: 5353 }
rules:
  example.com:
    - name: all
      then:
        action: refused
upstream:
  timeout_ms: 500
reload:
  interval_secs: 30
  allow_partial: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.upstream.timeout_ms, 500);
        assert!(config.reload.allow_partial);
        assert_eq!(config.rules["example.com"].len(), 1);

        let listeners = config.listeners().unwrap();
        assert_eq!(listeners.len(), 3);
        assert!(listeners
            .iter()
            .any(|l| l.protocol == Protocol::Udp && l.addr.port() == 5353));
        assert_eq!(
            listeners
                .iter()
                .filter(|l| l.protocol == Protocol::Tcp)
                .count(),
            2
        );
    }

    #[test]
    fn test_runtime_differs_ignores_rules() {
        let a = Config::from_yaml(
            "listen: { udp: { address: 127.0.0.1, port: 53 } }\nrules: { a.com: [] }",
        )
        .unwrap();
        let mut b = a.clone();
        b.rules.insert("b.com".to_string(), Vec::new());
        assert!(!a.runtime_differs(&b));

        b.upstream.timeout_ms = 1;
        assert!(a.runtime_differs(&b));
    }
}
