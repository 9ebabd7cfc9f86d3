//! dnsfence - a DNS policy proxy
//!
//! Every inbound query is routed to the most specific configured domain,
//! matched against that domain's ordered rule list, and then forwarded to an
//! upstream resolver, refused, or failed.
//!
//! # Architecture
//!
//! - `config`: YAML configuration loading, validation and hot reload
//! - `rules`: rule compilation, domain routing, rule matching and the
//!   atomically swapped rule store
//! - `proxy`: the request handler that dispatches matched actions, forwards
//!   to upstreams and filters forwarded answers
//! - `server`: UDP and TCP listeners
//! - `dns`: wire encoding and locally built replies
//! - `logging`: `tracing` subscriber setup
//! - `error`: Error types and handling
//!

/// Configuration loading, validation and hot reload
pub mod config;

/// DNS message helpers
pub mod dns;

/// Logging initialization
pub mod logging;

/// Request handling: dispatch, forwarding, response filtering, audit
pub mod proxy;

/// Rule compilation, routing and matching
pub mod rules;

/// DNS listeners
///
/// One UDP or TCP listener per configured binding.
pub mod server;

/// Error types and handling
///
/// Provides unified error types for the entire crate.
pub mod error {

    use crate::rules::CompileError;
    use thiserror::Error;

    /// Main error type for dnsfence
    #[derive(Error, Debug)]
    pub enum Error {
        // ============ DNS Protocol Errors ============
        /// DNS protocol error
        #[error("DNS protocol error: {0}")]
        DnsProtocol(String),

        // ============ Upstream Errors ============
        /// Upstream server timeout
        #[error("Upstream timeout: {upstream} ({timeout_ms}ms)")]
        UpstreamTimeout {
            /// The upstream server address
            upstream: String,
            /// Timeout duration in milliseconds
            timeout_ms: u64,
        },

        /// Network connection error
        #[error("Connection error to {address}: {reason}")]
        Connection {
            /// Target address
            address: String,
            /// Failure reason
            reason: String,
        },

        // ============ Configuration Errors ============
        /// Configuration error
        #[error("Configuration error: {0}")]
        Config(String),

        /// Invalid configuration value
        #[error("Invalid config value for {field}: {value} - {reason}")]
        InvalidConfigValue {
            /// The field name
            field: String,
            /// The invalid value
            value: String,
            /// Reason why it's invalid
            reason: String,
        },

        /// Address parsing error
        #[error("Invalid address: {input}")]
        InvalidAddress {
            /// The invalid address input
            input: String,
        },

        /// Rule compilation produced errors
        #[error("{} rule compile error(s): {}", .0.len(), CompileError::summary(.0))]
        Compile(Vec<CompileError>),

        // ============ File/IO Errors ============
        /// IO error
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        /// File parse error
        #[error("Failed to parse file '{path}': {reason}")]
        FileParse {
            /// Path to the file
            path: String,
            /// Parse error description
            reason: String,
        },

        /// Other error
        #[error("Error: {0}")]
        Other(String),
    }

    impl Error {
        /// Create an UpstreamTimeout error
        pub fn upstream_timeout(upstream: impl Into<String>, timeout_ms: u64) -> Self {
            Self::UpstreamTimeout {
                upstream: upstream.into(),
                timeout_ms,
            }
        }

        /// Create a Connection error
        pub fn connection(address: impl Into<String>, reason: impl Into<String>) -> Self {
            Self::Connection {
                address: address.into(),
                reason: reason.into(),
            }
        }

        /// Create an InvalidAddress error
        pub fn invalid_address(input: impl Into<String>) -> Self {
            Self::InvalidAddress {
                input: input.into(),
            }
        }

        /// Create an InvalidConfigValue error
        pub fn invalid_config_value(
            field: impl Into<String>,
            value: impl Into<String>,
            reason: impl Into<String>,
        ) -> Self {
            Self::InvalidConfigValue {
                field: field.into(),
                value: value.into(),
                reason: reason.into(),
            }
        }

        /// Create a FileParse error
        pub fn file_parse(path: impl Into<String>, reason: impl Into<String>) -> Self {
            Self::FileParse {
                path: path.into(),
                reason: reason.into(),
            }
        }

        /// Check if this error is a configuration error
        pub fn is_config_error(&self) -> bool {
            matches!(
                self,
                Error::Config(_)
                    | Error::InvalidConfigValue { .. }
                    | Error::InvalidAddress { .. }
                    | Error::FileParse { .. }
                    | Error::Compile(_)
            )
        }
    }

    impl From<hickory_proto::error::ProtoError> for Error {
        fn from(e: hickory_proto::error::ProtoError) -> Self {
            Error::DnsProtocol(e.to_string())
        }
    }

    /// Result type for dnsfence operations
    pub type Result<T> = std::result::Result<T, Error>;
}

// Re-export commonly used types
pub use error::{Error, Result};
