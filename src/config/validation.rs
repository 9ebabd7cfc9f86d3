//! Configuration validation
//!
//! Validates the runtime sections of a configuration. Rule entries are not
//! checked here; the rule compiler reports those with per-rule context.

use crate::config::Config;
use crate::{Error, Result};

/// Validate a configuration
///
/// # Errors
///
/// Returns the first validation failure found.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_log_level(&config.log.level)?;
    validate_log_format(&config.log.format)?;
    validate_listen(config)?;
    validate_upstream(config)?;
    validate_server(config)?;

    Ok(())
}

/// Validate log level
fn validate_log_level(level: &str) -> Result<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];

    if !valid_levels.contains(&level) {
        return Err(Error::Config(format!(
            "Invalid log level '{}'. Must be one of: {}",
            level,
            valid_levels.join(", ")
        )));
    }

    Ok(())
}

fn validate_log_format(format: &str) -> Result<()> {
    let valid = ["text", "json"];
    if !valid.contains(&format) {
        return Err(Error::Config(format!(
            "Invalid log format '{}'. Must be one of: {}",
            format,
            valid.join(", ")
        )));
    }
    Ok(())
}

/// Every binding must resolve, and at least one must exist
fn validate_listen(config: &Config) -> Result<()> {
    let listeners = config.listeners()?;
    if listeners.is_empty() {
        return Err(Error::Config(
            "At least one listen binding is required".to_string(),
        ));
    }

    let mut seen = std::collections::HashSet::new();
    for listener in &listeners {
        if !seen.insert((listener.protocol, listener.addr)) {
            return Err(Error::Config(format!(
                "Duplicate listen binding: {}",
                listener
            )));
        }
    }

    Ok(())
}

fn validate_upstream(config: &Config) -> Result<()> {
    if config.upstream.timeout_ms == 0 {
        return Err(Error::invalid_config_value(
            "upstream.timeout_ms",
            "0",
            "must be greater than zero",
        ));
    }
    if config.upstream.udp_buffer_size < 512 {
        return Err(Error::invalid_config_value(
            "upstream.udp_buffer_size",
            config.upstream.udp_buffer_size.to_string(),
            "must be at least 512",
        ));
    }
    Ok(())
}

fn validate_server(config: &Config) -> Result<()> {
    let server = &config.server;
    if server.max_udp_size < 512 {
        return Err(Error::invalid_config_value(
            "server.max_udp_size",
            server.max_udp_size.to_string(),
            "must be at least 512",
        ));
    }
    if server.max_tcp_size == 0 || server.max_tcp_size > 65535 {
        return Err(Error::invalid_config_value(
            "server.max_tcp_size",
            server.max_tcp_size.to_string(),
            "must be between 1 and 65535",
        ));
    }
    Ok(())
}
