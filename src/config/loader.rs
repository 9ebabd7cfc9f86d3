//! Configuration loader
//!
//! Loads configuration from files and strings.

use crate::config::Config;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::env;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

// Compile-once Regex instance to avoid repeated compilation at runtime/tests
static RE_ENV: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Z0-9_]+)(?::-([^}]*))?\}").expect("env substitution pattern is valid")
});

/// Load configuration from a YAML file
///
/// Supports environment variable substitution: ${VAR_NAME} or ${VAR_NAME:-default}
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed or validated.
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    load_from_yaml(&contents).map_err(|e| match e {
        Error::Config(reason) => Error::file_parse(path.display().to_string(), reason),
        other => other,
    })
}

/// Modification marker of a configuration file
///
/// The file's mtime; reload compares it to decide whether to re-read.
pub fn modified_marker<P: AsRef<Path>>(path: P) -> Result<SystemTime> {
    let meta = fs::metadata(path.as_ref())?;
    Ok(meta.modified()?)
}

/// Substitute environment variables in configuration
///
/// Supports ${VAR_NAME} and ${VAR_NAME:-default_value}
fn substitute_env_vars(content: &str) -> Result<String> {
    let mut missing = None;

    let result = RE_ENV.replace_all(content, |cap: &regex::Captures<'_>| {
        let var_name = &cap[1];
        match (env::var(var_name), cap.get(2)) {
            (Ok(v), _) => v,
            (Err(_), Some(default)) => default.as_str().to_string(),
            (Err(_), None) => {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    if let Some(var_name) = missing {
        return Err(Error::Config(format!(
            "Environment variable {} not found and no default provided",
            var_name
        )));
    }

    Ok(result.into_owned())
}

/// Load configuration from a YAML string
///
/// # Errors
///
/// Returns an error if the YAML cannot be parsed or validated.
pub fn load_from_yaml(yaml: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(yaml)
        .map_err(|e| Error::Config(format!("Failed to parse YAML: {}", e)))?;

    config.validate()?;

    Ok(config)
}
