//! Configuration parsing helpers.

use std::time::Duration;

use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Parse a human-readable duration (`15s`, `1m`, `1m30s`, `500ms`).
///
/// A bare `0` is accepted as [`Duration::ZERO`], which lets `--interval 0`
/// run ticks back to back.
///
/// # Examples
///
/// ```
/// use loadwatch::config::parse_duration;
///
/// assert_eq!(parse_duration("15s").unwrap().as_secs(), 15);
/// assert_eq!(parse_duration("1m").unwrap().as_secs(), 60);
/// assert_eq!(parse_duration("0").unwrap().as_secs(), 0);
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    match s {
        "" => Err("duration string is empty".to_string()),
        "0" => Ok(Duration::ZERO),
        _ => humantime::parse_duration(s).map_err(|e| e.to_string()),
    }
}

/// Expand environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}`; unset variables without a
/// default expand to the empty string.
pub fn expand_env_vars(input: &str) -> String {
    static ENV_VAR_REGEX: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

    let regex = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("failed to compile env var regex")
    });

    regex
        .replace_all(input, |caps: &regex::Captures| {
            let default_value = caps.get(2).map_or("", |m| m.as_str());
            std::env::var(&caps[1]).unwrap_or_else(|_| default_value.to_string())
        })
        .into_owned()
}
