use crate::config::Config;
use crate::error::ConfigError;

/// Validate a [`Config`], returning all detected violations.
///
/// Returns `Ok(())` when the config is valid, or `Err` with a
/// vector of every validation error found.
pub fn validate(config: &Config) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let endpoint = config.connection.endpoint.trim();
    if endpoint.is_empty() {
        errors.push(invalid("connection.endpoint", "must not be empty".to_string()));
    } else if endpoint.strip_prefix("unix:").is_some_and(|p| p.trim().is_empty()) {
        errors.push(invalid(
            "connection.endpoint",
            "unix: endpoint needs a socket path".to_string(),
        ));
    }

    let tick = config.connection.tick_interval_ms;
    if !(1..=1000).contains(&tick) {
        errors.push(invalid(
            "connection.tick_interval_ms",
            format!("must be 1..=1000, got {tick}"),
        ));
    }

    let page = config.trace.page_size;
    if !(1..=10_000).contains(&page) {
        errors.push(invalid(
            "trace.page_size",
            format!("must be 1..=10000, got {page}"),
        ));
    }

    if config.peer.history_len == 0 {
        errors.push(invalid("peer.history_len", "must be at least 1".to_string()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::Validation {
        field: field.to_string(),
        message,
    }
}
