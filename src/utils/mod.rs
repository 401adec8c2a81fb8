pub mod retry;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::models::common::Config;

/// Environment variables with this prefix override file values, using `__`
/// between path segments (`RELAY__NODE__RPC_URL`).
pub const ENV_PREFIX: &str = "RELAY";

pub fn load_config<P: AsRef<Path>>(file_name: P) -> Result<Config> {
    let config_path = file_name.as_ref();
    info!("Config path: {}", config_path.to_string_lossy());

    let settings = config::Config::builder()
        .add_source(config::File::from(config_path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()
        .context("failed to read configuration sources")?;

    let config: Config = settings
        .try_deserialize()
        .context("failed to parse configuration")?;
    config.validate().context("invalid configuration")?;

    Ok(config)
}

pub(crate) fn strip_html(error: &str) -> String {
    // If the error contains HTML tags, extract just the text content
    if error.contains("<!doctype html>") || error.contains("<html>") {
        // Remove all HTML tags and return the first non-empty line of text
        error
            .lines()
            .map(|line| line.trim())
            .find(|line| {
                !line.starts_with('<')
                    && !line.ends_with('>')
                    && !line.is_empty()
                    && !line.starts_with("<!")
                    && *line != "html"
                    && *line != "body"
            })
            .unwrap_or(error)
            .to_string()
    } else {
        // Return original error if no HTML
        error.to_string()
    }
}

/// Shortens a response body for logging.
pub(crate) fn truncate_body(body: &str, limit: usize) -> String {
    let body = strip_html(body);
    match body.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body,
    }
}
