//! Configuration loading and schema definitions for the TestRail reporter.
//!
//! This module provides types and functions for loading reporter
//! configuration from TOML files or strings. Loading only checks the TOML
//! shape; [`ReporterOptions::validate`] enforces the required options.

pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "testrail-reporter.toml";

/// Loads reporter configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read (e.g., doesn't exist or permission denied)
/// - The file contains invalid TOML syntax
/// - The configuration doesn't match the expected schema
///
/// # Example
///
/// ```no_run
/// use testrail_reporter::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("testrail-reporter.toml"))?;
/// let reporter_config = config.testrail.validate()?;
/// println!("Project: {}", reporter_config.project_id);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Loads reporter configuration from a TOML string.
///
/// # Example
///
/// ```
/// use testrail_reporter::config::load_config_str;
///
/// let config = load_config_str(r#"
///     [testrail]
///     host = "https://example.testrail.io"
///     username = "ci@example.com"
///     password = "secret"
///     project_id = 3
///     suite_id = 1
/// "#)?;
///
/// assert_eq!(config.testrail.project_id, Some(3));
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    Ok(config)
}
