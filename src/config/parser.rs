use crate::config::types::{Config, GithubConfig};
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variable overriding `crawler.target-count`
pub const TARGET_COUNT_ENV: &str = "TARGET_REPO_COUNT";

/// Environment variable overriding `crawler.batch-size`
pub const BATCH_SIZE_ENV: &str = "BATCH_SIZE";

/// Loads and parses a configuration file from the given path
///
/// The file is parsed, environment overrides are applied, and the result is
/// validated.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use stargaze::config::load_config;
///
/// let config = load_config(Path::new("stargaze.toml")).unwrap();
/// println!("Batch size: {}", config.crawler.batch_size);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    // Read the configuration file
    let content = std::fs::read_to_string(path)?;

    let mut config = parse_config(&content)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

    // Validate the configuration
    validate(&config)?;

    Ok(config)
}

/// Parses TOML content into a `Config` without validating it
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Applies `TARGET_REPO_COUNT` and `BATCH_SIZE` overrides
///
/// `lookup` resolves an environment variable name to its value. Empty values
/// are ignored; values that are not integers are a validation error.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = non_empty(lookup(TARGET_COUNT_ENV)) {
        config.crawler.target_count = value.parse().map_err(|_| {
            ConfigError::Validation(format!(
                "{} must be a positive integer, got '{}'",
                TARGET_COUNT_ENV, value
            ))
        })?;
        tracing::debug!("target-count overridden by {}", TARGET_COUNT_ENV);
    }

    if let Some(value) = non_empty(lookup(BATCH_SIZE_ENV)) {
        config.crawler.batch_size = value.parse().map_err(|_| {
            ConfigError::Validation(format!(
                "{} must be a positive integer, got '{}'",
                BATCH_SIZE_ENV, value
            ))
        })?;
        tracing::debug!("batch-size overridden by {}", BATCH_SIZE_ENV);
    }

    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reads the GitHub access token from the configured environment variable
pub fn resolve_token(config: &GithubConfig) -> Result<String, ConfigError> {
    non_empty(std::env::var(&config.token_env).ok())
        .ok_or_else(|| ConfigError::MissingToken(config.token_env.clone()))
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Recorded with every crawl run so runs made with different settings can be
/// told apart.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
