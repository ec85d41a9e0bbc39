use crate::config::types::{
    Config, CrawlerConfig, GithubConfig, OutputConfig, RateLimitConfig, RetryConfig,
};
use crate::ConfigError;
use url::Url;

/// Largest page GitHub's search connection will return
pub const MAX_PAGE_SIZE: u32 = 100;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_github_config(&config.github)?;
    validate_crawler_config(&config.crawler)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_retry_config(&config.retry)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the GitHub endpoint configuration
fn validate_github_config(config: &GithubConfig) -> Result<(), ConfigError> {
    let endpoint = Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid endpoint: {}", e)))?;

    if endpoint.scheme() != "https" && endpoint.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "Endpoint '{}' must use http or https",
            config.endpoint
        )));
    }

    if config.token_env.trim().is_empty() {
        return Err(ConfigError::Validation(
            "token-env cannot be empty".to_string(),
        ));
    }

    if config.search_query.trim().is_empty() {
        return Err(ConfigError::Validation(
            "search-query cannot be empty".to_string(),
        ));
    }

    if config.page_size < 1 || config.page_size > MAX_PAGE_SIZE {
        return Err(ConfigError::Validation(format!(
            "page-size must be between 1 and {}, got {}",
            MAX_PAGE_SIZE, config.page_size
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawl size and batching
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.target_count < 1 {
        return Err(ConfigError::Validation(format!(
            "target-count must be >= 1, got {}",
            config.target_count
        )));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch-size must be >= 1, got {}",
            config.batch_size
        )));
    }

    Ok(())
}

/// Validates the rate-limit pause policy
fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    // Never more than one hourly window
    if config.safety_margin_secs > 3600 {
        return Err(ConfigError::Validation(format!(
            "safety-margin-secs must be <= 3600, got {}",
            config.safety_margin_secs
        )));
    }

    Ok(())
}

/// Validates back-off settings
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.base_delay_secs > config.max_delay_secs {
        return Err(ConfigError::Validation(format!(
            "base-delay-secs ({}) cannot exceed max-delay-secs ({})",
            config.base_delay_secs, config.max_delay_secs
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.export_path.is_empty() {
        return Err(ConfigError::Validation(
            "export-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
