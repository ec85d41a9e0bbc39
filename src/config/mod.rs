//! Configuration module for Stargaze
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section and key is optional; missing values fall back to defaults.
//!
//! # Example
//!
//! ```no_run
//! use stargaze::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("stargaze.toml")).unwrap();
//! println!("Crawler will collect {} repositories", config.crawler.target_count);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, GithubConfig, OutputConfig, RateLimitConfig, RetryConfig};

// Re-export parser functions
pub use parser::{
    apply_env_overrides, compute_config_hash, load_config, load_config_with_hash, parse_config,
    resolve_token, BATCH_SIZE_ENV, TARGET_COUNT_ENV,
};
pub use validation::{validate, MAX_PAGE_SIZE};
