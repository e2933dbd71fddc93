use crate::config::types::{Config, CrawlerConfig, OutputConfig, SessionConfig, TargetConfig, UserAgentConfig};
use crate::ConfigError;
use regex::Regex;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_session_config(&config.session)?;
    validate_output_config(&config.output)?;
    validate_targets(&config.targets)?;
    Ok(())
}

/// Validates worker pool and pacing configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 32 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 32, got {}",
            config.workers
        )));
    }

    if config.retries > 10 {
        return Err(ConfigError::Validation(format!(
            "retries must be <= 10, got {}",
            config.retries
        )));
    }

    if config.fetch_timeout < 1 {
        return Err(ConfigError::Validation(
            "fetch_timeout must be >= 1 second".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.server.is_empty() || config.locale.is_empty() {
        return Err(ConfigError::Validation(
            "session server and locale cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.thumbs_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "thumbs_dir cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates target entries
fn validate_targets(targets: &[TargetConfig]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();

    for target in targets {
        if target.name.is_empty() {
            return Err(ConfigError::Validation(
                "target name cannot be empty".to_string(),
            ));
        }

        if !names.insert(target.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate target name '{}'",
                target.name
            )));
        }

        let url = Url::parse(&target.listing_url).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "Invalid listing URL '{}': {}",
                target.listing_url, e
            ))
        })?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigError::InvalidUrl(format!(
                "Listing URL '{}' must use http or https",
                target.listing_url
            )));
        }

        Regex::new(&target.detail_pattern).map_err(|e| {
            ConfigError::InvalidPattern(format!("'{}': {}", target.detail_pattern, e))
        })?;

        if target.events_path.as_os_str().is_empty() || target.entities_path.as_os_str().is_empty()
        {
            return Err(ConfigError::Validation(format!(
                "target '{}' needs both events_path and entities_path",
                target.name
            )));
        }

        if target.events_path == target.entities_path {
            return Err(ConfigError::Validation(format!(
                "target '{}' cannot write events and entities to the same file",
                target.name
            )));
        }

        if target.entity_key.is_empty() {
            return Err(ConfigError::Validation(format!(
                "target '{}' has an empty entity_key",
                target.name
            )));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| ConfigError::Validation(format!("Invalid email format: '{}'", email)))?;

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
