use crate::config::types::{
    Config, CrawlerConfig, ForumConfig, KeywordConfig, OutputConfig, PipelineConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_forum_config(&config.forum)?;
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_keywords(&config.keywords)?;
    validate_pipeline_config(&config.pipeline)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates forum location settings
fn validate_forum_config(config: &ForumConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "base-url must use HTTP or HTTPS, got '{}'",
            url.scheme()
        )));
    }

    if config.forum_link_marker.is_empty() || config.topic_link_marker.is_empty() {
        return Err(ConfigError::Validation(
            "forum-link-marker and topic-link-marker cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_requests < 1 || config.max_concurrent_requests > 64 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-requests must be between 1 and 64, got {}",
            config.max_concurrent_requests
        )));
    }

    if config.autothrottle_max_delay < config.autothrottle_start_delay {
        return Err(ConfigError::Validation(format!(
            "autothrottle-max-delay ({}ms) must be >= autothrottle-start-delay ({}ms)",
            config.autothrottle_max_delay, config.autothrottle_start_delay
        )));
    }

    if !(config.autothrottle_target_concurrency > 0.0) {
        return Err(ConfigError::Validation(format!(
            "autothrottle-target-concurrency must be positive, got {}",
            config.autothrottle_target_concurrency
        )));
    }

    if config.request_timeout == 0 {
        return Err(ConfigError::Validation(
            "request-timeout must be at least 1 second".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates the keyword sets
///
/// A keyword listed as both excluded and included could never match, since
/// exclusion wins.
fn validate_keywords(config: &KeywordConfig) -> Result<(), ConfigError> {
    if config
        .excluded
        .iter()
        .chain(config.included.iter())
        .any(|k| k.trim().is_empty())
    {
        return Err(ConfigError::Validation(
            "keywords cannot be empty strings".to_string(),
        ));
    }

    let excluded: HashSet<String> = config.excluded.iter().map(|k| k.to_lowercase()).collect();
    if let Some(overlap) = config
        .included
        .iter()
        .find(|k| excluded.contains(&k.to_lowercase()))
    {
        return Err(ConfigError::Validation(format!(
            "keyword '{}' is both excluded and included",
            overlap
        )));
    }

    Ok(())
}

/// Validates pipeline configuration
fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.target_language.trim().is_empty() {
        return Err(ConfigError::Validation(
            "target-language cannot be empty".to_string(),
        ));
    }

    if config.workers < 1 || config.workers > 256 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 256, got {}",
            config.workers
        )));
    }

    if config.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "max-tokens must be at least 1".to_string(),
        ));
    }

    if let Some(url) = &config.inference_url {
        Url::parse(url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid inference-url: {}", e)))?;
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

    if matches!(config.feed_path.as_deref(), Some("")) {
        return Err(ConfigError::Validation(
            "feed-path cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    };

    if !valid {
        return Err(ConfigError::Validation(format!(
            "Invalid contact-email: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords(excluded: &[&str], included: &[&str]) -> KeywordConfig {
        KeywordConfig {
            excluded: excluded.iter().map(|s| s.to_string()).collect(),
            included: included.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_disjoint_keywords_pass() {
        assert!(validate_keywords(&keywords(&["regulamin"], &["sportowcy"])).is_ok());
    }

    #[test]
    fn test_overlapping_keywords_rejected() {
        let result = validate_keywords(&keywords(&["Regulamin"], &["regulamin"]));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_blank_keyword_rejected() {
        assert!(validate_keywords(&keywords(&["  "], &[])).is_err());
    }

    #[test]
    fn test_max_delay_below_start_delay_rejected() {
        let config = CrawlerConfig {
            autothrottle_start_delay: 5000,
            autothrottle_max_delay: 1000,
            ..CrawlerConfig::default()
        };
        assert!(validate_crawler_config(&config).is_err());
    }

    #[test]
    fn test_invalid_inference_url_rejected() {
        let config = PipelineConfig {
            inference_url: Some("not a url".to_string()),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            validate_pipeline_config(&config),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_email_validation() {
        assert!(validate_email("admin@example.com").is_ok());
        assert!(validate_email("admin").is_err());
        assert!(validate_email("@example.com").is_err());
    }
}
