use crate::config::types::{Config, CrawlerConfig, NotifyConfig, OutputConfig, SiteConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    validate_notify_config(&config.notify)?;
    Ok(())
}

/// Validates the target-site configuration
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::Validation(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if let Some(proxy) = &config.proxy {
        Url::parse(proxy)
            .map_err(|e| ConfigError::Validation(format!("Invalid proxy URL '{}': {}", proxy, e)))?;
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.worker_count < 1 || config.worker_count > 100 {
        return Err(ConfigError::Validation(format!(
            "worker-count must be between 1 and 100, got {}",
            config.worker_count
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.idle_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "idle-timeout-secs must be >= 1".to_string(),
        ));
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

    if let Some(dir) = &config.snapshot_dir {
        if dir.is_empty() {
            return Err(ConfigError::Validation(
                "snapshot-dir cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates notification configuration
fn validate_notify_config(config: &NotifyConfig) -> Result<(), ConfigError> {
    if let Some(webhook) = &config.webhook_url {
        Url::parse(webhook).map_err(|e| {
            ConfigError::Validation(format!("Invalid webhook-url '{}': {}", webhook, e))
        })?;
    }
    Ok(())
}
