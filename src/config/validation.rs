use crate::config::types::{
    BrowserConfig, Config, EngineConfig, IdentityConfig, OutputConfig, QueryEntry,
    TransportPreference,
};
use crate::identity::profile_by_tag;
use crate::ConfigError;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_engine_config(&config.engine)?;
    validate_identity_config(&config.identity)?;
    validate_browser_config(&config.browser, &config.engine)?;
    validate_output_config(&config.output)?;
    validate_queries(&config.all_queries())?;
    Ok(())
}

/// Largest accepted delay or backoff setting, in seconds (one day)
const MAX_DELAY_SECS: f64 = 86_400.0;

/// Validates fetch engine settings
fn validate_engine_config(config: &EngineConfig) -> Result<(), ConfigError> {
    validate_seconds(config.min_delay, "min-delay")?;
    validate_seconds(config.max_delay, "max-delay")?;
    validate_seconds(config.backoff_base, "backoff-base")?;
    validate_seconds(config.backoff_cap, "backoff-cap")?;
    validate_seconds(config.backoff_jitter, "backoff-jitter")?;

    if config.min_delay > config.max_delay {
        return Err(ConfigError::Validation(format!(
            "min-delay ({}) must not exceed max-delay ({})",
            config.min_delay, config.max_delay
        )));
    }

    if config.timeout < 1 {
        return Err(ConfigError::Validation(
            "timeout must be at least 1 second".to_string(),
        ));
    }

    if config.captcha_poll_interval < 1 {
        return Err(ConfigError::Validation(
            "captcha-poll-interval must be at least 1 second".to_string(),
        ));
    }

    if config.backoff_base <= 0.0 {
        return Err(ConfigError::Validation(
            "backoff-base must be positive".to_string(),
        ));
    }

    if config.backoff_cap < config.backoff_base {
        return Err(ConfigError::Validation(format!(
            "backoff-cap ({}) must be >= backoff-base ({})",
            config.backoff_cap, config.backoff_base
        )));
    }

    if config.max_concurrent_queries < 1 || config.max_concurrent_queries > 64 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-queries must be between 1 and 64, got {}",
            config.max_concurrent_queries
        )));
    }

    Ok(())
}

/// A finite number of seconds in `0..=MAX_DELAY_SECS`
///
/// NaN fails every comparison, so finiteness is checked explicitly.
fn validate_seconds(value: f64, name: &str) -> Result<(), ConfigError> {
    if !value.is_finite() || !(0.0..=MAX_DELAY_SECS).contains(&value) {
        return Err(ConfigError::Validation(format!(
            "{} must be between 0 and {} seconds, got {}",
            name, MAX_DELAY_SECS, value
        )));
    }
    Ok(())
}

fn validate_identity_config(config: &IdentityConfig) -> Result<(), ConfigError> {
    if let Some(proxy) = &config.proxy {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
    }

    if let Some(tag) = &config.fingerprint_profile {
        if profile_by_tag(tag).is_none() {
            return Err(ConfigError::Validation(format!(
                "Unknown fingerprint-profile '{}'",
                tag
            )));
        }
    }

    Ok(())
}

fn validate_browser_config(
    config: &BrowserConfig,
    engine: &EngineConfig,
) -> Result<(), ConfigError> {
    if engine.transport_preference == TransportPreference::BrowserFirst && !config.enabled {
        return Err(ConfigError::Validation(
            "transport-preference = \"browser-first\" requires [browser] enabled = true"
                .to_string(),
        ));
    }

    if config.enabled {
        validate_http_url(&config.debugging_url, "debugging-url")?;
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

/// Validates queries after `[search]` expansion
fn validate_queries(queries: &[QueryEntry]) -> Result<(), ConfigError> {
    if queries.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[query]] or a [search] section is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for query in queries {
        if query.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "query id cannot be empty".to_string(),
            ));
        }

        if !seen.insert(query.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate query id '{}'",
                query.id
            )));
        }

        validate_http_url(&query.url, &format!("query '{}'", query.id))?;

        let selectors = query
            .result_selector
            .iter()
            .chain(query.title_selector.iter())
            .chain(query.next_selectors.iter());
        for selector in selectors {
            validate_selector(selector)?;
        }
    }

    Ok(())
}

fn validate_http_url(raw: &str, what: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} URL '{}': {}", what, raw, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} URL '{}' must use http or https",
            what, raw
        )));
    }

    Ok(())
}

fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}
