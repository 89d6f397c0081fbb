//! Deployment configuration
//!
//! Read from the environment (and `.env` when present), with local
//! development defaults.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Where recommendation cache lookups go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// The backend's `/recommend/cache` endpoint
    #[default]
    Http,
    /// Process-local cache filled by this process's own runs
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    /// Backend base URL
    pub api_url: String,
    /// Access key of the place-lookup widget, handed to the front end as-is
    pub places_api_key: String,
    /// Look-back span in years, fixed per pipeline instance
    pub past_span: u32,
    pub request_timeout: Duration,
    pub server_port: u16,
    pub status_buffer: usize,
    pub cache: CacheMode,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            places_api_key: String::new(),
            past_span: 5,
            request_timeout: Duration::from_secs(60),
            server_port: 3000,
            status_buffer: 1024,
            cache: CacheMode::Http,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup, falling back to defaults for unset keys
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            api_url: lookup("RECOMMENDER_API_URL").unwrap_or(defaults.api_url),
            places_api_key: lookup("PLACES_API_KEY").unwrap_or(defaults.places_api_key),
            past_span: parse_or(&lookup, "PAST_SPAN", defaults.past_span)?,
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            server_port: parse_or(&lookup, "SERVER_PORT", defaults.server_port)?,
            status_buffer: parse_or(&lookup, "STATUS_BUFFER", defaults.status_buffer)?,
            cache: match lookup("CACHE").as_deref().map(str::trim) {
                None | Some("") => defaults.cache,
                Some(raw) if raw.eq_ignore_ascii_case("http") => CacheMode::Http,
                Some(raw) if raw.eq_ignore_ascii_case("memory") => CacheMode::Memory,
                Some(raw) => bail!("Invalid value for CACHE: '{}' (expected 'http' or 'memory')", raw),
            },
        };

        if config.past_span == 0 {
            bail!("PAST_SPAN must be at least 1");
        }
        Ok(config)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("RECOMMENDER_API_URL", "https://weather.example.com"),
            ("PAST_SPAN", "10"),
            ("REQUEST_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "https://weather.example.com");
        assert_eq!(config.past_span, 10);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[("SERVER_PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("SERVER_PORT"));
        assert!(AppConfig::from_lookup(lookup_from(&[("PAST_SPAN", "0")])).is_err());
    }

    #[test]
    fn test_cache_mode_switch() {
        let config = AppConfig::from_lookup(lookup_from(&[("CACHE", "Memory")])).unwrap();
        assert_eq!(config.cache, CacheMode::Memory);
        let config = AppConfig::from_lookup(lookup_from(&[("CACHE", "http")])).unwrap();
        assert_eq!(config.cache, CacheMode::Http);

        let err = AppConfig::from_lookup(lookup_from(&[("CACHE", "redis")])).unwrap_err();
        assert!(err.to_string().contains("CACHE"));
    }
}
