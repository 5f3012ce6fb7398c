use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use linedesk_sdk::LineId;
use thiserror::Error;
use url::Url;

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:5000";
pub const DEFAULT_PUSH_PATH: &str = "/ws";
pub const DEFAULT_LINE_COUNT: u32 = 8;
pub const DEFAULT_CHANNEL_COUNT: u32 = 8;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid server url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid value for {var}: '{value}'")]
    InvalidValue { var: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: Url,
    pub push_path: String,
    pub line_count: u32,
    /// Highest selectable audio channel; 0 means "unrouted".
    pub channel_count: u32,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub tick_interval: Duration,
    pub request_timeout: Duration,
    pub recents_file: Option<PathBuf>,
}

impl ClientConfig {
    /// Settings for `server_url` with every other knob at its default.
    pub fn for_server(server_url: Url) -> Self {
        Self {
            server_url,
            push_path: DEFAULT_PUSH_PATH.to_string(),
            line_count: DEFAULT_LINE_COUNT,
            channel_count: DEFAULT_CHANNEL_COUNT,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: Duration::from_millis(1_000),
            tick_interval: Duration::from_millis(1_000),
            request_timeout: linedesk_sdk::DEFAULT_REQUEST_TIMEOUT,
            recents_file: None,
        }
    }

    pub fn new(server_url: &str) -> Result<Self, ConfigError> {
        Ok(Self::for_server(parse_server_url(server_url)?))
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let server = read("LINEDESK_SERVER");
        let defaults = Self::new(server.as_deref().unwrap_or(DEFAULT_SERVER))?;
        let config = Self {
            server_url: defaults.server_url,
            push_path: read("LINEDESK_PUSH_PATH").unwrap_or(defaults.push_path),
            line_count: parse_or("LINEDESK_LINES", read("LINEDESK_LINES"), defaults.line_count)?,
            channel_count: parse_or(
                "LINEDESK_CHANNELS",
                read("LINEDESK_CHANNELS"),
                defaults.channel_count,
            )?,
            max_reconnect_attempts: parse_or(
                "LINEDESK_MAX_RECONNECTS",
                read("LINEDESK_MAX_RECONNECTS"),
                defaults.max_reconnect_attempts,
            )?,
            reconnect_delay: Duration::from_millis(parse_or(
                "LINEDESK_RECONNECT_DELAY_MS",
                read("LINEDESK_RECONNECT_DELAY_MS"),
                1_000,
            )?),
            tick_interval: Duration::from_millis(parse_or(
                "LINEDESK_TICK_MS",
                read("LINEDESK_TICK_MS"),
                1_000,
            )?),
            request_timeout: Duration::from_millis(parse_or(
                "LINEDESK_REQUEST_TIMEOUT_MS",
                read("LINEDESK_REQUEST_TIMEOUT_MS"),
                10_000,
            )?),
            recents_file: read("LINEDESK_RECENTS_FILE").map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.line_count == 0 {
            return Err(ConfigError::Zero("line count"));
        }
        if self.max_reconnect_attempts == 0 {
            return Err(ConfigError::Zero("max reconnect attempts"));
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::Zero("tick interval"));
        }
        Ok(())
    }

    /// Lines this client follows, `1..=line_count`.
    pub fn line_ids(&self) -> Vec<LineId> {
        (1..=self.line_count).collect()
    }
}

pub fn parse_server_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|err| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

fn parse_or<T: FromStr>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_follow_observed_panel() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.line_ids(), (1..=8).collect::<Vec<_>>());
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.server_url.as_str(), "http://127.0.0.1:5000/");
    }

    #[test]
    fn server_only_config_keeps_other_defaults() {
        let url = parse_server_url("http://10.1.2.3:8080").unwrap();
        let config = ClientConfig::for_server(url.clone());
        assert_eq!(config.server_url, url);
        assert_eq!(config.push_path, DEFAULT_PUSH_PATH);
        assert_eq!(config.channel_count, DEFAULT_CHANNEL_COUNT);
        assert!(config.validate().is_ok());
        assert!(matches!(
            ClientConfig::new("not a url"),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn environment_overrides_apply() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("LINEDESK_SERVER", "https://phones.studio.local"),
            ("LINEDESK_LINES", "4"),
            ("LINEDESK_MAX_RECONNECTS", "3"),
            ("LINEDESK_RECONNECT_DELAY_MS", "250"),
            ("LINEDESK_RECENTS_FILE", "/tmp/recents.json"),
        ]))
        .unwrap();
        assert_eq!(config.server_url.host_str(), Some("phones.studio.local"));
        assert_eq!(config.line_count, 4);
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.reconnect_delay, Duration::from_millis(250));
        assert_eq!(config.recents_file, Some(PathBuf::from("/tmp/recents.json")));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("LINEDESK_LINES", "eight")])),
            Err(ConfigError::InvalidValue { var: "LINEDESK_LINES", .. })
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("LINEDESK_LINES", "0")])),
            Err(ConfigError::Zero(_))
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("LINEDESK_SERVER", "ftp://x")])),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }
}
