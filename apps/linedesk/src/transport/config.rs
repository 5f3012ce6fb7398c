use std::time::Duration;

use linedesk_sdk::LineId;
use url::Url;

use super::TransportError;
use crate::config::ClientConfig;

/// Settings for the push channel.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// HTTP base URL of the line server.
    pub server_url: Url,
    /// Path of the push endpoint, appended to the base URL path.
    pub path: String,
    /// Lines announced in the subscription sent on every connect.
    pub lines: Vec<LineId>,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
}

impl PushConfig {
    pub fn from_client_config(config: &ClientConfig) -> Self {
        Self {
            server_url: config.server_url.clone(),
            path: config.push_path.clone(),
            lines: config.line_ids(),
            max_reconnect_attempts: config.max_reconnect_attempts,
            reconnect_delay: config.reconnect_delay,
            connect_timeout: config.request_timeout,
        }
    }

    /// Builds the socket URL: `http` becomes `ws`, `https` becomes `wss`.
    pub fn build_url(&self) -> Result<Url, TransportError> {
        let mut url = self.server_url.clone();
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(TransportError::InvalidUrl(format!(
                    "unsupported scheme '{other}' in {}",
                    self.server_url
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| TransportError::InvalidUrl(self.server_url.to_string()))?;

        // Normalize localhost to avoid IPv6 resolution differences.
        if url.host_str() == Some("localhost") {
            url.set_host(Some("127.0.0.1"))
                .map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
        }

        let base = url.path().trim_end_matches('/').to_string();
        let suffix = self.path.trim_start_matches('/');
        url.set_path(&format!("{base}/{suffix}"));
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }
}
