//! Asynchronous client for the line server's HTTP API.
//!
//! Consumed by the `linedesk` console and its session runtime. Every call is a
//! single request: nothing here retries, a failed action is re-issued by the
//! operator.

pub mod memory;
pub mod model;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub use memory::{ApiCall, InMemoryLineApi};
pub use model::{
    ChannelAck, DialAck, LineId, LineState, LineUpdate, NetworkConfig, NetworkMode,
    RegistrationInfo, SaveAck, SipConfig, SipLineConfig, SystemStatus, ToneAck,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server rejected request ({status}): {message}")]
    Server { status: StatusCode, message: String },
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus { status: StatusCode, body: String },
    #[error("unable to decode response: {0}")]
    Decode(String),
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Message suitable for showing to the operator.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Server { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Line, audio and system operations the session and dispatcher depend on.
#[async_trait]
pub trait LineApi: Send + Sync {
    async fn list_lines(&self) -> Result<Vec<LineUpdate>, ApiError>;

    async fn dial(&self, line_id: LineId, number: &str) -> Result<DialAck, ApiError>;

    async fn hangup(&self, line_id: LineId) -> Result<(), ApiError>;

    async fn set_channel(&self, line_id: LineId, channel: u32) -> Result<ChannelAck, ApiError>;

    async fn start_test_tone(&self, channel: u32) -> Result<ToneAck, ApiError>;

    async fn stop_test_tone(&self) -> Result<(), ApiError>;

    async fn sip_config(&self) -> Result<SipConfig, ApiError>;

    async fn save_sip_config(&self, config: &SipConfig) -> Result<SaveAck, ApiError>;

    async fn network_config(&self) -> Result<NetworkConfig, ApiError>;

    async fn save_network_config(&self, config: &NetworkConfig) -> Result<(), ApiError>;

    async fn system_status(&self) -> Result<SystemStatus, ApiError>;

    async fn restart_service(&self) -> Result<(), ApiError>;

    async fn reboot(&self) -> Result<(), ApiError>;
}

#[derive(Clone, Debug)]
pub struct LinedeskClient {
    http: Client,
    base_url: Url,
}

impl LinedeskClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let mut base_url =
            Url::parse(base_url).map_err(|err| ApiError::InvalidUrl(format!("{base_url}: {err}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn get_line(&self, line_id: LineId) -> Result<LineUpdate, ApiError> {
        let value: Value = self
            .request(Method::GET, &format!("api/lines/{line_id}"), None)
            .await?;
        LineUpdate::from_value(&value)
            .ok_or_else(|| ApiError::Decode(format!("line payload without line_id: {value}")))
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| ApiError::InvalidUrl(format!("{path}: {err}")))
    }

    async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!(target: "linedesk::api", method = %method, url = %url, "sending request");
        let mut builder = self.http.request(method, url);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let res = builder.send().await?;
        read_response(res).await
    }
}

async fn read_response<T>(res: Response) -> Result<T, ApiError>
where
    T: DeserializeOwned,
{
    let status = res.status();
    let bytes = res.bytes().await?;
    let value = if bytes.iter().all(u8::is_ascii_whitespace) {
        Some(Value::Null)
    } else {
        serde_json::from_slice::<Value>(&bytes).ok()
    };

    if let Some(message) = value.as_ref().and_then(error_message) {
        return Err(ApiError::Server { status, message });
    }
    if !status.is_success() {
        return Err(ApiError::UnexpectedStatus {
            status,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        });
    }
    match value {
        Some(value) => serde_json::from_value(value).map_err(|err| ApiError::Decode(err.to_string())),
        None => Err(ApiError::Decode(format!(
            "response is not json: {}",
            String::from_utf8_lossy(&bytes)
        ))),
    }
}

fn error_message(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::Null => None,
        Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl LineApi for LinedeskClient {
    async fn list_lines(&self) -> Result<Vec<LineUpdate>, ApiError> {
        let values: Vec<Value> = self.request(Method::GET, "api/lines", None).await?;
        Ok(values
            .iter()
            .filter_map(|value| {
                let parsed = LineUpdate::from_value(value);
                if parsed.is_none() {
                    warn!(target: "linedesk::api", payload = %value, "skipping line entry without line_id");
                }
                parsed
            })
            .collect())
    }

    async fn dial(&self, line_id: LineId, number: &str) -> Result<DialAck, ApiError> {
        self.request(
            Method::POST,
            &format!("api/lines/{line_id}/dial"),
            Some(json!({ "phone_number": number })),
        )
        .await
    }

    async fn hangup(&self, line_id: LineId) -> Result<(), ApiError> {
        let _: Value = self
            .request(Method::POST, &format!("api/lines/{line_id}/hangup"), None)
            .await?;
        Ok(())
    }

    async fn set_channel(&self, line_id: LineId, channel: u32) -> Result<ChannelAck, ApiError> {
        self.request(
            Method::POST,
            &format!("api/lines/{line_id}/channel"),
            Some(json!({ "channel": channel })),
        )
        .await
    }

    async fn start_test_tone(&self, channel: u32) -> Result<ToneAck, ApiError> {
        self.request(
            Method::POST,
            "api/audio/test",
            Some(json!({ "channel": channel })),
        )
        .await
    }

    async fn stop_test_tone(&self) -> Result<(), ApiError> {
        let _: Value = self.request(Method::DELETE, "api/audio/test", None).await?;
        Ok(())
    }

    async fn sip_config(&self) -> Result<SipConfig, ApiError> {
        self.request(Method::GET, "api/config/sip", None).await
    }

    async fn save_sip_config(&self, config: &SipConfig) -> Result<SaveAck, ApiError> {
        let body = serde_json::to_value(config).map_err(|err| ApiError::Decode(err.to_string()))?;
        self.request(Method::POST, "api/config/sip", Some(body)).await
    }

    async fn network_config(&self) -> Result<NetworkConfig, ApiError> {
        self.request(Method::GET, "api/config/network", None).await
    }

    async fn save_network_config(&self, config: &NetworkConfig) -> Result<(), ApiError> {
        let body = serde_json::to_value(config).map_err(|err| ApiError::Decode(err.to_string()))?;
        let _: Value = self
            .request(Method::POST, "api/config/network", Some(body))
            .await?;
        Ok(())
    }

    async fn system_status(&self) -> Result<SystemStatus, ApiError> {
        self.request(Method::GET, "api/system/status", None).await
    }

    async fn restart_service(&self) -> Result<(), ApiError> {
        let _: Value = self
            .request(Method::POST, "api/system/restart", None)
            .await?;
        Ok(())
    }

    async fn reboot(&self) -> Result<(), ApiError> {
        let _: Value = self.request(Method::POST, "api/system/reboot", None).await?;
        Ok(())
    }
}
