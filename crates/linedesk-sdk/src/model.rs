//! Wire shapes exchanged with the line server.
//!
//! Line payloads arrive both from `GET /api/lines` and from `line_status`
//! pushes. They are parsed leniently: a field with an unexpected JSON type is
//! dropped on its own instead of rejecting the whole update, so one odd field
//! coming from the server never stalls the client.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

pub type LineId = u32;

/// Call state of a line as reported by the server.
///
/// Only the four states the client reacts to are modelled; every other label
/// is carried through verbatim in [`LineState::Other`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LineState {
    #[default]
    Idle,
    Dialing,
    Ringing,
    Connected,
    Other(String),
}

impl LineState {
    pub fn as_str(&self) -> &str {
        match self {
            LineState::Idle => "idle",
            LineState::Dialing => "dialing",
            LineState::Ringing => "ringing",
            LineState::Connected => "connected",
            LineState::Other(label) => label.as_str(),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, LineState::Idle)
    }
}

impl From<&str> for LineState {
    fn from(value: &str) -> Self {
        match value {
            "idle" => LineState::Idle,
            "dialing" => LineState::Dialing,
            "ringing" => LineState::Ringing,
            "connected" => LineState::Connected,
            other => LineState::Other(other.to_string()),
        }
    }
}

impl From<String> for LineState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "idle" | "dialing" | "ringing" | "connected" => LineState::from(value.as_str()),
            _ => LineState::Other(value),
        }
    }
}

impl From<LineState> for String {
    fn from(value: LineState) -> Self {
        match value {
            LineState::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for LineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial line record. Only `line_id` is guaranteed; absent fields mean
/// "unchanged" when the update is merged into a held record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LineUpdate {
    pub line_id: LineId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<LineState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
    #[serde(rename = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_channel: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sip_registered: Option<bool>,
}

impl LineUpdate {
    pub fn new(line_id: LineId) -> Self {
        Self {
            line_id,
            ..Self::default()
        }
    }

    pub fn with_state(mut self, state: impl Into<LineState>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn with_phone_number(mut self, number: impl Into<String>) -> Self {
        self.phone_number = Some(number.into());
        self
    }

    pub fn with_duration(mut self, seconds: u64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn with_audio_channel(mut self, channel: u32) -> Self {
        self.audio_channel = Some(channel);
        self
    }

    /// Lenient parse of a line payload. Returns `None` only when the payload
    /// cannot be addressed to a line.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let line_id = match map.get("line_id").and_then(as_u64) {
            Some(id) => LineId::try_from(id).ok()?,
            None => {
                debug!(target: "linedesk::model", payload = %value, "line payload without usable line_id");
                return None;
            }
        };

        let duration_key = if map.contains_key("duration") {
            "duration"
        } else {
            "duration_seconds"
        };

        Some(Self {
            line_id,
            state: state_field(map),
            phone_number: string_field(map, "phone_number"),
            caller_id: string_field(map, "caller_id"),
            duration_seconds: u64_field(map, duration_key),
            audio_channel: u64_field(map, "audio_channel").and_then(|v| u32::try_from(v).ok()),
            sip_registered: bool_field(map, "sip_registered"),
        })
    }
}

impl<'de> Deserialize<'de> for LineUpdate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        LineUpdate::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom("line payload is missing a valid line_id"))
    }
}

/// SIP registration health pushed on `sip_registration`.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationInfo {
    pub account: Option<String>,
    pub line_id: Option<LineId>,
    pub registered: Option<bool>,
    pub status: Option<String>,
    pub raw: Value,
}

impl RegistrationInfo {
    pub fn from_value(value: &Value) -> Self {
        let empty = Map::new();
        let map = value.as_object().unwrap_or(&empty);
        Self {
            account: string_field(map, "account").or_else(|| string_field(map, "username")),
            line_id: u64_field(map, "line_id").and_then(|v| LineId::try_from(v).ok()),
            registered: bool_field(map, "registered").or_else(|| bool_field(map, "sip_registered")),
            status: string_field(map, "status"),
            raw: value.clone(),
        }
    }

    /// Key used to keep the latest info per account.
    pub fn key(&self) -> String {
        match (&self.account, self.line_id) {
            (Some(account), _) => account.clone(),
            (None, Some(line_id)) => format!("line-{line_id}"),
            (None, None) => "default".to_string(),
        }
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn u64_field(map: &Map<String, Value>, key: &str) -> Option<u64> {
    match map.get(key) {
        None | Some(Value::Null) => None,
        Some(value) => {
            let parsed = as_u64(value);
            if parsed.is_none() {
                debug!(target: "linedesk::model", field = key, value = %value, "dropping non-integer field");
            }
            parsed
        }
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(other) => {
            debug!(target: "linedesk::model", field = key, value = %other, "dropping non-string field");
            None
        }
    }
}

fn bool_field(map: &Map<String, Value>, key: &str) -> Option<bool> {
    match map.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::Bool(flag)) => Some(*flag),
        Some(other) => {
            debug!(target: "linedesk::model", field = key, value = %other, "dropping non-boolean field");
            None
        }
    }
}

fn state_field(map: &Map<String, Value>) -> Option<LineState> {
    match map.get("state") {
        None | Some(Value::Null) => None,
        Some(Value::String(label)) => Some(LineState::from(label.clone())),
        Some(Value::Number(number)) => Some(LineState::Other(number.to_string())),
        Some(Value::Bool(flag)) => Some(LineState::Other(flag.to_string())),
        Some(other) => {
            debug!(target: "linedesk::model", value = %other, "dropping structured state field");
            None
        }
    }
}

fn default_mode() -> String {
    "multi_account".to_string()
}

fn default_sip_port() -> u16 {
    5060
}

fn default_transport() -> String {
    "UDP".to_string()
}

fn default_num_lines() -> u32 {
    8
}

/// Multi-account SIP configuration served by `/api/config/sip`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SipConfig {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub sip_server: String,
    #[serde(default = "default_sip_port")]
    pub sip_port: u16,
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default = "default_num_lines")]
    pub num_lines: u32,
    #[serde(default)]
    pub lines: Vec<SipLineConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for SipConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            sip_server: String::new(),
            sip_port: default_sip_port(),
            transport: default_transport(),
            num_lines: default_num_lines(),
            lines: Vec::new(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipLineConfig {
    pub line_id: LineId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub caller_id_name: String,
    #[serde(default)]
    pub caller_id_number: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    #[default]
    Dhcp,
    Static,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub mode: NetworkMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_mask: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_server: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SystemStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub sip_engine: Option<String>,
    #[serde(default)]
    pub audio_router: Option<String>,
    #[serde(default)]
    pub lines_registered: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DialAck {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChannelAck {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub channel: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ToneAck {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub channel: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SaveAck {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_state_is_kept_literally() {
        let state: LineState = serde_json::from_value(json!("on_hold")).unwrap();
        assert_eq!(state, LineState::Other("on_hold".into()));
        assert_eq!(state.as_str(), "on_hold");
        assert_eq!(serde_json::to_value(&state).unwrap(), json!("on_hold"));
    }

    #[test]
    fn parses_full_line_payload() {
        let update = LineUpdate::from_value(&json!({
            "line_id": 3,
            "state": "connected",
            "phone_number": "5551234",
            "caller_id": "5551234",
            "duration": 42,
            "audio_channel": 2,
            "sip_registered": true
        }))
        .expect("line update");
        assert_eq!(update.line_id, 3);
        assert_eq!(update.state, Some(LineState::Connected));
        assert_eq!(update.phone_number.as_deref(), Some("5551234"));
        assert_eq!(update.duration_seconds, Some(42));
        assert_eq!(update.audio_channel, Some(2));
        assert_eq!(update.sip_registered, Some(true));
    }

    #[test]
    fn channel_only_push_leaves_other_fields_absent() {
        let update = LineUpdate::from_value(&json!({"line_id": 5, "audio_channel": 4})).unwrap();
        assert_eq!(update.state, None);
        assert_eq!(update.phone_number, None);
        assert_eq!(update.audio_channel, Some(4));
    }

    #[test]
    fn mistyped_fields_are_dropped_individually() {
        let update = LineUpdate::from_value(&json!({
            "line_id": "2",
            "state": "ringing",
            "duration": "soon",
            "audio_channel": -1,
            "sip_registered": "yes"
        }))
        .unwrap();
        assert_eq!(update.line_id, 2);
        assert_eq!(update.state, Some(LineState::Ringing));
        assert_eq!(update.duration_seconds, None);
        assert_eq!(update.audio_channel, None);
        assert_eq!(update.sip_registered, None);
    }

    #[test]
    fn payload_without_line_id_is_rejected() {
        assert!(LineUpdate::from_value(&json!({"state": "idle"})).is_none());
        assert!(LineUpdate::from_value(&json!({"line_id": -4})).is_none());
        assert!(LineUpdate::from_value(&json!([1, 2])).is_none());
        assert!(serde_json::from_value::<LineUpdate>(json!({"state": "idle"})).is_err());
    }

    #[test]
    fn accepts_duration_seconds_alias() {
        let update =
            LineUpdate::from_value(&json!({"line_id": 1, "duration_seconds": 7.0})).unwrap();
        assert_eq!(update.duration_seconds, Some(7));
    }

    #[test]
    fn registration_key_prefers_account() {
        let info = RegistrationInfo::from_value(&json!({"account": "1001", "registered": true}));
        assert_eq!(info.key(), "1001");
        assert_eq!(info.registered, Some(true));

        let info = RegistrationInfo::from_value(&json!({"line_id": 4, "status": "failed"}));
        assert_eq!(info.key(), "line-4");
        assert_eq!(info.status.as_deref(), Some("failed"));
    }

    #[test]
    fn sip_config_defaults_and_extra_keys() {
        let config: SipConfig =
            serde_json::from_value(json!({"sip_server": "pbx.local", "codec": "pcmu"})).unwrap();
        assert_eq!(config.sip_port, 5060);
        assert_eq!(config.transport, "UDP");
        assert_eq!(config.mode, "multi_account");
        assert_eq!(config.extra.get("codec"), Some(&json!("pcmu")));
        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["codec"], "pcmu");
    }
}
