//! Push channel framing.
//!
//! Every frame is a JSON text message `{"event": <name>, "data": <payload>}`.
//! Socket.IO style arrays `[<name>, <payload>]` are accepted on the way in.

use linedesk_sdk::{LineId, LineUpdate, RegistrationInfo};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

pub const EVENT_SUBSCRIBE: &str = "subscribe";
pub const EVENT_LINE_STATUS: &str = "line_status";
pub const EVENT_SIP_REGISTRATION: &str = "sip_registration";
pub const EVENT_CONNECTED: &str = "connected";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("frame has no event name")]
    MissingEvent,
    #[error("line_status payload cannot be addressed to a line: {0}")]
    Unaddressed(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Inbound frames the client understands.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    LineStatus(LineUpdate),
    Registration(RegistrationInfo),
    Greeting(Value),
    Unknown(String),
}

pub fn subscribe_frame(lines: &[LineId]) -> Result<String, ProtocolError> {
    Envelope::new(EVENT_SUBSCRIBE, json!({ "lines": lines })).encode()
}

pub fn decode(text: &str) -> Result<ServerEvent, ProtocolError> {
    let envelope = match serde_json::from_str::<Value>(text)? {
        Value::Array(mut parts) if !parts.is_empty() => {
            let data = if parts.len() > 1 {
                parts.swap_remove(1)
            } else {
                Value::Null
            };
            match parts.swap_remove(0) {
                Value::String(event) => Envelope { event, data },
                _ => return Err(ProtocolError::MissingEvent),
            }
        }
        value @ Value::Object(_) => serde_json::from_value(value)?,
        _ => return Err(ProtocolError::MissingEvent),
    };

    match envelope.event.as_str() {
        EVENT_LINE_STATUS => LineUpdate::from_value(&envelope.data)
            .map(ServerEvent::LineStatus)
            .ok_or(ProtocolError::Unaddressed(envelope.data)),
        EVENT_SIP_REGISTRATION => Ok(ServerEvent::Registration(RegistrationInfo::from_value(
            &envelope.data,
        ))),
        EVENT_CONNECTED => Ok(ServerEvent::Greeting(envelope.data)),
        _ => Ok(ServerEvent::Unknown(envelope.event)),
    }
}
