//! Editable model of the multi-account SIP configuration.

use linedesk_sdk::{LineId, SipConfig, SipLineConfig};
use serde_json::{Map, Value};
use thiserror::Error;

const DEFAULT_SIP_PORT: u16 = 5060;
const DEFAULT_TRANSPORT: &str = "UDP";
const MULTI_ACCOUNT_MODE: &str = "multi_account";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("please enter a SIP server")]
    MissingServer,
    #[error("line {0} is not part of this form")]
    UnknownLine(LineId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineSummary {
    Configured(String),
    NotConfigured,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineAccountFields {
    pub username: String,
    pub password: String,
    pub caller_id_name: String,
    pub caller_id_number: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SipSettingsForm {
    pub sip_server: String,
    pub sip_port: u16,
    pub transport: String,
    lines: Vec<LineAccountFields>,
    extra: Map<String, Value>,
}

impl SipSettingsForm {
    /// Blank form for lines `1..=line_count`.
    pub fn new(line_count: u32) -> Self {
        Self {
            sip_server: String::new(),
            sip_port: DEFAULT_SIP_PORT,
            transport: DEFAULT_TRANSPORT.to_string(),
            lines: vec![LineAccountFields::default(); line_count as usize],
            extra: Map::new(),
        }
    }

    pub fn from_config(config: &SipConfig, line_count: u32) -> Self {
        let mut form = Self::new(line_count);
        form.sip_server = config.sip_server.clone();
        form.sip_port = config.sip_port;
        form.transport = config.transport.clone();
        form.extra = config.extra.clone();
        for line in &config.lines {
            if let Some(fields) = form.line_mut(line.line_id) {
                *fields = LineAccountFields {
                    username: line.username.clone(),
                    password: line.password.clone(),
                    caller_id_name: line.caller_id_name.clone(),
                    caller_id_number: line.caller_id_number.clone(),
                };
            }
        }
        form
    }

    pub fn line_count(&self) -> u32 {
        self.lines.len() as u32
    }

    pub fn line(&self, line_id: LineId) -> Option<&LineAccountFields> {
        let index = usize::try_from(line_id.checked_sub(1)?).ok()?;
        self.lines.get(index)
    }

    pub fn line_mut(&mut self, line_id: LineId) -> Option<&mut LineAccountFields> {
        let index = usize::try_from(line_id.checked_sub(1)?).ok()?;
        self.lines.get_mut(index)
    }

    pub fn set_line(
        &mut self,
        line_id: LineId,
        fields: LineAccountFields,
    ) -> Result<(), SettingsError> {
        let slot = self
            .line_mut(line_id)
            .ok_or(SettingsError::UnknownLine(line_id))?;
        *slot = fields;
        Ok(())
    }

    pub fn line_summary(&self, line_id: LineId) -> LineSummary {
        match self.line(line_id) {
            Some(fields) if !fields.username.trim().is_empty() => {
                LineSummary::Configured(fields.username.clone())
            }
            _ => LineSummary::NotConfigured,
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.sip_server.trim().is_empty() {
            return Err(SettingsError::MissingServer);
        }
        Ok(())
    }

    /// Payload for `POST /api/config/sip`, one entry per line.
    pub fn to_config(&self) -> SipConfig {
        let transport = match self.transport.trim() {
            "" => DEFAULT_TRANSPORT.to_string(),
            other => other.to_string(),
        };
        let lines = (1..=self.line_count())
            .zip(&self.lines)
            .map(|(line_id, fields)| SipLineConfig {
                line_id,
                username: fields.username.clone(),
                password: fields.password.clone(),
                caller_id_name: if fields.caller_id_name.trim().is_empty() {
                    format!("Line {line_id}")
                } else {
                    fields.caller_id_name.clone()
                },
                caller_id_number: fields.caller_id_number.clone(),
            })
            .collect();
        SipConfig {
            mode: MULTI_ACCOUNT_MODE.to_string(),
            sip_server: self.sip_server.trim().to_string(),
            sip_port: if self.sip_port == 0 {
                DEFAULT_SIP_PORT
            } else {
                self.sip_port
            },
            transport,
            num_lines: self.line_count(),
            lines,
            extra: self.extra.clone(),
        }
    }
}
