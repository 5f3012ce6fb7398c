use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::Mutex;

use crate::model::{
    ChannelAck, DialAck, LineId, LineUpdate, NetworkConfig, SaveAck, SipConfig, SystemStatus,
    ToneAck,
};
use crate::{ApiError, LineApi};

/// A request observed by [`InMemoryLineApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    ListLines,
    Dial { line_id: LineId, number: String },
    Hangup { line_id: LineId },
    SetChannel { line_id: LineId, channel: u32 },
    StartTestTone { channel: u32 },
    StopTestTone,
    SipConfig,
    SaveSipConfig(SipConfig),
    NetworkConfig,
    SaveNetworkConfig(NetworkConfig),
    SystemStatus,
    RestartService,
    Reboot,
}

impl ApiCall {
    fn operation(&self) -> &'static str {
        match self {
            ApiCall::ListLines => "list_lines",
            ApiCall::Dial { .. } => "dial",
            ApiCall::Hangup { .. } => "hangup",
            ApiCall::SetChannel { .. } => "set_channel",
            ApiCall::StartTestTone { .. } => "start_test_tone",
            ApiCall::StopTestTone => "stop_test_tone",
            ApiCall::SipConfig => "sip_config",
            ApiCall::SaveSipConfig(_) => "save_sip_config",
            ApiCall::NetworkConfig => "network_config",
            ApiCall::SaveNetworkConfig(_) => "save_network_config",
            ApiCall::SystemStatus => "system_status",
            ApiCall::RestartService => "restart_service",
            ApiCall::Reboot => "reboot",
        }
    }
}

/// In-memory adapter for tests and offline wiring. Records every call and
/// answers from canned state; an operation can be told to fail with a server
/// error payload.
#[derive(Default)]
pub struct InMemoryLineApi {
    lines: Mutex<Vec<LineUpdate>>,
    sip: Mutex<SipConfig>,
    network: Mutex<NetworkConfig>,
    calls: Mutex<Vec<ApiCall>>,
    failures: Mutex<HashMap<&'static str, String>>,
}

impl InMemoryLineApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn set_lines(&self, lines: Vec<LineUpdate>) {
        *self.lines.lock().await = lines;
    }

    pub async fn set_sip_config(&self, config: SipConfig) {
        *self.sip.lock().await = config;
    }

    /// Makes `operation` (e.g. `"dial"`) answer with an error payload.
    pub async fn fail(&self, operation: &'static str, message: impl Into<String>) {
        self.failures.lock().await.insert(operation, message.into());
    }

    pub async fn clear_failures(&self) {
        self.failures.lock().await.clear();
    }

    pub async fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: ApiCall) -> Result<(), ApiError> {
        let operation = call.operation();
        self.calls.lock().await.push(call);
        match self.failures.lock().await.get(operation) {
            Some(message) => Err(ApiError::Server {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LineApi for InMemoryLineApi {
    async fn list_lines(&self) -> Result<Vec<LineUpdate>, ApiError> {
        self.record(ApiCall::ListLines).await?;
        Ok(self.lines.lock().await.clone())
    }

    async fn dial(&self, line_id: LineId, number: &str) -> Result<DialAck, ApiError> {
        self.record(ApiCall::Dial {
            line_id,
            number: number.to_string(),
        })
        .await?;
        Ok(DialAck {
            status: Some("dialing".into()),
            phone_number: Some(number.to_string()),
        })
    }

    async fn hangup(&self, line_id: LineId) -> Result<(), ApiError> {
        self.record(ApiCall::Hangup { line_id }).await
    }

    async fn set_channel(&self, line_id: LineId, channel: u32) -> Result<ChannelAck, ApiError> {
        self.record(ApiCall::SetChannel { line_id, channel }).await?;
        Ok(ChannelAck {
            status: Some("success".into()),
            channel: Some(channel),
        })
    }

    async fn start_test_tone(&self, channel: u32) -> Result<ToneAck, ApiError> {
        self.record(ApiCall::StartTestTone { channel }).await?;
        Ok(ToneAck {
            status: Some("playing".into()),
            channel: Some(channel),
        })
    }

    async fn stop_test_tone(&self) -> Result<(), ApiError> {
        self.record(ApiCall::StopTestTone).await
    }

    async fn sip_config(&self) -> Result<SipConfig, ApiError> {
        self.record(ApiCall::SipConfig).await?;
        Ok(self.sip.lock().await.clone())
    }

    async fn save_sip_config(&self, config: &SipConfig) -> Result<SaveAck, ApiError> {
        self.record(ApiCall::SaveSipConfig(config.clone())).await?;
        *self.sip.lock().await = config.clone();
        Ok(SaveAck {
            status: Some("saved".into()),
            message: Some("Configuration saved. Restart required.".into()),
        })
    }

    async fn network_config(&self) -> Result<NetworkConfig, ApiError> {
        self.record(ApiCall::NetworkConfig).await?;
        Ok(self.network.lock().await.clone())
    }

    async fn save_network_config(&self, config: &NetworkConfig) -> Result<(), ApiError> {
        self.record(ApiCall::SaveNetworkConfig(config.clone())).await?;
        *self.network.lock().await = config.clone();
        Ok(())
    }

    async fn system_status(&self) -> Result<SystemStatus, ApiError> {
        self.record(ApiCall::SystemStatus).await?;
        Ok(SystemStatus {
            status: Some("running".into()),
            sip_engine: Some("running".into()),
            audio_router: Some("running".into()),
            lines_registered: Some(self.lines.lock().await.len() as u32),
        })
    }

    async fn restart_service(&self) -> Result<(), ApiError> {
        self.record(ApiCall::RestartService).await
    }

    async fn reboot(&self) -> Result<(), ApiError> {
        self.record(ApiCall::Reboot).await
    }
}
