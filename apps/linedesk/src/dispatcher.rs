//! Operator actions and their local side effects.
//!
//! Dial and hangup never touch the line store: the line only moves once the
//! server pushes its new state. Channel selection is applied optimistically
//! and left for the next push to confirm or correct. Nothing is retried.

use std::sync::Arc;

use linedesk_sdk::{
    ApiError, DialAck, LineApi, LineId, LineState, LineUpdate, NetworkConfig, SaveAck,
    SystemStatus,
};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::recents::{RecentNumbers, RecentsFile};
use crate::settings::{SettingsError, SipSettingsForm};
use crate::store::LineStore;

/// Asks the operator to approve a destructive action.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("please enter a phone number")]
    EmptyNumber,
    #[error("line {line_id} is busy ({state})")]
    LineBusy { line_id: LineId, state: LineState },
    #[error("channel {channel} is out of range (0-{max})")]
    InvalidChannel { channel: u32, max: u32 },
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("{}", .0.user_message())]
    Request(#[from] ApiError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T = ()> {
    Done(T),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }
}

/// What the line's primary button does right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineIntent {
    OpenDialPad,
    Hangup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneState {
    Idle,
    Starting,
    Active,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneOutcome {
    Started,
    Stopped,
    AlreadyActive,
    NotActive,
}

pub struct ActionDispatcher {
    store: Arc<LineStore>,
    api: Arc<dyn LineApi>,
    channel_count: u32,
    recents: Mutex<RecentNumbers>,
    recents_file: Option<RecentsFile>,
    tone: Mutex<ToneState>,
}

impl ActionDispatcher {
    pub fn new(store: Arc<LineStore>, api: Arc<dyn LineApi>, channel_count: u32) -> Self {
        Self {
            store,
            api,
            channel_count,
            recents: Mutex::new(RecentNumbers::new()),
            recents_file: None,
            tone: Mutex::new(ToneState::Idle),
        }
    }

    /// Loads recent numbers from `file` and persists every change back to it.
    pub fn with_recents_file(mut self, file: RecentsFile) -> Self {
        *self.recents.get_mut() = file.load();
        self.recents_file = Some(file);
        self
    }

    pub fn press_line(&self, line_id: LineId) -> LineIntent {
        match self.store.get(line_id) {
            Some(record) if !record.state.is_idle() => LineIntent::Hangup,
            _ => LineIntent::OpenDialPad,
        }
    }

    pub async fn dial(&self, line_id: LineId, number: &str) -> Result<DialAck, DispatchError> {
        let number = number.trim();
        if number.is_empty() {
            return Err(DispatchError::EmptyNumber);
        }
        if let Some(record) = self.store.get(line_id) {
            if !record.state.is_idle() {
                return Err(DispatchError::LineBusy {
                    line_id,
                    state: record.state,
                });
            }
        }

        self.remember(number);
        info!(target: "linedesk::dispatch", line_id, number, "dialing");
        let ack = self.api.dial(line_id, number).await.map_err(|err| {
            warn!(target: "linedesk::dispatch", line_id, error = %err, "dial failed");
            DispatchError::Request(err)
        })?;
        Ok(ack)
    }

    pub async fn hangup(
        &self,
        line_id: LineId,
        confirm: &dyn Confirm,
    ) -> Result<Outcome, DispatchError> {
        if !confirm.confirm(&format!("Hang up Line {line_id}?")) {
            debug!(target: "linedesk::dispatch", line_id, "hangup cancelled");
            return Ok(Outcome::Cancelled);
        }
        info!(target: "linedesk::dispatch", line_id, "hanging up");
        self.api.hangup(line_id).await.map_err(|err| {
            warn!(target: "linedesk::dispatch", line_id, error = %err, "hangup failed");
            DispatchError::Request(err)
        })?;
        Ok(Outcome::Done(()))
    }

    pub async fn set_channel(&self, line_id: LineId, channel: u32) -> Result<(), DispatchError> {
        if channel > self.channel_count {
            return Err(DispatchError::InvalidChannel {
                channel,
                max: self.channel_count,
            });
        }
        self.store
            .apply_optimistic(line_id, LineUpdate::new(line_id).with_audio_channel(channel));
        match self.api.set_channel(line_id, channel).await {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(
                    target: "linedesk::dispatch",
                    line_id,
                    channel,
                    error = %err,
                    "error setting channel"
                );
                Err(DispatchError::Request(err))
            }
        }
    }

    pub async fn start_test_tone(&self, channel: u32) -> Result<ToneOutcome, DispatchError> {
        {
            let mut tone = self.tone.lock();
            if *tone != ToneState::Idle {
                return Ok(ToneOutcome::AlreadyActive);
            }
            *tone = ToneState::Starting;
        }
        match self.api.start_test_tone(channel).await {
            Ok(_) => {
                *self.tone.lock() = ToneState::Active;
                debug!(target: "linedesk::dispatch", channel, "test tone playing");
                Ok(ToneOutcome::Started)
            }
            Err(err) => {
                *self.tone.lock() = ToneState::Idle;
                warn!(target: "linedesk::dispatch", channel, error = %err, "error starting test tone");
                Err(DispatchError::Request(err))
            }
        }
    }

    pub async fn stop_test_tone(&self) -> Result<ToneOutcome, DispatchError> {
        {
            let mut tone = self.tone.lock();
            if *tone != ToneState::Active {
                return Ok(ToneOutcome::NotActive);
            }
            *tone = ToneState::Stopping;
        }
        match self.api.stop_test_tone().await {
            Ok(()) => {
                *self.tone.lock() = ToneState::Idle;
                Ok(ToneOutcome::Stopped)
            }
            Err(err) => {
                *self.tone.lock() = ToneState::Active;
                warn!(target: "linedesk::dispatch", error = %err, "error stopping test tone");
                Err(DispatchError::Request(err))
            }
        }
    }

    pub fn tone_state(&self) -> ToneState {
        *self.tone.lock()
    }

    pub async fn reboot(&self, confirm: &dyn Confirm) -> Result<Outcome, DispatchError> {
        if !confirm.confirm("Reboot the system?") {
            return Ok(Outcome::Cancelled);
        }
        info!(target: "linedesk::dispatch", "requesting reboot");
        self.api.reboot().await?;
        Ok(Outcome::Done(()))
    }

    pub async fn restart_service(&self, confirm: &dyn Confirm) -> Result<Outcome, DispatchError> {
        if !confirm.confirm("Restart the telephony service?") {
            return Ok(Outcome::Cancelled);
        }
        info!(target: "linedesk::dispatch", "requesting service restart");
        self.api.restart_service().await?;
        Ok(Outcome::Done(()))
    }

    pub async fn save_sip_config(
        &self,
        form: &SipSettingsForm,
        confirm: &dyn Confirm,
    ) -> Result<Outcome<SaveAck>, DispatchError> {
        form.validate()?;
        if !confirm.confirm("Save SIP settings? System will restart to apply changes.") {
            return Ok(Outcome::Cancelled);
        }
        let ack = self.api.save_sip_config(&form.to_config()).await?;
        info!(target: "linedesk::dispatch", server = %form.sip_server, "sip settings saved");
        Ok(Outcome::Done(ack))
    }

    pub async fn save_network_config(
        &self,
        config: &NetworkConfig,
        confirm: &dyn Confirm,
    ) -> Result<Outcome, DispatchError> {
        if !confirm.confirm("Save network settings? System will reboot to apply changes.") {
            return Ok(Outcome::Cancelled);
        }
        self.api.save_network_config(config).await?;
        info!(target: "linedesk::dispatch", mode = ?config.mode, "network settings saved");
        Ok(Outcome::Done(()))
    }

    pub async fn system_status(&self) -> Result<SystemStatus, DispatchError> {
        Ok(self.api.system_status().await?)
    }

    pub fn recent_numbers(&self) -> Vec<String> {
        self.recents.lock().as_slice().to_vec()
    }

    pub fn clear_recent_numbers(&self) {
        let snapshot = {
            let mut recents = self.recents.lock();
            recents.clear();
            recents.clone()
        };
        self.persist(&snapshot);
    }

    fn remember(&self, number: &str) {
        let snapshot = {
            let mut recents = self.recents.lock();
            recents.record(number);
            recents.clone()
        };
        self.persist(&snapshot);
    }

    fn persist(&self, recents: &RecentNumbers) {
        if let Some(file) = &self.recents_file {
            if let Err(err) = file.save(recents) {
                warn!(target: "linedesk::dispatch", error = %err, "failed to persist recent numbers");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linedesk_sdk::{ApiCall, InMemoryLineApi};

    fn yes(_: &str) -> bool {
        true
    }

    fn no(_: &str) -> bool {
        false
    }

    fn dispatcher() -> (Arc<LineStore>, Arc<InMemoryLineApi>, ActionDispatcher) {
        let store = LineStore::new();
        let api = InMemoryLineApi::new();
        let dispatcher = ActionDispatcher::new(store.clone(), api.clone(), 8);
        (store, api, dispatcher)
    }

    #[tokio::test]
    async fn dial_records_recent_and_leaves_store_alone() {
        let (store, api, dispatcher) = dispatcher();
        store.apply_update(LineUpdate::new(1).with_state("idle"));
        let before = store.get_all();

        dispatcher.dial(1, " 5551234 ").await.unwrap();
        assert_eq!(store.get_all(), before);
        assert_eq!(dispatcher.recent_numbers(), vec!["5551234".to_string()]);
        assert_eq!(
            api.calls().await,
            vec![ApiCall::Dial {
                line_id: 1,
                number: "5551234".into()
            }]
        );
    }

    #[tokio::test]
    async fn dial_rejects_empty_number_and_busy_line_before_any_request() {
        let (store, api, dispatcher) = dispatcher();
        store.apply_update(LineUpdate::new(2).with_state("connected"));
        let before = store.get_all();

        assert!(matches!(
            dispatcher.dial(1, "   ").await,
            Err(DispatchError::EmptyNumber)
        ));
        assert!(matches!(
            dispatcher.dial(2, "5551234").await,
            Err(DispatchError::LineBusy { line_id: 2, .. })
        ));
        assert!(api.calls().await.is_empty());
        assert!(dispatcher.recent_numbers().is_empty());
        assert_eq!(store.get_all(), before);
    }

    #[tokio::test]
    async fn failed_dial_surfaces_server_message() {
        let (store, api, dispatcher) = dispatcher();
        store.apply_update(LineUpdate::new(1).with_state("idle"));
        api.fail("dial", "Failed to dial").await;
        let err = dispatcher.dial(1, "5551234").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to dial");
        assert_eq!(store.get(1).unwrap().state, LineState::Idle);
        assert_eq!(dispatcher.recent_numbers().len(), 1);
    }

    #[tokio::test]
    async fn hangup_requires_confirmation() {
        let (store, api, dispatcher) = dispatcher();
        store.apply_update(LineUpdate::new(3).with_state("connected"));

        let outcome = dispatcher.hangup(3, &no).await.unwrap();
        assert!(outcome.is_cancelled());
        assert!(api.calls().await.is_empty());

        let outcome = dispatcher.hangup(3, &yes).await.unwrap();
        assert_eq!(outcome, Outcome::Done(()));
        assert_eq!(api.calls().await, vec![ApiCall::Hangup { line_id: 3 }]);
        assert_eq!(store.get(3).unwrap().state, LineState::Connected);
    }

    #[tokio::test]
    async fn failed_hangup_leaves_the_store_untouched() {
        let (store, api, dispatcher) = dispatcher();
        store.apply_update(
            LineUpdate::new(2)
                .with_state("connected")
                .with_phone_number("5550100")
                .with_duration(30)
                .with_audio_channel(4),
        );
        let before = store.get_all();
        api.fail("hangup", "Failed to hangup").await;

        let err = dispatcher.hangup(2, &yes).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Request(ApiError::Server { ref message, .. }) if message == "Failed to hangup"
        ));
        assert_eq!(err.to_string(), "Failed to hangup");
        assert_eq!(store.get_all(), before);
        assert_eq!(api.calls().await, vec![ApiCall::Hangup { line_id: 2 }]);
    }

    #[tokio::test]
    async fn hangup_prompt_names_the_line() {
        let (_store, _api, dispatcher) = dispatcher();
        let seen = Mutex::new(String::new());
        let confirm = |prompt: &str| {
            *seen.lock() = prompt.to_string();
            false
        };
        dispatcher.hangup(5, &confirm).await.unwrap();
        assert_eq!(*seen.lock(), "Hang up Line 5?");
    }

    #[tokio::test]
    async fn channel_is_applied_optimistically_even_when_request_fails() {
        let (store, api, dispatcher) = dispatcher();
        api.fail("set_channel", "no such channel").await;
        assert!(dispatcher.set_channel(1, 3).await.is_err());
        assert_eq!(store.get(1).unwrap().audio_channel, Some(3));

        store.apply_update(LineUpdate::new(1).with_audio_channel(1));
        assert_eq!(store.get(1).unwrap().audio_channel, Some(1));
    }

    #[tokio::test]
    async fn out_of_range_channel_is_rejected_locally() {
        let (store, api, dispatcher) = dispatcher();
        assert!(matches!(
            dispatcher.set_channel(1, 9).await,
            Err(DispatchError::InvalidChannel { channel: 9, max: 8 })
        ));
        assert!(store.get(1).is_none());
        assert!(api.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_tone_start_and_stop_are_idempotent() {
        let (_store, api, dispatcher) = dispatcher();
        assert_eq!(dispatcher.stop_test_tone().await.unwrap(), ToneOutcome::NotActive);
        assert_eq!(dispatcher.start_test_tone(2).await.unwrap(), ToneOutcome::Started);
        assert_eq!(
            dispatcher.start_test_tone(2).await.unwrap(),
            ToneOutcome::AlreadyActive
        );
        assert_eq!(dispatcher.tone_state(), ToneState::Active);
        assert_eq!(dispatcher.stop_test_tone().await.unwrap(), ToneOutcome::Stopped);
        assert_eq!(dispatcher.stop_test_tone().await.unwrap(), ToneOutcome::NotActive);
        assert_eq!(
            api.calls().await,
            vec![ApiCall::StartTestTone { channel: 2 }, ApiCall::StopTestTone]
        );
    }

    #[tokio::test]
    async fn failed_tone_requests_restore_previous_state() {
        let (_store, api, dispatcher) = dispatcher();
        api.fail("start_test_tone", "audio busy").await;
        assert!(dispatcher.start_test_tone(1).await.is_err());
        assert_eq!(dispatcher.tone_state(), ToneState::Idle);

        api.clear_failures().await;
        dispatcher.start_test_tone(1).await.unwrap();
        api.fail("stop_test_tone", "audio busy").await;
        assert!(dispatcher.stop_test_tone().await.is_err());
        assert_eq!(dispatcher.tone_state(), ToneState::Active);
    }

    #[tokio::test]
    async fn sip_settings_are_validated_before_confirmation() {
        let (_store, api, dispatcher) = dispatcher();
        let asked = Mutex::new(0);
        let confirm = |_: &str| {
            *asked.lock() += 1;
            true
        };
        let form = SipSettingsForm::new(8);
        assert!(matches!(
            dispatcher.save_sip_config(&form, &confirm).await,
            Err(DispatchError::Settings(SettingsError::MissingServer))
        ));
        assert_eq!(*asked.lock(), 0);

        let mut form = SipSettingsForm::new(8);
        form.sip_server = "pbx.local".into();
        let outcome = dispatcher.save_sip_config(&form, &confirm).await.unwrap();
        assert!(matches!(outcome, Outcome::Done(_)));
        assert_eq!(*asked.lock(), 1);
        assert!(matches!(
            api.calls().await.as_slice(),
            [ApiCall::SaveSipConfig(config)] if config.num_lines == 8
        ));
    }

    #[tokio::test]
    async fn system_actions_are_confirmation_gated() {
        let (_store, api, dispatcher) = dispatcher();
        assert!(dispatcher.reboot(&no).await.unwrap().is_cancelled());
        assert!(dispatcher.restart_service(&no).await.unwrap().is_cancelled());
        assert!(
            dispatcher
                .save_network_config(&NetworkConfig::default(), &no)
                .await
                .unwrap()
                .is_cancelled()
        );
        assert!(api.calls().await.is_empty());
        dispatcher.reboot(&yes).await.unwrap();
        assert_eq!(api.calls().await, vec![ApiCall::Reboot]);
    }

    #[tokio::test]
    async fn press_line_follows_stored_state() {
        let (store, _api, dispatcher) = dispatcher();
        assert_eq!(dispatcher.press_line(1), LineIntent::OpenDialPad);
        store.apply_update(LineUpdate::new(1).with_state("ringing"));
        assert_eq!(dispatcher.press_line(1), LineIntent::Hangup);
        store.apply_update(LineUpdate::new(1).with_state("on_hold"));
        assert_eq!(dispatcher.press_line(1), LineIntent::Hangup);
        store.apply_update(LineUpdate::new(1).with_state("idle"));
        assert_eq!(dispatcher.press_line(1), LineIntent::OpenDialPad);
    }

    #[tokio::test]
    async fn recents_persist_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = RecentsFile::new(dir.path().join("recent.json"));
        let (store, api, _) = dispatcher();
        let dispatcher = ActionDispatcher::new(store, api, 8).with_recents_file(file.clone());
        dispatcher.dial(1, "5550001").await.unwrap();
        dispatcher.dial(2, "5550002").await.unwrap();
        assert_eq!(
            file.load().as_slice(),
            ["5550002".to_string(), "5550001".to_string()]
        );
        dispatcher.clear_recent_numbers();
        assert!(file.load().is_empty());
    }
}
