//! One running client: store, board, push channel and dispatcher, wired
//! together explicitly and torn down together.

use std::collections::BTreeMap;
use std::sync::Arc;

use line_bus::{Bus, BusError, LocalBus, next_event};
use linedesk_sdk::{ApiError, LineApi, LinedeskClient, RegistrationInfo};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::{ClientConfig, ConfigError};
use crate::dispatcher::ActionDispatcher;
use crate::recents::RecentsFile;
use crate::store::LineStore;
use crate::transport::{PushClient, PushConfig, TransportError, TransportEvent};
use crate::view::{BoardSnapshot, LineBoard, Renderer};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type Registrations = Arc<RwLock<BTreeMap<String, RegistrationInfo>>>;

pub struct Session {
    config: ClientConfig,
    api: Arc<dyn LineApi>,
    store: Arc<LineStore>,
    board: Arc<LineBoard>,
    dispatcher: Arc<ActionDispatcher>,
    transport: Arc<PushClient>,
    registrations: Registrations,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    pub async fn start(config: ClientConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let client = LinedeskClient::with_timeout(config.server_url.as_str(), config.request_timeout)?;
        Self::with_api(config, Arc::new(client)).await
    }

    pub async fn with_api(
        config: ClientConfig,
        api: Arc<dyn LineApi>,
    ) -> Result<Self, SessionError> {
        let store = LineStore::new();
        let board = Arc::new(LineBoard::new());
        let bus = Arc::new(LocalBus::new());
        let transport = Arc::new(PushClient::new(
            PushConfig::from_client_config(&config),
            bus.clone(),
        )?);

        let mut dispatcher = ActionDispatcher::new(store.clone(), api.clone(), config.channel_count);
        if let Some(file) = recents_file(&config) {
            dispatcher = dispatcher.with_recents_file(file);
        }
        let dispatcher = Arc::new(dispatcher);
        let registrations: Registrations = Arc::default();

        // Subscribe before anything can publish.
        let events = bus.subscribe_all();
        let renderer = Renderer::spawn(store.clone(), board.clone());

        reload_lines(api.as_ref(), &store).await;

        let pump = tokio::spawn(pump_events(
            events,
            api.clone(),
            store.clone(),
            registrations.clone(),
        ));
        let ticker = spawn_ticker(store.clone(), &config);

        transport.connect();
        info!(
            target: "linedesk::session",
            server = %config.server_url,
            push = %transport.url(),
            lines = config.line_count,
            "session started"
        );

        Ok(Self {
            config,
            api,
            store,
            board,
            dispatcher,
            transport,
            registrations,
            tasks: vec![renderer, pump, ticker],
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<LineStore> {
        &self.store
    }

    pub fn board(&self) -> watch::Receiver<BoardSnapshot> {
        self.board.subscribe()
    }

    pub fn views(&self) -> BoardSnapshot {
        self.board.snapshot()
    }

    pub fn dispatcher(&self) -> &Arc<ActionDispatcher> {
        &self.dispatcher
    }

    pub fn transport(&self) -> &Arc<PushClient> {
        &self.transport
    }

    pub fn registrations(&self) -> BTreeMap<String, RegistrationInfo> {
        self.registrations.read().clone()
    }

    /// Re-reads every line from the server.
    pub async fn reload(&self) {
        reload_lines(self.api.as_ref(), &self.store).await;
    }

    pub async fn shutdown(mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.transport.disconnect().await;
        info!(target: "linedesk::session", "session stopped");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.transport.halt();
    }
}

fn recents_file(config: &ClientConfig) -> Option<RecentsFile> {
    if let Some(path) = &config.recents_file {
        return Some(RecentsFile::new(path));
    }
    match RecentsFile::default_location() {
        Ok(file) => Some(file),
        Err(err) => {
            warn!(target: "linedesk::session", error = %err, "recent numbers will not be persisted");
            None
        }
    }
}

async fn reload_lines(api: &dyn LineApi, store: &LineStore) {
    match api.list_lines().await {
        Ok(lines) => {
            let count = lines.len();
            store.load_snapshot(lines);
            debug!(target: "linedesk::session", count, "lines loaded");
        }
        Err(err) => {
            error!(target: "linedesk::session", error = %err, "error loading lines");
        }
    }
}

async fn pump_events(
    mut events: broadcast::Receiver<TransportEvent>,
    api: Arc<dyn LineApi>,
    store: Arc<LineStore>,
    registrations: Registrations,
) {
    loop {
        match next_event(&mut events).await {
            Ok(TransportEvent::Connected) => reload_lines(api.as_ref(), &store).await,
            Ok(TransportEvent::LineStatus(update)) => {
                store.apply_update(update);
            }
            Ok(TransportEvent::RegistrationStatus(info)) => {
                debug!(
                    target: "linedesk::session",
                    key = %info.key(),
                    registered = ?info.registered,
                    "sip registration update"
                );
                registrations.write().insert(info.key(), info);
            }
            Ok(TransportEvent::Disconnected { reason }) => {
                debug!(target: "linedesk::session", reason = %reason, "push channel down");
            }
            Ok(TransportEvent::ConnectError(err)) => {
                if err.terminal {
                    error!(
                        target: "linedesk::session",
                        attempts = err.attempts,
                        reason = %err.reason,
                        "push channel gave up; live updates stopped"
                    );
                }
            }
            Err(BusError::Lagged(skipped)) => {
                warn!(target: "linedesk::session", skipped, "event pump lagged; reloading lines");
                reload_lines(api.as_ref(), &store).await;
            }
            Err(BusError::Closed) => break,
        }
    }
}

fn spawn_ticker(store: Arc<LineStore>, config: &ClientConfig) -> JoinHandle<()> {
    let period = config.tick_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            store.tick();
        }
    })
}
