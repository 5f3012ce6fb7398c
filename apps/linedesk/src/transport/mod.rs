//! Push channel to the line server.
//!
//! [`PushClient`] owns at most one WebSocket at a time. A supervisor task
//! dials, subscribes, pumps inbound frames onto the event bus and reconnects
//! after a fixed delay. Consecutive failed attempts are counted; reaching the
//! ceiling publishes a terminal [`ConnectError`] and the supervisor stops.

pub mod config;
pub mod protocol;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use line_bus::{Bus, LocalBus};
use linedesk_sdk::{LineUpdate, RegistrationInfo};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};
use url::Url;

pub use config::PushConfig;
use protocol::{ProtocolError, ServerEvent};

pub const TOPIC_CONNECTED: &str = "connected";
pub const TOPIC_DISCONNECTED: &str = "disconnected";
pub const TOPIC_LINE_STATUS: &str = "line_status";
pub const TOPIC_REGISTRATION_STATUS: &str = "registration_status";
pub const TOPIC_CONNECT_ERROR: &str = "connect_error";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid push url: {0}")]
    InvalidUrl(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectError {
    pub reason: String,
    /// Consecutive failures so far, this one included.
    pub attempts: u32,
    /// No further attempts will be made.
    pub terminal: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected { reason: String },
    LineStatus(LineUpdate),
    RegistrationStatus(RegistrationInfo),
    ConnectError(ConnectError),
}

impl TransportEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            TransportEvent::Connected => TOPIC_CONNECTED,
            TransportEvent::Disconnected { .. } => TOPIC_DISCONNECTED,
            TransportEvent::LineStatus(_) => TOPIC_LINE_STATUS,
            TransportEvent::RegistrationStatus(_) => TOPIC_REGISTRATION_STATUS,
            TransportEvent::ConnectError(_) => TOPIC_CONNECT_ERROR,
        }
    }
}

#[derive(Debug, Default)]
struct LinkState {
    attempts: AtomicU32,
    connected: AtomicBool,
    subscriptions_sent: AtomicU64,
}

struct Supervisor {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

pub struct PushClient {
    config: PushConfig,
    url: Url,
    bus: Arc<LocalBus<TransportEvent>>,
    state: Arc<LinkState>,
    supervisor: Mutex<Option<Supervisor>>,
}

impl PushClient {
    pub fn new(
        config: PushConfig,
        bus: Arc<LocalBus<TransportEvent>>,
    ) -> Result<Self, TransportError> {
        let url = config.build_url()?;
        Ok(Self {
            config,
            url,
            bus,
            state: Arc::new(LinkState::default()),
            supervisor: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn bus(&self) -> &Arc<LocalBus<TransportEvent>> {
        &self.bus
    }

    /// Starts the supervisor. Returns `false` when one is already running.
    pub fn connect(&self) -> bool {
        let mut guard = self.supervisor.lock();
        if let Some(running) = guard.as_ref() {
            if !running.handle.is_finished() {
                debug!(target: "linedesk::transport", url = %self.url, "connect ignored; push channel already active");
                return false;
            }
        }

        self.state.attempts.store(0, Ordering::SeqCst);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let link = Link {
            url: self.url.clone(),
            config: self.config.clone(),
            bus: self.bus.clone(),
            state: self.state.clone(),
        };
        info!(target: "linedesk::transport", url = %self.url, "starting push channel");
        let handle = tokio::spawn(link.supervise(shutdown_rx));
        *guard = Some(Supervisor { handle, shutdown });
        true
    }

    /// Stops the supervisor and closes the socket.
    pub async fn disconnect(&self) {
        let running = self.supervisor.lock().take();
        let Some(Supervisor { mut handle, shutdown }) = running else {
            return;
        };
        let _ = shutdown.send(true);
        if tokio::time::timeout(Duration::from_secs(2), &mut handle)
            .await
            .is_err()
        {
            warn!(target: "linedesk::transport", "push supervisor did not stop in time; aborting");
            handle.abort();
        }
        if self.state.connected.swap(false, Ordering::SeqCst) {
            self.bus.publish(
                TOPIC_DISCONNECTED,
                TransportEvent::Disconnected {
                    reason: "client disconnect".into(),
                },
            );
        }
    }

    /// Signals the supervisor to close the socket without waiting for it.
    pub fn halt(&self) {
        if let Some(running) = self.supervisor.lock().take() {
            let _ = running.shutdown.send(true);
        }
    }

    /// Consecutive failed connection attempts since the last success.
    pub fn attempts(&self) -> u32 {
        self.state.attempts.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    /// Subscription frames written over the client's lifetime.
    pub fn subscriptions_sent(&self) -> u64 {
        self.state.subscriptions_sent.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.supervisor
            .lock()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }
}

impl Drop for PushClient {
    fn drop(&mut self) {
        self.halt();
    }
}

enum PumpEnd {
    Closed(String),
    Shutdown,
}

struct Link {
    url: Url,
    config: PushConfig,
    bus: Arc<LocalBus<TransportEvent>>,
    state: Arc<LinkState>,
}

impl Link {
    async fn supervise(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let attempt = tokio::select! {
                result = self.establish() => result,
                _ = stopped(&mut shutdown) => return,
            };

            match attempt {
                Err(err) => {
                    let attempts = self.state.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    let terminal = attempts >= self.config.max_reconnect_attempts;
                    warn!(
                        target: "linedesk::transport",
                        url = %self.url,
                        attempts,
                        terminal,
                        error = %err,
                        "push connection attempt failed"
                    );
                    self.publish(TransportEvent::ConnectError(ConnectError {
                        reason: err.to_string(),
                        attempts,
                        terminal,
                    }));
                    if terminal {
                        error!(
                            target: "linedesk::transport",
                            attempts,
                            "max reconnect attempts reached; giving up"
                        );
                        return;
                    }
                }
                Ok(socket) => {
                    self.state.attempts.store(0, Ordering::SeqCst);
                    self.state.connected.store(true, Ordering::SeqCst);
                    info!(target: "linedesk::transport", url = %self.url, "push channel connected");
                    self.publish(TransportEvent::Connected);

                    let end = self.pump(socket, &mut shutdown).await;
                    let reason = match &end {
                        PumpEnd::Closed(reason) => reason.clone(),
                        PumpEnd::Shutdown => "client disconnect".to_string(),
                    };
                    if self.state.connected.swap(false, Ordering::SeqCst) {
                        info!(target: "linedesk::transport", reason = %reason, "push channel disconnected");
                        self.publish(TransportEvent::Disconnected { reason });
                    }
                    if matches!(end, PumpEnd::Shutdown) {
                        return;
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                _ = stopped(&mut shutdown) => return,
            }
        }
    }

    /// Dials the socket and writes the subscription.
    async fn establish(&self) -> Result<Socket, TransportError> {
        let timeout = self.config.connect_timeout;
        let (mut socket, _) = tokio::time::timeout(timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;
        let frame = protocol::subscribe_frame(&self.config.lines)?;
        socket.send(Message::Text(frame)).await?;
        let sent = self.state.subscriptions_sent.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            target: "linedesk::transport",
            lines = ?self.config.lines,
            total = sent,
            "subscription sent"
        );
        Ok(socket)
    }

    async fn pump(&self, socket: Socket, shutdown: &mut watch::Receiver<bool>) -> PumpEnd {
        let (mut sink, mut stream) = socket.split();
        loop {
            let frame = tokio::select! {
                frame = stream.next() => frame,
                _ = stopped(shutdown) => {
                    let _ = sink.send(Message::Close(None)).await;
                    return PumpEnd::Shutdown;
                }
            };
            match frame {
                Some(Ok(Message::Text(text))) => self.dispatch(&text),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => self.dispatch(text),
                    Err(_) => debug!(target: "linedesk::transport", len = bytes.len(), "ignoring binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|frame| format!("closed by server ({})", frame.code))
                        .unwrap_or_else(|| "closed by server".to_string());
                    return PumpEnd::Closed(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return PumpEnd::Closed(err.to_string()),
                None => return PumpEnd::Closed("stream ended".to_string()),
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match protocol::decode(text) {
            Ok(ServerEvent::LineStatus(update)) => {
                trace!(target: "linedesk::transport", line_id = update.line_id, "line status push");
                self.publish(TransportEvent::LineStatus(update));
            }
            Ok(ServerEvent::Registration(info)) => {
                self.publish(TransportEvent::RegistrationStatus(info));
            }
            Ok(ServerEvent::Greeting(data)) => {
                debug!(target: "linedesk::transport", greeting = %data, "server greeting");
            }
            Ok(ServerEvent::Unknown(event)) => {
                debug!(target: "linedesk::transport", event = %event, "ignoring unknown push event");
            }
            Err(err) => {
                warn!(target: "linedesk::transport", error = %err, "ignoring unreadable push frame");
            }
        }
    }

    fn publish(&self, event: TransportEvent) {
        self.bus.publish(event.topic(), event);
    }
}

/// Resolves once shutdown is requested or the client is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
