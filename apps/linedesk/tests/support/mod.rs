#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path as UrlPath, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use linedesk_core::ClientConfig;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{Mutex as AsyncMutex, broadcast, oneshot};
use tokio::time::{sleep, timeout};

const CLOSE_SENTINEL: &str = "__close__";

#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub path: String,
    pub body: Value,
}

pub struct StubState {
    lines: AsyncMutex<Value>,
    subscriptions: AsyncMutex<Vec<Value>>,
    requests: AsyncMutex<Vec<Recorded>>,
    dial_error: AsyncMutex<Option<String>>,
    connections: AtomicUsize,
    close_after_subscribe: AtomicUsize,
    pushes: broadcast::Sender<String>,
}

impl StubState {
    fn new() -> Self {
        let (pushes, _) = broadcast::channel(64);
        Self {
            lines: AsyncMutex::new(json!([])),
            subscriptions: AsyncMutex::new(Vec::new()),
            requests: AsyncMutex::new(Vec::new()),
            dial_error: AsyncMutex::new(None),
            connections: AtomicUsize::new(0),
            close_after_subscribe: AtomicUsize::new(0),
            pushes,
        }
    }

    async fn record(&self, path: String, body: Value) {
        self.requests.lock().await.push(Recorded { path, body });
    }
}

/// Line server stand-in: the HTTP routes the client uses plus the push socket.
pub struct StubServer {
    pub addr: SocketAddr,
    pub state: Arc<StubState>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl StubServer {
    pub async fn start() -> Self {
        let state = Arc::new(StubState::new());
        let router = Router::new()
            .route("/api/lines", get(list_lines))
            .route("/api/lines/:id/dial", post(dial))
            .route("/api/lines/:id/hangup", post(hangup))
            .route("/api/lines/:id/channel", post(set_channel))
            .route("/ws", get(ws_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener bind");
        let addr = listener.local_addr().expect("local addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            state,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client settings pointed at this server with fast reconnects.
    pub fn config(&self, recents_dir: &Path) -> ClientConfig {
        ClientConfig {
            reconnect_delay: Duration::from_millis(20),
            request_timeout: Duration::from_secs(2),
            recents_file: Some(recents_dir.join("recent_numbers.json")),
            ..ClientConfig::new(&self.base_url()).expect("stub url")
        }
    }

    pub async fn set_lines(&self, lines: Value) {
        *self.state.lines.lock().await = lines;
    }

    pub async fn fail_dial(&self, message: &str) {
        *self.state.dial_error.lock().await = Some(message.to_string());
    }

    /// Drops the next `count` push connections right after they subscribe.
    pub fn close_after_subscribe(&self, count: usize) {
        self.state
            .close_after_subscribe
            .store(count, Ordering::SeqCst);
    }

    pub fn push(&self, event: &str, data: Value) -> usize {
        self.push_raw(&json!({ "event": event, "data": data }).to_string())
    }

    pub fn push_raw(&self, frame: &str) -> usize {
        self.state.pushes.send(frame.to_string()).unwrap_or(0)
    }

    /// Closes every live push connection.
    pub fn kick(&self) -> usize {
        self.push_raw(CLOSE_SENTINEL)
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub async fn subscriptions(&self) -> Vec<Value> {
        self.state.subscriptions.lock().await.clone()
    }

    pub async fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().await.clone()
    }

    pub async fn wait_for_subscriptions(&self, count: usize) {
        timeout(Duration::from_secs(5), async {
            while self.state.subscriptions.lock().await.len() < count {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {count} subscriptions"));
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually<F>(what: &str, mut check: F)
where
    F: FnMut() -> bool,
{
    timeout(Duration::from_secs(2), async {
        while !check() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

async fn list_lines(State(state): State<Arc<StubState>>) -> Json<Value> {
    Json(state.lines.lock().await.clone())
}

async fn dial(
    State(state): State<Arc<StubState>>,
    UrlPath(id): UrlPath<u32>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state
        .record(format!("/api/lines/{id}/dial"), body.clone())
        .await;
    if let Some(message) = state.dial_error.lock().await.clone() {
        return Json(json!({ "error": message }));
    }
    Json(json!({ "status": "dialing", "phone_number": body["phone_number"] }))
}

async fn hangup(State(state): State<Arc<StubState>>, UrlPath(id): UrlPath<u32>) -> Json<Value> {
    state
        .record(format!("/api/lines/{id}/hangup"), Value::Null)
        .await;
    Json(json!({}))
}

async fn set_channel(
    State(state): State<Arc<StubState>>,
    UrlPath(id): UrlPath<u32>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state
        .record(format!("/api/lines/{id}/channel"), body.clone())
        .await;
    Json(json!({ "status": "success", "channel": body["channel"] }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<StubState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<StubState>) {
    state.connections.fetch_add(1, Ordering::SeqCst);
    let mut pushes = state.pushes.subscribe();
    let (mut sender, mut receiver) = socket.split();

    match receiver.next().await {
        Some(Ok(WsMessage::Text(text))) => {
            let value = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
            state.subscriptions.lock().await.push(value);
        }
        _ => return,
    }

    let drop_now = state
        .close_after_subscribe
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if drop_now {
        let _ = sender.send(WsMessage::Close(None)).await;
        return;
    }

    loop {
        tokio::select! {
            push = pushes.recv() => match push {
                Ok(frame) if frame == CLOSE_SENTINEL => {
                    let _ = sender.send(WsMessage::Close(None)).await;
                    break;
                }
                Ok(frame) => {
                    if sender.send(WsMessage::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
