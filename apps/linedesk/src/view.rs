//! Projection of line records onto what an operator sees.
//!
//! [`render`] is pure. [`LineBoard`] holds exactly one [`LineView`] per line
//! and replaces it wholesale on every apply, publishing the resulting board
//! through a `watch` channel. [`Renderer`] keeps a board in step with a store.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use line_bus::{BusError, next_event};
use linedesk_sdk::{LineId, LineState};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::store::{LineRecord, LineStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    Neutral,
    Active,
    Ringing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryAction {
    Dial,
    Hangup,
    None,
}

impl PrimaryAction {
    pub fn label(self) -> &'static str {
        match self {
            PrimaryAction::Dial => "DIAL",
            PrimaryAction::Hangup => "HANGUP",
            PrimaryAction::None => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineView {
    pub line_id: LineId,
    pub status: String,
    pub tone: StatusTone,
    pub action: PrimaryAction,
    pub audio_channel: Option<u32>,
}

impl fmt::Display for LineView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.tone {
            StatusTone::Neutral => ' ',
            StatusTone::Active => '*',
            StatusTone::Ringing => '!',
        };
        write!(f, "{marker} Line {:<2} {:<36}", self.line_id, self.status)?;
        match self.audio_channel {
            Some(channel) if channel > 0 => write!(f, " ch {channel:<2}")?,
            _ => write!(f, " ch --")?,
        }
        if self.action != PrimaryAction::None {
            write!(f, "  [{}]", self.action.label())?;
        }
        Ok(())
    }
}

pub fn render(record: &LineRecord) -> LineView {
    let number = record.phone_number.as_deref().unwrap_or_default();
    let (status, tone, action) = match &record.state {
        LineState::Idle => (
            "Available".to_string(),
            StatusTone::Neutral,
            PrimaryAction::Dial,
        ),
        LineState::Dialing => (
            format!("Dialing {number}..."),
            StatusTone::Active,
            PrimaryAction::Hangup,
        ),
        LineState::Ringing => (
            format!("Ringing {number}..."),
            StatusTone::Ringing,
            PrimaryAction::Hangup,
        ),
        LineState::Connected => (
            format!(
                "Active: {number} ({})",
                format_duration(record.duration_seconds)
            ),
            StatusTone::Active,
            PrimaryAction::Hangup,
        ),
        LineState::Other(label) => (label.clone(), StatusTone::Neutral, PrimaryAction::None),
    };
    LineView {
        line_id: record.line_id,
        status,
        tone,
        action,
        audio_channel: record.audio_channel,
    }
}

/// `mm:ss`, zero padded. Minutes keep growing past 99.
pub fn format_duration(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

pub type BoardSnapshot = BTreeMap<LineId, LineView>;

#[derive(Debug)]
pub struct LineBoard {
    tx: watch::Sender<BoardSnapshot>,
}

impl Default for LineBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BoardSnapshot::new());
        Self { tx }
    }

    /// Replaces the view for the record's line. Returns `false` when the
    /// rendered view is identical to the one already shown.
    pub fn apply(&self, record: &LineRecord) -> bool {
        let view = render(record);
        self.tx.send_if_modified(|board| {
            if board.get(&view.line_id) == Some(&view) {
                return false;
            }
            board.insert(view.line_id, view);
            true
        })
    }

    pub fn view(&self, line_id: LineId) -> Option<LineView> {
        self.tx.borrow().get(&line_id).cloned()
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        self.tx.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    pub fn subscribe(&self) -> watch::Receiver<BoardSnapshot> {
        self.tx.subscribe()
    }
}

/// Keeps a [`LineBoard`] in step with a [`LineStore`].
pub struct Renderer;

impl Renderer {
    pub fn spawn(store: Arc<LineStore>, board: Arc<LineBoard>) -> JoinHandle<()> {
        let mut changes = store.subscribe();
        for record in store.get_all() {
            board.apply(&record);
        }
        tokio::spawn(async move {
            loop {
                match next_event(&mut changes).await {
                    Ok(change) => {
                        board.apply(&change.record);
                    }
                    Err(BusError::Lagged(skipped)) => {
                        warn!(target: "linedesk::view", skipped, "renderer lagged; redrawing every line");
                        for record in store.get_all() {
                            board.apply(&record);
                        }
                    }
                    Err(BusError::Closed) => {
                        debug!(target: "linedesk::view", "store change feed closed");
                        break;
                    }
                }
            }
        })
    }
}
