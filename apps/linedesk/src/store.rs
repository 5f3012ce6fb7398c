//! In-memory view of every line the client follows.
//!
//! Server pushes, bulk loads and optimistic local edits all go through the
//! same shallow merge: fields present in an update overwrite, absent fields
//! are kept. Whichever update arrives last wins. The only field the client
//! changes on its own is the connected-call duration, advanced by [`LineStore::tick`]
//! and replaced by the next authoritative value.
//!
//! Every mutation publishes the resulting [`LineChange`] before releasing the
//! map lock, so subscribers receive changes in exactly the order they were
//! merged and the last change seen for a line always matches the store.
//! Publishing only enqueues on a broadcast channel; no subscriber code runs
//! under the lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use line_bus::{Bus, LocalBus};
use linedesk_sdk::{LineId, LineState, LineUpdate};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::trace;

pub const TOPIC_LINE_CHANGED: &str = "line_changed";

/// Last known state of one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    pub line_id: LineId,
    pub state: LineState,
    pub phone_number: Option<String>,
    pub caller_id: Option<String>,
    pub duration_seconds: u64,
    pub audio_channel: Option<u32>,
    pub sip_registered: Option<bool>,
}

impl LineRecord {
    pub fn new(line_id: LineId) -> Self {
        Self {
            line_id,
            state: LineState::Idle,
            phone_number: None,
            caller_id: None,
            duration_seconds: 0,
            audio_channel: None,
            sip_registered: None,
        }
    }

    fn merge(&mut self, update: LineUpdate) {
        let LineUpdate {
            line_id: _,
            state,
            phone_number,
            caller_id,
            duration_seconds,
            audio_channel,
            sip_registered,
        } = update;
        if let Some(state) = state {
            self.state = state;
        }
        if let Some(number) = phone_number {
            self.phone_number = Some(number);
        }
        if let Some(caller_id) = caller_id {
            self.caller_id = Some(caller_id);
        }
        if let Some(seconds) = duration_seconds {
            self.duration_seconds = seconds;
        }
        if let Some(channel) = audio_channel {
            self.audio_channel = Some(channel);
        }
        if let Some(registered) = sip_registered {
            self.sip_registered = Some(registered);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOrigin {
    Server,
    Optimistic,
    Tick,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineChange {
    pub record: LineRecord,
    pub origin: UpdateOrigin,
}

#[derive(Debug, Default)]
pub struct LineStore {
    lines: RwLock<BTreeMap<LineId, LineRecord>>,
    changes: LocalBus<LineChange>,
}

impl LineStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Merges an authoritative update, creating the record on first sight.
    pub fn apply_update(&self, update: LineUpdate) -> LineRecord {
        self.merge(update, UpdateOrigin::Server)
    }

    /// Merges a local edit made ahead of server confirmation. The next
    /// [`apply_update`](Self::apply_update) for the line overwrites it.
    pub fn apply_optimistic(&self, line_id: LineId, mut fields: LineUpdate) -> LineRecord {
        fields.line_id = line_id;
        self.merge(fields, UpdateOrigin::Optimistic)
    }

    /// Applies a bulk load entry by entry, in order.
    pub fn load_snapshot(&self, lines: Vec<LineUpdate>) -> Vec<LineRecord> {
        lines
            .into_iter()
            .map(|update| self.apply_update(update))
            .collect()
    }

    /// Advances the duration of every connected line by one second and
    /// returns the advanced records.
    pub fn tick(&self) -> Vec<LineRecord> {
        let mut lines = self.lines.write();
        let advanced: Vec<LineRecord> = lines
            .values_mut()
            .filter(|record| record.state == LineState::Connected)
            .map(|record| {
                record.duration_seconds = record.duration_seconds.saturating_add(1);
                record.clone()
            })
            .collect();
        for record in &advanced {
            self.publish(record.clone(), UpdateOrigin::Tick);
        }
        advanced
    }

    pub fn get(&self, line_id: LineId) -> Option<LineRecord> {
        self.lines.read().get(&line_id).cloned()
    }

    /// Snapshot of every record, ordered by line id.
    pub fn get_all(&self) -> Vec<LineRecord> {
        self.lines.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.read().is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LineChange> {
        self.changes.subscribe(TOPIC_LINE_CHANGED)
    }

    fn merge(&self, update: LineUpdate, origin: UpdateOrigin) -> LineRecord {
        let line_id = update.line_id;
        let mut lines = self.lines.write();
        let record = lines
            .entry(line_id)
            .or_insert_with(|| LineRecord::new(line_id));
        record.merge(update);
        let record = record.clone();
        self.publish(record.clone(), origin);
        drop(lines);
        trace!(
            target: "linedesk::store",
            line_id,
            state = %record.state,
            origin = ?origin,
            "line merged"
        );
        record
    }

    /// Callers hold the map write lock.
    fn publish(&self, record: LineRecord, origin: UpdateOrigin) {
        self.changes
            .publish(TOPIC_LINE_CHANGED, LineChange { record, origin });
    }
}
