//! Auto-Save Coordinator
//!
//! Debounces canvas edits so the store sees one write per burst of changes
//! instead of one per drag or keystroke. An `(owner, canvas)` pair holds a
//! slot only while it has unsaved contents, a pending timer or a write in
//! flight. The last saved revision is remembered apart from the slot until
//! the canvas is discarded.
//!
//! The client bumps a revision counter on every mutation. A schedule whose
//! revision is already saved (or already pending) is a no-op, and an older
//! revision never replaces a newer one. Writes for one canvas are serialized.
//!
//! A write failing on the database keeps the contents pending, and the next
//! schedule or manual save writes them again. A write the store rejects
//! outright (missing canvas, invalid contents) drops them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::document::{CanvasEdge, CanvasNode, CanvasPatch};
use crate::error::{Error, Result};
use crate::store::CanvasStore;

/// Auto-save configuration (deserializable from TOML)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoSaveConfig {
    /// Quiet period after the last change before contents are written
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_delay_ms() -> u64 {
    10_000
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
        }
    }
}

impl AutoSaveConfig {
    /// Debounce delay as a duration
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Reject a zero delay
    pub fn validate(&self) -> Result<()> {
        if self.delay_ms == 0 {
            return Err(Error::validation("autosave.delay_ms must be greater than zero"));
        }
        Ok(())
    }
}

/// Result of [`AutoSaveCoordinator::schedule`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Revision already saved or pending; nothing changed
    Unchanged,
    /// Timer (re)started for the new contents
    Scheduled,
}

/// Result of an immediate save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SaveOutcome {
    /// Contents written
    Saved {
        /// Revision now stored
        revision: u64,
    },
    /// Nothing was pending
    Clean,
}

/// Auto-save state of one canvas
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSaveStatus {
    /// Unsaved contents exist
    pub dirty: bool,
    /// A write is in flight
    pub saving: bool,
    /// Revision of the unsaved contents
    pub pending_revision: Option<u64>,
    /// Last revision written successfully
    pub saved_revision: Option<u64>,
    /// When the last successful write finished
    pub last_saved_at: Option<DateTime<Utc>>,
    /// Error of the last failed write, cleared on success
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SlotKey {
    owner: String,
    canvas_id: String,
}

impl SlotKey {
    fn new(owner: &str, canvas_id: &str) -> Self {
        Self {
            owner: owner.to_string(),
            canvas_id: canvas_id.to_string(),
        }
    }
}

#[derive(Clone)]
struct PendingWrite {
    revision: u64,
    nodes: Vec<CanvasNode>,
    edges: Vec<CanvasEdge>,
}

#[derive(Default)]
struct Slot {
    pending: Option<PendingWrite>,
    last_error: Option<String>,
    saving: bool,
    timer: Option<JoinHandle<()>>,
    generation: u64,
    write_lock: Arc<Mutex<()>>,
}

impl Slot {
    /// Whether `revision` adds nothing over what is saved or about to be
    fn is_current(&self, revision: u64, saved: Option<u64>) -> bool {
        match &self.pending {
            Some(p) => revision < p.revision || (revision == p.revision && self.timer.is_some()),
            None => saved.is_some_and(|saved| revision <= saved),
        }
    }

    fn is_stale(&self, revision: u64, saved: Option<u64>) -> bool {
        match &self.pending {
            Some(p) => revision < p.revision,
            None => saved.is_some_and(|saved| revision <= saved),
        }
    }

    fn is_idle(&self) -> bool {
        self.pending.is_none() && self.timer.is_none() && !self.saving
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation += 1;
    }
}

/// Last successful write of a canvas
#[derive(Debug, Clone, Copy)]
struct SavedMark {
    revision: u64,
    at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    /// Canvases with pending contents, a running timer or a write in flight
    slots: HashMap<SlotKey, Slot>,
    /// Only written after the store accepted the contents
    saved: HashMap<SlotKey, SavedMark>,
}

impl State {
    fn saved_revision(&self, key: &SlotKey) -> Option<u64> {
        self.saved.get(key).map(|mark| mark.revision)
    }

    fn release_if_idle(&mut self, key: &SlotKey) {
        if self.slots.get(key).is_some_and(Slot::is_idle) {
            self.slots.remove(key);
        }
    }

    fn status(&self, key: &SlotKey) -> AutoSaveStatus {
        let mut status = self
            .slots
            .get(key)
            .map(|slot| AutoSaveStatus {
                dirty: slot.pending.is_some(),
                saving: slot.saving,
                pending_revision: slot.pending.as_ref().map(|p| p.revision),
                last_error: slot.last_error.clone(),
                ..AutoSaveStatus::default()
            })
            .unwrap_or_default();

        if let Some(mark) = self.saved.get(key) {
            status.saved_revision = Some(mark.revision);
            status.last_saved_at = Some(mark.at);
        }
        status
    }
}

struct Inner {
    store: Arc<dyn CanvasStore>,
    delay: Duration,
    state: Mutex<State>,
}

/// Debounced writer of full canvas contents
#[derive(Clone)]
pub struct AutoSaveCoordinator {
    inner: Arc<Inner>,
}

impl AutoSaveCoordinator {
    /// Create a coordinator writing to `store` after `delay` of quiet
    #[must_use]
    pub fn new(store: Arc<dyn CanvasStore>, delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                delay,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Create a coordinator from configuration
    #[must_use]
    pub fn from_config(store: Arc<dyn CanvasStore>, config: &AutoSaveConfig) -> Self {
        Self::new(store, config.delay())
    }

    /// Debounce delay
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Record new contents and (re)start the save timer
    pub async fn schedule(
        &self,
        owner: &str,
        canvas_id: &str,
        revision: u64,
        nodes: Vec<CanvasNode>,
        edges: Vec<CanvasEdge>,
    ) -> ScheduleOutcome {
        let key = SlotKey::new(owner, canvas_id);
        let mut state = self.inner.state.lock().await;

        let saved = state.saved_revision(&key);
        let current = match state.slots.get(&key) {
            Some(slot) => slot.is_current(revision, saved),
            None => saved.is_some_and(|saved| revision <= saved),
        };
        if current {
            debug!(canvas_id = %canvas_id, revision, "Auto-save skipped, revision unchanged");
            return ScheduleOutcome::Unchanged;
        }

        let slot = state.slots.entry(key.clone()).or_default();
        slot.cancel_timer();
        slot.pending = Some(PendingWrite {
            revision,
            nodes,
            edges,
        });

        let generation = slot.generation;
        let delay = self.inner.delay;
        let this = self.clone();
        slot.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.fire(key, generation).await;
        }));

        debug!(
            canvas_id = %canvas_id,
            revision,
            delay_ms = delay.as_millis() as u64,
            "Auto-save scheduled"
        );
        ScheduleOutcome::Scheduled
    }

    /// Write the given contents now, cancelling any pending timer
    pub async fn save_now(
        &self,
        owner: &str,
        canvas_id: &str,
        revision: u64,
        nodes: Vec<CanvasNode>,
        edges: Vec<CanvasEdge>,
    ) -> Result<SaveOutcome> {
        let key = SlotKey::new(owner, canvas_id);
        {
            let mut state = self.inner.state.lock().await;
            let saved = state.saved_revision(&key);
            let slot = state.slots.entry(key.clone()).or_default();
            slot.cancel_timer();

            if !slot.is_stale(revision, saved) {
                slot.pending = Some(PendingWrite {
                    revision,
                    nodes,
                    edges,
                });
            }
        }

        self.persist(&key).await
    }

    /// Write whatever is pending for one canvas now
    pub async fn flush(&self, owner: &str, canvas_id: &str) -> Result<SaveOutcome> {
        let key = SlotKey::new(owner, canvas_id);
        {
            let mut state = self.inner.state.lock().await;
            match state.slots.get_mut(&key) {
                Some(slot) => slot.cancel_timer(),
                None => return Ok(SaveOutcome::Clean),
            }
        }

        self.persist(&key).await
    }

    /// Write every pending canvas now. Returns the number written.
    pub async fn flush_all(&self) -> usize {
        let keys: Vec<SlotKey> = {
            let state = self.inner.state.lock().await;
            state
                .slots
                .iter()
                .filter(|(_, slot)| slot.pending.is_some())
                .map(|(key, _)| key.clone())
                .collect()
        };

        let mut written = 0;
        for key in keys {
            match self.flush(&key.owner, &key.canvas_id).await {
                Ok(SaveOutcome::Saved { .. }) => written += 1,
                Ok(SaveOutcome::Clean) => {}
                Err(e) => {
                    warn!(canvas_id = %key.canvas_id, error = %e, "Flush failed");
                }
            }
        }

        if written > 0 {
            info!(written, "Flushed pending auto-saves");
        }
        written
    }

    /// Forget a canvas without writing. Returns whether unsaved contents
    /// were discarded.
    pub async fn discard(&self, owner: &str, canvas_id: &str) -> bool {
        let key = SlotKey::new(owner, canvas_id);
        let mut state = self.inner.state.lock().await;
        state.saved.remove(&key);
        match state.slots.remove(&key) {
            Some(mut slot) => {
                slot.cancel_timer();
                slot.pending.is_some()
            }
            None => false,
        }
    }

    /// Cancel every timer and drop all slots. Returns how many canvases had
    /// unsaved contents.
    pub async fn shutdown(&self) -> usize {
        let mut state = self.inner.state.lock().await;
        state.saved.clear();
        let mut unsaved = 0;
        for (key, mut slot) in state.slots.drain() {
            slot.cancel_timer();
            if slot.pending.is_some() {
                warn!(canvas_id = %key.canvas_id, "Dropping unsaved canvas contents");
                unsaved += 1;
            }
        }
        unsaved
    }

    /// Auto-save state of a canvas
    pub async fn status(&self, owner: &str, canvas_id: &str) -> AutoSaveStatus {
        let state = self.inner.state.lock().await;
        state.status(&SlotKey::new(owner, canvas_id))
    }

    /// Number of canvases with unsaved contents
    pub async fn dirty_count(&self) -> usize {
        let state = self.inner.state.lock().await;
        state.slots.values().filter(|s| s.pending.is_some()).count()
    }

    /// Number of canvases with pending contents, a running timer or a write
    /// in flight
    pub async fn active_slots(&self) -> usize {
        self.inner.state.lock().await.slots.len()
    }

    async fn fire(&self, key: SlotKey, generation: u64) {
        {
            let mut state = self.inner.state.lock().await;
            match state.slots.get_mut(&key) {
                Some(slot) if slot.generation == generation => slot.timer = None,
                _ => return,
            }
        }

        // failure is already logged and recorded on the slot
        let _ = self.persist(&key).await;
    }

    async fn persist(&self, key: &SlotKey) -> Result<SaveOutcome> {
        loop {
            let write_lock = {
                let state = self.inner.state.lock().await;
                match state.slots.get(key) {
                    Some(slot) => slot.write_lock.clone(),
                    None => return Ok(SaveOutcome::Clean),
                }
            };
            let _write = write_lock.lock().await;

            let pending = {
                let mut state = self.inner.state.lock().await;
                let Some(slot) = state.slots.get_mut(key) else {
                    return Ok(SaveOutcome::Clean);
                };
                // released and recreated while we waited for the write lock
                if !Arc::ptr_eq(&slot.write_lock, &write_lock) {
                    continue;
                }
                let Some(pending) = slot.pending.clone() else {
                    state.release_if_idle(key);
                    return Ok(SaveOutcome::Clean);
                };
                slot.saving = true;
                pending
            };

            return self.write(key, pending).await;
        }
    }

    async fn write(&self, key: &SlotKey, pending: PendingWrite) -> Result<SaveOutcome> {
        let revision = pending.revision;
        let node_count = pending.nodes.len();
        let patch = CanvasPatch::contents(revision, pending.nodes, pending.edges);
        let result = self
            .inner
            .store
            .update_canvas(&key.canvas_id, patch, &key.owner)
            .await;

        let mut state = self.inner.state.lock().await;
        let failure = result.as_ref().err().map(ToString::to_string);
        let keep_contents = match &result {
            Ok(_) => false,
            Err(e) => e.is_recoverable(),
        };

        // the slot may have been discarded while the write was in flight
        let tracked = match state.slots.get_mut(key) {
            Some(slot) => {
                slot.saving = false;
                slot.last_error = failure;
                if !keep_contents && slot.pending.as_ref().is_some_and(|p| p.revision == revision) {
                    slot.pending = None;
                }
                true
            }
            None => false,
        };
        state.release_if_idle(key);

        match result {
            Ok(_) if !tracked => {
                debug!(canvas_id = %key.canvas_id, revision, "Canvas saved after discard");
                Ok(SaveOutcome::Saved { revision })
            }
            Ok(_) => {
                let revision = state
                    .saved_revision(key)
                    .map_or(revision, |saved| saved.max(revision));
                state.saved.insert(
                    key.clone(),
                    SavedMark {
                        revision,
                        at: Utc::now(),
                    },
                );
                info!(
                    canvas_id = %key.canvas_id,
                    owner = %key.owner,
                    revision,
                    nodes = node_count,
                    "Canvas auto-saved"
                );
                Ok(SaveOutcome::Saved { revision })
            }
            Err(e) if keep_contents => {
                warn!(
                    canvas_id = %key.canvas_id,
                    owner = %key.owner,
                    revision,
                    error = %e,
                    "Canvas auto-save failed, contents kept for retry"
                );
                Err(e)
            }
            Err(e) => {
                warn!(
                    canvas_id = %key.canvas_id,
                    owner = %key.owner,
                    revision,
                    error = %e,
                    "Canvas auto-save rejected, contents dropped"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests;
