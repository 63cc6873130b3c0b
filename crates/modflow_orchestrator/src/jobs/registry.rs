//! Job Registry - job id → record map
//!
//! # Lock Audit
//!
//! - `slots` (RwLock) is held only for map lookups/inserts, never across I/O.
//! - Each job has its own Mutex; writers to the same job are serialized,
//!   writers to different jobs never contend.
//! - Subscriber callbacks run after the job lock is released.
//!
//! # Ordering
//!
//! Every write carries a sequence number taken from the job's counter. A
//! write is applied only if its number is greater than the last applied one,
//! so a poll response issued before an approval cannot overwrite it.

use super::{JobId, JobRecord};
use crate::error::{OrchestratorError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use tokio::sync::watch;
use tracing::debug;

type Callback = Arc<dyn Fn(&JobRecord) + Send + Sync>;

struct SlotState {
    record: JobRecord,
    /// Last sequence number handed out
    issued_seq: u64,
    /// Sequence number of the last applied write
    applied_seq: u64,
    subscribers: Vec<(u64, Callback)>,
}

struct JobSlot {
    state: Mutex<SlotState>,
    updates: watch::Sender<JobRecord>,
}

impl JobSlot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry of all known jobs
pub struct JobRegistry {
    slots: RwLock<HashMap<JobId, Arc<JobSlot>>>,
    next_subscription: AtomicU64,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.len())
            .finish()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    fn slot(&self, id: &JobId) -> Result<Arc<JobSlot>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::UnknownJob(id.clone()))
    }

    /// Register a new record. Returns false if the id is already known.
    pub fn insert(&self, record: JobRecord) -> bool {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.contains_key(&record.id) {
            return false;
        }
        let (updates, _) = watch::channel(record.clone());
        let slot = JobSlot {
            state: Mutex::new(SlotState {
                record: record.clone(),
                issued_seq: 0,
                applied_seq: 0,
                subscribers: Vec::new(),
            }),
            updates,
        };
        slots.insert(record.id, Arc::new(slot));
        true
    }

    /// Snapshot of a record
    pub fn get(&self, id: &JobId) -> Option<JobRecord> {
        let slot = self.slot(id).ok()?;
        let state = slot.lock();
        Some(state.record.clone())
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records, newest first
    pub fn list(&self) -> Vec<JobRecord> {
        let slots: Vec<Arc<JobSlot>> = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut records: Vec<JobRecord> = slots.iter().map(|s| s.lock().record.clone()).collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Reserve a sequence number for a write whose data is about to be fetched
    pub fn issue_sequence(&self, id: &JobId) -> Result<u64> {
        let slot = self.slot(id)?;
        let mut state = slot.lock();
        state.issued_seq += 1;
        Ok(state.issued_seq)
    }

    /// Apply a write tagged with `seq`. Returns `Ok(None)` if a more recent
    /// write was already applied.
    pub fn apply<R>(
        &self,
        id: &JobId,
        seq: u64,
        write: impl FnOnce(&mut JobRecord) -> R,
    ) -> Result<Option<R>> {
        let slot = self.slot(id)?;
        let mut state = slot.lock();
        if seq <= state.applied_seq {
            debug!(
                "Discarding stale update for job {} (seq {} <= {})",
                id, seq, state.applied_seq
            );
            return Ok(None);
        }
        state.applied_seq = seq;
        Ok(Some(Self::write_and_notify(&slot, state, write)))
    }

    /// Apply a write that supersedes everything issued so far
    pub fn mutate<R>(&self, id: &JobId, write: impl FnOnce(&mut JobRecord) -> R) -> Result<R> {
        let slot = self.slot(id)?;
        let mut state = slot.lock();
        state.issued_seq += 1;
        state.applied_seq = state.issued_seq;
        Ok(Self::write_and_notify(&slot, state, write))
    }

    fn write_and_notify<R>(
        slot: &JobSlot,
        mut state: MutexGuard<'_, SlotState>,
        write: impl FnOnce(&mut JobRecord) -> R,
    ) -> R {
        let before = state.record.clone();
        let result = write(&mut state.record);
        if state.record == before {
            return result;
        }
        let callbacks: Vec<Callback> =
            state.subscribers.iter().map(|(_, cb)| Arc::clone(cb)).collect();
        let snapshot = state.record.clone();
        // Published under the job lock so watchers never see writes reordered
        slot.updates.send_replace(snapshot.clone());
        drop(state);

        for callback in callbacks {
            callback(&snapshot);
        }
        result
    }

    /// Call `callback` with every change to the record until the
    /// subscription is dropped
    pub fn subscribe(
        &self,
        id: &JobId,
        callback: impl Fn(&JobRecord) + Send + Sync + 'static,
    ) -> Result<Subscription> {
        let slot = self.slot(id)?;
        let sub_id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        slot.lock().subscribers.push((sub_id, Arc::new(callback)));
        Ok(Subscription {
            job_id: id.clone(),
            sub_id,
            slot: Arc::downgrade(&slot),
        })
    }

    /// Receiver that always holds the latest record
    pub fn watch(&self, id: &JobId) -> Result<watch::Receiver<JobRecord>> {
        Ok(self.slot(id)?.updates.subscribe())
    }

    /// Remove terminal records. Returns how many were removed.
    pub fn clear_history(&self) -> usize {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let before = slots.len();
        slots.retain(|_, slot| !slot.lock().record.is_terminal());
        before - slots.len()
    }
}

/// Handle returned by [`JobRegistry::subscribe`]; detaches on drop
pub struct Subscription {
    job_id: JobId,
    sub_id: u64,
    slot: Weak<JobSlot>,
}

impl Subscription {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Stop receiving updates
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.upgrade() {
            slot.lock().subscribers.retain(|(id, _)| *id != self.sub_id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("job_id", &self.job_id)
            .field("sub_id", &self.sub_id)
            .finish()
    }
}
