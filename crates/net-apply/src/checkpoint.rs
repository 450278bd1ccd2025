//! Checkpoint manager
//!
//! A checkpoint captures the state before an apply so it can be restored.
//! Its lifecycle is `pending` followed by exactly one of `committed`,
//! `rolledback` or `expired`. At most one checkpoint is pending at a time.
//!
//! While an apply is running the orchestrator holds the checkpoint: it
//! cannot expire and other callers cannot finalize it. Releasing it re-arms
//! the expiry deadline. A [`Lease`] dropped while still holding (the apply
//! future was cancelled) releases the hold from a spawned task.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use netstate_core::compare::state_mismatches;
use netstate_core::{
    BackendDriver, CompareMode, CompareOptions, NetstateError, NetworkState, OperationLog, Result,
};

use crate::differ::diff_replace;
use crate::store::{CheckpointStore, StoredCheckpoint};
use crate::transaction::apply_operations;

pub const CHECKPOINT_PREFIX: &str = "/netstate/checkpoint/";

/// Finalized checkpoints kept for [`CheckpointManager::show`].
const MAX_HISTORY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    Pending,
    Committed,
    #[serde(rename = "rolledback")]
    RolledBack,
    Expired,
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointStatus::Pending => write!(f, "pending"),
            CheckpointStatus::Committed => write!(f, "committed"),
            CheckpointStatus::RolledBack => write!(f, "rolledback"),
            CheckpointStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Public view of a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CheckpointInfo {
    pub id: String,
    pub status: CheckpointStatus,
    pub created: DateTime<Utc>,
    pub timeout_seconds: u64,
    /// Set while pending and not held by an apply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

/// Checkpoint taken or joined by an apply.
pub(crate) struct Lease {
    pub id: String,
    pub joined: bool,
    hold: Option<Hold>,
}

/// What a dropped lease needs to give up its hold.
struct Hold {
    table: Arc<Mutex<Table>>,
    store: Option<CheckpointStore>,
    generation: u64,
}

impl Hold {
    /// Release the checkpoint unless the holder already released or
    /// finalized it.
    async fn release_abandoned(self, id: String) {
        let mut table = self.table.lock().await;
        let Some(entry) = table.get_mut(&id) else {
            return;
        };
        if !entry.held || entry.generation != self.generation {
            return;
        }
        warn!("apply holding checkpoint {} was cancelled, releasing it", id);
        let (deadline, generation) = entry.unhold();
        persist(self.store.as_ref(), entry).await;
        spawn_expiry(Arc::clone(&self.table), self.store.clone(), id, deadline, generation);
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let Some(hold) = self.hold.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(hold.release_abandoned(self.id.clone()));
            }
            Err(_) => warn!("no runtime to release checkpoint {}", self.id),
        }
    }
}

struct Entry {
    id: String,
    snapshot: Option<NetworkState>,
    created: DateTime<Utc>,
    timeout: Duration,
    deadline: Instant,
    status: CheckpointStatus,
    held: bool,
    generation: u64,
}

impl Entry {
    /// Move a due, unattended checkpoint to `expired`.
    fn expire_if_due(&mut self, now: Instant) -> bool {
        if self.status == CheckpointStatus::Pending && !self.held && now >= self.deadline {
            self.status = CheckpointStatus::Expired;
            self.snapshot = None;
            self.generation += 1;
            return true;
        }
        false
    }

    /// Drop the hold and restart the expiry countdown.
    fn unhold(&mut self) -> (Instant, u64) {
        self.held = false;
        self.deadline = Instant::now() + self.timeout;
        self.generation += 1;
        (self.deadline, self.generation)
    }

    fn wall_deadline(&self) -> DateTime<Utc> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        Utc::now() + chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::zero())
    }

    fn info(&self) -> CheckpointInfo {
        CheckpointInfo {
            id: self.id.clone(),
            status: self.status,
            created: self.created,
            timeout_seconds: self.timeout.as_secs(),
            expires: (self.status == CheckpointStatus::Pending && !self.held)
                .then(|| self.wall_deadline()),
        }
    }
}

#[derive(Default)]
struct Table {
    entries: Vec<Entry>,
    seq: u64,
}

impl Table {
    fn get_mut(&mut self, id: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    fn pending_id(&self) -> Option<String> {
        self.entries
            .iter()
            .find(|e| e.status == CheckpointStatus::Pending)
            .map(|e| e.id.clone())
    }

    fn next_id(&mut self) -> String {
        self.seq += 1;
        format!("{}{}-{}", CHECKPOINT_PREFIX, Utc::now().timestamp_millis(), self.seq)
    }

    fn trim_history(&mut self) {
        let finalized = self
            .entries
            .iter()
            .filter(|e| e.status != CheckpointStatus::Pending)
            .count();
        let mut excess = finalized.saturating_sub(MAX_HISTORY);
        self.entries.retain(|e| {
            if excess > 0 && e.status != CheckpointStatus::Pending {
                excess -= 1;
                return false;
            }
            true
        });
    }
}

/// Tracks checkpoints of one engine and restores snapshots on rollback.
pub struct CheckpointManager {
    driver: Arc<dyn BackendDriver>,
    table: Arc<Mutex<Table>>,
    store: Option<CheckpointStore>,
    default_timeout: Duration,
}

impl CheckpointManager {
    pub fn new(driver: Arc<dyn BackendDriver>, default_timeout: Duration) -> Self {
        Self {
            driver,
            table: Arc::new(Mutex::new(Table::default())),
            store: None,
            default_timeout,
        }
    }

    /// Persist pending checkpoints in `dir` and recover the ones found there.
    pub async fn with_store(mut self, dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let store = CheckpointStore::open(&dir).await.map_err(|e| {
            NetstateError::InvalidArgument(format!("checkpoint directory {:?}: {}", dir, e))
        })?;
        self.store = Some(store);
        self.recover().await?;
        Ok(self)
    }

    async fn recover(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let records = store.load_all().await.map_err(|e| {
            NetstateError::InvalidArgument(format!("checkpoint directory {:?}: {}", store.dir(), e))
        })?;

        let mut table = self.table.lock().await;
        for record in records {
            let timeout = Duration::from_millis(record.timeout_ms);
            let remaining = (record.deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            let snapshot = match record.snapshot() {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!("discarding checkpoint {}: {}", record.id, e);
                    None
                }
            };
            let status = if snapshot.is_some()
                && !remaining.is_zero()
                && table.pending_id().is_none()
            {
                CheckpointStatus::Pending
            } else {
                CheckpointStatus::Expired
            };

            if status == CheckpointStatus::Expired {
                if let Err(e) = store.remove(&record.id).await {
                    warn!("failed to remove checkpoint {}: {}", record.id, e);
                }
            } else {
                info!("recovered pending checkpoint {}", record.id);
            }

            let deadline = Instant::now() + remaining;
            table.entries.push(Entry {
                id: record.id.clone(),
                snapshot: snapshot.filter(|_| status == CheckpointStatus::Pending),
                created: record.created,
                timeout,
                deadline,
                status,
                held: false,
                generation: 0,
            });
            if status == CheckpointStatus::Pending {
                self.arm(record.id, deadline, 0);
            }
        }
        Ok(())
    }

    fn effective_timeout(&self, timeout: Duration) -> Duration {
        if timeout.is_zero() {
            self.default_timeout
        } else {
            timeout
        }
    }

    /// Create a pending checkpoint for `snapshot` and start its expiry.
    pub async fn create(&self, snapshot: NetworkState, timeout: Duration) -> Result<String> {
        let lease = self.open(snapshot, timeout, false, false).await?;
        Ok(lease.id.clone())
    }

    /// Create a held checkpoint, or join the pending one when `join` is set.
    pub(crate) async fn begin(
        &self,
        snapshot: NetworkState,
        timeout: Duration,
        join: bool,
    ) -> Result<Lease> {
        self.open(snapshot, timeout, join, true).await
    }

    async fn open(
        &self,
        snapshot: NetworkState,
        timeout: Duration,
        join: bool,
        hold: bool,
    ) -> Result<Lease> {
        let timeout = self.effective_timeout(timeout);
        let mut table = self.table.lock().await;
        let now = Instant::now();

        if let Some(id) = table.pending_id() {
            let entry = table
                .get_mut(&id)
                .ok_or_else(|| NetstateError::Bug(format!("checkpoint {} vanished", id)))?;
            if entry.expire_if_due(now) {
                info!("checkpoint {} expired", id);
                self.forget(&id).await;
            } else if entry.held || !join {
                return Err(NetstateError::CheckpointInProgress(id));
            } else {
                entry.held = hold;
                entry.generation += 1;
                let generation = entry.generation;
                let hold = hold.then(|| self.hold(generation));
                return Ok(Lease {
                    id,
                    joined: true,
                    hold,
                });
            }
        }

        let id = table.next_id();
        let created = Utc::now();
        let deadline = now + timeout;
        let entry = Entry {
            id: id.clone(),
            snapshot: Some(snapshot),
            created,
            timeout,
            deadline,
            status: CheckpointStatus::Pending,
            held: hold,
            generation: 0,
        };
        self.persist(&entry).await;
        table.entries.push(entry);
        table.trim_history();
        if !hold {
            self.arm(id.clone(), deadline, 0);
        }
        info!("created checkpoint {} with timeout {:?}", id, timeout);
        Ok(Lease {
            id,
            joined: false,
            hold: hold.then(|| self.hold(0)),
        })
    }

    fn hold(&self, generation: u64) -> Hold {
        Hold {
            table: Arc::clone(&self.table),
            store: self.store.clone(),
            generation,
        }
    }

    /// End the hold of an apply and restart the expiry countdown.
    pub(crate) async fn release(&self, id: &str) -> Result<()> {
        let mut table = self.table.lock().await;
        let entry = table
            .get_mut(id)
            .ok_or_else(|| NetstateError::UnknownCheckpoint(id.to_string()))?;
        let (deadline, generation) = entry.unhold();
        self.persist(entry).await;
        self.arm(id.to_string(), deadline, generation);
        Ok(())
    }

    /// Restart the expiry countdown of a pending checkpoint with a new timeout.
    pub async fn adjust_timeout(&self, id: &str, timeout: Duration) -> Result<()> {
        let timeout = self.effective_timeout(timeout);
        let mut table = self.table.lock().await;
        let id = resolve(&table, id)?;
        let entry = table
            .get_mut(&id)
            .ok_or_else(|| NetstateError::UnknownCheckpoint(id.clone()))?;
        if entry.expire_if_due(Instant::now()) {
            self.forget(&id).await;
        }
        if entry.status != CheckpointStatus::Pending {
            return Err(NetstateError::AlreadyFinalized {
                id,
                status: entry.status.to_string(),
            });
        }
        entry.timeout = timeout;
        entry.deadline = Instant::now() + timeout;
        entry.generation += 1;
        let (deadline, generation, held) = (entry.deadline, entry.generation, entry.held);
        self.persist(entry).await;
        if !held {
            self.arm(id, deadline, generation);
        }
        Ok(())
    }

    /// Commit a checkpoint, an empty id selects the pending one.
    pub async fn commit(&self, id: &str) -> Result<String> {
        let (id, _) = self.finalize(id, CheckpointStatus::Committed, false).await?;
        info!("committed checkpoint {}", id);
        Ok(id)
    }

    pub(crate) async fn commit_held(&self, id: &str) -> Result<String> {
        let (id, _) = self.finalize(id, CheckpointStatus::Committed, true).await?;
        info!("committed checkpoint {}", id);
        Ok(id)
    }

    /// Roll back to a checkpoint, an empty id selects the pending one.
    ///
    /// The checkpoint ends as `rolledback` even when restoring fails; the
    /// failure is reported as `RollbackFailed`.
    pub async fn rollback(&self, id: &str, log: &mut OperationLog) -> Result<String> {
        let (id, snapshot) = self.finalize(id, CheckpointStatus::RolledBack, false).await?;
        self.restore(&id, snapshot, log).await?;
        Ok(id)
    }

    pub(crate) async fn rollback_held(&self, id: &str, log: &mut OperationLog) -> Result<String> {
        let (id, snapshot) = self.finalize(id, CheckpointStatus::RolledBack, true).await?;
        self.restore(&id, snapshot, log).await?;
        Ok(id)
    }

    async fn finalize(
        &self,
        id: &str,
        status: CheckpointStatus,
        by_holder: bool,
    ) -> Result<(String, Option<NetworkState>)> {
        let mut table = self.table.lock().await;
        let id = resolve(&table, id)?;
        let entry = table
            .get_mut(&id)
            .ok_or_else(|| NetstateError::UnknownCheckpoint(id.clone()))?;

        if entry.expire_if_due(Instant::now()) {
            info!("checkpoint {} expired", id);
            self.forget(&id).await;
        }
        if entry.status != CheckpointStatus::Pending {
            return Err(NetstateError::AlreadyFinalized {
                id,
                status: entry.status.to_string(),
            });
        }
        if entry.held && !by_holder {
            return Err(NetstateError::CheckpointInProgress(id));
        }

        entry.status = status;
        entry.held = false;
        entry.generation += 1;
        let snapshot = entry.snapshot.take();
        self.forget(&id).await;
        table.trim_history();
        Ok((id, snapshot))
    }

    async fn restore(
        &self,
        id: &str,
        snapshot: Option<NetworkState>,
        log: &mut OperationLog,
    ) -> Result<()> {
        let failed = |reason: String| NetstateError::RollbackFailed {
            id: id.to_string(),
            reason,
        };
        let snapshot = snapshot.ok_or_else(|| failed("snapshot is missing".to_string()))?;
        log.info(format!("rolling back to checkpoint {}", id));

        let deadline = Instant::now() + self.default_timeout;
        let current = tokio::time::timeout_at(deadline, self.driver.read_current_state())
            .await
            .map_err(|_| failed("timed out reading the live state".to_string()))?
            .map_err(|e| failed(e.to_string()))?;
        let changes = diff_replace(&current, &snapshot).map_err(|e| failed(e.to_string()))?;
        log.info(format!("rollback needs {} operations", changes.len()));

        apply_operations(self.driver.as_ref(), &changes, Some(deadline), false, log)
            .await
            .map_err(|e| failed(e.to_string()))?;

        let opts = CompareOptions {
            include_secrets: true,
            ..Default::default()
        };
        match self.driver.read_current_state().await {
            Ok(live) => {
                for mismatch in state_mismatches(&snapshot, &live, &opts, CompareMode::Replace) {
                    log.warn(format!("after rollback: {}", mismatch));
                }
            }
            Err(e) => log.warn(format!("cannot re-read state after rollback: {}", e)),
        }

        log.info(format!("rolled back checkpoint {}", id));
        Ok(())
    }

    /// All known checkpoints, oldest first.
    pub async fn show(&self) -> Vec<CheckpointInfo> {
        let mut table = self.table.lock().await;
        let now = Instant::now();
        let mut expired = Vec::new();
        for entry in table.entries.iter_mut() {
            if entry.expire_if_due(now) {
                expired.push(entry.id.clone());
            }
        }
        for id in expired {
            self.forget(&id).await;
        }
        table.entries.iter().map(Entry::info).collect()
    }

    /// Id of the pending checkpoint, if any.
    pub async fn current(&self) -> Option<String> {
        self.table.lock().await.pending_id()
    }

    pub async fn status(&self, id: &str) -> Option<CheckpointStatus> {
        let mut table = self.table.lock().await;
        let entry = table.get_mut(id)?;
        if entry.expire_if_due(Instant::now()) {
            self.forget(id).await;
        }
        Some(entry.status)
    }

    fn arm(&self, id: String, deadline: Instant, generation: u64) {
        spawn_expiry(Arc::clone(&self.table), self.store.clone(), id, deadline, generation);
    }

    async fn persist(&self, entry: &Entry) {
        persist(self.store.as_ref(), entry).await;
    }

    async fn forget(&self, id: &str) {
        if let Some(store) = &self.store {
            if let Err(e) = store.remove(id).await {
                warn!("failed to remove checkpoint {}: {}", id, e);
            }
        }
    }
}

/// Resolve an empty id to the pending checkpoint.
fn resolve(table: &Table, id: &str) -> Result<String> {
    if !id.is_empty() {
        return Ok(id.to_string());
    }
    table
        .pending_id()
        .ok_or_else(|| NetstateError::UnknownCheckpoint("no pending checkpoint".to_string()))
}

/// Expire `id` at `deadline` unless its generation moved on.
fn spawn_expiry(
    table: Arc<Mutex<Table>>,
    store: Option<CheckpointStore>,
    id: String,
    deadline: Instant,
    generation: u64,
) {
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        let mut table = table.lock().await;
        let Some(entry) = table.get_mut(&id) else {
            return;
        };
        if entry.generation == generation && entry.expire_if_due(Instant::now()) {
            info!("checkpoint {} expired", id);
            if let Some(store) = store {
                if let Err(e) = store.remove(&id).await {
                    warn!("failed to remove checkpoint {}: {}", id, e);
                }
            }
        }
    });
}

async fn persist(store: Option<&CheckpointStore>, entry: &Entry) {
    let (Some(store), Some(snapshot)) = (store, &entry.snapshot) else {
        return;
    };
    let record = match StoredCheckpoint::new(
        &entry.id,
        entry.created,
        entry.timeout,
        entry.wall_deadline(),
        snapshot,
    ) {
        Ok(record) => record,
        Err(e) => {
            warn!("failed to persist checkpoint {}: {}", entry.id, e);
            return;
        }
    };
    if let Err(e) = store.save(&record).await {
        warn!("failed to persist checkpoint {}: {}", entry.id, e);
    }
}
