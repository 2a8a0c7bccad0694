//! Tiered progress persistence: local first, remote best effort.

mod conflict;

pub use conflict::{ConflictResolver, ResetReport};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use exam_core::Clock;
use exam_core::model::{ProgressRecord, SimulationId};
use storage::repository::{ProgressRepository, StorageError};

/// Which tiers accepted a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveReport {
    pub local: bool,
    /// `None` when the remote tier was skipped (offline or signed out).
    pub remote: Option<bool>,
}

/// The single progress repository the controller talks to.
///
/// Writes go to the local tier and, when a user is signed in and the store is
/// online, to the remote tier. Reads consult both and keep the record with the
/// newest `updated_at`. Tier failures are logged and never surface.
///
/// A clear the remote tier did not see (offline, unreachable) leaves a
/// tombstone stamped with the clear time. Remote records no newer than the
/// tombstone are ignored, and the delete is replayed on the next operation
/// that finds the remote reachable.
pub struct ProgressStore {
    local: Arc<dyn ProgressRepository>,
    remote: Option<Arc<dyn ProgressRepository>>,
    online: AtomicBool,
    clock: Clock,
    tombstones: Mutex<BTreeMap<SimulationId, DateTime<Utc>>>,
}

impl ProgressStore {
    #[must_use]
    pub fn local_only(local: Arc<dyn ProgressRepository>) -> Self {
        Self {
            local,
            remote: None,
            online: AtomicBool::new(true),
            clock: Clock::system(),
            tombstones: Mutex::new(BTreeMap::new()),
        }
    }

    /// Stamp tombstones with `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_remote(mut self, remote: Arc<dyn ProgressRepository>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    fn remote(&self) -> Option<&Arc<dyn ProgressRepository>> {
        self.remote.as_ref().filter(|_| self.is_online())
    }

    fn tombstones(&self) -> MutexGuard<'_, BTreeMap<SimulationId, DateTime<Utc>>> {
        self.tombstones
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Ids whose clear has not reached the remote tier yet.
    #[must_use]
    pub fn pending_clears(&self) -> Vec<SimulationId> {
        self.tombstones().keys().cloned().collect()
    }

    /// True when `id` was cleared locally at or after `updated_at`.
    fn buried(&self, id: &SimulationId, updated_at: DateTime<Utc>) -> bool {
        self.tombstones()
            .get(id)
            .is_some_and(|cleared_at| *cleared_at >= updated_at)
    }

    /// Replay pending clears against the remote tier, if it is reachable.
    ///
    /// A remote record written after the clear (another device kept going)
    /// wins and is left alone. Stops at the first failure and keeps the
    /// remaining tombstones for the next attempt.
    pub async fn replay_pending_clears(&self) {
        let Some(remote) = self.remote() else {
            return;
        };
        let pending: Vec<(SimulationId, DateTime<Utc>)> = self
            .tombstones()
            .iter()
            .map(|(id, at)| (id.clone(), *at))
            .collect();

        for (id, cleared_at) in pending {
            let outcome = match remote.read(&id).await {
                Ok(Some(record)) if record.updated_at() > cleared_at => Ok(()),
                Ok(None) => Ok(()),
                Ok(Some(_)) => remote.clear(&id).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(()) => {
                    debug!(simulation_id = %id, "replayed pending progress clear");
                    let mut tombstones = self.tombstones();
                    // a newer clear may have landed while the remote call was in flight
                    if tombstones.get(&id) == Some(&cleared_at) {
                        tombstones.remove(&id);
                    }
                }
                Err(err) => {
                    warn!(simulation_id = %id, error = %err, "pending progress clear not replayed");
                    return;
                }
            }
        }
    }

    /// Write `record` to every reachable tier.
    pub async fn save(&self, record: &ProgressRecord) -> SaveReport {
        self.replay_pending_clears().await;
        let id = record.simulation_id();
        let local = match self.local.write(record).await {
            Ok(()) => true,
            Err(err) => {
                warn!(simulation_id = %id, error = %err, "local progress write failed");
                false
            }
        };
        let remote = match self.remote() {
            Some(remote) => Some(match remote.write(record).await {
                Ok(()) => true,
                Err(err) => {
                    warn!(simulation_id = %id, error = %err, "remote progress write failed");
                    false
                }
            }),
            None => None,
        };
        SaveReport { local, remote }
    }

    async fn read_local(&self, id: &SimulationId) -> Option<ProgressRecord> {
        self.local.read(id).await.unwrap_or_else(|err| {
            warn!(simulation_id = %id, error = %err, "local progress read failed");
            None
        })
    }

    async fn read_remote(&self, id: &SimulationId) -> Option<ProgressRecord> {
        let remote = self.remote()?;
        let record = remote.read(id).await.unwrap_or_else(|err| {
            warn!(simulation_id = %id, error = %err, "remote progress read failed");
            None
        })?;
        if self.buried(id, record.updated_at()) {
            debug!(simulation_id = %id, "ignoring remote progress cleared locally");
            return None;
        }
        Some(record)
    }
}

#[async_trait]
impl ProgressRepository for ProgressStore {
    async fn read(&self, id: &SimulationId) -> Result<Option<ProgressRecord>, StorageError> {
        self.replay_pending_clears().await;
        let local = self.read_local(id).await;
        let remote = self.read_remote(id).await;

        let merged = match (local, remote) {
            (Some(local), Some(remote)) if remote.updated_at() > local.updated_at() => {
                debug!(simulation_id = %id, "remote progress is newer, refreshing local copy");
                if let Err(err) = self.local.write(&remote).await {
                    warn!(simulation_id = %id, error = %err, "local progress refresh failed");
                }
                Some(remote)
            }
            (Some(local), _) => Some(local),
            (None, remote) => remote,
        };
        Ok(merged)
    }

    async fn write(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        self.save(record).await;
        Ok(())
    }

    async fn clear(&self, id: &SimulationId) -> Result<(), StorageError> {
        if let Err(err) = self.local.clear(id).await {
            warn!(simulation_id = %id, error = %err, "local progress clear failed");
        }
        if self.remote.is_none() {
            return Ok(());
        }
        if let Some(remote) = self.remote() {
            match remote.clear(id).await {
                Ok(()) => {
                    self.tombstones().remove(id);
                    return Ok(());
                }
                Err(err) => {
                    warn!(simulation_id = %id, error = %err, "remote progress clear failed");
                }
            }
        }
        debug!(simulation_id = %id, "remote clear deferred");
        self.tombstones().insert(id.clone(), self.clock.now());
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<SimulationId>, StorageError> {
        self.replay_pending_clears().await;
        let mut ids = BTreeSet::new();
        match self.local.list_ids().await {
            Ok(local) => ids.extend(local),
            Err(err) => warn!(error = %err, "local progress listing failed"),
        }
        if let Some(remote) = self.remote() {
            match remote.list_ids().await {
                Ok(remote) => ids.extend(remote),
                Err(err) => warn!(error = %err, "remote progress listing failed"),
            }
        }
        Ok(ids.into_iter().collect())
    }
}
