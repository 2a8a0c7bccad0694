use std::sync::Arc;

use tracing::{info, warn};

use exam_core::model::SimulationId;
use storage::repository::ProgressRepository;

use super::ProgressStore;
use crate::tab_scope::TabScope;

/// What a conflict reset removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub cleared: Vec<SimulationId>,
    pub tokens_dropped: usize,
}

impl ResetReport {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.cleared.is_empty() && self.tokens_dropped == 0
    }
}

/// Invalidates in-flight attempts of other simulations when a new one is started.
///
/// Only explicit starts call this; resuming or merely viewing never does.
#[derive(Clone)]
pub struct ConflictResolver {
    store: Arc<ProgressStore>,
    scope: TabScope,
}

impl ConflictResolver {
    #[must_use]
    pub fn new(store: Arc<ProgressStore>, scope: TabScope) -> Self {
        Self { store, scope }
    }

    /// Clear every unfinished record whose id is not `starting`, in both tiers,
    /// along with launch tokens left behind for those simulations.
    ///
    /// Finished attempts are kept. Idempotent.
    pub async fn reset_conflicting_progress(&self, starting: &SimulationId) -> ResetReport {
        let tokens_dropped = self.scope.clear_foreign_tokens(starting);
        let ids = self.store.list_ids().await.unwrap_or_default();

        let mut cleared = Vec::new();
        for id in ids.into_iter().filter(|id| id != starting) {
            let active = match self.store.read(&id).await {
                Ok(record) => record.is_some_and(|record| !record.simulation_complete()),
                Err(err) => {
                    warn!(simulation_id = %id, error = %err, "could not inspect progress");
                    false
                }
            };
            if !active {
                continue;
            }
            if let Err(err) = self.store.clear(&id).await {
                warn!(simulation_id = %id, error = %err, "could not clear conflicting progress");
                continue;
            }
            cleared.push(id);
        }

        if !cleared.is_empty() {
            info!(
                starting = %starting,
                cleared = cleared.len(),
                "cleared conflicting progress"
            );
        }
        ResetReport {
            cleared,
            tokens_dropped,
        }
    }
}
