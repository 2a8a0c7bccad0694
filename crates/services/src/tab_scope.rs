//! Per-tab scope: short-lived launch tokens and one-shot telemetry markers.
//!
//! Lives as long as the browsing tab (or terminal process) and survives a
//! controller remount, but not a new tab.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use exam_core::model::{SimulationDescriptor, SimulationId};

/// Typed hand-off from an explicit "start" action to the controller that mounts next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchToken {
    pub descriptor: SimulationDescriptor,
    pub issued_at: DateTime<Utc>,
}

/// Telemetry milestone that may be emitted once per simulation per tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Milestone {
    Start,
    Progress(u8),
    Complete,
}

#[derive(Default)]
struct TabState {
    tokens: HashMap<SimulationId, LaunchToken>,
    markers: HashSet<(SimulationId, Milestone)>,
}

#[derive(Clone, Default)]
pub struct TabScope {
    state: Arc<Mutex<TabState>>,
}

impl TabScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // The state is plain data; a poisoned lock still holds a consistent map.
    fn lock(&self) -> MutexGuard<'_, TabState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a launch token, replacing any earlier token for the same id.
    pub fn issue(&self, token: LaunchToken) {
        let id = token.descriptor.simulation_id().clone();
        self.lock().tokens.insert(id, token);
    }

    /// Claim and clear the token for `id`. A second claim returns `None`.
    pub fn claim(&self, id: &SimulationId) -> Option<LaunchToken> {
        self.lock().tokens.remove(id)
    }

    /// Drop tokens for every simulation other than `keep`, returning how many went.
    pub fn clear_foreign_tokens(&self, keep: &SimulationId) -> usize {
        let mut state = self.lock();
        let before = state.tokens.len();
        state.tokens.retain(|id, _| id == keep);
        before - state.tokens.len()
    }

    /// Record `milestone` for `id`; true only the first time.
    pub fn mark_once(&self, id: &SimulationId, milestone: Milestone) -> bool {
        self.lock().markers.insert((id.clone(), milestone))
    }

    #[must_use]
    pub fn is_marked(&self, id: &SimulationId, milestone: Milestone) -> bool {
        self.lock().markers.contains(&(id.clone(), milestone))
    }
}
