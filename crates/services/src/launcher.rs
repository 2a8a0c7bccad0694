use tracing::info;
use url::Url;

use exam_core::Clock;
use exam_core::model::{SimulationDescriptor, SimulationId};
use exam_core::route::route_path;

use crate::error::LaunchError;
use crate::progress::{ConflictResolver, ResetReport};
use crate::tab_scope::{LaunchToken, TabScope};

const ROUTE_BASE: &str = "https://exam.local/";

/// Where to navigate after an explicit start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub url: Url,
    pub reset: ResetReport,
}

/// Entry point for the user's "start" and "continue" actions.
#[derive(Clone)]
pub struct SimulationLauncher {
    resolver: ConflictResolver,
    scope: TabScope,
    clock: Clock,
    force_exam: bool,
}

impl SimulationLauncher {
    #[must_use]
    pub fn new(resolver: ConflictResolver, scope: TabScope, clock: Clock, force_exam: bool) -> Self {
        Self {
            resolver,
            scope,
            clock,
            force_exam,
        }
    }

    /// Start a new attempt: clear other simulations' unfinished progress,
    /// hand the descriptor to the next mount and build its route.
    ///
    /// With `fresh` the route carries the one-shot reset marker, so this
    /// simulation's own progress is discarded on mount as well.
    ///
    /// # Errors
    ///
    /// Returns `LaunchError::Route` if the route cannot be built.
    pub async fn start(
        &self,
        descriptor: SimulationDescriptor,
        fresh: bool,
    ) -> Result<Launch, LaunchError> {
        let descriptor = descriptor.with_forced_exam_mode(self.force_exam);
        let reset = self
            .resolver
            .reset_conflicting_progress(descriptor.simulation_id())
            .await;

        let mut url = route_url(&route_path(&descriptor))?;
        if fresh {
            url.query_pairs_mut().append_pair("reset", "1");
        }
        info!(
            simulation_id = %descriptor.simulation_id(),
            fresh,
            cleared = reset.cleared.len(),
            "simulation started"
        );
        self.scope.issue(LaunchToken {
            descriptor,
            issued_at: self.clock.now(),
        });
        Ok(Launch { url, reset })
    }

    /// Route that resumes `id` without touching any other simulation's progress.
    ///
    /// # Errors
    ///
    /// Returns `LaunchError::Route` if the route cannot be built.
    pub fn resume_url(&self, id: &SimulationId) -> Result<Url, LaunchError> {
        let mut url = route_url("/simulation/resume/")?;
        url.path_segments_mut()
            .map_err(|()| LaunchError::Route(ROUTE_BASE.to_owned()))?
            .pop_if_empty()
            .push(id.as_str());
        url.query_pairs_mut().append_pair("continue", "1");
        Ok(url)
    }
}

fn route_url(path: &str) -> Result<Url, LaunchError> {
    Url::parse(ROUTE_BASE)
        .and_then(|base| base.join(path))
        .map_err(|e| LaunchError::Route(e.to_string()))
}
