use std::sync::Arc;

use url::Url;

use exam_core::model::SimulationId;
use exam_core::route::{LaunchRequest, RouteError, parse_route};
use storage::repository::{ProgressRepository, QuestionCatalog, Storage};

use crate::Clock;
use crate::config::EngineConfig;
use crate::error::AppServicesError;
use crate::launcher::SimulationLauncher;
use crate::progress::{ConflictResolver, ProgressStore};
use crate::questions::QuestionSupplier;
use crate::sessions::{SessionContext, SessionController};
use crate::tab_scope::TabScope;
use crate::telemetry::{MilestoneTracker, TelemetrySink, TracingTelemetry};

/// Assembles the engine's collaborators for one app instance (one tab).
#[derive(Clone)]
pub struct AppServices {
    config: EngineConfig,
    clock: Clock,
    questions: Arc<dyn QuestionCatalog>,
    store: Arc<ProgressStore>,
    scope: TabScope,
    telemetry: Arc<dyn TelemetrySink>,
    premium: bool,
}

impl AppServices {
    /// Wire services over `storage`, with `remote` as the signed-in user's
    /// remote tier when present.
    #[must_use]
    pub fn new(
        storage: Storage,
        remote: Option<Arc<dyn ProgressRepository>>,
        clock: Clock,
        config: EngineConfig,
    ) -> Self {
        let mut store = ProgressStore::local_only(storage.progress).with_clock(clock);
        if let Some(remote) = remote {
            store = store.with_remote(remote);
        }
        Self {
            config,
            clock,
            questions: storage.questions,
            store: Arc::new(store),
            scope: TabScope::new(),
            telemetry: Arc::new(TracingTelemetry),
            premium: false,
        }
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        remote: Option<Arc<dyn ProgressRepository>>,
        clock: Clock,
        config: EngineConfig,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(storage, remote, clock, config))
    }

    /// Route lifecycle events to `sink`, tagged with the user's entitlement.
    #[must_use]
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>, premium: bool) -> Self {
        self.telemetry = sink;
        self.premium = premium;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn questions(&self) -> Arc<dyn QuestionCatalog> {
        Arc::clone(&self.questions)
    }

    #[must_use]
    pub fn progress_store(&self) -> Arc<ProgressStore> {
        Arc::clone(&self.store)
    }

    #[must_use]
    pub fn tab_scope(&self) -> TabScope {
        self.scope.clone()
    }

    #[must_use]
    pub fn launcher(&self) -> SimulationLauncher {
        SimulationLauncher::new(
            ConflictResolver::new(Arc::clone(&self.store), self.scope.clone()),
            self.scope.clone(),
            self.clock,
            self.config.force_exam_mode,
        )
    }

    /// A fresh controller for the next mount.
    #[must_use]
    pub fn controller(&self) -> SessionController {
        SessionController::new(SessionContext {
            supplier: QuestionSupplier::new(self.questions.clone(), &self.config),
            store: Arc::clone(&self.store),
            scope: self.scope.clone(),
            milestones: MilestoneTracker::new(
                Arc::clone(&self.telemetry),
                self.scope.clone(),
                self.premium,
            ),
            clock: self.clock,
            config: self.config.clone(),
        })
    }

    /// Parse a navigation URL, claiming its reset marker.
    ///
    /// # Errors
    ///
    /// Returns `RouteError` for anything that is not a simulation route.
    pub fn parse_launch(&self, url: &mut Url) -> Result<LaunchRequest, RouteError> {
        parse_route(url, self.config.quick_practice_default_limit)
    }

    /// Whether `id` has progress worth offering a "continue" for.
    pub async fn resumable(&self, id: &SimulationId) -> bool {
        self.store.has_progress(id).await.unwrap_or(false)
    }
}
