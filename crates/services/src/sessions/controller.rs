use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use exam_core::model::{Question, SimulationDescriptor, SimulationId, SimulationMode};
use exam_core::route::{LaunchRequest, RouteTarget};
use exam_core::session::{SessionError, SimulationSession, Transition};
use storage::repository::ProgressRepository;

use super::view::SessionView;
use crate::Clock;
use crate::config::EngineConfig;
use crate::error::{ControllerError, SupplierError};
use crate::progress::{ProgressStore, SaveReport};
use crate::questions::QuestionSupplier;
use crate::tab_scope::TabScope;
use crate::telemetry::MilestoneTracker;

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Non-error outcome shown when a mode has nothing to practise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyState {
    pub mode: SimulationMode,
    pub message: &'static str,
    /// Where the "back" affordance leads.
    pub back_target: &'static str,
}

impl EmptyState {
    #[must_use]
    pub fn for_mode(mode: SimulationMode) -> Self {
        let (message, back_target) = match mode {
            SimulationMode::Topic => ("No questions are available for this topic yet.", "/topics"),
            SimulationMode::Difficulty => (
                "No questions match this difficulty and question type yet.",
                "/practice/difficulty",
            ),
            SimulationMode::Story => ("This story has no questions yet.", "/stories"),
            SimulationMode::QuestionSet => ("This page of the question set is empty.", "/sets"),
            SimulationMode::QuickPractice => {
                ("No questions of this type are available.", "/practice")
            }
            SimulationMode::FullExam => ("The exam question pool is empty.", "/"),
        };
        Self {
            mode,
            message,
            back_target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Loading,
    Active,
    Empty(EmptyState),
    Complete,
}

/// How a mount resolved its starting state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    Resumed,
    Fresh,
    /// Fresh start after an explicit reset request.
    Reset,
    Empty,
}

/// One-time, user-visible notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    ProgressReset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountReport {
    pub simulation_id: SimulationId,
    pub decision: ResumeDecision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing was written: progress not loaded yet, or no session.
    Skipped,
    Saved(SaveReport),
}

/// Collaborators shared by every controller of one app instance.
#[derive(Clone)]
pub struct SessionContext {
    pub supplier: QuestionSupplier,
    pub store: Arc<ProgressStore>,
    pub scope: TabScope,
    pub milestones: MilestoneTracker,
    pub clock: Clock,
    pub config: EngineConfig,
}

struct ControllerState {
    phase: SessionPhase,
    descriptor: Option<SimulationDescriptor>,
    session: Option<SimulationSession>,
    progress_loaded: bool,
    notice: Option<Notice>,
}

impl ControllerState {
    fn loading(descriptor: Option<SimulationDescriptor>) -> Self {
        Self {
            phase: SessionPhase::Loading,
            descriptor,
            session: None,
            progress_loaded: false,
            notice: None,
        }
    }
}

struct Shared {
    ctx: SessionContext,
    state: Mutex<ControllerState>,
    // serializes writes so an older snapshot never lands after a newer one
    save_lock: Mutex<()>,
    changes: watch::Sender<u64>,
}

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

/// Runs one attempt: mount-time resume resolution, the answer/navigate loop,
/// completion, restart and persistence.
///
/// Cheap to clone; clones drive the same attempt (the runtime's timer and
/// auto-save tasks hold clones).
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    #[must_use]
    pub fn new(ctx: SessionContext) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                ctx,
                state: Mutex::new(ControllerState::loading(None)),
                save_lock: Mutex::new(()),
                changes,
            }),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.shared.ctx.clock.now()
    }

    fn descriptor_for(&self, request: &LaunchRequest) -> Result<SimulationDescriptor, ControllerError> {
        let scope = &self.shared.ctx.scope;
        let descriptor = match &request.target {
            RouteTarget::Descriptor(descriptor) => scope
                .claim(descriptor.simulation_id())
                .map_or_else(|| descriptor.clone(), |token| token.descriptor),
            RouteTarget::Resume(id) => match scope.claim(id) {
                Some(token) => token.descriptor,
                None => SimulationDescriptor::from_simulation_id(id)?,
            },
        };
        let forced = request.force_exam || self.shared.ctx.config.force_exam_mode;
        Ok(descriptor.with_forced_exam_mode(forced))
    }

    /// Resolve questions and progress for `request` and enter `Active` (or `Empty`).
    ///
    /// Saves are no-ops until this returns, so a stored attempt can never be
    /// overwritten by a not-yet-restored fresh state.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::Descriptor` if a resume route names an id no
    /// mode produces.
    pub async fn mount(&self, request: &LaunchRequest) -> Result<MountReport, ControllerError> {
        let descriptor = self.descriptor_for(request)?;
        let id = descriptor.simulation_id().clone();
        *self.shared.state.lock().await = ControllerState::loading(Some(descriptor.clone()));

        let Some(questions) = self.resolve_questions(&descriptor).await else {
            return Ok(MountReport {
                simulation_id: id,
                decision: ResumeDecision::Empty,
            });
        };

        let store = &self.shared.ctx.store;
        let exam_secs = self.shared.ctx.config.exam_duration_secs;
        let (session, decision) = if request.reset_requested {
            store.clear(&id).await?;
            info!(simulation_id = %id, "progress reset requested, starting fresh");
            (
                SimulationSession::fresh(&descriptor, questions, exam_secs)?,
                ResumeDecision::Reset,
            )
        } else {
            match store.read(&id).await? {
                Some(record) if record.has_resumable_progress() => {
                    match SimulationSession::resume(&descriptor, questions.clone(), &record, exam_secs)
                    {
                        Ok(session) => {
                            info!(
                                simulation_id = %id,
                                index = session.current_index(),
                                "resumed progress"
                            );
                            (session, ResumeDecision::Resumed)
                        }
                        Err(err) => {
                            warn!(simulation_id = %id, error = %err, "discarding unusable progress");
                            store.clear(&id).await?;
                            (
                                SimulationSession::fresh(&descriptor, questions, exam_secs)?,
                                ResumeDecision::Fresh,
                            )
                        }
                    }
                }
                _ => {
                    debug!(simulation_id = %id, continue_requested = request.continue_requested, "starting fresh");
                    (
                        SimulationSession::fresh(&descriptor, questions, exam_secs)?,
                        ResumeDecision::Fresh,
                    )
                }
            }
        };

        let notice = (decision == ResumeDecision::Reset).then_some(Notice::ProgressReset);
        self.install(descriptor.mode(), session, notice).await;
        Ok(MountReport {
            simulation_id: id,
            decision,
        })
    }

    async fn resolve_questions(
        &self,
        descriptor: &SimulationDescriptor,
    ) -> Option<Vec<Question>> {
        match self.shared.ctx.supplier.resolve(descriptor).await {
            Ok(questions) => Some(questions),
            Err(err) => {
                if !matches!(err, SupplierError::Empty) {
                    warn!(simulation_id = %descriptor.simulation_id(), error = %err, "question resolution failed");
                }
                let mut state = self.shared.state.lock().await;
                state.phase = SessionPhase::Empty(EmptyState::for_mode(descriptor.mode()));
                None
            }
        }
    }

    async fn install(&self, mode: SimulationMode, session: SimulationSession, notice: Option<Notice>) {
        let mut state = self.shared.state.lock().await;
        self.shared.ctx.milestones.observe(&session, mode);
        state.phase = if session.is_complete() {
            SessionPhase::Complete
        } else {
            SessionPhase::Active
        };
        state.session = Some(session);
        state.notice = notice;
        state.progress_loaded = true;
    }

    async fn apply<F>(&self, action: F) -> Result<Transition, ControllerError>
    where
        F: FnOnce(&mut SimulationSession, DateTime<Utc>) -> Result<Transition, SessionError>,
    {
        let now = self.now();
        let transition = {
            let mut state = self.shared.state.lock().await;
            if state.phase != SessionPhase::Active {
                return Err(ControllerError::NotActive);
            }
            let mode = state
                .descriptor
                .as_ref()
                .map(SimulationDescriptor::mode)
                .ok_or(ControllerError::NotActive)?;
            let session = state.session.as_mut().ok_or(ControllerError::NotActive)?;

            let before = session.revision();
            let transition = action(session, now)?;
            let changed = session.revision() != before;
            self.shared.ctx.milestones.observe(session, mode);

            if transition == Transition::Completed {
                let breakdown = session.breakdown();
                info!(
                    simulation_id = %session.simulation_id(),
                    score = breakdown.display_score(),
                    correct = breakdown.correct,
                    total = breakdown.total,
                    "simulation complete"
                );
                state.phase = SessionPhase::Complete;
            }
            if changed {
                self.shared.changes.send_modify(|n| *n += 1);
            }
            transition
        };

        if transition == Transition::Completed {
            self.save_now().await;
        }
        Ok(transition)
    }

    /// # Errors
    ///
    /// Returns `ControllerError::NotActive` outside `Active`, or the session's
    /// own rejection (e.g. an option the question does not have).
    pub async fn select_answer(&self, option: usize) -> Result<Transition, ControllerError> {
        self.apply(|session, _| session.select_answer(option)).await
    }

    /// # Errors
    ///
    /// Returns `ControllerError::NotActive` outside `Active`.
    pub async fn submit_answer(&self) -> Result<Transition, ControllerError> {
        self.apply(|session, _| session.submit_answer()).await
    }

    /// # Errors
    ///
    /// Returns `ControllerError::NotActive` outside `Active`.
    pub async fn next_question(&self) -> Result<Transition, ControllerError> {
        self.apply(SimulationSession::next_question).await
    }

    /// # Errors
    ///
    /// Returns `ControllerError::Session` on the first question or when exam
    /// rules forbid going back.
    pub async fn previous_question(&self) -> Result<Transition, ControllerError> {
        self.apply(SimulationSession::previous_question).await
    }

    /// # Errors
    ///
    /// Returns `ControllerError::Session` for an index past the end or a
    /// locked exam question.
    pub async fn navigate_to(&self, index: usize) -> Result<Transition, ControllerError> {
        self.apply(|session, now| session.navigate_to(index, now)).await
    }

    /// # Errors
    ///
    /// Returns `ControllerError::NotActive` outside `Active`.
    pub async fn toggle_flag(&self) -> Result<Transition, ControllerError> {
        self.apply(|session, _| session.toggle_flag()).await
    }

    /// Advance the exam countdown by one second.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::NotActive` outside `Active`.
    pub async fn tick(&self) -> Result<Transition, ControllerError> {
        self.apply(|session, now| Ok(session.tick(now))).await
    }

    /// Throw away the finished attempt and start over with fresh state.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::NotComplete` unless the attempt is complete.
    pub async fn restart(&self) -> Result<MountReport, ControllerError> {
        let descriptor = {
            let mut state = self.shared.state.lock().await;
            if state.phase != SessionPhase::Complete {
                return Err(ControllerError::NotComplete);
            }
            let descriptor = state.descriptor.clone().ok_or(ControllerError::NotActive)?;
            *state = ControllerState::loading(Some(descriptor.clone()));
            descriptor
        };
        let id = descriptor.simulation_id().clone();

        self.shared.ctx.store.clear(&id).await?;
        info!(simulation_id = %id, "simulation restarted");

        let Some(questions) = self.resolve_questions(&descriptor).await else {
            return Ok(MountReport {
                simulation_id: id,
                decision: ResumeDecision::Empty,
            });
        };
        let session = SimulationSession::fresh(
            &descriptor,
            questions,
            self.shared.ctx.config.exam_duration_secs,
        )?;
        self.install(descriptor.mode(), session, None).await;
        self.shared.changes.send_modify(|n| *n += 1);
        Ok(MountReport {
            simulation_id: id,
            decision: ResumeDecision::Fresh,
        })
    }

    /// Persist the live session state to every reachable tier.
    ///
    /// The record is built from the state at the moment of writing, never
    /// from a snapshot taken when the save was scheduled.
    pub async fn save_now(&self) -> SaveOutcome {
        let _serial = self.shared.save_lock.lock().await;
        let record = {
            let state = self.shared.state.lock().await;
            if !state.progress_loaded {
                debug!("save skipped, progress not loaded");
                return SaveOutcome::Skipped;
            }
            let Some(session) = state.session.as_ref() else {
                return SaveOutcome::Skipped;
            };
            match session.to_record(self.now()) {
                Ok(record) => record,
                Err(err) => {
                    warn!(simulation_id = %session.simulation_id(), error = %err, "session produced an invalid record");
                    return SaveOutcome::Skipped;
                }
            }
        };
        SaveOutcome::Saved(self.shared.ctx.store.save(&record).await)
    }

    /// Final best-effort save, after which further saves are no-ops.
    pub async fn unmount(&self) -> SaveOutcome {
        let outcome = self.save_now().await;
        let mut state = self.shared.state.lock().await;
        state.progress_loaded = false;
        outcome
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.changes.subscribe()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.shared.state.lock().await.phase
    }

    pub async fn is_progress_loaded(&self) -> bool {
        self.shared.state.lock().await.progress_loaded
    }

    pub async fn exam_mode(&self) -> bool {
        self.shared
            .state
            .lock()
            .await
            .descriptor
            .as_ref()
            .is_some_and(SimulationDescriptor::exam_mode)
    }

    /// Claim the pending one-time notice, if any.
    pub async fn take_notice(&self) -> Option<Notice> {
        self.shared.state.lock().await.notice.take()
    }

    pub async fn view(&self) -> Option<SessionView> {
        let state = self.shared.state.lock().await;
        let mode = state.descriptor.as_ref()?.mode();
        let session = state.session.as_ref()?;
        Some(SessionView::build(session, mode, state.phase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::RecordingTelemetry;
    use exam_core::model::{ModeParams, TopicId};
    use exam_core::time::fixed_clock;
    use async_trait::async_trait;
    use storage::repository::{
        InMemoryProgressRepository, InMemoryQuestionBank, QuestionQuery, QuestionSource,
        StorageError,
    };

    /// Question provider that is always down.
    struct UnreachableSource;

    #[async_trait]
    impl QuestionSource for UnreachableSource {
        async fn fetch(&self, _query: &QuestionQuery) -> Result<Vec<Question>, StorageError> {
            Err(StorageError::Unavailable("question service offline".into()))
        }
    }

    fn context(source: impl QuestionSource + 'static) -> SessionContext {
        let scope = TabScope::new();
        let config = EngineConfig::default();
        SessionContext {
            supplier: QuestionSupplier::new(Arc::new(source), &config),
            store: Arc::new(ProgressStore::local_only(Arc::new(InMemoryProgressRepository::new()))),
            milestones: MilestoneTracker::new(Arc::new(RecordingTelemetry::new()), scope.clone(), false),
            scope,
            clock: fixed_clock(),
            config,
        }
    }

    fn topic_request(topic: u64) -> LaunchRequest {
        LaunchRequest {
            target: RouteTarget::Descriptor(
                SimulationDescriptor::new(ModeParams::Topic {
                    topic_id: TopicId::new(topic),
                })
                .unwrap(),
            ),
            reset_requested: false,
            continue_requested: false,
            force_exam: false,
        }
    }

    #[tokio::test]
    async fn empty_resolution_enters_empty_state_with_back_target() {
        let controller = SessionController::new(context(InMemoryQuestionBank::new()));
        let report = controller.mount(&topic_request(5)).await.unwrap();

        assert_eq!(report.decision, ResumeDecision::Empty);
        assert_eq!(
            controller.phase().await,
            SessionPhase::Empty(EmptyState::for_mode(SimulationMode::Topic))
        );
        assert_eq!(controller.save_now().await, SaveOutcome::Skipped);
        assert!(matches!(
            controller.select_answer(0).await,
            Err(ControllerError::NotActive)
        ));
    }

    #[tokio::test]
    async fn failing_question_source_enters_empty_state() {
        let controller = SessionController::new(context(UnreachableSource));
        let report = controller.mount(&topic_request(1)).await.unwrap();

        assert_eq!(report.decision, ResumeDecision::Empty);
        assert_eq!(
            controller.phase().await,
            SessionPhase::Empty(EmptyState::for_mode(SimulationMode::Topic))
        );
        assert!(controller.view().await.is_none());
        assert_eq!(controller.save_now().await, SaveOutcome::Skipped);
    }

    #[tokio::test]
    async fn unknown_resume_id_is_rejected() {
        let controller = SessionController::new(context(InMemoryQuestionBank::new()));
        let request = LaunchRequest {
            target: RouteTarget::Resume(SimulationId::from_persisted("bogus")),
            reset_requested: false,
            continue_requested: true,
            force_exam: false,
        };
        assert!(matches!(
            controller.mount(&request).await,
            Err(ControllerError::Descriptor(_))
        ));
    }

    #[tokio::test]
    async fn save_before_mount_is_skipped() {
        let controller = SessionController::new(context(InMemoryQuestionBank::new()));
        assert_eq!(controller.save_now().await, SaveOutcome::Skipped);
        assert!(controller.view().await.is_none());
    }
}
