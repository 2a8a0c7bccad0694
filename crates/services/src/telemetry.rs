//! Lifecycle analytics: fire-and-forget events with once-per-tab milestones.

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{info, warn};

use exam_core::model::{SimulationId, SimulationMode};
use exam_core::session::SimulationSession;

use crate::tab_scope::{Milestone, TabScope};

const PROGRESS_THRESHOLDS: [u8; 3] = [25, 50, 75];

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryKind {
    Start,
    Progress {
        completion_rate: u8,
    },
    Complete {
        score: u32,
        questions_answered: usize,
        questions_correct: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub simulation_id: SimulationId,
    pub mode: SimulationMode,
    pub premium: bool,
    pub kind: TelemetryKind,
}

impl TelemetryEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self.kind {
            TelemetryKind::Start => "simulation_start",
            TelemetryKind::Progress { .. } => "simulation_progress",
            TelemetryKind::Complete { .. } => "simulation_complete",
        }
    }
}

#[derive(Debug, Error)]
#[error("telemetry delivery failed: {0}")]
pub struct TelemetryError(pub String);

/// Destination for lifecycle events. Failures never reach the session.
pub trait TelemetrySink: Send + Sync {
    /// # Errors
    ///
    /// Returns `TelemetryError` if the event could not be delivered.
    fn emit(&self, event: &TelemetryEvent) -> Result<(), TelemetryError>;
}

/// Writes events to the tracing pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn emit(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        match &event.kind {
            TelemetryKind::Start => info!(
                event = event.name(),
                simulation_id = %event.simulation_id,
                mode = %event.mode,
                premium = event.premium,
            ),
            TelemetryKind::Progress { completion_rate } => info!(
                event = event.name(),
                simulation_id = %event.simulation_id,
                mode = %event.mode,
                premium = event.premium,
                completion_rate,
            ),
            TelemetryKind::Complete {
                score,
                questions_answered,
                questions_correct,
            } => info!(
                event = event.name(),
                simulation_id = %event.simulation_id,
                mode = %event.mode,
                premium = event.premium,
                score,
                questions_answered,
                questions_correct,
            ),
        }
        Ok(())
    }
}

/// Keeps every event in memory; used by tests and the terminal summary.
#[derive(Debug, Clone, Default)]
pub struct RecordingTelemetry {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
}

impl RecordingTelemetry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.events().iter().filter(|e| e.name() == name).count()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn emit(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

/// Fans out to several sinks; one failing sink does not starve the others.
#[derive(Clone, Default)]
pub struct FanoutTelemetry {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutTelemetry {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }
}

impl TelemetrySink for FanoutTelemetry {
    fn emit(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(err) = sink.emit(event) {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Decides which lifecycle events a session state warrants.
///
/// Runs after every state change; the tab-scoped markers make each event
/// fire at most once per simulation.
#[derive(Clone)]
pub struct MilestoneTracker {
    sink: Arc<dyn TelemetrySink>,
    scope: TabScope,
    premium: bool,
}

impl MilestoneTracker {
    #[must_use]
    pub fn new(sink: Arc<dyn TelemetrySink>, scope: TabScope, premium: bool) -> Self {
        Self {
            sink,
            scope,
            premium,
        }
    }

    pub fn observe(&self, session: &SimulationSession, mode: SimulationMode) {
        let id = session.simulation_id();
        let breakdown = session.breakdown();

        if !session.is_complete()
            && session.current_index() == 0
            && self.scope.mark_once(id, Milestone::Start)
        {
            self.send(id, mode, TelemetryKind::Start);
        }

        let rate = breakdown.completion_rate();
        for threshold in PROGRESS_THRESHOLDS {
            if rate >= f64::from(threshold)
                && self.scope.mark_once(id, Milestone::Progress(threshold))
            {
                self.send(
                    id,
                    mode,
                    TelemetryKind::Progress {
                        completion_rate: threshold,
                    },
                );
            }
        }

        if session.is_complete() && self.scope.mark_once(id, Milestone::Complete) {
            self.send(
                id,
                mode,
                TelemetryKind::Complete {
                    score: breakdown.display_score(),
                    questions_answered: breakdown.answered,
                    questions_correct: breakdown.correct,
                },
            );
        }
    }

    fn send(&self, id: &SimulationId, mode: SimulationMode, kind: TelemetryKind) {
        let event = TelemetryEvent {
            simulation_id: id.clone(),
            mode,
            premium: self.premium,
            kind,
        };
        if let Err(err) = self.sink.emit(&event) {
            warn!(event = event.name(), error = %err, "telemetry dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{
        Difficulty, ModeParams, Question, QuestionId, QuestionTags, QuestionType,
        SimulationDescriptor, TopicId,
    };
    use exam_core::time::fixed_now;

    struct BrokenSink;

    impl TelemetrySink for BrokenSink {
        fn emit(&self, _event: &TelemetryEvent) -> Result<(), TelemetryError> {
            Err(TelemetryError("collector offline".into()))
        }
    }

    fn session(n: u64) -> SimulationSession {
        let descriptor = SimulationDescriptor::new(ModeParams::Topic {
            topic_id: TopicId::new(1),
        })
        .unwrap();
        let questions = (0..n)
            .map(|i| {
                Question::new(
                    QuestionId::new(i + 1),
                    format!("Q{i}"),
                    vec!["a".into(), "b".into()],
                    0,
                    None,
                    QuestionTags {
                        kind: QuestionType::Restatement,
                        difficulty: Difficulty::Easy,
                        topic_id: Some(TopicId::new(1)),
                        story_id: None,
                    },
                )
                .unwrap()
            })
            .collect();
        SimulationSession::fresh(&descriptor, questions, 60).unwrap()
    }

    fn answer(session: &mut SimulationSession, option: usize) {
        session.select_answer(option).unwrap();
        session.submit_answer().unwrap();
        session.next_question(fixed_now()).unwrap();
    }

    #[test]
    fn thresholds_fire_once_each() {
        let sink = RecordingTelemetry::new();
        let tracker = MilestoneTracker::new(Arc::new(sink.clone()), TabScope::new(), true);
        let mut session = session(4);

        tracker.observe(&session, SimulationMode::Topic);
        tracker.observe(&session, SimulationMode::Topic);
        for option in [0, 1, 0, 0] {
            answer(&mut session, option);
            tracker.observe(&session, SimulationMode::Topic);
            tracker.observe(&session, SimulationMode::Topic);
        }

        let names: Vec<_> = sink.events().iter().map(TelemetryEvent::name).collect();
        assert_eq!(
            names,
            vec![
                "simulation_start",
                "simulation_progress",
                "simulation_progress",
                "simulation_progress",
                "simulation_complete",
            ]
        );
        let last = sink.events().pop().unwrap();
        assert!(last.premium);
        assert_eq!(
            last.kind,
            TelemetryKind::Complete {
                score: 75,
                questions_answered: 4,
                questions_correct: 3,
            }
        );
    }

    #[test]
    fn jump_past_several_thresholds_emits_each() {
        let sink = RecordingTelemetry::new();
        let tracker = MilestoneTracker::new(Arc::new(sink.clone()), TabScope::new(), false);
        let mut session = session(2);
        answer(&mut session, 0);
        tracker.observe(&session, SimulationMode::Topic);

        let rates: Vec<_> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e.kind {
                TelemetryKind::Progress { completion_rate } => Some(completion_rate),
                _ => None,
            })
            .collect();
        assert_eq!(rates, vec![25, 50]);
        assert_eq!(sink.count("simulation_start"), 0);
    }

    #[test]
    fn sink_failure_does_not_panic_or_block_other_sinks() {
        let recording = RecordingTelemetry::new();
        let fanout = FanoutTelemetry::new(vec![Arc::new(BrokenSink), Arc::new(recording.clone())]);
        let tracker = MilestoneTracker::new(Arc::new(fanout), TabScope::new(), false);

        tracker.observe(&session(3), SimulationMode::Topic);
        assert_eq!(recording.count("simulation_start"), 1);
    }
}
