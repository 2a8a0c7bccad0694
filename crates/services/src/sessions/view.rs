use exam_core::model::{QuestionId, SimulationId, SimulationMode};
use exam_core::scoring::ScoreBreakdown;
use exam_core::session::SimulationSession;

use super::controller::SessionPhase;

/// The question as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionView {
    pub id: QuestionId,
    pub prompt: String,
    pub options: Vec<String>,
    /// Revealed after submission in practice modes only.
    pub explanation: Option<String>,
    pub correct_option: Option<usize>,
}

/// Read-only snapshot of a controller for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub simulation_id: SimulationId,
    pub mode: SimulationMode,
    pub exam_mode: bool,
    pub phase: SessionPhase,
    pub current_index: usize,
    pub total: usize,
    pub question: Option<QuestionView>,
    pub selection: Option<usize>,
    pub submitted: Option<usize>,
    pub locked: bool,
    pub flagged: bool,
    pub flags: Vec<usize>,
    pub remaining_time: Option<u32>,
    pub breakdown: ScoreBreakdown,
}

impl SessionView {
    pub(crate) fn build(session: &SimulationSession, mode: SimulationMode, phase: SessionPhase) -> Self {
        let index = session.current_index();
        let submitted = session.answers().get(&index).copied();
        let reveal = submitted.is_some() && !session.exam_mode();
        let question = session.current_question().map(|q| QuestionView {
            id: q.id(),
            prompt: q.prompt().to_owned(),
            options: q.options().to_vec(),
            explanation: reveal.then(|| q.explanation().map(str::to_owned)).flatten(),
            correct_option: reveal.then(|| q.correct_option()),
        });

        Self {
            simulation_id: session.simulation_id().clone(),
            mode,
            exam_mode: session.exam_mode(),
            phase,
            current_index: index,
            total: session.total_questions(),
            question,
            selection: session.selection(),
            submitted,
            locked: session.is_locked(index),
            flagged: session.flags().contains(&index),
            flags: session.flags().iter().copied().collect(),
            remaining_time: session.remaining_time(),
            breakdown: session.breakdown(),
        }
    }

    #[must_use]
    pub fn display_score(&self) -> u32 {
        self.breakdown.display_score()
    }
}
