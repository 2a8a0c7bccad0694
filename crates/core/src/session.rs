use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use crate::model::{
    ProgressDraft, ProgressRecord, ProgressRecordError, Question, SimulationDescriptor,
    SimulationId,
};
use crate::scoring::ScoreBreakdown;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no questions available for session")]
    Empty,

    #[error("session already completed")]
    Completed,

    #[error("option {option} does not exist (question has {count} options)")]
    InvalidOption { option: usize, count: usize },

    #[error("question index {index} is outside 0..={total}")]
    OutOfBounds { index: usize, total: usize },

    #[error("question {index} was already submitted and cannot be revisited in exam mode")]
    RevisitLocked { index: usize },

    #[error("stored progress belongs to {found}, expected {expected}")]
    ForeignRecord {
        expected: SimulationId,
        found: SimulationId,
    },

    #[error("stored progress covers {stored} questions but {resolved} were resolved")]
    QuestionCountMismatch { stored: usize, resolved: usize },

    #[error("stored progress was taken against a different question list")]
    QuestionSetChanged,
}

/// What a single user action did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing changed (repeated click, submit without selection, ...).
    Unchanged,
    Updated,
    /// The action moved the session into its terminal state.
    Completed,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// In-memory state of one attempt.
///
/// Pure and synchronous: persistence, timers and telemetry live in the
/// services layer and observe the session through [`Self::revision`] and
/// [`Self::to_record`].
#[derive(Clone)]
pub struct SimulationSession {
    simulation_id: SimulationId,
    exam_mode: bool,
    questions: Vec<Question>,
    fingerprint: String,
    current: usize,
    answers: BTreeMap<usize, usize>,
    flags: BTreeSet<usize>,
    selection: Option<usize>,
    // practice mode: question submitted during the current visit, still editable
    editable: Option<usize>,
    remaining_time: Option<u32>,
    complete: bool,
    completed_at: Option<DateTime<Utc>>,
    breakdown: ScoreBreakdown,
    revision: u64,
}

impl SimulationSession {
    /// Start a fresh attempt at the first question.
    ///
    /// `exam_duration_secs` seeds the countdown when the descriptor is in exam mode.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` if no questions are given.
    pub fn fresh(
        descriptor: &SimulationDescriptor,
        questions: Vec<Question>,
        exam_duration_secs: u32,
    ) -> Result<Self, SessionError> {
        if questions.is_empty() {
            return Err(SessionError::Empty);
        }
        let breakdown = ScoreBreakdown::compute(&questions, &BTreeMap::new());
        Ok(Self {
            simulation_id: descriptor.simulation_id().clone(),
            exam_mode: descriptor.exam_mode(),
            fingerprint: question_fingerprint(&questions),
            questions,
            current: 0,
            answers: BTreeMap::new(),
            flags: BTreeSet::new(),
            selection: None,
            editable: None,
            remaining_time: descriptor.exam_mode().then_some(exam_duration_secs),
            complete: false,
            completed_at: None,
            breakdown,
            revision: 0,
        })
    }

    /// Rebuild an attempt from a stored record.
    ///
    /// Score fields are recomputed from the answers; the stored score is not trusted.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` if no questions are given,
    /// `SessionError::ForeignRecord` if the record is for another simulation, and
    /// `SessionError::QuestionCountMismatch` if the question list changed size and
    /// `SessionError::QuestionSetChanged` if it holds different questions or
    /// the same ones in another order.
    pub fn resume(
        descriptor: &SimulationDescriptor,
        questions: Vec<Question>,
        record: &ProgressRecord,
        exam_duration_secs: u32,
    ) -> Result<Self, SessionError> {
        if record.simulation_id() != descriptor.simulation_id() {
            return Err(SessionError::ForeignRecord {
                expected: descriptor.simulation_id().clone(),
                found: record.simulation_id().clone(),
            });
        }
        if record.total_questions() != questions.len() {
            return Err(SessionError::QuestionCountMismatch {
                stored: record.total_questions(),
                resolved: questions.len(),
            });
        }

        let mut session = Self::fresh(descriptor, questions, exam_duration_secs)?;
        if record
            .question_fingerprint()
            .is_some_and(|stored| stored != session.fingerprint)
        {
            return Err(SessionError::QuestionSetChanged);
        }

        session.current = record.current_question_index();
        session.answers = record.user_answers().clone();
        session.flags = record.question_flags().clone();
        if session.exam_mode {
            session.remaining_time = record.remaining_time().or(session.remaining_time);
        }
        session.complete = record.simulation_complete();
        session.completed_at = record.completed_at();
        session.recompute();
        Ok(session)
    }

    #[must_use]
    pub fn simulation_id(&self) -> &SimulationId {
        &self.simulation_id
    }

    #[must_use]
    pub fn exam_mode(&self) -> bool {
        self.exam_mode
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<usize, usize> {
        &self.answers
    }

    #[must_use]
    pub fn flags(&self) -> &BTreeSet<usize> {
        &self.flags
    }

    /// Tentative, not yet submitted choice for the current question.
    #[must_use]
    pub fn selection(&self) -> Option<usize> {
        self.selection
    }

    #[must_use]
    pub fn remaining_time(&self) -> Option<u32> {
        self.remaining_time
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn breakdown(&self) -> ScoreBreakdown {
        self.breakdown
    }

    /// Bumped whenever the current index, the answers or completion change.
    ///
    /// Flags, selections and timer ticks leave it untouched.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// True when the answer for `index` can no longer be changed.
    #[must_use]
    pub fn is_locked(&self, index: usize) -> bool {
        self.answers.contains_key(&index) && (self.exam_mode || self.editable != Some(index))
    }

    /// Record a tentative choice for the current question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` once the attempt is finished and
    /// `SessionError::InvalidOption` for an option the question does not have.
    pub fn select_answer(&mut self, option: usize) -> Result<Transition, SessionError> {
        let question = self.active_question()?;
        let count = question.options().len();
        if option >= count {
            return Err(SessionError::InvalidOption { option, count });
        }
        if self.is_locked(self.current) || self.selection == Some(option) {
            return Ok(Transition::Unchanged);
        }
        self.selection = Some(option);
        Ok(Transition::Updated)
    }

    /// Submit the tentative choice as the answer to the current question.
    ///
    /// A submit without a selection is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` once the attempt is finished.
    pub fn submit_answer(&mut self) -> Result<Transition, SessionError> {
        self.active_question()?;
        let Some(option) = self.selection else {
            return Ok(Transition::Unchanged);
        };
        if self.is_locked(self.current) || self.answers.get(&self.current) == Some(&option) {
            return Ok(Transition::Unchanged);
        }

        self.answers.insert(self.current, option);
        if !self.exam_mode {
            self.editable = Some(self.current);
        }
        self.recompute();
        self.revision += 1;
        Ok(Transition::Updated)
    }

    /// # Errors
    ///
    /// See [`Self::navigate_to`].
    pub fn next_question(&mut self, now: DateTime<Utc>) -> Result<Transition, SessionError> {
        self.navigate_to(self.current + 1, now)
    }

    /// # Errors
    ///
    /// Returns `SessionError::OutOfBounds` on the first question, otherwise see
    /// [`Self::navigate_to`].
    pub fn previous_question(&mut self, now: DateTime<Utc>) -> Result<Transition, SessionError> {
        let Some(index) = self.current.checked_sub(1) else {
            return Err(SessionError::OutOfBounds {
                index: 0,
                total: self.questions.len(),
            });
        };
        self.navigate_to(index, now)
    }

    /// Jump to `index`. Moving to `index == total` completes the attempt.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` once finished, `SessionError::OutOfBounds`
    /// past the end, and `SessionError::RevisitLocked` when exam rules forbid
    /// returning to an already submitted question.
    pub fn navigate_to(
        &mut self,
        index: usize,
        now: DateTime<Utc>,
    ) -> Result<Transition, SessionError> {
        if self.complete {
            return Err(SessionError::Completed);
        }
        let total = self.questions.len();
        if index > total {
            return Err(SessionError::OutOfBounds { index, total });
        }
        if index == self.current {
            return Ok(Transition::Unchanged);
        }
        if self.exam_mode && index < self.current && self.answers.contains_key(&index) {
            return Err(SessionError::RevisitLocked { index });
        }

        self.current = index;
        self.selection = None;
        self.editable = None;
        self.revision += 1;

        if index == total {
            self.finish(now);
            return Ok(Transition::Completed);
        }
        Ok(Transition::Updated)
    }

    /// Mark or unmark the current question for review.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed` once the attempt is finished.
    pub fn toggle_flag(&mut self) -> Result<Transition, SessionError> {
        self.active_question()?;
        if !self.flags.remove(&self.current) {
            self.flags.insert(self.current);
        }
        Ok(Transition::Updated)
    }

    /// One second of exam time. Reaching zero ends the attempt immediately;
    /// unanswered questions stay unanswered and count as incorrect.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Transition {
        if !self.exam_mode || self.complete {
            return Transition::Unchanged;
        }
        let Some(remaining) = self.remaining_time else {
            return Transition::Unchanged;
        };
        let remaining = remaining.saturating_sub(1);
        self.remaining_time = Some(remaining);
        if remaining > 0 {
            return Transition::Updated;
        }

        self.current = self.questions.len();
        self.selection = None;
        self.editable = None;
        self.revision += 1;
        self.finish(now);
        Transition::Completed
    }

    /// Snapshot the attempt for persistence, stamped with `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressRecordError` only if the session invariants were broken.
    pub fn to_record(&self, updated_at: DateTime<Utc>) -> Result<ProgressRecord, ProgressRecordError> {
        ProgressDraft {
            simulation_id: self.simulation_id.clone(),
            current_question_index: self.current,
            user_answers: self.answers.clone(),
            question_flags: self.flags.clone(),
            remaining_time: self.remaining_time,
            simulation_complete: self.complete,
            total_questions: self.questions.len(),
            correct_answers: self.breakdown.correct,
            score: self.breakdown.score,
            completed_at: self.completed_at,
            updated_at,
            question_fingerprint: Some(self.fingerprint.clone()),
        }
        .validate()
    }

    fn active_question(&self) -> Result<&Question, SessionError> {
        if self.complete {
            return Err(SessionError::Completed);
        }
        self.questions.get(self.current).ok_or(SessionError::Completed)
    }

    fn finish(&mut self, now: DateTime<Utc>) {
        self.complete = true;
        self.completed_at = Some(now);
        self.recompute();
    }

    fn recompute(&mut self) {
        self.breakdown = ScoreBreakdown::compute(&self.questions, &self.answers);
    }
}

impl fmt::Debug for SimulationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationSession")
            .field("simulation_id", &self.simulation_id)
            .field("exam_mode", &self.exam_mode)
            .field("questions_len", &self.questions.len())
            .field("current", &self.current)
            .field("answers_len", &self.answers.len())
            .field("remaining_time", &self.remaining_time)
            .field("complete", &self.complete)
            .finish_non_exhaustive()
    }
}

/// FNV-1a over the ordered question ids, as 16 hex digits.
#[must_use]
pub fn question_fingerprint(questions: &[Question]) -> String {
    let hash = questions
        .iter()
        .flat_map(|q| q.id().value().to_le_bytes())
        .fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
        });
    format!("{hash:016x}")
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
