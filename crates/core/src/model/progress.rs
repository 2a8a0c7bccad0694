use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::model::ids::SimulationId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressRecordError {
    #[error("answer recorded for question {index} but only {total} questions exist")]
    AnswerOutOfRange { index: usize, total: usize },

    #[error("flag recorded for question {index} but only {total} questions exist")]
    FlagOutOfRange { index: usize, total: usize },

    #[error("current question index {index} exceeds total {total}")]
    IndexOutOfRange { index: usize, total: usize },

    #[error("completed record must point past the last question ({index} < {total})")]
    CompleteBeforeEnd { index: usize, total: usize },

    #[error("{correct} correct answers exceed {answered} answered questions")]
    CorrectExceedsAnswered { correct: usize, answered: usize },
}

/// Unvalidated persisted shape, shared by both storage tiers and the wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDraft {
    pub simulation_id: SimulationId,
    pub current_question_index: usize,
    #[serde(default)]
    pub user_answers: BTreeMap<usize, usize>,
    #[serde(default)]
    pub question_flags: BTreeSet<usize>,
    #[serde(default)]
    pub remaining_time: Option<u32>,
    #[serde(default)]
    pub simulation_complete: bool,
    pub total_questions: usize,
    #[serde(default)]
    pub correct_answers: usize,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    /// Hash of the ordered question ids the attempt was taken against.
    /// Absent in records written before it was tracked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_fingerprint: Option<String>,
}

impl ProgressDraft {
    /// Check the record invariants.
    ///
    /// # Errors
    ///
    /// Returns `ProgressRecordError` when answers or flags point outside the
    /// question range, the index is past the end, or a complete record still
    /// points at an unanswered question.
    pub fn validate(self) -> Result<ProgressRecord, ProgressRecordError> {
        let total = self.total_questions;
        if let Some(&index) = self.user_answers.keys().find(|&&i| i >= total) {
            return Err(ProgressRecordError::AnswerOutOfRange { index, total });
        }
        if let Some(&index) = self.question_flags.iter().find(|&&i| i >= total) {
            return Err(ProgressRecordError::FlagOutOfRange { index, total });
        }
        if self.current_question_index > total {
            return Err(ProgressRecordError::IndexOutOfRange {
                index: self.current_question_index,
                total,
            });
        }
        if self.simulation_complete && self.current_question_index < total {
            return Err(ProgressRecordError::CompleteBeforeEnd {
                index: self.current_question_index,
                total,
            });
        }
        if self.correct_answers > self.user_answers.len() {
            return Err(ProgressRecordError::CorrectExceedsAnswered {
                correct: self.correct_answers,
                answered: self.user_answers.len(),
            });
        }
        Ok(ProgressRecord(self))
    }
}

/// A validated snapshot of one attempt, as stored in the local and remote tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProgressDraft", into = "ProgressDraft")]
pub struct ProgressRecord(ProgressDraft);

impl TryFrom<ProgressDraft> for ProgressRecord {
    type Error = ProgressRecordError;

    fn try_from(draft: ProgressDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl From<ProgressRecord> for ProgressDraft {
    fn from(record: ProgressRecord) -> Self {
        record.0
    }
}

impl ProgressRecord {
    #[must_use]
    pub fn simulation_id(&self) -> &SimulationId {
        &self.0.simulation_id
    }

    #[must_use]
    pub fn current_question_index(&self) -> usize {
        self.0.current_question_index
    }

    #[must_use]
    pub fn user_answers(&self) -> &BTreeMap<usize, usize> {
        &self.0.user_answers
    }

    #[must_use]
    pub fn question_flags(&self) -> &BTreeSet<usize> {
        &self.0.question_flags
    }

    #[must_use]
    pub fn remaining_time(&self) -> Option<u32> {
        self.0.remaining_time
    }

    #[must_use]
    pub fn simulation_complete(&self) -> bool {
        self.0.simulation_complete
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.0.total_questions
    }

    #[must_use]
    pub fn correct_answers(&self) -> usize {
        self.0.correct_answers
    }

    #[must_use]
    pub fn score(&self) -> f64 {
        self.0.score
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.0.completed_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.0.updated_at
    }

    #[must_use]
    pub fn question_fingerprint(&self) -> Option<&str> {
        self.0.question_fingerprint.as_deref()
    }

    /// Whether the attempt is worth offering a "continue" for: the user moved
    /// past the first question and has not finished.
    #[must_use]
    pub fn has_resumable_progress(&self) -> bool {
        self.0.current_question_index > 0 && !self.0.simulation_complete
    }

    #[must_use]
    pub fn into_draft(self) -> ProgressDraft {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn draft(index: usize, total: usize) -> ProgressDraft {
        ProgressDraft {
            simulation_id: SimulationId::from_persisted("topic_1"),
            current_question_index: index,
            user_answers: BTreeMap::new(),
            question_flags: BTreeSet::new(),
            remaining_time: None,
            simulation_complete: false,
            total_questions: total,
            correct_answers: 0,
            score: 0.0,
            completed_at: None,
            updated_at: fixed_now(),
            question_fingerprint: None,
        }
    }

    #[test]
    fn answers_must_stay_inside_question_range() {
        let mut d = draft(1, 3);
        d.user_answers.insert(3, 0);
        assert_eq!(
            d.validate().unwrap_err(),
            ProgressRecordError::AnswerOutOfRange { index: 3, total: 3 }
        );
    }

    #[test]
    fn complete_requires_index_past_end() {
        let mut d = draft(2, 3);
        d.simulation_complete = true;
        assert!(matches!(
            d.validate(),
            Err(ProgressRecordError::CompleteBeforeEnd { .. })
        ));
    }

    #[test]
    fn resumable_only_when_moved_and_unfinished() {
        assert!(!draft(0, 3).validate().unwrap().has_resumable_progress());
        assert!(draft(1, 3).validate().unwrap().has_resumable_progress());

        let mut done = draft(3, 3);
        done.simulation_complete = true;
        assert!(!done.validate().unwrap().has_resumable_progress());
    }

    #[test]
    fn deserializing_runs_validation() {
        let json = r#"{
            "simulationId": "topic_1",
            "currentQuestionIndex": 5,
            "totalQuestions": 3,
            "updatedAt": "2023-11-14T22:13:20Z"
        }"#;
        assert!(serde_json::from_str::<ProgressRecord>(json).is_err());

        let ok = json.replace("\"currentQuestionIndex\": 5", "\"currentQuestionIndex\": 2");
        let record: ProgressRecord = serde_json::from_str(&ok).unwrap();
        assert_eq!(record.current_question_index(), 2);
        assert!(record.user_answers().is_empty());
    }
}
