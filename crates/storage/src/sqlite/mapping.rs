use std::collections::{BTreeMap, BTreeSet};

use exam_core::model::{
    ProgressDraft, ProgressRecord, Question, QuestionId, QuestionTags, SimulationId, StoryId,
    TopicId,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn usize_to_i64(field: &'static str, v: usize) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn u64_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_usize(field: &'static str, v: i64) -> Result<usize, StorageError> {
    usize::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn map_progress_row(row: &sqlx::sqlite::SqliteRow) -> Result<ProgressRecord, StorageError> {
    let answers_json: String = row.try_get("user_answers").map_err(ser)?;
    let flags_json: String = row.try_get("question_flags").map_err(ser)?;
    let user_answers: BTreeMap<usize, usize> = serde_json::from_str(&answers_json).map_err(ser)?;
    let question_flags: BTreeSet<usize> = serde_json::from_str(&flags_json).map_err(ser)?;

    let remaining_time = row
        .try_get::<Option<i64>, _>("remaining_time")
        .map_err(ser)?
        .map(|v| {
            u32::try_from(v)
                .map_err(|_| StorageError::Serialization(format!("invalid remaining_time: {v}")))
        })
        .transpose()?;

    ProgressDraft {
        simulation_id: SimulationId::from_persisted(
            row.try_get::<String, _>("simulation_id").map_err(ser)?,
        ),
        current_question_index: i64_to_usize(
            "current_question_index",
            row.try_get("current_question_index").map_err(ser)?,
        )?,
        user_answers,
        question_flags,
        remaining_time,
        simulation_complete: row.try_get::<bool, _>("simulation_complete").map_err(ser)?,
        total_questions: i64_to_usize(
            "total_questions",
            row.try_get("total_questions").map_err(ser)?,
        )?,
        correct_answers: i64_to_usize(
            "correct_answers",
            row.try_get("correct_answers").map_err(ser)?,
        )?,
        score: row.try_get("score").map_err(ser)?,
        completed_at: row.try_get("completed_at").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
        question_fingerprint: row.try_get("question_fingerprint").map_err(ser)?,
    }
    .validate()
    .map_err(ser)
}

pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let options_json: String = row.try_get("options").map_err(ser)?;
    let options: Vec<String> = serde_json::from_str(&options_json).map_err(ser)?;
    let kind: String = row.try_get("kind").map_err(ser)?;
    let difficulty: String = row.try_get("difficulty").map_err(ser)?;

    let tags = QuestionTags {
        kind: kind.parse().map_err(ser)?,
        difficulty: difficulty.parse().map_err(ser)?,
        topic_id: row
            .try_get::<Option<i64>, _>("topic_id")
            .map_err(ser)?
            .map(|v| i64_to_u64("topic_id", v).map(TopicId::new))
            .transpose()?,
        story_id: row
            .try_get::<Option<i64>, _>("story_id")
            .map_err(ser)?
            .map(|v| i64_to_u64("story_id", v).map(StoryId::new))
            .transpose()?,
    };

    Question::new(
        QuestionId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        row.try_get::<String, _>("prompt").map_err(ser)?,
        options,
        i64_to_usize("correct_option", row.try_get("correct_option").map_err(ser)?)?,
        row.try_get("explanation").map_err(ser)?,
        tags,
    )
    .map_err(ser)
}
