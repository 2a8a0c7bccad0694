use async_trait::async_trait;
use exam_core::model::{ProgressRecord, SimulationId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, map_progress_row, ser, usize_to_i64};
use crate::repository::{ProgressRepository, StorageError};

#[async_trait]
impl ProgressRepository for SqliteRepository {
    async fn read(&self, id: &SimulationId) -> Result<Option<ProgressRecord>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    simulation_id, current_question_index, user_answers, question_flags,
                    remaining_time, simulation_complete, total_questions, correct_answers,
                    score, completed_at, updated_at, question_fingerprint
                FROM simulation_progress
                WHERE simulation_id = ?1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn write(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let answers = serde_json::to_string(record.user_answers()).map_err(ser)?;
        let flags = serde_json::to_string(record.question_flags()).map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO simulation_progress (
                simulation_id, current_question_index, user_answers, question_flags,
                remaining_time, simulation_complete, total_questions, correct_answers,
                score, completed_at, updated_at, question_fingerprint
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(simulation_id) DO UPDATE SET
                current_question_index = excluded.current_question_index,
                user_answers = excluded.user_answers,
                question_flags = excluded.question_flags,
                remaining_time = excluded.remaining_time,
                simulation_complete = excluded.simulation_complete,
                total_questions = excluded.total_questions,
                correct_answers = excluded.correct_answers,
                score = excluded.score,
                completed_at = excluded.completed_at,
                updated_at = excluded.updated_at,
                question_fingerprint = excluded.question_fingerprint
            ",
        )
        .bind(record.simulation_id().as_str())
        .bind(usize_to_i64(
            "current_question_index",
            record.current_question_index(),
        )?)
        .bind(answers)
        .bind(flags)
        .bind(record.remaining_time().map(i64::from))
        .bind(record.simulation_complete())
        .bind(usize_to_i64("total_questions", record.total_questions())?)
        .bind(usize_to_i64("correct_answers", record.correct_answers())?)
        .bind(record.score())
        .bind(record.completed_at())
        .bind(record.updated_at())
        .bind(record.question_fingerprint())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn clear(&self, id: &SimulationId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM simulation_progress WHERE simulation_id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<SimulationId>, StorageError> {
        let rows = sqlx::query("SELECT simulation_id FROM simulation_progress ORDER BY simulation_id")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("simulation_id")
                    .map(SimulationId::from_persisted)
                    .map_err(ser)
            })
            .collect()
    }
}
