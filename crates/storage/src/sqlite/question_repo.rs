use async_trait::async_trait;
use exam_core::model::{Question, QuestionId, SetId};

use super::SqliteRepository;
use super::mapping::{conn, map_question_row, ser, u64_to_i64, usize_to_i64};
use crate::repository::{QuestionCatalog, QuestionQuery, QuestionSource, StorageError};

const QUESTION_COLUMNS: &str = "q.id, q.prompt, q.options, q.correct_option, q.explanation, \
                                q.kind, q.difficulty, q.topic_id, q.story_id";

#[async_trait]
impl QuestionSource for SqliteRepository {
    async fn fetch(&self, query: &QuestionQuery) -> Result<Vec<Question>, StorageError> {
        let rows = match query {
            QuestionQuery::Topic(topic_id) => {
                sqlx::query(&format!(
                    "SELECT {QUESTION_COLUMNS} FROM questions q WHERE q.topic_id = ?1 ORDER BY q.id"
                ))
                .bind(u64_to_i64("topic_id", topic_id.value())?)
                .fetch_all(&self.pool)
                .await
            }
            QuestionQuery::Difficulty { level, kind } => {
                sqlx::query(&format!(
                    "SELECT {QUESTION_COLUMNS} FROM questions q \
                     WHERE q.difficulty = ?1 AND q.kind = ?2 ORDER BY q.id"
                ))
                .bind(level.as_str())
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await
            }
            QuestionQuery::Story(story_id) => {
                sqlx::query(&format!(
                    "SELECT {QUESTION_COLUMNS} FROM questions q WHERE q.story_id = ?1 ORDER BY q.id"
                ))
                .bind(u64_to_i64("story_id", story_id.value())?)
                .fetch_all(&self.pool)
                .await
            }
            QuestionQuery::SetPage { set_id, window } => {
                sqlx::query(&format!(
                    "SELECT {QUESTION_COLUMNS} FROM question_set_items s \
                     JOIN questions q ON q.id = s.question_id \
                     WHERE s.set_id = ?1 \
                     ORDER BY s.position LIMIT ?2 OFFSET ?3"
                ))
                .bind(u64_to_i64("set_id", set_id.value())?)
                .bind(usize_to_i64("page size", window.len())?)
                .bind(usize_to_i64("page start", window.start)?)
                .fetch_all(&self.pool)
                .await
            }
            QuestionQuery::Kind { kind, limit } => {
                sqlx::query(&format!(
                    "SELECT {QUESTION_COLUMNS} FROM questions q WHERE q.kind = ?1 \
                     ORDER BY q.id LIMIT ?2"
                ))
                .bind(kind.as_str())
                .bind(usize_to_i64("limit", *limit)?)
                .fetch_all(&self.pool)
                .await
            }
            QuestionQuery::Exam { limit } => {
                sqlx::query(&format!(
                    "SELECT {QUESTION_COLUMNS} FROM questions q ORDER BY q.id LIMIT ?1"
                ))
                .bind(usize_to_i64("limit", *limit)?)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(conn)?;

        rows.iter().map(map_question_row).collect()
    }
}

#[async_trait]
impl QuestionCatalog for SqliteRepository {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let tags = question.tags();
        let options = serde_json::to_string(question.options()).map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO questions (
                id, prompt, options, correct_option, explanation,
                kind, difficulty, topic_id, story_id
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                prompt = excluded.prompt,
                options = excluded.options,
                correct_option = excluded.correct_option,
                explanation = excluded.explanation,
                kind = excluded.kind,
                difficulty = excluded.difficulty,
                topic_id = excluded.topic_id,
                story_id = excluded.story_id
            ",
        )
        .bind(u64_to_i64("question_id", question.id().value())?)
        .bind(question.prompt())
        .bind(options)
        .bind(usize_to_i64("correct_option", question.correct_option())?)
        .bind(question.explanation())
        .bind(tags.kind.as_str())
        .bind(tags.difficulty.as_str())
        .bind(
            tags.topic_id
                .map(|t| u64_to_i64("topic_id", t.value()))
                .transpose()?,
        )
        .bind(
            tags.story_id
                .map(|s| u64_to_i64("story_id", s.value()))
                .transpose()?,
        )
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn put_set(&self, set_id: SetId, members: &[QuestionId]) -> Result<(), StorageError> {
        let set = u64_to_i64("set_id", set_id.value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        for id in members {
            let exists = sqlx::query("SELECT 1 FROM questions WHERE id = ?1")
                .bind(u64_to_i64("question_id", id.value())?)
                .fetch_optional(&mut *tx)
                .await
                .map_err(conn)?;
            if exists.is_none() {
                return Err(StorageError::NotFound);
            }
        }

        sqlx::query("DELETE FROM question_set_items WHERE set_id = ?1")
            .bind(set)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, id) in members.iter().enumerate() {
            sqlx::query(
                "INSERT INTO question_set_items (set_id, position, question_id) VALUES (?1, ?2, ?3)",
            )
            .bind(set)
            .bind(usize_to_i64("position", position)?)
            .bind(u64_to_i64("question_id", id.value())?)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
