use async_trait::async_trait;
use exam_core::model::{
    Difficulty, ModeParams, PageWindow, ProgressRecord, Question, QuestionId, QuestionType, SetId,
    SimulationId, StoryId, TopicId,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The tier cannot be used right now (offline, signed out, quota).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

//
// ─── PROGRESS ──────────────────────────────────────────────────────────────────
//

/// Keyed store of in-flight attempts, one record per simulation id.
///
/// Implemented by the local tier (in-memory, `SQLite`) and the remote tier
/// (HTTP, scoped to one user).
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the record for `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read or the stored
    /// record is corrupt.
    async fn read(&self, id: &SimulationId) -> Result<Option<ProgressRecord>, StorageError>;

    /// Overwrite the record stored under `record.simulation_id()`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn write(&self, record: &ProgressRecord) -> Result<(), StorageError>;

    /// Remove the record for `id`. Removing a missing record is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend rejects the delete.
    async fn clear(&self, id: &SimulationId) -> Result<(), StorageError>;

    /// Ids of every stored record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be listed.
    async fn list_ids(&self) -> Result<Vec<SimulationId>, StorageError>;

    /// True iff a record exists, moved past the first question and is not complete.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be read.
    async fn has_progress(&self, id: &SimulationId) -> Result<bool, StorageError> {
        Ok(self
            .read(id)
            .await?
            .is_some_and(|record| record.has_resumable_progress()))
    }
}

/// Simple in-memory progress store for tests and ephemeral sessions.
#[derive(Clone, Default)]
pub struct InMemoryProgressRepository {
    records: Arc<Mutex<BTreeMap<SimulationId, ProgressRecord>>>,
}

impl InMemoryProgressRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records; handy for asserting that nothing was written.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.len())
    }

    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryProgressRepository {
    async fn read(&self, id: &SimulationId) -> Result<Option<ProgressRecord>, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(id).cloned())
    }

    async fn write(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(record.simulation_id().clone(), record.clone());
        Ok(())
    }

    async fn clear(&self, id: &SimulationId) -> Result<(), StorageError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(id);
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<SimulationId>, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.keys().cloned().collect())
    }
}

//
// ─── QUESTIONS ─────────────────────────────────────────────────────────────────
//

/// Query accepted by a question content provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionQuery {
    Topic(TopicId),
    Difficulty {
        level: Difficulty,
        kind: QuestionType,
    },
    Story(StoryId),
    /// Items `[window.start, window.end)` of a set, in set order.
    SetPage { set_id: SetId, window: PageWindow },
    /// Up to `limit` questions of one type.
    Kind { kind: QuestionType, limit: usize },
    /// Up to `limit` questions across every type.
    Exam { limit: usize },
}

impl QuestionQuery {
    /// Translate a descriptor's parameters into a provider query.
    #[must_use]
    pub fn for_params(params: &ModeParams, page_size: u32, exam_questions: usize) -> Self {
        match params {
            ModeParams::Topic { topic_id } => Self::Topic(*topic_id),
            ModeParams::Difficulty { level, kind } => Self::Difficulty {
                level: *level,
                kind: *kind,
            },
            ModeParams::Story { story_id } => Self::Story(*story_id),
            ModeParams::QuestionSet { set_id, page } => Self::SetPage {
                set_id: *set_id,
                window: PageWindow::for_page(*page, page_size),
            },
            ModeParams::QuickPractice { kind, limit } => Self::Kind {
                kind: *kind,
                limit: *limit as usize,
            },
            ModeParams::FullExam => Self::Exam {
                limit: exam_questions,
            },
        }
    }
}

/// Read side of the question content provider.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Return the ordered questions matching `query`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the provider cannot be reached or returns
    /// malformed records.
    async fn fetch(&self, query: &QuestionQuery) -> Result<Vec<Question>, StorageError>;
}

/// Write side used by seeding tools and tests.
#[async_trait]
pub trait QuestionCatalog: QuestionSource {
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;

    /// Replace the ordered membership of a question set.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if a member question does not exist.
    async fn put_set(&self, set_id: SetId, members: &[QuestionId]) -> Result<(), StorageError>;
}

pub(crate) fn matches_query(question: &Question, query: &QuestionQuery) -> bool {
    let tags = question.tags();
    match query {
        QuestionQuery::Topic(topic) => tags.topic_id == Some(*topic),
        QuestionQuery::Difficulty { level, kind } => {
            tags.difficulty == *level && tags.kind == *kind
        }
        QuestionQuery::Story(story) => tags.story_id == Some(*story),
        QuestionQuery::Kind { kind, .. } => tags.kind == *kind,
        QuestionQuery::Exam { .. } => true,
        QuestionQuery::SetPage { .. } => false,
    }
}

/// In-memory question bank, ordered by question id.
#[derive(Clone, Default)]
pub struct InMemoryQuestionBank {
    questions: Arc<Mutex<BTreeMap<QuestionId, Question>>>,
    sets: Arc<Mutex<HashMap<SetId, Vec<QuestionId>>>>,
}

impl InMemoryQuestionBank {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuestionSource for InMemoryQuestionBank {
    async fn fetch(&self, query: &QuestionQuery) -> Result<Vec<Question>, StorageError> {
        let questions = self
            .questions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if let QuestionQuery::SetPage { set_id, window } = query {
            let sets = self
                .sets
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            let members = sets.get(set_id).map(Vec::as_slice).unwrap_or_default();
            return Ok(members
                .iter()
                .skip(window.start)
                .take(window.len())
                .filter_map(|id| questions.get(id).cloned())
                .collect());
        }

        let limit = match query {
            QuestionQuery::Kind { limit, .. } | QuestionQuery::Exam { limit } => *limit,
            _ => usize::MAX,
        };
        Ok(questions
            .values()
            .filter(|q| matches_query(q, query))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl QuestionCatalog for InMemoryQuestionBank {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut guard = self
            .questions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(question.id(), question.clone());
        Ok(())
    }

    async fn put_set(&self, set_id: SetId, members: &[QuestionId]) -> Result<(), StorageError> {
        {
            let questions = self
                .questions
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            if members.iter().any(|id| !questions.contains_key(id)) {
                return Err(StorageError::NotFound);
            }
        }
        let mut sets = self
            .sets
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        sets.insert(set_id, members.to_vec());
        Ok(())
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Local storage backends behind trait objects for easy swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub questions: Arc<dyn QuestionCatalog>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            progress: Arc::new(InMemoryProgressRepository::new()),
            questions: Arc::new(InMemoryQuestionBank::new()),
        }
    }
}
