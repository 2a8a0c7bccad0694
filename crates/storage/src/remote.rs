//! Remote progress tier: a per-user HTTP mirror of the local store.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_core::model::{ProgressDraft, ProgressRecord, SimulationId, UserId};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::repository::{ProgressRepository, StorageError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Wire shape of a remote progress row: the persisted record with the
/// owning user beside it, all at the top level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProgressRow {
    pub simulation_id: SimulationId,
    pub user_id: UserId,
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_fingerprint: Option<String>,
}

impl RemoteProgressRow {
    #[must_use]
    pub fn new(user_id: UserId, draft: ProgressDraft) -> Self {
        let ProgressDraft {
            simulation_id,
            current_question_index,
            user_answers,
            question_flags,
            remaining_time,
            simulation_complete,
            total_questions,
            correct_answers,
            score,
            completed_at,
            updated_at,
            question_fingerprint,
        } = draft;
        Self {
            simulation_id,
            user_id,
            current_question_index,
            user_answers,
            question_flags,
            remaining_time,
            simulation_complete,
            total_questions,
            correct_answers,
            score,
            completed_at,
            updated_at,
            question_fingerprint,
        }
    }

    /// Drop the owner and hand back the unvalidated record.
    #[must_use]
    pub fn into_draft(self) -> ProgressDraft {
        ProgressDraft {
            simulation_id: self.simulation_id,
            current_question_index: self.current_question_index,
            user_answers: self.user_answers,
            question_flags: self.question_flags,
            remaining_time: self.remaining_time,
            simulation_complete: self.simulation_complete,
            total_questions: self.total_questions,
            correct_answers: self.correct_answers,
            score: self.score,
            completed_at: self.completed_at,
            updated_at: self.updated_at,
            question_fingerprint: self.question_fingerprint,
        }
    }
}

/// HTTP-backed progress repository for one authenticated user.
#[derive(Clone)]
pub struct RemoteProgressStore {
    client: reqwest::Client,
    base: Url,
    user: UserId,
}

impl RemoteProgressStore {
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the HTTP client cannot be built.
    pub fn new(base: Url, user: UserId) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Self { client, base, user })
    }

    #[must_use]
    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub(crate) fn endpoint(&self, id: Option<&SimulationId>) -> Result<Url, StorageError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| StorageError::Connection(format!("invalid base url: {}", self.base)))?;
            segments
                .pop_if_empty()
                .extend(["users", self.user.as_str(), "progress"]);
            if let Some(id) = id {
                segments.push(id.as_str());
            }
        }
        Ok(url)
    }
}

fn transport(e: &reqwest::Error) -> StorageError {
    if e.is_decode() {
        StorageError::Serialization(e.to_string())
    } else {
        StorageError::Connection(e.to_string())
    }
}

fn unexpected(status: StatusCode) -> StorageError {
    debug!(%status, "unexpected remote progress response");
    StorageError::Connection(format!("remote store responded with {status}"))
}

#[async_trait]
impl ProgressRepository for RemoteProgressStore {
    async fn read(&self, id: &SimulationId) -> Result<Option<ProgressRecord>, StorageError> {
        let response = self
            .client
            .get(self.endpoint(Some(id))?)
            .send()
            .await
            .map_err(|e| transport(&e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let row: RemoteProgressRow = response.json().await.map_err(|e| transport(&e))?;
                if row.user_id != self.user {
                    return Err(StorageError::Conflict);
                }
                row.into_draft()
                    .validate()
                    .map(Some)
                    .map_err(|e| StorageError::Serialization(e.to_string()))
            }
            status => Err(unexpected(status)),
        }
    }

    async fn write(&self, record: &ProgressRecord) -> Result<(), StorageError> {
        let row = RemoteProgressRow::new(self.user.clone(), record.clone().into_draft());
        let response = self
            .client
            .put(self.endpoint(Some(record.simulation_id()))?)
            .json(&row)
            .send()
            .await
            .map_err(|e| transport(&e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(unexpected(response.status()))
        }
    }

    async fn clear(&self, id: &SimulationId) -> Result<(), StorageError> {
        let response = self
            .client
            .delete(self.endpoint(Some(id))?)
            .send()
            .await
            .map_err(|e| transport(&e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(unexpected(status)),
        }
    }

    async fn list_ids(&self) -> Result<Vec<SimulationId>, StorageError> {
        let response = self
            .client
            .get(self.endpoint(None)?)
            .send()
            .await
            .map_err(|e| transport(&e))?;

        if !response.status().is_success() {
            return Err(unexpected(response.status()));
        }
        let rows: Vec<RemoteProgressRow> = response.json().await.map_err(|e| transport(&e))?;
        Ok(rows
            .into_iter()
            .filter(|row| row.user_id == self.user)
            .map(|row| row.simulation_id)
            .collect())
    }
}
