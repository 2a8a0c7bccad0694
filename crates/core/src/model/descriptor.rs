use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::{SetId, SimulationId, StoryId, TopicId};
use crate::model::question::{Difficulty, QuestionType};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DescriptorError {
    #[error("quick practice limit must be > 0")]
    ZeroQuickPracticeLimit,

    #[error("unrecognised simulation id: {0}")]
    UnknownSimulationId(String),
}

/// The kind of attempt being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SimulationMode {
    Topic,
    Difficulty,
    Story,
    QuestionSet,
    QuickPractice,
    FullExam,
}

impl SimulationMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SimulationMode::Topic => "topic",
            SimulationMode::Difficulty => "difficulty",
            SimulationMode::Story => "story",
            SimulationMode::QuestionSet => "questionSet",
            SimulationMode::QuickPractice => "quickPractice",
            SimulationMode::FullExam => "fullExam",
        }
    }
}

impl fmt::Display for SimulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mode-specific parameters. Every field participates in the simulation id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum ModeParams {
    Topic { topic_id: TopicId },
    Difficulty { level: Difficulty, kind: QuestionType },
    Story { story_id: StoryId },
    QuestionSet { set_id: SetId, page: u32 },
    QuickPractice { kind: QuestionType, limit: u32 },
    FullExam,
}

impl ModeParams {
    #[must_use]
    pub fn mode(&self) -> SimulationMode {
        match self {
            ModeParams::Topic { .. } => SimulationMode::Topic,
            ModeParams::Difficulty { .. } => SimulationMode::Difficulty,
            ModeParams::Story { .. } => SimulationMode::Story,
            ModeParams::QuestionSet { .. } => SimulationMode::QuestionSet,
            ModeParams::QuickPractice { .. } => SimulationMode::QuickPractice,
            ModeParams::FullExam => SimulationMode::FullExam,
        }
    }

    fn simulation_key(&self) -> String {
        match self {
            ModeParams::Topic { topic_id } => format!("topic_{topic_id}"),
            ModeParams::Difficulty { level, kind } => format!("difficulty_{level}_{kind}"),
            ModeParams::Story { story_id } => format!("story_{story_id}"),
            ModeParams::QuestionSet { set_id, page } => format!("qs_{set_id}_p{page}"),
            ModeParams::QuickPractice { kind, limit } => format!("quick_{kind}_{limit}"),
            ModeParams::FullExam => "full_exam".to_owned(),
        }
    }
}

/// Zero-based half-open slice `[start, end)` of a question set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub start: usize,
    pub end: usize,
}

impl PageWindow {
    #[must_use]
    pub fn for_page(page: u32, page_size: u32) -> Self {
        let size = page_size.max(1) as usize;
        let start = (page as usize).saturating_mul(size);
        Self {
            start,
            end: start.saturating_add(size),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Immutable description of the attempt a controller is opened for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationDescriptor {
    params: ModeParams,
    simulation_id: SimulationId,
    exam_mode: bool,
}

impl SimulationDescriptor {
    /// Build a descriptor, deriving the simulation id from the parameters.
    ///
    /// # Errors
    ///
    /// Returns `DescriptorError::ZeroQuickPracticeLimit` for an empty quick practice.
    pub fn new(params: ModeParams) -> Result<Self, DescriptorError> {
        if let ModeParams::QuickPractice { limit: 0, .. } = params {
            return Err(DescriptorError::ZeroQuickPracticeLimit);
        }
        let simulation_id = SimulationId::from_persisted(params.simulation_key());
        let exam_mode = matches!(params, ModeParams::FullExam);
        Ok(Self {
            params,
            simulation_id,
            exam_mode,
        })
    }

    /// Apply timed exam rules to a practice mode as well.
    #[must_use]
    pub fn with_forced_exam_mode(mut self, forced: bool) -> Self {
        self.exam_mode = self.exam_mode || forced;
        self
    }

    /// Recover the parameters from a simulation id produced by [`Self::new`].
    ///
    /// # Errors
    ///
    /// Returns `DescriptorError::UnknownSimulationId` if the id does not follow
    /// any mode's key layout.
    pub fn from_simulation_id(id: &SimulationId) -> Result<Self, DescriptorError> {
        let raw = id.as_str();
        let unknown = || DescriptorError::UnknownSimulationId(raw.to_owned());

        let params = if raw == "full_exam" {
            ModeParams::FullExam
        } else if let Some(rest) = raw.strip_prefix("topic_") {
            ModeParams::Topic {
                topic_id: rest.parse().map_err(|_| unknown())?,
            }
        } else if let Some(rest) = raw.strip_prefix("difficulty_") {
            let (level, kind) = rest.split_once('_').ok_or_else(unknown)?;
            ModeParams::Difficulty {
                level: level.parse().map_err(|_| unknown())?,
                kind: kind.parse().map_err(|_| unknown())?,
            }
        } else if let Some(rest) = raw.strip_prefix("story_") {
            ModeParams::Story {
                story_id: rest.parse().map_err(|_| unknown())?,
            }
        } else if let Some(rest) = raw.strip_prefix("qs_") {
            let (set, page) = rest.split_once("_p").ok_or_else(unknown)?;
            ModeParams::QuestionSet {
                set_id: set.parse().map_err(|_| unknown())?,
                page: page.parse().map_err(|_| unknown())?,
            }
        } else if let Some(rest) = raw.strip_prefix("quick_") {
            let (kind, limit) = rest.rsplit_once('_').ok_or_else(unknown)?;
            ModeParams::QuickPractice {
                kind: kind.parse().map_err(|_| unknown())?,
                limit: limit.parse().map_err(|_| unknown())?,
            }
        } else {
            return Err(unknown());
        };

        let descriptor = Self::new(params)?;
        if descriptor.simulation_id != *id {
            // e.g. "topic_007" parses but does not round-trip
            return Err(unknown());
        }
        Ok(descriptor)
    }

    #[must_use]
    pub fn params(&self) -> &ModeParams {
        &self.params
    }

    #[must_use]
    pub fn mode(&self) -> SimulationMode {
        self.params.mode()
    }

    #[must_use]
    pub fn simulation_id(&self) -> &SimulationId {
        &self.simulation_id
    }

    #[must_use]
    pub fn exam_mode(&self) -> bool {
        self.exam_mode
    }
}
