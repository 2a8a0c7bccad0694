use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{QuestionId, StoryId, TopicId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("question needs at least two options, got {count}")]
    TooFewOptions { count: usize },

    #[error("correct option {index} is out of range for {count} options")]
    CorrectOptionOutOfRange { index: usize, count: usize },

    #[error("unknown difficulty: {0}")]
    UnknownDifficulty(String),

    #[error("unknown question type: {0}")]
    UnknownQuestionType(String),
}

//
// ─── CLASSIFICATION ────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(QuestionError::UnknownDifficulty(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    SentenceCompletion,
    Restatement,
    ReadingComprehension,
}

impl QuestionType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::SentenceCompletion => "sentence-completion",
            QuestionType::Restatement => "restatement",
            QuestionType::ReadingComprehension => "reading-comprehension",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sentence-completion" => Ok(Self::SentenceCompletion),
            "restatement" => Ok(Self::Restatement),
            "reading-comprehension" => Ok(Self::ReadingComprehension),
            other => Err(QuestionError::UnknownQuestionType(other.to_owned())),
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// Where a question sits in the content catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionTags {
    pub kind: QuestionType,
    pub difficulty: Difficulty,
    pub topic_id: Option<TopicId>,
    pub story_id: Option<StoryId>,
}

/// A multiple-choice question as delivered by the content provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    prompt: String,
    options: Vec<String>,
    correct_option: usize,
    explanation: Option<String>,
    tags: QuestionTags,
}

impl Question {
    /// Validate and build a question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the prompt is blank, fewer than two options
    /// are given, or the correct option does not index into `options`.
    pub fn new(
        id: QuestionId,
        prompt: impl Into<String>,
        options: Vec<String>,
        correct_option: usize,
        explanation: Option<String>,
        tags: QuestionTags,
    ) -> Result<Self, QuestionError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        if options.len() < 2 {
            return Err(QuestionError::TooFewOptions {
                count: options.len(),
            });
        }
        if correct_option >= options.len() {
            return Err(QuestionError::CorrectOptionOutOfRange {
                index: correct_option,
                count: options.len(),
            });
        }

        Ok(Self {
            id,
            prompt,
            options,
            correct_option,
            explanation,
            tags,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn correct_option(&self) -> usize {
        self.correct_option
    }

    #[must_use]
    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    #[must_use]
    pub fn tags(&self) -> &QuestionTags {
        &self.tags
    }

    #[must_use]
    pub fn is_correct(&self, option: usize) -> bool {
        option == self.correct_option
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> QuestionTags {
        QuestionTags {
            kind: QuestionType::Restatement,
            difficulty: Difficulty::Easy,
            topic_id: None,
            story_id: None,
        }
    }

    fn options(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("option {i}")).collect()
    }

    #[test]
    fn rejects_out_of_range_key() {
        let err = Question::new(QuestionId::new(1), "Q", options(4), 4, None, tags()).unwrap_err();
        assert_eq!(
            err,
            QuestionError::CorrectOptionOutOfRange { index: 4, count: 4 }
        );
    }

    #[test]
    fn rejects_blank_prompt_and_single_option() {
        assert_eq!(
            Question::new(QuestionId::new(1), "  ", options(4), 0, None, tags()).unwrap_err(),
            QuestionError::EmptyPrompt
        );
        assert_eq!(
            Question::new(QuestionId::new(1), "Q", options(1), 0, None, tags()).unwrap_err(),
            QuestionError::TooFewOptions { count: 1 }
        );
    }

    #[test]
    fn classification_parses_kebab_case() {
        assert_eq!(
            "sentence-completion".parse::<QuestionType>().unwrap(),
            QuestionType::SentenceCompletion
        );
        assert_eq!("medium".parse::<Difficulty>().unwrap(), Difficulty::Medium);
        assert!("extreme".parse::<Difficulty>().is_err());
    }
}
