//! Deterministic demo content for local development and tests.

use exam_core::model::{
    Difficulty, Question, QuestionError, QuestionId, QuestionTags, QuestionType, SetId, StoryId,
    TopicId,
};

use crate::repository::{QuestionCatalog, StorageError};

const KINDS: [QuestionType; 3] = [
    QuestionType::SentenceCompletion,
    QuestionType::Restatement,
    QuestionType::ReadingComprehension,
];
const LEVELS: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

/// Shape of the generated bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleShape {
    /// Questions generated for every (difficulty, type) pair.
    pub per_bucket: u32,
    pub topics: u64,
    pub stories: u64,
}

impl Default for SampleShape {
    fn default() -> Self {
        Self {
            per_bucket: 15,
            topics: 4,
            stories: 3,
        }
    }
}

/// Build the sample questions. Ids are dense from 1 and stable across runs.
///
/// # Errors
///
/// Returns `QuestionError` if a generated question fails validation.
pub fn sample_questions(shape: SampleShape) -> Result<Vec<Question>, QuestionError> {
    let mut out = Vec::new();
    let mut next_id = 1_u64;
    for level in LEVELS {
        for kind in KINDS {
            for n in 0..shape.per_bucket {
                let id = next_id;
                next_id += 1;
                let correct = (id % 4) as usize;
                let story_id = (kind == QuestionType::ReadingComprehension && shape.stories > 0)
                    .then(|| StoryId::new(1 + u64::from(n) % shape.stories));
                let topic_id = (shape.topics > 0).then(|| TopicId::new(1 + id % shape.topics));
                out.push(Question::new(
                    QuestionId::new(id),
                    format!("{level} {kind} question #{}", n + 1),
                    (1..=4).map(|o| format!("Option {o}")).collect(),
                    correct,
                    Some(format!("Option {} is correct.", correct + 1)),
                    QuestionTags {
                        kind,
                        difficulty: level,
                        topic_id,
                        story_id,
                    },
                )?);
            }
        }
    }
    Ok(out)
}

/// Store `questions` and group them into set 1 in id order.
///
/// # Errors
///
/// Returns `StorageError` if the catalog rejects a write.
pub async fn seed_catalog(
    catalog: &dyn QuestionCatalog,
    questions: &[Question],
) -> Result<SetId, StorageError> {
    for question in questions {
        catalog.upsert_question(question).await?;
    }
    let set_id = SetId::new(1);
    let members: Vec<QuestionId> = questions.iter().map(Question::id).collect();
    catalog.put_set(set_id, &members).await?;
    Ok(set_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryQuestionBank, QuestionQuery, QuestionSource};
    use exam_core::model::PageWindow;

    #[test]
    fn default_shape_fills_every_bucket() {
        let questions = sample_questions(SampleShape::default()).unwrap();
        assert_eq!(questions.len(), 135);
        let hard_restatement = questions
            .iter()
            .filter(|q| {
                q.tags().difficulty == Difficulty::Hard && q.tags().kind == QuestionType::Restatement
            })
            .count();
        assert_eq!(hard_restatement, 15);
        assert!(
            questions
                .iter()
                .filter(|q| q.tags().kind != QuestionType::ReadingComprehension)
                .all(|q| q.tags().story_id.is_none())
        );
    }

    #[tokio::test]
    async fn seeded_set_pages_in_id_order() {
        let bank = InMemoryQuestionBank::new();
        let questions = sample_questions(SampleShape {
            per_bucket: 2,
            topics: 1,
            stories: 1,
        })
        .unwrap();
        let set_id = seed_catalog(&bank, &questions).await.unwrap();

        let page = bank
            .fetch(&QuestionQuery::SetPage {
                set_id,
                window: PageWindow::for_page(1, 10),
            })
            .await
            .unwrap();
        let ids: Vec<u64> = page.iter().map(|q| q.id().value()).collect();
        assert_eq!(ids, vec![11, 12, 13, 14, 15, 16, 17, 18]);
    }
}
