use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use exam_core::model::{ModeParams, Question, SimulationDescriptor, SimulationId};
use storage::repository::{QuestionQuery, QuestionSource};

use crate::config::EngineConfig;
use crate::error::SupplierError;

/// Resolves a descriptor into the ordered questions of one attempt.
#[derive(Clone)]
pub struct QuestionSupplier {
    source: Arc<dyn QuestionSource>,
    page_size: u32,
    exam_questions: usize,
    shuffle_pool: usize,
}

impl QuestionSupplier {
    #[must_use]
    pub fn new(source: Arc<dyn QuestionSource>, config: &EngineConfig) -> Self {
        Self {
            source,
            page_size: config.question_set_page_size,
            exam_questions: config.exam_question_count,
            shuffle_pool: config.shuffle_pool.max(1),
        }
    }

    /// Return the questions for `descriptor`.
    ///
    /// Quick practice and the full exam draw a shuffled selection seeded by
    /// the simulation id, so a resumed attempt sees the same sequence.
    ///
    /// # Errors
    ///
    /// Returns `SupplierError::Empty` when nothing matches and
    /// `SupplierError::Source` when the provider fails.
    pub async fn resolve(
        &self,
        descriptor: &SimulationDescriptor,
    ) -> Result<Vec<Question>, SupplierError> {
        let params = descriptor.params();
        let questions = match params {
            ModeParams::QuickPractice { kind, limit } => {
                let pool = self
                    .source
                    .fetch(&QuestionQuery::Kind {
                        kind: *kind,
                        limit: self.shuffle_pool,
                    })
                    .await?;
                self.note_capped(&pool, descriptor);
                seeded_pick(pool, *limit as usize, descriptor.simulation_id())
            }
            ModeParams::FullExam => {
                let pool = self
                    .source
                    .fetch(&QuestionQuery::Exam {
                        limit: self.shuffle_pool,
                    })
                    .await?;
                self.note_capped(&pool, descriptor);
                seeded_pick(pool, self.exam_questions, descriptor.simulation_id())
            }
            _ => {
                let query = QuestionQuery::for_params(params, self.page_size, self.exam_questions);
                self.source.fetch(&query).await?
            }
        };

        debug!(
            simulation_id = %descriptor.simulation_id(),
            count = questions.len(),
            "resolved questions"
        );
        if questions.is_empty() {
            return Err(SupplierError::Empty);
        }
        Ok(questions)
    }

    fn note_capped(&self, pool: &[Question], descriptor: &SimulationDescriptor) {
        if pool.len() >= self.shuffle_pool {
            warn!(
                simulation_id = %descriptor.simulation_id(),
                shuffle_pool = self.shuffle_pool,
                "candidate pool is full; raise shuffle_pool to draw from the whole bank"
            );
        }
    }
}

fn seeded_pick(mut pool: Vec<Question>, take: usize, id: &SimulationId) -> Vec<Question> {
    let mut rng = StdRng::seed_from_u64(seed_for(id));
    pool.shuffle(&mut rng);
    pool.truncate(take);
    pool
}

// FNV-1a; stable across builds unlike the std hasher.
fn seed_for(id: &SimulationId) -> u64 {
    id.as_str()
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0000_0100_0000_01b3)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{QuestionType, SetId};
    use storage::repository::InMemoryQuestionBank;
    use storage::sample::{SampleShape, sample_questions, seed_catalog};

    async fn supplier(per_bucket: u32, config: &EngineConfig) -> QuestionSupplier {
        let bank = InMemoryQuestionBank::new();
        let questions = sample_questions(SampleShape {
            per_bucket,
            topics: 2,
            stories: 2,
        })
        .unwrap();
        seed_catalog(&bank, &questions).await.unwrap();
        QuestionSupplier::new(Arc::new(bank), config)
    }

    fn descriptor(params: ModeParams) -> SimulationDescriptor {
        SimulationDescriptor::new(params).unwrap()
    }

    #[tokio::test]
    async fn quick_practice_selection_is_stable_per_simulation() {
        let supplier = supplier(20, &EngineConfig::default()).await;
        let quick = descriptor(ModeParams::QuickPractice {
            kind: QuestionType::Restatement,
            limit: 10,
        });

        let first = supplier.resolve(&quick).await.unwrap();
        let second = supplier.resolve(&quick).await.unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(first, second);
        assert!(first.iter().all(|q| q.tags().kind == QuestionType::Restatement));
    }

    #[tokio::test]
    async fn exam_draws_configured_question_count() {
        let config = EngineConfig {
            exam_question_count: 12,
            ..EngineConfig::default()
        };
        let supplier = supplier(5, &config).await;
        let exam = supplier
            .resolve(&descriptor(ModeParams::FullExam))
            .await
            .unwrap();
        assert_eq!(exam.len(), 12);
    }

    #[tokio::test]
    async fn short_final_page_is_returned_and_empty_page_is_reported() {
        let config = EngineConfig {
            question_set_page_size: 40,
            ..EngineConfig::default()
        };
        // 9 buckets * 5 = 45 questions in set 1
        let supplier = supplier(5, &config).await;
        let last = supplier
            .resolve(&descriptor(ModeParams::QuestionSet {
                set_id: SetId::new(1),
                page: 1,
            }))
            .await
            .unwrap();
        assert_eq!(last.len(), 5);

        let past_end = supplier
            .resolve(&descriptor(ModeParams::QuestionSet {
                set_id: SetId::new(1),
                page: 2,
            }))
            .await;
        assert!(matches!(past_end, Err(SupplierError::Empty)));
    }

    #[tokio::test]
    async fn shuffle_pool_bounds_the_candidates() {
        let quick = descriptor(ModeParams::QuickPractice {
            kind: QuestionType::Restatement,
            limit: 10,
        });

        let capped = supplier(
            20,
            &EngineConfig {
                shuffle_pool: 4,
                ..EngineConfig::default()
            },
        )
        .await;
        assert_eq!(capped.resolve(&quick).await.unwrap().len(), 4);

        let wide = supplier(
            20,
            &EngineConfig {
                shuffle_pool: 10_000,
                ..EngineConfig::default()
            },
        )
        .await;
        assert_eq!(wide.resolve(&quick).await.unwrap().len(), 10);
    }

    #[test]
    fn seeds_differ_between_simulations() {
        let a = seed_for(&SimulationId::from_persisted("quick_restatement_10"));
        let b = seed_for(&SimulationId::from_persisted("quick_restatement_20"));
        assert_ne!(a, b);
    }
}
