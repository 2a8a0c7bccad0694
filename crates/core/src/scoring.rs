use std::collections::BTreeMap;

use crate::model::Question;

/// Score derived from submitted answers. Never stored as the only source of truth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub total: usize,
    pub answered: usize,
    pub correct: usize,
    /// Unrounded percentage; persisted as-is so repeated resumes do not drift.
    pub score: f64,
}

impl ScoreBreakdown {
    /// Recompute from answers keyed by question index.
    ///
    /// Answers for indices outside `questions` are ignored. Unanswered
    /// questions count against the score.
    #[must_use]
    pub fn compute(questions: &[Question], answers: &BTreeMap<usize, usize>) -> Self {
        let total = questions.len();
        let mut answered = 0;
        let mut correct = 0;
        for (&index, &option) in answers {
            let Some(question) = questions.get(index) else {
                continue;
            };
            answered += 1;
            if question.is_correct(option) {
                correct += 1;
            }
        }
        Self {
            total,
            answered,
            correct,
            score: percentage(correct, total),
        }
    }

    /// Score rounded for display.
    #[must_use]
    pub fn display_score(&self) -> u32 {
        display_score(self.score)
    }

    /// Share of questions answered, in percent.
    #[must_use]
    pub fn completion_rate(&self) -> f64 {
        percentage(self.answered, self.total)
    }
}

#[allow(clippy::cast_precision_loss)]
fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn display_score(score: f64) -> u32 {
    score.clamp(0.0, 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Difficulty, QuestionId, QuestionTags, QuestionType};

    fn questions(n: u64) -> Vec<Question> {
        (0..n)
            .map(|i| {
                Question::new(
                    QuestionId::new(i),
                    format!("Q{i}"),
                    vec!["a".into(), "b".into(), "c".into(), "d".into()],
                    0,
                    None,
                    QuestionTags {
                        kind: QuestionType::Restatement,
                        difficulty: Difficulty::Easy,
                        topic_id: None,
                        story_id: None,
                    },
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn seven_of_ten_scores_seventy() {
        let qs = questions(10);
        let mut answers = BTreeMap::new();
        for i in 0..7 {
            answers.insert(i, 0);
        }
        answers.insert(7, 1);
        let breakdown = ScoreBreakdown::compute(&qs, &answers);
        assert_eq!(breakdown.correct, 7);
        assert_eq!(breakdown.answered, 8);
        assert_eq!(breakdown.display_score(), 70);
    }

    #[test]
    fn fractional_score_is_preserved_until_display() {
        let qs = questions(15);
        let answers: BTreeMap<usize, usize> = (0..11).map(|i| (i, 0)).collect();
        let breakdown = ScoreBreakdown::compute(&qs, &answers);
        assert!((breakdown.score - 73.333_333).abs() < 1e-3);
        assert_eq!(breakdown.display_score(), 73);
    }

    #[test]
    fn empty_question_list_scores_zero() {
        let breakdown = ScoreBreakdown::compute(&[], &BTreeMap::new());
        assert_eq!(breakdown.score, 0.0);
        assert_eq!(breakdown.completion_rate(), 0.0);
    }
}
