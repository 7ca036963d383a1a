use std::collections::BTreeMap;

use wellspring_types::Severity;

use crate::questions::{Category, QUESTIONS, Question};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("unknown question '{0}'")]
    UnknownQuestion(String),
    #[error("question '{0}' was not answered")]
    Unanswered(&'static str),
    #[error("option {index} is not valid for question '{question}'")]
    InvalidOption { question: &'static str, index: usize },
}

/// Result of scoring one set of responses.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreCard {
    /// 0.0..=100.0, one decimal place.
    pub score: f64,
    pub severity: Severity,
    pub category_scores: BTreeMap<Category, f64>,
}

impl ScoreCard {
    /// Category scores keyed by their text name, for persistence and JSON.
    pub fn category_scores_by_name(&self) -> BTreeMap<String, f64> {
        self.category_scores
            .iter()
            .map(|(category, score)| (category.as_str().to_string(), *score))
            .collect()
    }
}

/// Score responses against the built-in question bank.
pub fn score(responses: &BTreeMap<String, usize>) -> Result<ScoreCard, ScoringError> {
    score_with(QUESTIONS, responses)
}

pub fn score_with(
    bank: &[Question],
    responses: &BTreeMap<String, usize>,
) -> Result<ScoreCard, ScoringError> {
    if let Some(unknown) = responses.keys().find(|id| !bank.iter().any(|q| q.id == id.as_str())) {
        return Err(ScoringError::UnknownQuestion(unknown.clone()));
    }

    let mut earned = 0.0;
    let mut possible = 0.0;
    let mut per_category: BTreeMap<Category, (f64, f64)> = BTreeMap::new();

    for question in bank {
        let index = *responses
            .get(question.id)
            .ok_or(ScoringError::Unanswered(question.id))?;
        if index >= question.options.len() {
            return Err(ScoringError::InvalidOption { question: question.id, index });
        }

        let points = index as f64 * question.weight;
        earned += points;
        possible += question.max_points();

        let entry = per_category.entry(question.category).or_insert((0.0, 0.0));
        entry.0 += points;
        entry.1 += question.max_points();
    }

    let score = percentage(earned, possible);
    let category_scores = per_category
        .into_iter()
        .map(|(category, (earned, possible))| (category, percentage(earned, possible)))
        .collect();

    Ok(ScoreCard {
        score,
        severity: classify(score),
        category_scores,
    })
}

/// Map a 0-100 score onto its severity bucket.
pub fn classify(score: f64) -> Severity {
    if score >= 85.0 {
        Severity::Excellent
    } else if score >= 70.0 {
        Severity::Good
    } else if score >= 50.0 {
        Severity::Fair
    } else if score >= 30.0 {
        Severity::Poor
    } else {
        Severity::Critical
    }
}

fn percentage(earned: f64, possible: f64) -> f64 {
    if possible <= 0.0 {
        return 0.0;
    }
    (earned / possible * 1000.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(index: usize) -> BTreeMap<String, usize> {
        QUESTIONS.iter().map(|q| (q.id.to_string(), index)).collect()
    }

    #[test]
    fn best_answers_score_full_marks() {
        let card = score(&uniform(4)).unwrap();
        assert_eq!(card.score, 100.0);
        assert_eq!(card.severity, Severity::Excellent);
        assert!(card.category_scores.values().all(|s| *s == 100.0));
        assert_eq!(card.category_scores.len(), Category::ALL.len());
    }

    #[test]
    fn worst_answers_are_critical() {
        let card = score(&uniform(0)).unwrap();
        assert_eq!(card.score, 0.0);
        assert_eq!(card.severity, Severity::Critical);
    }

    #[test]
    fn middle_answers_are_fair() {
        let card = score(&uniform(2)).unwrap();
        assert_eq!(card.score, 50.0);
        assert_eq!(card.severity, Severity::Fair);
    }

    #[test]
    fn weights_shift_the_score() {
        // Best answer on a weight-2.0 question, worst everywhere else.
        let mut responses = uniform(0);
        responses.insert("exercise_days".into(), 4);
        let card = score(&responses).unwrap();

        let total: f64 = QUESTIONS.iter().map(|q| q.max_points()).sum();
        let expected = (8.0 / total * 1000.0).round() / 10.0;
        assert_eq!(card.score, expected);
        assert_eq!(card.category_scores[&Category::Physical], (8.0 / 14.0 * 1000.0_f64).round() / 10.0);
        assert_eq!(card.category_scores[&Category::Sleep], 0.0);
    }

    #[test]
    fn scoring_is_deterministic() {
        let mut responses = uniform(3);
        responses.insert("mood".into(), 1);
        responses.insert("alcohol".into(), 2);
        assert_eq!(score(&responses).unwrap(), score(&responses).unwrap());
    }

    #[test]
    fn classify_boundaries() {
        assert_eq!(classify(100.0), Severity::Excellent);
        assert_eq!(classify(85.0), Severity::Excellent);
        assert_eq!(classify(84.9), Severity::Good);
        assert_eq!(classify(70.0), Severity::Good);
        assert_eq!(classify(69.9), Severity::Fair);
        assert_eq!(classify(50.0), Severity::Fair);
        assert_eq!(classify(49.9), Severity::Poor);
        assert_eq!(classify(30.0), Severity::Poor);
        assert_eq!(classify(29.9), Severity::Critical);
        assert_eq!(classify(0.0), Severity::Critical);
    }

    #[test]
    fn rejects_unknown_question() {
        let mut responses = uniform(2);
        responses.insert("shoe_size".into(), 1);
        assert_eq!(score(&responses), Err(ScoringError::UnknownQuestion("shoe_size".into())));
    }

    #[test]
    fn rejects_missing_answer() {
        let mut responses = uniform(2);
        responses.remove("sleep_hours");
        assert_eq!(score(&responses), Err(ScoringError::Unanswered("sleep_hours")));
    }

    #[test]
    fn rejects_out_of_range_option() {
        let mut responses = uniform(2);
        responses.insert("stress".into(), 5);
        assert_eq!(
            score(&responses),
            Err(ScoringError::InvalidOption { question: "stress", index: 5 })
        );
    }

    #[test]
    fn category_names_are_text_keys() {
        let card = score(&uniform(4)).unwrap();
        let named = card.category_scores_by_name();
        assert_eq!(named.get("nutrition"), Some(&100.0));
    }
}
