use wellspring_types::Severity;

use crate::questions::Category;
use crate::scoring::ScoreCard;

/// Category scores below this get a targeted recommendation.
pub const CATEGORY_ATTENTION_THRESHOLD: f64 = 60.0;

/// Build recommendations for a score card: one general line for the
/// severity, then one per weak category (weakest first), then a follow-up
/// line for high severity that depends on whether a doctor was assigned.
pub fn recommend(card: &ScoreCard, doctor_assigned: bool) -> Vec<String> {
    let mut out = vec![general(card.severity).to_string()];

    let mut weak: Vec<(Category, f64)> = card
        .category_scores
        .iter()
        .filter(|(_, score)| **score < CATEGORY_ATTENTION_THRESHOLD)
        .map(|(category, score)| (*category, *score))
        .collect();
    // Stable sort keeps category order for equal scores.
    weak.sort_by(|a, b| a.1.total_cmp(&b.1));

    out.extend(weak.into_iter().map(|(category, _)| targeted(category).to_string()));

    if card.severity.is_high() {
        out.push(follow_up(doctor_assigned).to_string());
    }

    out
}

fn follow_up(doctor_assigned: bool) -> &'static str {
    if doctor_assigned {
        "A doctor has been asked to review your results. Please check your messages and \
         book a consultation soon."
    } else {
        "No doctor is available to review your results right now. Please book a \
         consultation with a doctor as soon as you can."
    }
}

fn general(severity: Severity) -> &'static str {
    match severity {
        Severity::Excellent => "Excellent work. Keep up your current routine and reassess in three months.",
        Severity::Good => "You are in good health overall. Small, consistent improvements will keep you on track.",
        Severity::Fair => "Your health is fair. Focus on the areas below and reassess in four to six weeks.",
        Severity::Poor => "Several areas of your health need attention. Start with one or two changes this week.",
        Severity::Critical => {
            "Your results indicate significant health risks. Please seek medical advice promptly."
        }
    }
}

fn targeted(category: Category) -> &'static str {
    match category {
        Category::Physical => {
            "Aim for at least 150 minutes of moderate activity per week, such as brisk walking or cycling."
        }
        Category::Mental => {
            "Make time for stress relief such as breathing exercises or talking with someone you trust."
        }
        Category::Sleep => "Keep a regular sleep schedule and aim for 7-9 hours per night.",
        Category::Nutrition => {
            "Add a serving of fruit or vegetables to each meal and cut back on processed food."
        }
        Category::Lifestyle => {
            "Reduce tobacco and alcohol use; ask your doctor about support programmes."
        }
    }
}
