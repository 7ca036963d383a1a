use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Physical,
    Mental,
    Sleep,
    Nutrition,
    Lifestyle,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Physical,
        Category::Mental,
        Category::Sleep,
        Category::Nutrition,
        Category::Lifestyle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Physical => "physical",
            Category::Mental => "mental",
            Category::Sleep => "sleep",
            Category::Nutrition => "nutrition",
            Category::Lifestyle => "lifestyle",
        }
    }
}

/// One assessment question. Options are ordered worst to best; the chosen
/// index is the number of points (0..=4) before weighting.
#[derive(Debug, Clone, Serialize)]
pub struct Question {
    pub id: &'static str,
    pub category: Category,
    pub prompt: &'static str,
    pub weight: f64,
    pub options: &'static [&'static str],
}

impl Question {
    pub fn max_points(&self) -> f64 {
        (self.options.len() - 1) as f64 * self.weight
    }
}

const FREQUENCY_OPTIONS: &[&str] = &["Never", "Rarely", "Sometimes", "Often", "Always"];

pub static QUESTIONS: &[Question] = &[
    Question {
        id: "exercise_days",
        category: Category::Physical,
        prompt: "How many days per week do you do at least 30 minutes of physical activity?",
        weight: 2.0,
        options: &["None", "1 day", "2-3 days", "4-5 days", "6-7 days"],
    },
    Question {
        id: "physical_symptoms",
        category: Category::Physical,
        prompt: "How often do pain, breathlessness or fatigue limit your daily activities?",
        weight: 1.5,
        options: &["Always", "Often", "Sometimes", "Rarely", "Never"],
    },
    Question {
        id: "mood",
        category: Category::Mental,
        prompt: "Over the last two weeks, how often have you felt down, depressed or hopeless?",
        weight: 2.0,
        options: &["Nearly every day", "More than half the days", "Several days", "Rarely", "Not at all"],
    },
    Question {
        id: "stress",
        category: Category::Mental,
        prompt: "How often do you feel able to cope with stress in your life?",
        weight: 1.5,
        options: FREQUENCY_OPTIONS,
    },
    Question {
        id: "sleep_hours",
        category: Category::Sleep,
        prompt: "How many hours do you sleep on a typical night?",
        weight: 1.5,
        options: &["Under 4", "4-5", "5-6", "6-7", "7-9"],
    },
    Question {
        id: "sleep_quality",
        category: Category::Sleep,
        prompt: "How often do you wake up feeling rested?",
        weight: 1.0,
        options: FREQUENCY_OPTIONS,
    },
    Question {
        id: "fruit_vegetables",
        category: Category::Nutrition,
        prompt: "How many servings of fruit and vegetables do you eat per day?",
        weight: 1.5,
        options: &["None", "1", "2", "3-4", "5 or more"],
    },
    Question {
        id: "processed_food",
        category: Category::Nutrition,
        prompt: "How often do you eat fast food or heavily processed meals?",
        weight: 1.0,
        options: &["Daily", "Several times a week", "Weekly", "Monthly", "Rarely"],
    },
    Question {
        id: "smoking",
        category: Category::Lifestyle,
        prompt: "Do you smoke or vape?",
        weight: 2.0,
        options: &["Daily, heavily", "Daily", "Occasionally", "Quit within the last year", "Never / quit long ago"],
    },
    Question {
        id: "alcohol",
        category: Category::Lifestyle,
        prompt: "How many alcoholic drinks do you have in a typical week?",
        weight: 1.0,
        options: &["More than 21", "15-21", "8-14", "1-7", "None"],
    },
];

pub fn find(id: &str) -> Option<&'static Question> {
    QUESTIONS.iter().find(|q| q.id == id)
}
