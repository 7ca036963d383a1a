//! Health domain rules with no I/O: the assessment question bank, scoring,
//! severity classification, recommendations, habit streaks and calorie
//! estimates.

pub mod calories;
pub mod questions;
pub mod recommendations;
pub mod scoring;
pub mod streak;

pub use questions::{Category, QUESTIONS, Question};
pub use recommendations::recommend;
pub use scoring::{ScoreCard, ScoringError, classify, score};
pub use streak::{Streak, compute_streak};
