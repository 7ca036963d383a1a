pub mod api;
pub mod models;

pub use models::{ActivityKind, CompletionStatus, Frequency, ParseEnumError, ReviewDecision, Role, Severity};
