pub mod activities;
pub mod admin;
pub mod assessments;
pub mod auth;
pub mod convert;
pub mod dashboard;
pub mod error;
pub mod extract;
pub mod habits;
pub mod mailer;
pub mod messages;
pub mod middleware;
pub mod router;
pub mod state;
pub mod storage;
pub mod validation;

pub use router::router;
pub use state::{AppState, AppStateInner};
