//! `impl Database` blocks, one file per table group.

mod activities;
mod assessments;
mod habits;
mod messages;
mod users;

pub use users::NewUser;
