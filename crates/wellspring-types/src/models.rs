use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Returned when a stored or submitted string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Enums that are persisted as lowercase text columns.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Doctor,
    Admin,
}

text_enum!(Role, "role", { User => "user", Doctor => "doctor", Admin => "admin" });

impl Role {
    /// Doctors and admins review habit proofs.
    pub fn is_reviewer(&self) -> bool {
        matches!(self, Role::Doctor | Role::Admin)
    }
}

/// Health-status bucket derived from an assessment score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

text_enum!(Severity, "severity", {
    Excellent => "excellent",
    Good => "good",
    Fair => "fair",
    Poor => "poor",
    Critical => "critical",
});

impl Severity {
    /// Poor and critical results get a doctor assigned.
    pub fn is_high(&self) -> bool {
        matches!(self, Severity::Poor | Severity::Critical)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Pending,
    Approved,
    Rejected,
}

text_enum!(CompletionStatus, "completion status", {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
}

text_enum!(Frequency, "frequency", { Daily => "daily", Weekly => "weekly" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn resulting_status(&self) -> CompletionStatus {
        match self {
            ReviewDecision::Approve => CompletionStatus::Approved,
            ReviewDecision::Reject => CompletionStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Walking,
    Running,
    Cycling,
    Swimming,
    Yoga,
    Strength,
    Hiit,
    Other,
}

text_enum!(ActivityKind, "activity kind", {
    Walking => "walking",
    Running => "running",
    Cycling => "cycling",
    Swimming => "swimming",
    Yoga => "yoga",
    Strength => "strength",
    Hiit => "hiit",
    Other => "other",
});

/// Public view of an account. Never carries credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub specialization: Option<String>,
    pub available: bool,
    pub created_at: DateTime<Utc>,
}
