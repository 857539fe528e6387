//! Debitor domain model.
//!
//! # Responsibility
//! - Define the single business record persisted by the repository.
//! - Own input validation rules that must hold before any storage access.
//!
//! # Invariants
//! - `id` is assigned by the store; `0` means "not yet persisted".
//! - `name` is never blank for records written through the repository.
//! - An empty `email` means "no email".

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned debitor identifier.
pub type DebitorId = i64;

/// Upper bound for `name`, mirrored by the `debitors.name` column check.
pub const NAME_MAX_CHARS: usize = 200;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

/// Business record for one debitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Debitor {
    /// Store-assigned ID. Ignored on create.
    pub id: DebitorId,
    /// Display name; default sort and search key.
    pub name: String,
    /// Secondary search key. Empty when the debitor has no email.
    #[serde(default)]
    pub email: String,
}

impl Debitor {
    /// Creates an unsaved debitor (`id == 0`) without email.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            email: String::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Returns `None` when the debitor has no email.
    pub fn email(&self) -> Option<&str> {
        if self.email.is_empty() {
            None
        } else {
            Some(self.email.as_str())
        }
    }

    /// Checks write-path invariants.
    ///
    /// # Errors
    /// - `BlankName` when `name` is empty or whitespace only.
    /// - `NameTooLong` when `name` exceeds [`NAME_MAX_CHARS`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::BlankName);
        }

        let actual = self.name.chars().count();
        if actual > NAME_MAX_CHARS {
            return Err(ValidationError::NameTooLong {
                max: NAME_MAX_CHARS,
                actual,
            });
        }

        Ok(())
    }

    /// Case-insensitive containment match on name, or on email when present.
    pub fn matches_term(&self, term: &str) -> bool {
        let needle = term.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self
                .email()
                .is_some_and(|email| email.to_lowercase().contains(&needle))
    }
}

/// Caller-side precondition violations. Always raised before any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    NonPositiveId(DebitorId),
    InvalidId(String),
    MissingRecord,
    BlankName,
    NameTooLong { max: usize, actual: usize },
    BlankConnectionString,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveId(id) => write!(f, "debitor id must be greater than 0, got {id}"),
            Self::InvalidId(value) => write!(f, "debitor id must be a positive integer: `{value}`"),
            Self::MissingRecord => write!(f, "debitor record is required"),
            Self::BlankName => write!(f, "debitor name must not be blank"),
            Self::NameTooLong { max, actual } => write!(
                f,
                "debitor name exceeds {max} characters (got {actual})"
            ),
            Self::BlankConnectionString => write!(f, "connection string must not be blank"),
        }
    }
}

impl Error for ValidationError {}

/// Parses user-entered text into a debitor ID.
///
/// Only plain positive integers pass, so values such as
/// `"5; DROP TABLE debitors"` never reach a statement.
pub fn parse_debitor_id(value: &str) -> Result<DebitorId, ValidationError> {
    let trimmed = value.trim();
    let id = trimmed
        .parse::<DebitorId>()
        .map_err(|_| ValidationError::InvalidId(trimmed.to_string()))?;
    if id <= 0 {
        return Err(ValidationError::NonPositiveId(id));
    }
    Ok(id)
}

/// Lightweight email shape check (`local@domain.tld`, no whitespace).
pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.is_match(value)
}
