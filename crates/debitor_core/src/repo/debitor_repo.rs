//! Debitor repository contract and guarded implementation.
//!
//! # Responsibility
//! - Translate list/get/create/search intents into parameterized SQL.
//! - Map result rows into `Debitor` records.
//! - Validate caller input before any storage access.
//!
//! # Invariants
//! - Values reach SQL only as named parameters.
//! - Nullable columns map to defaults (`0`, empty string), never to errors.
//! - Validation errors are always returned to the caller, never absorbed.
//!
//! # See also
//! - `crate::guard` for the fail-once latch semantics.

use crate::db::driver::{Driver, RowError, RowView};
use crate::guard::{ConnectionGuard, GuardFailure, GuardOutcome};
use crate::model::debitor::{Debitor, DebitorId, ValidationError};
use log::{debug, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

const DEBITOR_SELECT_ALL_SQL: &str = "SELECT id, name, email FROM debitors ORDER BY name ASC";
const DEBITOR_SELECT_BY_ID_SQL: &str = "SELECT id, name, email FROM debitors WHERE id = :id";
const DEBITOR_INSERT_SQL: &str = "INSERT INTO debitors (name, email) VALUES (:name, :email)";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for debitor operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    Validation(ValidationError),
    /// The guard reported a classified failure for this call.
    DataAccess(GuardFailure),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::DataAccess(err) => write!(f, "failed to access debitor data: {err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::DataAccess(err) => Some(err),
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Repository interface for debitor data.
pub trait DebitorRepository {
    /// Lists all debitors ordered by name ascending.
    ///
    /// A short-circuited call yields an empty list.
    fn get_all(&self) -> RepoResult<Vec<Debitor>>;

    /// Looks up one debitor by ID.
    ///
    /// # Errors
    /// - `Validation(NonPositiveId)` for `id <= 0`, before any I/O.
    fn get_by_id(&self, id: DebitorId) -> RepoResult<Option<Debitor>>;

    /// Inserts a new debitor; the store assigns the ID.
    ///
    /// Returns `Ok(false)` when the insert was short-circuited or failed.
    ///
    /// # Errors
    /// - `Validation(MissingRecord | BlankName | NameTooLong)` before any I/O.
    fn create(&self, debitor: Option<&Debitor>) -> RepoResult<bool>;

    /// Whether the underlying connection latch has tripped.
    fn is_tripped(&self) -> bool;

    /// Filters `get_all` by a case-insensitive name/email term and sorts by
    /// name. An empty term keeps every record.
    fn try_search_and_filter(&self, term: &str) -> RepoResult<Vec<Debitor>> {
        let all = self.get_all()?;
        let total = all.len();
        let mut found: Vec<Debitor> = all
            .into_iter()
            .filter(|debitor| term.is_empty() || debitor.matches_term(term))
            .collect();
        found.sort_by(|left, right| left.name.cmp(&right.name));

        debug!(
            "event=debitor_search module=repo status=ok matched={} total={}",
            found.len(),
            total
        );
        Ok(found)
    }

    /// Lossy variant of [`Self::try_search_and_filter`]: any failure yields
    /// an empty list. Check [`Self::is_tripped`] to tell the cases apart.
    fn search_and_filter(&self, term: &str) -> Vec<Debitor> {
        match self.try_search_and_filter(term) {
            Ok(found) => found,
            Err(err) => {
                warn!("event=debitor_search module=repo status=degraded error={err}");
                Vec::new()
            }
        }
    }
}

/// Debitor repository backed by a shared [`ConnectionGuard`].
pub struct GuardedDebitorRepository<D: Driver> {
    connection_string: String,
    guard: Arc<ConnectionGuard<D>>,
}

impl<D: Driver> GuardedDebitorRepository<D> {
    /// Creates a repository for `connection_string` using `guard`.
    ///
    /// # Errors
    /// - `Validation(BlankConnectionString)` for an empty or blank string.
    pub fn try_new(
        connection_string: impl Into<String>,
        guard: Arc<ConnectionGuard<D>>,
    ) -> RepoResult<Self> {
        let connection_string = connection_string.into();
        if connection_string.trim().is_empty() {
            return Err(ValidationError::BlankConnectionString.into());
        }

        Ok(Self {
            connection_string,
            guard,
        })
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn guard(&self) -> &Arc<ConnectionGuard<D>> {
        &self.guard
    }
}

impl<D: Driver> DebitorRepository for GuardedDebitorRepository<D> {
    fn get_all(&self) -> RepoResult<Vec<Debitor>> {
        let mut debitors = Vec::new();
        let outcome = self.guard.execute_query(
            &self.connection_string,
            DEBITOR_SELECT_ALL_SQL,
            |_| {},
            |row| {
                debitors.push(parse_debitor_row(row)?);
                Ok(())
            },
        );

        match outcome {
            GuardOutcome::Completed(_) | GuardOutcome::ShortCircuited => Ok(debitors),
            GuardOutcome::Failed(failure) => Err(RepoError::DataAccess(failure)),
        }
    }

    fn get_by_id(&self, id: DebitorId) -> RepoResult<Option<Debitor>> {
        if id <= 0 {
            return Err(ValidationError::NonPositiveId(id).into());
        }

        let mut found = None;
        let outcome = self.guard.execute_query(
            &self.connection_string,
            DEBITOR_SELECT_BY_ID_SQL,
            |params| {
                params.add(":id", id);
            },
            |row| {
                if found.is_none() {
                    found = Some(parse_debitor_row(row)?);
                }
                Ok(())
            },
        );

        match outcome {
            GuardOutcome::Completed(_) | GuardOutcome::ShortCircuited => Ok(found),
            GuardOutcome::Failed(failure) => Err(RepoError::DataAccess(failure)),
        }
    }

    fn create(&self, debitor: Option<&Debitor>) -> RepoResult<bool> {
        let debitor = debitor.ok_or(ValidationError::MissingRecord)?;
        debitor.validate()?;

        let outcome =
            self.guard
                .execute_non_query(&self.connection_string, DEBITOR_INSERT_SQL, |params| {
                    params
                        .add(":name", debitor.name.as_str())
                        .add(":email", debitor.email.as_str());
                });

        Ok(outcome.is_completed())
    }

    fn is_tripped(&self) -> bool {
        self.guard.is_tripped()
    }
}

fn parse_debitor_row(row: &dyn RowView) -> Result<Debitor, RowError> {
    Ok(Debitor {
        id: row.get_i64("id")?.unwrap_or(0),
        name: row.get_text("name")?.unwrap_or_default(),
        email: row.get_text("email")?.unwrap_or_default(),
    })
}
