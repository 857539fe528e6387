//! Connection guard: fail-once circuit breaker around raw statement execution.
//!
//! # Responsibility
//! - Open one connection per call, run a query or a mutating statement, and
//!   release the connection on every exit path.
//! - Classify driver failures and trip the shared latch on any of them.
//! - Reject every call without I/O once the latch has tripped.
//!
//! # Invariants
//! - The latch never resets within a process.
//! - Failures are absorbed here and reported as `GuardOutcome::Failed`;
//!   no driver error escapes as a Rust error.
//! - Each opened connection is closed exactly once, including when the row
//!   handler fails or panics.

mod state;

pub use state::ConnectionState;

use crate::db::driver::{
    Driver, DriverConnection, DriverError, Parameters, QueryError, RowError, RowView,
};
use crate::logging::sanitize_message;
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const MAX_LOGGED_ERROR_CHARS: usize = 240;

/// Failure taxonomy for classified guard failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Store unreachable within the driver's own timeout window.
    ConnectionTimeout,
    /// Any other vendor-reported store error.
    StoreError,
    /// Any other failure during open/execute, including row handler errors.
    Unclassified,
}

impl FailureKind {
    /// Stable category string used in log events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionTimeout => "timeout",
            Self::StoreError => "vendor_error",
            Self::Unclassified => "generic",
        }
    }
}

/// Diagnostic record of one classified failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Vendor error code, when the driver reported one.
    pub code: Option<i32>,
    /// `true` when this failure is the one that tripped the latch.
    pub first_trip: bool,
}

impl GuardFailure {
    fn from_driver(err: &DriverError, first_trip: bool) -> Self {
        let kind = match err {
            DriverError::Timeout { .. } => FailureKind::ConnectionTimeout,
            DriverError::Vendor { .. } => FailureKind::StoreError,
            DriverError::Other(_) => FailureKind::Unclassified,
        };
        Self {
            kind,
            message: err.message().to_string(),
            code: err.code(),
            first_trip,
        }
    }

    fn from_handler(err: &RowError, first_trip: bool) -> Self {
        Self {
            kind: FailureKind::Unclassified,
            message: err.to_string(),
            code: None,
            first_trip,
        }
    }
}

impl Display for GuardFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code}): {}", self.kind.as_str(), self.message),
            None => write!(f, "{}: {}", self.kind.as_str(), self.message),
        }
    }
}

impl Error for GuardFailure {}

/// Explicit result of one guarded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome<T> {
    /// The statement ran; carries the visited or affected row count.
    Completed(T),
    /// The latch was already tripped; nothing was attempted.
    ShortCircuited,
    /// The call failed and the latch is now tripped.
    Failed(GuardFailure),
}

impl<T> GuardOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::ShortCircuited | Self::Failed(_) => None,
        }
    }
}

/// Fail-once gate in front of a database driver.
///
/// One long-lived instance is shared (via `Arc`) by every repository that
/// talks to the same store.
pub struct ConnectionGuard<D: Driver> {
    driver: D,
    state: ConnectionState,
}

impl<D: Driver> ConnectionGuard<D> {
    /// Creates a guard with a fresh, untripped latch.
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            state: ConnectionState::new(),
        }
    }

    /// Thread-safe snapshot of the latch.
    pub fn is_tripped(&self) -> bool {
        self.state.is_tripped()
    }

    /// See [`ConnectionState::take_unreachable_notice`].
    pub fn take_unreachable_notice(&self) -> bool {
        self.state.take_unreachable_notice()
    }

    /// Runs a read statement and streams rows into `on_row`.
    ///
    /// `bind` is called once, before execution, to attach named parameters.
    /// `on_row` is called once per row, in store order, while the cursor is
    /// open. Returns the number of rows visited on success.
    pub fn execute_query<B, H>(
        &self,
        connection_string: &str,
        query: &str,
        bind: B,
        mut on_row: H,
    ) -> GuardOutcome<usize>
    where
        B: FnOnce(&mut Parameters),
        H: FnMut(&dyn RowView) -> Result<(), RowError>,
    {
        if self.state.is_tripped() {
            debug!("event=db_query module=guard status=short_circuit");
            return GuardOutcome::ShortCircuited;
        }

        let started_at = Instant::now();
        let mut scope = match self.driver.open(connection_string) {
            Ok(conn) => ConnectionScope(conn),
            Err(err) => return self.fail_driver("db_query", started_at, &err),
        };

        let mut params = Parameters::new();
        bind(&mut params);

        match scope.0.query(query, &params, &mut on_row) {
            Ok(rows) => {
                info!(
                    "event=db_query module=guard status=ok duration_ms={} rows={}",
                    started_at.elapsed().as_millis(),
                    rows
                );
                GuardOutcome::Completed(rows)
            }
            Err(QueryError::Driver(err)) => self.fail_driver("db_query", started_at, &err),
            Err(QueryError::Handler(err)) => {
                let failure = GuardFailure::from_handler(&err, self.state.trip());
                self.report("db_query", started_at, failure)
            }
        }
    }

    /// Runs a mutating statement (INSERT/UPDATE/DELETE).
    ///
    /// `bind` is called exactly once, before execution. Returns the
    /// affected-row count on success.
    pub fn execute_non_query<B>(
        &self,
        connection_string: &str,
        command: &str,
        bind: B,
    ) -> GuardOutcome<usize>
    where
        B: FnOnce(&mut Parameters),
    {
        if self.state.is_tripped() {
            debug!("event=db_execute module=guard status=short_circuit");
            return GuardOutcome::ShortCircuited;
        }

        let started_at = Instant::now();
        let mut scope = match self.driver.open(connection_string) {
            Ok(conn) => ConnectionScope(conn),
            Err(err) => return self.fail_driver("db_execute", started_at, &err),
        };

        let mut params = Parameters::new();
        bind(&mut params);

        match scope.0.execute(command, &params) {
            Ok(affected) => {
                info!(
                    "event=db_execute module=guard status=ok duration_ms={} affected={}",
                    started_at.elapsed().as_millis(),
                    affected
                );
                GuardOutcome::Completed(affected)
            }
            Err(err) => self.fail_driver("db_execute", started_at, &err),
        }
    }

    fn fail_driver<T>(&self, event: &str, started_at: Instant, err: &DriverError) -> GuardOutcome<T> {
        let failure = GuardFailure::from_driver(err, self.state.trip());
        self.report(event, started_at, failure)
    }

    fn report<T>(&self, event: &str, started_at: Instant, failure: GuardFailure) -> GuardOutcome<T> {
        error!(
            "event={} module=guard status=error duration_ms={} error_kind={} error_code={} error={}",
            event,
            started_at.elapsed().as_millis(),
            failure.kind.as_str(),
            failure
                .code
                .map_or_else(|| "none".to_string(), |code| code.to_string()),
            sanitize_message(&failure.message, MAX_LOGGED_ERROR_CHARS)
        );
        if failure.first_trip {
            warn!(
                "event=connection_tripped module=guard status=tripped error_kind={}",
                failure.kind.as_str()
            );
        }
        GuardOutcome::Failed(failure)
    }
}

/// Closes the wrapped connection when the call scope ends, on every path.
struct ConnectionScope<C: DriverConnection>(C);

impl<C: DriverConnection> Drop for ConnectionScope<C> {
    fn drop(&mut self) {
        if let Err(err) = self.0.close() {
            warn!(
                "event=db_close module=guard status=error error={}",
                sanitize_message(&err.to_string(), MAX_LOGGED_ERROR_CHARS)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FailureKind, GuardFailure, GuardOutcome};
    use crate::db::driver::{DriverError, RowError};

    #[test]
    fn driver_errors_map_onto_failure_kinds() {
        let timeout = DriverError::Timeout {
            code: 5,
            message: "database is locked".to_string(),
        };
        let vendor = DriverError::Vendor {
            code: 19,
            extended_code: 2067,
            message: "UNIQUE constraint failed".to_string(),
        };
        let other = DriverError::Other("Invalid parameter name: :x".to_string());

        let failure = GuardFailure::from_driver(&timeout, true);
        assert_eq!(failure.kind, FailureKind::ConnectionTimeout);
        assert_eq!(failure.code, Some(5));
        assert!(failure.first_trip);

        let failure = GuardFailure::from_driver(&vendor, false);
        assert_eq!(failure.kind, FailureKind::StoreError);
        assert_eq!(failure.code, Some(2067));
        assert_eq!(failure.message, "UNIQUE constraint failed");

        let failure = GuardFailure::from_driver(&other, false);
        assert_eq!(failure.kind, FailureKind::Unclassified);
        assert_eq!(failure.code, None);
    }

    #[test]
    fn handler_errors_are_unclassified() {
        let failure = GuardFailure::from_handler(&RowError::MissingColumn("ID".to_string()), true);
        assert_eq!(failure.kind, FailureKind::Unclassified);
        assert!(failure.message.contains("ID"));
        assert_eq!(failure.to_string(), "generic: result set has no column `ID`");
    }

    #[test]
    fn outcome_helpers() {
        assert_eq!(GuardOutcome::Completed(3).completed(), Some(3));
        assert!(!GuardOutcome::<usize>::ShortCircuited.is_completed());
        assert_eq!(GuardOutcome::<usize>::ShortCircuited.completed(), None);
    }
}
