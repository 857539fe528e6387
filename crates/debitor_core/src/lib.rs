//! Database-access core for debitor master data.
//!
//! A fail-once connection guard wraps raw statement execution; the debitor
//! repository builds parameterized SQL on top of it and maps rows to records.

pub mod db;
pub mod guard;
pub mod logging;
pub mod model;
pub mod repo;
pub mod settings;

pub use db::{create_database, SqliteDriver};
pub use guard::{ConnectionGuard, ConnectionState, FailureKind, GuardFailure, GuardOutcome};
pub use logging::{default_log_level, init_logging, init_stderr_logging, logging_status};
pub use model::debitor::{
    is_valid_email, parse_debitor_id, Debitor, DebitorId, ValidationError, NAME_MAX_CHARS,
};
pub use repo::debitor_repo::{DebitorRepository, GuardedDebitorRepository, RepoError, RepoResult};
pub use settings::{AppSettings, SettingsError, DEFAULT_CONNECTION_STRING};

/// Guard over the bundled SQLite driver.
pub type SqliteGuard = ConnectionGuard<SqliteDriver>;
/// Debitor repository over the bundled SQLite driver.
pub type SqliteDebitorRepository = GuardedDebitorRepository<SqliteDriver>;
