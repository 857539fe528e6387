//! SQLite implementation of the driver contracts.
//!
//! # Responsibility
//! - Open per-call SQLite connections from an opaque connection string.
//! - Stream rows to handlers and execute named-parameter statements.
//! - Classify `rusqlite` failures into `DriverError` variants.
//!
//! # Invariants
//! - Per-call connections never create the database file.
//! - `BUSY` and `CANTOPEN` are the timeout-class codes.
//! - Parameter values are bound, never formatted into SQL text.

use super::driver::{
    Driver, DriverConnection, DriverError, Parameters, QueryError, RowError, RowHandler, RowView,
    SqlValue,
};
use log::{error, info};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, ErrorCode, OpenFlags, Row, ToSql};
use std::time::{Duration, Instant};

const SCHEMA_SQL: &str = include_str!("schema/debitors.sql");

/// SQLite driver; each `open` yields a fresh connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver {
    busy_timeout: Option<Duration>,
}

impl SqliteDriver {
    /// Uses the `rusqlite` default busy timeout (5 s).
    pub fn new() -> Self {
        Self::default()
    }

    /// How long a statement waits on a locked store before failing with `BUSY`.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }
}

impl Driver for SqliteDriver {
    type Connection = SqliteConnection;

    fn open(&self, connection_string: &str) -> Result<Self::Connection, DriverError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(connection_string, flags)?;
        if let Some(timeout) = self.busy_timeout {
            conn.busy_timeout(timeout)?;
        }
        Ok(SqliteConnection { conn: Some(conn) })
    }
}

/// Connection handed out by [`SqliteDriver`].
pub struct SqliteConnection {
    conn: Option<Connection>,
}

impl SqliteConnection {
    fn conn(&self) -> Result<&Connection, DriverError> {
        self.conn
            .as_ref()
            .ok_or_else(|| DriverError::Other("connection already closed".to_string()))
    }
}

impl DriverConnection for SqliteConnection {
    fn query(
        &mut self,
        sql: &str,
        params: &Parameters,
        on_row: &mut RowHandler<'_>,
    ) -> Result<usize, QueryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(DriverError::from)?;
        let bound = bind_values(params);
        let named = named_refs(&bound);
        let mut rows = stmt.query(named.as_slice()).map_err(DriverError::from)?;

        let mut visited = 0;
        while let Some(row) = rows.next().map_err(DriverError::from)? {
            on_row(&SqliteRow(row))?;
            visited += 1;
        }

        Ok(visited)
    }

    fn execute(&mut self, sql: &str, params: &Parameters) -> Result<usize, DriverError> {
        let conn = self.conn()?;
        let bound = bind_values(params);
        let named = named_refs(&bound);
        let changed = conn.execute(sql, named.as_slice())?;
        Ok(changed)
    }

    fn close(&mut self) -> Result<(), DriverError> {
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, err)| err.into()),
            None => Ok(()),
        }
    }
}

struct SqliteRow<'a, 'stmt>(&'a Row<'stmt>);

impl RowView for SqliteRow<'_, '_> {
    fn value(&self, column: &str) -> Result<SqlValue, RowError> {
        let value = self
            .0
            .get_ref(column)
            .map_err(|_| RowError::MissingColumn(column.to_string()))?;

        Ok(match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(value) => SqlValue::Integer(value),
            ValueRef::Real(value) => SqlValue::Real(value),
            ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
        })
    }
}

fn bind_values(params: &Parameters) -> Vec<(&str, Value)> {
    params
        .iter()
        .map(|(name, value)| (name, to_sqlite_value(value)))
        .collect()
}

fn named_refs<'a>(bound: &'a [(&'a str, Value)]) -> Vec<(&'a str, &'a dyn ToSql)> {
    bound
        .iter()
        .map(|(name, value)| (*name, value as &dyn ToSql))
        .collect()
}

fn to_sqlite_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(value) => Value::Integer(*value),
        SqlValue::Real(value) => Value::Real(*value),
        SqlValue::Text(value) => Value::Text(value.clone()),
        SqlValue::Blob(value) => Value::Blob(value.clone()),
    }
}

impl From<rusqlite::Error> for DriverError {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::SqliteFailure(failure, message) => {
                let message = message.unwrap_or_else(|| failure.to_string());
                let code = failure.extended_code & 0xff;
                match failure.code {
                    ErrorCode::DatabaseBusy | ErrorCode::CannotOpen => {
                        Self::Timeout { code, message }
                    }
                    _ => Self::Vendor {
                        code,
                        extended_code: failure.extended_code,
                        message,
                    },
                }
            }
            other => Self::Other(other.to_string()),
        }
    }
}

/// Creates (if needed) the database behind `connection_string` and applies
/// the `debitors` table definition.
///
/// This is a bootstrap helper for tooling and tests; the guarded query path
/// never creates databases.
///
/// # Side effects
/// - May create the database file.
/// - Emits `db_bootstrap` logging events with duration and status.
pub fn create_database(connection_string: &str) -> Result<(), DriverError> {
    let started_at = Instant::now();
    info!("event=db_bootstrap module=db status=start");

    let result = Connection::open_with_flags(
        connection_string,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .and_then(|conn| {
        conn.execute_batch(SCHEMA_SQL)?;
        conn.close().map_err(|(_, err)| err)
    });

    match result {
        Ok(()) => {
            info!(
                "event=db_bootstrap module=db status=ok duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(())
        }
        Err(err) => {
            let err = DriverError::from(err);
            error!(
                "event=db_bootstrap module=db status=error duration_ms={} error_code={} error={}",
                started_at.elapsed().as_millis(),
                err.code().unwrap_or_default(),
                err
            );
            Err(err)
        }
    }
}
