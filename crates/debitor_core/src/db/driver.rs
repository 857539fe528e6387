//! Driver-neutral contracts used by the connection guard.
//!
//! # Responsibility
//! - Describe how a connection is opened, queried, executed and closed.
//! - Carry values, named parameters and row access without leaking vendor
//!   types into guard or repository code.
//!
//! # Invariants
//! - Parameter names are always stored in `:name` form.
//! - Drivers classify their own errors into `DriverError` variants.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Owned SQL value as seen by row handlers and parameter binders.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Storage class name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Named parameter bindings for one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    entries: Vec<(String, SqlValue)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `value` to the `:name` marker, replacing an earlier binding.
    ///
    /// `name` may be given with or without the leading colon.
    pub fn add(&mut self, name: &str, value: impl Into<SqlValue>) -> &mut Self {
        let name = normalize_name(name);
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        let name = normalize_name(name);
        self.entries
            .iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.starts_with(':') {
        trimmed.to_string()
    } else {
        format!(":{trimmed}")
    }
}

/// Row mapping failures raised by row handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    MissingColumn(String),
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl Display for RowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingColumn(column) => write!(f, "result set has no column `{column}`"),
            Self::TypeMismatch {
                column,
                expected,
                found,
            } => write!(f, "column `{column}` expected {expected}, found {found}"),
        }
    }
}

impl Error for RowError {}

/// Read access to the current row of an open cursor.
///
/// A `RowView` is only valid inside the row handler call it was passed to.
pub trait RowView {
    /// Returns the value of `column` (case-insensitive name lookup).
    fn value(&self, column: &str) -> Result<SqlValue, RowError>;

    /// Reads an integer column; `None` for NULL.
    fn get_i64(&self, column: &str) -> Result<Option<i64>, RowError> {
        match self.value(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Integer(value) => Ok(Some(value)),
            other => Err(RowError::TypeMismatch {
                column: column.to_string(),
                expected: "integer",
                found: other.type_name(),
            }),
        }
    }

    /// Reads a text column; `None` for NULL.
    fn get_text(&self, column: &str) -> Result<Option<String>, RowError> {
        match self.value(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(value) => Ok(Some(value)),
            other => Err(RowError::TypeMismatch {
                column: column.to_string(),
                expected: "text",
                found: other.type_name(),
            }),
        }
    }
}

/// Row handler signature shared by drivers and the guard.
pub type RowHandler<'h> = dyn FnMut(&dyn RowView) -> Result<(), RowError> + 'h;

/// Driver-level failure, already classified by the vendor driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Store unreachable or not answering in time ("no listener" / timeout).
    Timeout { code: i32, message: String },
    /// Any other vendor-reported error.
    Vendor {
        code: i32,
        extended_code: i32,
        message: String,
    },
    /// Driver failure without a vendor code.
    Other(String),
}

impl DriverError {
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Timeout { code, .. } => Some(*code),
            Self::Vendor { extended_code, .. } => Some(*extended_code),
            Self::Other(_) => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Timeout { message, .. } => message,
            Self::Vendor { message, .. } => message,
            Self::Other(message) => message,
        }
    }
}

impl Display for DriverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { code, message } => {
                write!(f, "connection timeout (code {code}): {message}")
            }
            Self::Vendor {
                code,
                extended_code,
                message,
            } => write!(f, "store error {code}/{extended_code}: {message}"),
            Self::Other(message) => write!(f, "driver error: {message}"),
        }
    }
}

impl Error for DriverError {}

/// Failure of a streaming query: either the driver or the row handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    Driver(DriverError),
    Handler(RowError),
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Driver(err) => write!(f, "{err}"),
            Self::Handler(err) => write!(f, "row handler failed: {err}"),
        }
    }
}

impl Error for QueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Driver(err) => Some(err),
            Self::Handler(err) => Some(err),
        }
    }
}

impl From<DriverError> for QueryError {
    fn from(value: DriverError) -> Self {
        Self::Driver(value)
    }
}

impl From<RowError> for QueryError {
    fn from(value: RowError) -> Self {
        Self::Handler(value)
    }
}

/// Opens connections from an opaque connection string.
pub trait Driver {
    type Connection: DriverConnection;

    fn open(&self, connection_string: &str) -> Result<Self::Connection, DriverError>;
}

/// One open connection, owned by a single guard call.
pub trait DriverConnection {
    /// Runs `sql` and calls `on_row` once per row while the cursor is open,
    /// in store order. Returns the number of rows visited.
    fn query(
        &mut self,
        sql: &str,
        params: &Parameters,
        on_row: &mut RowHandler<'_>,
    ) -> Result<usize, QueryError>;

    /// Runs a mutating statement and returns the affected-row count.
    fn execute(&mut self, sql: &str, params: &Parameters) -> Result<usize, DriverError>;

    /// Releases the connection. Called exactly once per opened connection.
    fn close(&mut self) -> Result<(), DriverError>;
}
