//! Scripted in-memory driver that records every interaction.

#![allow(dead_code)]

use debitor_core::db::{
    Driver, DriverConnection, DriverError, Parameters, QueryError, RowError, RowHandler, RowView,
    SqlValue,
};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    pub sql: String,
    pub params: Parameters,
}

#[derive(Debug, Default)]
pub struct Script {
    pub rows: Vec<FakeRow>,
    pub open_error: Option<DriverError>,
    pub execute_error: Option<DriverError>,
    pub affected: usize,
    pub opens: usize,
    pub closes: usize,
    pub statements: Vec<RecordedStatement>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeRow {
    columns: Vec<(String, SqlValue)>,
}

impl FakeRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.columns.push((column.to_string(), value.into()));
        self
    }

    /// A fully populated `debitors` row.
    pub fn debitor(id: i64, name: &str, email: &str) -> Self {
        Self::new()
            .with("ID", id)
            .with("NAME", name)
            .with("EMAIL", email)
    }
}

impl RowView for FakeRow {
    fn value(&self, column: &str) -> Result<SqlValue, RowError> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value.clone())
            .ok_or_else(|| RowError::MissingColumn(column.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeDriver {
    script: Arc<Mutex<Script>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<FakeRow>) -> Self {
        let driver = Self::new();
        driver.script().rows = rows;
        driver
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn fail_open(&self, err: DriverError) {
        self.script().open_error = Some(err);
    }

    pub fn fail_execute(&self, err: DriverError) {
        self.script().execute_error = Some(err);
    }

    pub fn opens(&self) -> usize {
        self.script().opens
    }

    pub fn closes(&self) -> usize {
        self.script().closes
    }

    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.script().statements.clone()
    }
}

impl Driver for FakeDriver {
    type Connection = FakeConnection;

    fn open(&self, _connection_string: &str) -> Result<Self::Connection, DriverError> {
        let mut script = self.script();
        script.opens += 1;
        if let Some(err) = script.open_error.clone() {
            return Err(err);
        }
        Ok(FakeConnection {
            script: Arc::clone(&self.script),
        })
    }
}

pub struct FakeConnection {
    script: Arc<Mutex<Script>>,
}

impl FakeConnection {
    fn record(&self, sql: &str, params: &Parameters) -> Script {
        let mut script = self.script.lock().unwrap();
        script.statements.push(RecordedStatement {
            sql: sql.to_string(),
            params: params.clone(),
        });
        Script {
            rows: script.rows.clone(),
            execute_error: script.execute_error.clone(),
            affected: script.affected,
            ..Script::default()
        }
    }
}

impl DriverConnection for FakeConnection {
    fn query(
        &mut self,
        sql: &str,
        params: &Parameters,
        on_row: &mut RowHandler<'_>,
    ) -> Result<usize, QueryError> {
        // Rows are handed out with the script lock released.
        let snapshot = self.record(sql, params);
        if let Some(err) = snapshot.execute_error {
            return Err(QueryError::Driver(err));
        }

        let mut visited = 0;
        for row in &snapshot.rows {
            on_row(row)?;
            visited += 1;
        }
        Ok(visited)
    }

    fn execute(&mut self, sql: &str, params: &Parameters) -> Result<usize, DriverError> {
        let snapshot = self.record(sql, params);
        match snapshot.execute_error {
            Some(err) => Err(err),
            None => Ok(snapshot.affected),
        }
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.script.lock().unwrap().closes += 1;
        Ok(())
    }
}

pub fn timeout_error() -> DriverError {
    DriverError::Timeout {
        code: 14,
        message: "unable to open database file".to_string(),
    }
}

pub fn vendor_error() -> DriverError {
    DriverError::Vendor {
        code: 19,
        extended_code: 2067,
        message: "UNIQUE constraint failed: debitors.email".to_string(),
    }
}
