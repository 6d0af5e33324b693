/// # Test Utilities Module
///
/// A scripted in-memory driver for exercising the engine without a
/// database server, plus recording log and fail-channel sinks.
///
/// A [`Script`] is shared between the test and every connection and
/// statement the [`ScriptedDriver`] hands out. Tests queue failures on it
/// and read back what the engine did: connects, live handles, executed
/// SQL with its bindings, fetches and cursor closes.
use crate::core::db::dispatch::StatementKind;
use crate::core::driver::{
    ConnectOptions, CursorKind, Driver, DriverConnection, DriverStatement, Placeholder,
};
use crate::core::error::{DriverError, DriverErrorKind, DriverResult};
use crate::core::value::{FetchMode, Row, Value};
use crate::fail::FailChannel;
use crate::log::LogSink;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Error text the default recovery policy treats as a lost connection.
pub const GONE_AWAY: &str = "SQLSTATE[HY000]: General error: 2006 MySQL server has gone away";

/// One executed statement as the driver saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub sql: String,
    pub bindings: Vec<(Placeholder, Value)>,
}

#[derive(Debug, Default)]
pub struct ScriptState {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub affected: u64,
    pub last_insert_id: String,
    pub connect_failures: VecDeque<DriverError>,
    pub execute_failures: VecDeque<DriverError>,
    /// Fetch index (per execution) that fails
    pub fetch_failure: Option<(usize, DriverError)>,
    pub connects: usize,
    pub live_handles: usize,
    pub max_live_handles: usize,
    pub executed: Vec<Executed>,
    pub cursor_closes: usize,
}

/// Shared, mutable script for a [`ScriptedDriver`].
#[derive(Debug, Clone, Default)]
pub struct Script {
    state: Arc<Mutex<ScriptState>>,
}

impl Script {
    pub fn new() -> Self {
        Script::default()
    }

    /// Rows returned by every row-set statement.
    pub fn with_rows(self, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        {
            let mut state = self.state();
            state.columns = columns.iter().map(|c| c.to_string()).collect();
            state.rows = rows;
        }
        self
    }

    /// Affected-row count reported by every other statement.
    pub fn with_affected(self, affected: u64) -> Self {
        self.state().affected = affected;
        self
    }

    pub fn with_last_insert_id(self, id: &str) -> Self {
        self.state().last_insert_id = id.to_string();
        self
    }

    /// Makes the next `times` executions fail with `message`.
    pub fn fail_executes(&self, times: usize, message: &str) {
        let mut state = self.state();
        for _ in 0..times {
            state
                .execute_failures
                .push_back(DriverError::new(DriverErrorKind::Execute, message));
        }
    }

    /// Makes the next `times` connection attempts fail with `message`.
    pub fn fail_connects(&self, times: usize, message: &str) {
        let mut state = self.state();
        for _ in 0..times {
            state
                .connect_failures
                .push_back(DriverError::new(DriverErrorKind::Connect, message));
        }
    }

    /// Makes fetch number `index` (0-based) of each execution fail.
    pub fn fail_fetch_at(&self, index: usize, message: &str) {
        self.state().fetch_failure =
            Some((index, DriverError::new(DriverErrorKind::Fetch, message)));
    }

    pub fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap()
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.state().executed.iter().map(|e| e.sql.clone()).collect()
    }

    pub fn last_executed(&self) -> Option<Executed> {
        self.state().executed.last().cloned()
    }

    pub fn driver(&self) -> ScriptedDriver {
        ScriptedDriver {
            script: self.clone(),
        }
    }

    /// A statement for `sql` that has already been executed once.
    pub fn executed_statement(&self, sql: &str) -> ScriptedStatement {
        let mut statement = ScriptedStatement::new(self.clone(), sql);
        statement.execute().unwrap();
        statement
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedDriver {
    script: Script,
}

impl Driver for ScriptedDriver {
    type Connection = ScriptedConnection;

    fn connect(&self, _options: &ConnectOptions) -> DriverResult<ScriptedConnection> {
        let mut state = self.script.state();
        state.connects += 1;
        if let Some(e) = state.connect_failures.pop_front() {
            return Err(e);
        }
        state.live_handles += 1;
        state.max_live_handles = state.max_live_handles.max(state.live_handles);
        Ok(ScriptedConnection {
            script: self.script.clone(),
            in_transaction: false,
        })
    }
}

#[derive(Debug)]
pub struct ScriptedConnection {
    script: Script,
    in_transaction: bool,
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        if let Ok(mut state) = self.script.state.lock() {
            state.live_handles -= 1;
        }
    }
}

impl DriverConnection for ScriptedConnection {
    type Statement = ScriptedStatement;

    fn prepare(&mut self, sql: &str, _cursor: CursorKind) -> DriverResult<ScriptedStatement> {
        Ok(ScriptedStatement::new(self.script.clone(), sql))
    }

    fn last_insert_id(&self) -> DriverResult<String> {
        Ok(self.script.state().last_insert_id.clone())
    }

    fn begin_transaction(&mut self) -> DriverResult<()> {
        if self.in_transaction {
            return Err(DriverError::new(
                DriverErrorKind::Transaction,
                "There is already an active transaction",
            ));
        }
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.end_transaction()
    }

    fn roll_back(&mut self) -> DriverResult<()> {
        self.end_transaction()
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

impl ScriptedConnection {
    fn end_transaction(&mut self) -> DriverResult<()> {
        if !self.in_transaction {
            return Err(DriverError::new(
                DriverErrorKind::Transaction,
                "There is no active transaction",
            ));
        }
        self.in_transaction = false;
        Ok(())
    }
}

#[derive(Debug)]
pub struct ScriptedStatement {
    script: Script,
    sql: String,
    columns: Arc<[String]>,
    bindings: Vec<(Placeholder, Value)>,
    rows: VecDeque<Vec<Value>>,
    fetched: usize,
    row_count: u64,
}

impl ScriptedStatement {
    fn new(script: Script, sql: &str) -> Self {
        let columns = script.state().columns.clone().into();
        ScriptedStatement {
            script,
            sql: sql.to_string(),
            columns,
            bindings: Vec::new(),
            rows: VecDeque::new(),
            fetched: 0,
            row_count: 0,
        }
    }
}

impl DriverStatement for ScriptedStatement {
    fn bind(&mut self, placeholder: Placeholder, value: Value) -> DriverResult<()> {
        self.bindings.push((placeholder, value));
        Ok(())
    }

    fn execute(&mut self) -> DriverResult<()> {
        let mut state = self.script.state();
        state.executed.push(Executed {
            sql: self.sql.clone(),
            bindings: self.bindings.clone(),
        });
        if let Some(e) = state.execute_failures.pop_front() {
            return Err(e);
        }
        self.fetched = 0;
        if StatementKind::classify(&self.sql).returns_rows() {
            self.rows = state.rows.iter().cloned().collect();
            self.row_count = self.rows.len() as u64;
        } else {
            self.rows.clear();
            self.row_count = state.affected;
        }
        Ok(())
    }

    fn fetch(&mut self, mode: FetchMode) -> DriverResult<Option<Row>> {
        let index = self.fetched;
        self.fetched += 1;
        if let Some((at, e)) = &self.script.state().fetch_failure {
            if *at == index {
                return Err(e.clone());
            }
        }
        Ok(self
            .rows
            .pop_front()
            .map(|values| Row::with_mode(&self.columns, values, mode)))
    }

    fn row_count(&self) -> u64 {
        self.row_count
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn close_cursor(&mut self) -> DriverResult<()> {
        self.rows.clear();
        self.script.state().cursor_closes += 1;
        Ok(())
    }
}

/// Collects log lines with their key, remembering which were notices.
#[derive(Debug, Clone, Default)]
pub struct RecordingLog {
    lines: Arc<Mutex<Vec<LogLine>>>,
}

#[derive(Debug, Clone)]
struct LogLine {
    key: String,
    message: String,
    notice: bool,
}

impl RecordingLog {
    pub fn messages(&self) -> Vec<String> {
        self.lines.lock().unwrap().iter().map(|l| l.message.clone()).collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lines.lock().unwrap().iter().map(|l| l.key.clone()).collect()
    }

    /// Messages recorded through [`LogSink::notice`].
    pub fn notices(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.notice)
            .map(|l| l.message.clone())
            .collect()
    }

    fn push(&self, message: &str, key: &str, notice: bool) {
        self.lines.lock().unwrap().push(LogLine {
            key: key.to_string(),
            message: message.to_string(),
            notice,
        });
    }
}

impl LogSink for RecordingLog {
    fn write(&self, message: &str, key: &str) {
        self.push(message, key, false);
    }

    fn notice(&self, message: &str, key: &str) {
        self.push(message, key, true);
    }
}

/// Collects fatal reports.
#[derive(Debug, Clone, Default)]
pub struct RecordingFailChannel {
    reports: Arc<Mutex<Vec<String>>>,
}

impl RecordingFailChannel {
    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().unwrap().clone()
    }
}

impl FailChannel for RecordingFailChannel {
    fn report_fatal(&self, message: &str) {
        self.reports.lock().unwrap().push(message.to_string());
    }
}

/// Rows `r1`, `r2`, `r3` with columns `id, name`.
pub fn three_rows() -> Vec<Vec<Value>> {
    (1..=3)
        .map(|i| vec![Value::Integer(i), Value::Text(format!("r{i}"))])
        .collect()
}

/// MySQL-style options; the scripted driver ignores them but the engine
/// uses them for identifier quoting and the log key.
pub fn mysql_options() -> ConnectOptions {
    ConnectOptions::mysql("localhost", 3306, "shop", "app", "secret")
}
