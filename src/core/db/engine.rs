/// Query Engine Module
///
/// `Database` is the request surface of sqlrun. Each public call is one
/// logical operation: its SQL and original parameters are captured in an
/// [`Operation`] and run through the rewrite / prepare / bind / execute
/// pipeline. When the driver reports a lost connection the handle is
/// dropped, a new one is opened, and the whole operation runs again from
/// its original parameters.
use crate::config::Config;
use crate::core::db::binder;
use crate::core::db::cursor::RowCursor;
use crate::core::db::dispatch::StatementKind;
use crate::core::db::recovery::{ConnectionState, Decision, RecoveryPolicy};
use crate::core::db::rewrite::rewrite;
use crate::core::db::writes;
use crate::core::driver::{ConnectOptions, CursorKind, Driver, DriverConnection, DriverStatement};
use crate::core::error::{DriverError, DriverResult};
use crate::core::value::{FetchMode, Params, Row, Value};
use crate::core::{Result, SqlrunError};
use crate::fail::{fatal_message, FailurePolicy};
use crate::log::{log_key, LogSink, TracingLog};
use tracing::{debug, error, info, warn};

/// Statement handle type produced by a driver.
pub type StatementOf<D> = <<D as Driver>::Connection as DriverConnection>::Statement;

/// Result of [`Database::query`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Row set of a SELECT, SHOW, CALL or DESCRIBE
    Rows(Vec<Row>),
    /// Affected-row count of an INSERT, UPDATE or DELETE
    Affected(u64),
    /// Any other statement
    Empty,
}

impl QueryOutcome {
    pub fn into_rows(self) -> Option<Vec<Row>> {
        match self {
            QueryOutcome::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn affected(&self) -> Option<u64> {
        match self {
            QueryOutcome::Affected(n) => Some(*n),
            _ => None,
        }
    }
}

/// Result of [`Database::iterator`].
#[derive(Debug)]
pub enum CursorOutcome<S: DriverStatement> {
    Rows(RowCursor<S>),
    Affected(u64),
    Empty,
}

impl<S: DriverStatement> CursorOutcome<S> {
    pub fn into_cursor(self) -> Option<RowCursor<S>> {
        match self {
            CursorOutcome::Rows(cursor) => Some(cursor),
            _ => None,
        }
    }
}

/// Counters kept across operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Rows seen by the last `column` or `row` call
    pub row_count: u64,
    /// Columns seen by the last `column` or `row` call
    pub column_count: usize,
    /// Statements that completed successfully
    pub query_count: u64,
}

/// One logical call, re-runnable after a reconnect.
#[derive(Debug, Clone, Copy)]
struct Operation<'q> {
    /// Operations without a name are never retried
    method: Option<&'static str>,
    sql: &'q str,
    params: &'q Params,
}

static NO_PARAMS: Params = Params::Positional(Vec::new());

impl<'q> Operation<'q> {
    fn new(method: &'static str, sql: &'q str, params: &'q Params) -> Self {
        Operation {
            method: Some(method),
            sql,
            params,
        }
    }

    fn unnamed(sql: &'q str) -> Self {
        Operation {
            method: None,
            sql,
            params: &NO_PARAMS,
        }
    }
}

/// Configures a [`Database`] before its first connection.
pub struct DatabaseBuilder<D: Driver> {
    driver: D,
    options: ConnectOptions,
    policy: RecoveryPolicy,
    log: Box<dyn LogSink>,
    failure: FailurePolicy,
}

impl<D: Driver> DatabaseBuilder<D> {
    pub fn recovery(mut self, policy: RecoveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn log_sink(mut self, log: Box<dyn LogSink>) -> Self {
        self.log = log;
        self
    }

    pub fn failure_policy(mut self, failure: FailurePolicy) -> Self {
        self.failure = failure;
        self
    }

    /// Builds the engine and attempts one connection. A failed attempt is
    /// logged and leaves the engine disconnected; the next operation
    /// connects again.
    pub fn build(self) -> Database<D> {
        let log_key = log_key(&self.options.database, &self.options.password);
        let mut db = Database {
            driver: self.driver,
            options: self.options,
            state: ConnectionState::default(),
            policy: self.policy,
            log: self.log,
            log_key,
            failure: self.failure,
            stats: QueryStats::default(),
        };
        match db.driver.connect(&db.options) {
            Ok(connection) => {
                info!("Connected to {}", db.options.dsn);
                db.state.handle = Some(connection);
            }
            Err(e) => {
                error!("Initial connection to {} failed: {}", db.options.dsn, e);
                db.write_log(&e.message);
            }
        }
        db
    }
}

/// Connection manager and query executor over a driver.
pub struct Database<D: Driver> {
    driver: D,
    options: ConnectOptions,
    state: ConnectionState<D::Connection>,
    policy: RecoveryPolicy,
    log: Box<dyn LogSink>,
    log_key: String,
    failure: FailurePolicy,
    stats: QueryStats,
}

impl<D: Driver> Database<D> {
    /// Builds an engine with default recovery, tracing logs, and errors
    /// returned to the caller.
    pub fn new(driver: D, options: ConnectOptions) -> Self {
        Database::builder(driver, options).build()
    }

    pub fn builder(driver: D, options: ConnectOptions) -> DatabaseBuilder<D> {
        DatabaseBuilder {
            driver,
            options,
            policy: RecoveryPolicy::default(),
            log: Box::new(TracingLog),
            failure: FailurePolicy::Propagate,
        }
    }

    /// Builds an engine from a loaded configuration file.
    pub fn from_config(driver: D, config: &Config) -> Result<Self> {
        Ok(Database::builder(driver, config.connect_options()?)
            .recovery(config.recovery_policy())
            .log_sink(config.log_sink())
            .build())
    }

    /// Runs a statement and returns its rows, its affected-row count, or
    /// nothing, depending on the statement's leading keyword.
    pub fn query(&mut self, sql: &str, params: &Params) -> Result<QueryOutcome> {
        self.query_with(sql, params, FetchMode::default())
    }

    pub fn query_with(&mut self, sql: &str, params: &Params, mode: FetchMode) -> Result<QueryOutcome> {
        let sql = sql.trim();
        let kind = StatementKind::classify(sql);
        self.with_recovery(Operation::new("query", sql, params), |conn, sql, params| {
            let mut statement = binder::execute(conn, sql, params, CursorKind::ForwardOnly)?;
            let outcome = match kind {
                StatementKind::RowSet => QueryOutcome::Rows(statement.fetch_all(mode)?),
                StatementKind::AffectedRows => QueryOutcome::Affected(statement.row_count()),
                StatementKind::Other => QueryOutcome::Empty,
            };
            statement.close_cursor()?;
            Ok(outcome)
        })
    }

    /// Like [`query`](Self::query), but row sets come back as a lazy
    /// [`RowCursor`] instead of a vector.
    pub fn iterator(&mut self, sql: &str, params: &Params) -> Result<CursorOutcome<StatementOf<D>>> {
        self.iterator_with(sql, params, FetchMode::default())
    }

    pub fn iterator_with(
        &mut self,
        sql: &str,
        params: &Params,
        mode: FetchMode,
    ) -> Result<CursorOutcome<StatementOf<D>>> {
        let sql = sql.trim();
        let kind = StatementKind::classify(sql);
        let op = Operation::new("iterator", sql, params);
        if kind.returns_rows() {
            let statement = self.with_recovery(op, |conn, sql, params| {
                binder::execute(conn, sql, params, CursorKind::Scrollable)
            })?;
            return Ok(CursorOutcome::Rows(RowCursor::new(statement, sql, mode)));
        }
        let affected = self.with_recovery(op, |conn, sql, params| {
            let mut statement = binder::execute(conn, sql, params, CursorKind::ForwardOnly)?;
            let affected = statement.row_count();
            statement.close_cursor()?;
            Ok(affected)
        })?;
        Ok(match kind {
            StatementKind::AffectedRows => CursorOutcome::Affected(affected),
            _ => CursorOutcome::Empty,
        })
    }

    /// Inserts one row and returns the new row's id, or `None` when no row
    /// was inserted.
    pub fn insert(&mut self, table: &str, values: &[(&str, Value)]) -> Result<Option<String>> {
        let (sql, params) = match writes::build_insert(self.options.kind, table, values) {
            Ok(built) => built,
            Err(error) => return Err(self.reject(error, "")),
        };
        match self.query(&sql, &params)? {
            QueryOutcome::Affected(n) if n > 0 => Ok(Some(self.last_insert_id()?)),
            _ => Ok(None),
        }
    }

    /// Inserts several rows with one statement. Every row must list the
    /// same columns in the same order as the first.
    pub fn insert_multi(&mut self, table: &str, rows: &[Vec<(&str, Value)>]) -> Result<bool> {
        let (sql, params) = match writes::build_insert_multi(self.options.kind, table, rows) {
            Ok(Some(built)) => built,
            Ok(None) => return Ok(false),
            Err(error) => return Err(self.reject(error, "")),
        };
        let affected = self.query(&sql, &params)?.affected().unwrap_or(0);
        Ok(affected > 0)
    }

    /// Updates rows matching all `conditions` and returns the affected-row
    /// count.
    pub fn update(
        &mut self,
        table: &str,
        values: &[(&str, Value)],
        conditions: &[(&str, Value)],
    ) -> Result<u64> {
        let (sql, params) = match writes::build_update(self.options.kind, table, values, conditions) {
            Some(built) => built,
            None => return Ok(0),
        };
        Ok(self.query(&sql, &params)?.affected().unwrap_or(0))
    }

    /// First column of every row.
    pub fn column(&mut self, sql: &str, params: &Params) -> Result<Vec<Value>> {
        let sql = sql.trim();
        let (values, row_count, column_count) =
            self.with_recovery(Operation::new("column", sql, params), |conn, sql, params| {
                let mut statement = binder::execute(conn, sql, params, CursorKind::ForwardOnly)?;
                let rows = statement.fetch_all(FetchMode::Num)?;
                let counts = (statement.row_count(), statement.column_count());
                statement.close_cursor()?;
                let values = rows
                    .into_iter()
                    .filter_map(|row| row.into_values().into_iter().next())
                    .collect::<Vec<_>>();
                Ok((values, counts.0, counts.1))
            })?;
        self.stats.row_count = row_count;
        self.stats.column_count = column_count;
        Ok(values)
    }

    /// First row of the result, if any.
    pub fn row(&mut self, sql: &str, params: &Params) -> Result<Option<Row>> {
        self.row_with(sql, params, FetchMode::default())
    }

    pub fn row_with(&mut self, sql: &str, params: &Params, mode: FetchMode) -> Result<Option<Row>> {
        let sql = sql.trim();
        let (row, row_count, column_count) =
            self.with_recovery(Operation::new("row", sql, params), |conn, sql, params| {
                let mut statement = binder::execute(conn, sql, params, CursorKind::ForwardOnly)?;
                let row = statement.fetch(mode)?;
                let counts = (statement.row_count(), statement.column_count());
                statement.close_cursor()?;
                Ok((row, counts.0, counts.1))
            })?;
        self.stats.row_count = row_count;
        self.stats.column_count = column_count;
        Ok(row)
    }

    /// First column of the first row, if any.
    pub fn single(&mut self, sql: &str, params: &Params) -> Result<Option<Value>> {
        let sql = sql.trim();
        self.with_recovery(Operation::new("single", sql, params), |conn, sql, params| {
            let mut statement = binder::execute(conn, sql, params, CursorKind::ForwardOnly)?;
            let row = statement.fetch(FetchMode::Num)?;
            statement.close_cursor()?;
            Ok(row.and_then(|row| row.into_values().into_iter().next()))
        })
    }

    pub fn last_insert_id(&mut self) -> Result<String> {
        self.with_recovery(Operation::unnamed(""), |conn, _, _| conn.last_insert_id())
    }

    pub fn begin_transaction(&mut self) -> Result<()> {
        self.with_recovery(Operation::unnamed("BEGIN"), |conn, _, _| conn.begin_transaction())
    }

    pub fn commit(&mut self) -> Result<()> {
        self.with_recovery(Operation::unnamed("COMMIT"), |conn, _, _| conn.commit())
    }

    pub fn roll_back(&mut self) -> Result<()> {
        self.with_recovery(Operation::unnamed("ROLLBACK"), |conn, _, _| conn.roll_back())
    }

    pub fn in_transaction(&self) -> bool {
        self.state
            .handle
            .as_ref()
            .map_or(false, |conn| conn.in_transaction())
    }

    /// Drops the connection. The next operation reconnects.
    pub fn close_connection(&mut self) {
        debug!("Closing connection to {}", self.options.dsn);
        self.state.invalidate();
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_open()
    }

    pub fn retry_count(&self) -> u32 {
        self.state.retry_count()
    }

    pub fn stats(&self) -> QueryStats {
        self.stats
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Runs `run` on a live connection, reconnecting and re-running the
    /// whole operation while the recovery policy allows it.
    fn with_recovery<T>(
        &mut self,
        op: Operation<'_>,
        mut run: impl FnMut(&mut D::Connection, &str, &Params) -> DriverResult<T>,
    ) -> Result<T> {
        loop {
            let (sql, params) = match rewrite(op.sql, op.params) {
                Ok(rewritten) => rewritten,
                Err(error) => return Err(self.reject(error, op.sql)),
            };
            let error = match self.connection().and_then(|conn| run(conn, &*sql, &*params)) {
                Ok(value) => {
                    // Transaction control and id lookups are not statements.
                    if op.method.is_some() {
                        self.state.record_success();
                        self.stats.query_count += 1;
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            self.write_log(&failure_message(&error.message, op.sql));
            let in_transaction = self.in_transaction();
            match self.policy.decide(&self.state, op.method, in_transaction, &error) {
                Decision::Retry => {
                    self.state.invalidate();
                    self.state.retry_count += 1;
                    warn!(
                        "Connection lost during {}; retry {} of {}",
                        op.method.unwrap_or("operation"),
                        self.state.retry_count,
                        self.policy.max_retries
                    );
                    self.write_notice(&format!("Retry {} times", self.state.retry_count));
                }
                Decision::Fail => return Err(self.fail(error, op.sql)),
            }
        }
    }

    /// The live connection, opening one if needed.
    fn connection(&mut self) -> DriverResult<&mut D::Connection> {
        let connection = match self.state.handle.take() {
            Some(connection) => connection,
            None => {
                info!("Connecting to {}", self.options.dsn);
                self.driver.connect(&self.options)?
            }
        };
        Ok(self.state.handle.insert(connection))
    }

    fn fail(&self, error: DriverError, sql: &str) -> SqlrunError {
        let error = self.policy.classify(error, sql);
        error!("{}", error);
        self.report(error)
    }

    /// Input that never reached the driver is logged and reported like a
    /// failed statement.
    fn reject(&self, error: SqlrunError, sql: &str) -> SqlrunError {
        self.write_log(&failure_message(&error.to_string(), sql));
        error!("{}", error);
        self.report(error)
    }

    fn report(&self, error: SqlrunError) -> SqlrunError {
        match &self.failure {
            // Inside an open transaction the caller gets the error back so
            // it can roll back.
            FailurePolicy::Report(channel) if !self.in_transaction() => {
                channel.report_fatal(&fatal_message(&error));
                SqlrunError::Aborted(error.to_string())
            }
            _ => error,
        }
    }

    fn write_log(&self, message: &str) {
        self.log.write(message, &self.log_key);
    }

    fn write_notice(&self, message: &str) {
        self.log.notice(message, &self.log_key);
    }
}

fn failure_message(message: &str, sql: &str) -> String {
    if sql.is_empty() {
        message.to_string()
    } else {
        format!("{}\nRaw SQL : {}", message, sql)
    }
}
