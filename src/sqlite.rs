/// SQLite Driver Module
///
/// Implements the driver traits on top of `rusqlite`. Statements share
/// their connection through an `Arc<Mutex<_>>` so they can outlive the
/// borrow that created them. Forward-only executions buffer their result
/// set; scrollable ones stream rows from a producer thread over a bounded
/// channel and hold the connection until the stream is finished or closed.
use crate::core::driver::{
    ConnectOptions, CursorKind, Driver, DriverConnection, DriverKind, DriverStatement, Placeholder,
};
use crate::core::error::{DriverError, DriverErrorKind, DriverResult};
use crate::core::value::{FetchMode, Row, Value};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, Statement};
use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Opens `sqlite:` connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    type Connection = SqliteConnection;

    fn connect(&self, options: &ConnectOptions) -> DriverResult<SqliteConnection> {
        if options.kind != DriverKind::Sqlite {
            return Err(DriverError::new(
                DriverErrorKind::Connect,
                format!("sqlite driver cannot open {}", options.dsn),
            ));
        }
        let path = options.target();
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| driver_error(DriverErrorKind::Connect, e))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| driver_error(DriverErrorKind::Connect, e))?;
        debug!("Opened sqlite database {}", path);

        Ok(SqliteConnection {
            conn: Arc::new(Mutex::new(conn)),
            transaction_open: Cell::new(false),
        })
    }
}

/// A live sqlite connection.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: Arc<Mutex<Connection>>,
    // Last observed transaction state, answered while a stream holds the lock.
    transaction_open: Cell<bool>,
}

impl DriverConnection for SqliteConnection {
    type Statement = SqliteStatement;

    fn prepare(&mut self, sql: &str, cursor: CursorKind) -> DriverResult<SqliteStatement> {
        let columns: Arc<[String]> = {
            let conn = lock(&self.conn, DriverErrorKind::Prepare)?;
            let statement = conn
                .prepare(sql)
                .map_err(|e| driver_error(DriverErrorKind::Prepare, e))?;
            statement
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>()
                .into()
        };
        Ok(SqliteStatement {
            conn: Arc::clone(&self.conn),
            sql: sql.to_string(),
            cursor,
            columns,
            bindings: Vec::new(),
            rows: VecDeque::new(),
            stream: None,
            row_count: 0,
        })
    }

    fn last_insert_id(&self) -> DriverResult<String> {
        let conn = lock(&self.conn, DriverErrorKind::Execute)?;
        Ok(conn.last_insert_rowid().to_string())
    }

    fn begin_transaction(&mut self) -> DriverResult<()> {
        self.batch("BEGIN")
    }

    fn commit(&mut self) -> DriverResult<()> {
        self.batch("COMMIT")
    }

    fn roll_back(&mut self) -> DriverResult<()> {
        self.batch("ROLLBACK")
    }

    fn in_transaction(&self) -> bool {
        if let Ok(conn) = self.conn.try_lock() {
            self.transaction_open.set(!conn.is_autocommit());
        }
        self.transaction_open.get()
    }
}

impl SqliteConnection {
    fn batch(&self, sql: &str) -> DriverResult<()> {
        let conn = lock(&self.conn, DriverErrorKind::Transaction)?;
        let result = conn
            .execute_batch(sql)
            .map_err(|e| driver_error(DriverErrorKind::Transaction, e));
        self.transaction_open.set(!conn.is_autocommit());
        result
    }
}

/// A prepared sqlite statement with its bound values.
#[derive(Debug)]
pub struct SqliteStatement {
    conn: Arc<Mutex<Connection>>,
    sql: String,
    cursor: CursorKind,
    columns: Arc<[String]>,
    bindings: Vec<(Placeholder, Value)>,
    rows: VecDeque<Vec<Value>>,
    stream: Option<RowStream>,
    row_count: u64,
}

impl DriverStatement for SqliteStatement {
    fn bind(&mut self, placeholder: Placeholder, value: Value) -> DriverResult<()> {
        self.bindings.retain(|(p, _)| *p != placeholder);
        self.bindings.push((placeholder, value));
        Ok(())
    }

    fn execute(&mut self) -> DriverResult<()> {
        self.stream = None;
        self.rows.clear();
        self.row_count = 0;

        if self.cursor == CursorKind::Scrollable && !self.columns.is_empty() {
            self.stream = Some(RowStream::start(
                Arc::clone(&self.conn),
                self.sql.clone(),
                self.bindings.clone(),
            )?);
            return Ok(());
        }

        let conn = lock(&self.conn, DriverErrorKind::Execute)?;
        let mut statement = prepare_bound(&conn, &self.sql, &self.bindings)?;

        let column_count = statement.column_count();
        if column_count == 0 {
            let changed = statement
                .raw_execute()
                .map_err(|e| driver_error(DriverErrorKind::Execute, e))?;
            self.row_count = changed as u64;
            return Ok(());
        }

        let mut buffered = VecDeque::new();
        let mut rows = statement.raw_query();
        while let Some(row) = rows
            .next()
            .map_err(|e| driver_error(DriverErrorKind::Execute, e))?
        {
            buffered.push_back(read_row(row, column_count)?);
        }
        self.row_count = buffered.len() as u64;
        self.rows = buffered;
        Ok(())
    }

    fn fetch(&mut self, mode: FetchMode) -> DriverResult<Option<Row>> {
        if let Some(stream) = self.stream.as_mut() {
            return match stream.next()? {
                Some(values) => {
                    self.row_count += 1;
                    Ok(Some(Row::with_mode(&self.columns, values, mode)))
                }
                None => {
                    self.stream = None;
                    Ok(None)
                }
            };
        }
        Ok(self
            .rows
            .pop_front()
            .map(|values| Row::with_mode(&self.columns, values, mode)))
    }

    /// Rows affected, or for a streamed result the rows delivered so far.
    fn row_count(&self) -> u64 {
        self.row_count
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn close_cursor(&mut self) -> DriverResult<()> {
        self.stream = None;
        self.rows.clear();
        Ok(())
    }
}

type RowMessage = DriverResult<Vec<Value>>;

/// Rows of one scrollable execution, produced on a dedicated thread.
///
/// The producer owns a clone of the connection handle and keeps its lock
/// for the whole stream. The channel holds a single row, so at most one row
/// waits ahead of the consumer. Dropping the stream disconnects the channel
/// and joins the producer, which releases the connection.
#[derive(Debug)]
struct RowStream {
    rows: Option<Receiver<RowMessage>>,
    producer: Option<JoinHandle<()>>,
}

impl RowStream {
    /// Spawns the producer and waits until the statement has run up to its
    /// first row, so prepare, bind and execute errors surface here.
    fn start(
        conn: Arc<Mutex<Connection>>,
        sql: String,
        bindings: Vec<(Placeholder, Value)>,
    ) -> DriverResult<Self> {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<DriverResult<()>>(1);
        let (row_tx, row_rx) = mpsc::sync_channel::<RowMessage>(1);

        let producer = thread::Builder::new()
            .name("sqlrun-sqlite-rows".to_string())
            .spawn(move || produce(&conn, &sql, &bindings, ready_tx, row_tx))
            .map_err(|e| {
                DriverError::new(
                    DriverErrorKind::Execute,
                    format!("failed to start sqlite row stream: {e}"),
                )
            })?;

        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(DriverError::new(
                DriverErrorKind::Execute,
                "sqlite row stream stopped before its first row",
            ))
        });
        let mut stream = RowStream {
            rows: Some(row_rx),
            producer: Some(producer),
        };
        match ready {
            Ok(()) => Ok(stream),
            Err(e) => {
                stream.finish();
                Err(e)
            }
        }
    }

    fn next(&mut self) -> DriverResult<Option<Vec<Value>>> {
        let received = match &self.rows {
            Some(rows) => rows.recv().ok(),
            None => None,
        };
        match received {
            Some(row) => row.map(Some),
            None => {
                self.finish();
                Ok(None)
            }
        }
    }

    fn finish(&mut self) {
        self.rows = None;
        if let Some(producer) = self.producer.take() {
            if producer.join().is_err() {
                warn!("sqlite row stream producer panicked");
            }
        }
    }
}

impl Drop for RowStream {
    fn drop(&mut self) {
        self.finish();
    }
}

fn produce(
    conn: &Mutex<Connection>,
    sql: &str,
    bindings: &[(Placeholder, Value)],
    ready: SyncSender<DriverResult<()>>,
    rows_out: SyncSender<RowMessage>,
) {
    let conn = match lock(conn, DriverErrorKind::Execute) {
        Ok(conn) => conn,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let mut statement = match prepare_bound(&conn, sql, bindings) {
        Ok(statement) => statement,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let column_count = statement.column_count();
    let mut rows = statement.raw_query();
    let first = match rows.next() {
        Ok(row) => row.map(|row| read_row(row, column_count)).transpose(),
        Err(e) => Err(driver_error(DriverErrorKind::Execute, e)),
    };
    let first = match first {
        Ok(first) => first,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        return;
    }
    let mut pending = match first {
        Some(values) => Ok(values),
        None => return,
    };

    loop {
        let failed = pending.is_err();
        if rows_out.send(pending).is_err() || failed {
            return;
        }
        pending = match rows.next() {
            Ok(Some(row)) => read_row(row, column_count),
            Ok(None) => return,
            Err(e) => Err(driver_error(DriverErrorKind::Fetch, e)),
        };
    }
}

fn prepare_bound<'c>(
    conn: &'c Connection,
    sql: &str,
    bindings: &[(Placeholder, Value)],
) -> DriverResult<Statement<'c>> {
    let mut statement = conn
        .prepare(sql)
        .map_err(|e| driver_error(DriverErrorKind::Prepare, e))?;

    for (placeholder, value) in bindings {
        let index = match placeholder {
            Placeholder::Index(i) => *i,
            Placeholder::Name(name) => statement
                .parameter_index(&format!(":{name}"))
                .map_err(|e| driver_error(DriverErrorKind::Bind, e))?
                .ok_or_else(|| {
                    DriverError::new(
                        DriverErrorKind::Bind,
                        format!("no placeholder {placeholder} in statement"),
                    )
                })?,
        };
        statement
            .raw_bind_parameter(index, to_sql_value(value))
            .map_err(|e| driver_error(DriverErrorKind::Bind, e))?;
    }
    Ok(statement)
}

fn read_row(row: &rusqlite::Row<'_>, column_count: usize) -> DriverResult<Vec<Value>> {
    let mut values = Vec::with_capacity(column_count);
    for i in 0..column_count {
        let value = row
            .get_ref(i)
            .map_err(|e| driver_error(DriverErrorKind::Fetch, e))?;
        values.push(from_value_ref(value));
    }
    Ok(values)
}

/// Never blocks: a scrollable stream keeps the lock until it is finished.
fn lock(conn: &Mutex<Connection>, kind: DriverErrorKind) -> DriverResult<MutexGuard<'_, Connection>> {
    conn.try_lock().map_err(|e| match e {
        TryLockError::WouldBlock => DriverError::new(
            kind,
            "sqlite connection is busy: a streaming result set is still open",
        ),
        TryLockError::Poisoned(_) => DriverError::new(kind, "sqlite connection lock poisoned"),
    })
}

fn driver_error(kind: DriverErrorKind, e: rusqlite::Error) -> DriverError {
    DriverError::new(kind, e.to_string())
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> SqliteConnection {
        SqliteDriver
            .connect(&ConnectOptions::sqlite(":memory:"))
            .unwrap()
    }

    fn run(conn: &mut SqliteConnection, sql: &str) -> SqliteStatement {
        let mut stmt = conn.prepare(sql, CursorKind::ForwardOnly).unwrap();
        stmt.execute().unwrap();
        stmt
    }

    #[test]
    fn test_rejects_other_dsn() {
        let opts = ConnectOptions::mysql("localhost", 3306, "shop", "u", "p");
        let err = SqliteDriver.connect(&opts).unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Connect);
    }

    #[test]
    fn test_bind_and_fetch() {
        let mut conn = memory();
        run(&mut conn, "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)");

        let mut insert = conn
            .prepare("INSERT INTO t (name) VALUES (:name)", CursorKind::ForwardOnly)
            .unwrap();
        insert.bind(Placeholder::Name("name".into()), "alice".into()).unwrap();
        insert.execute().unwrap();
        assert_eq!(insert.row_count(), 1);
        assert_eq!(conn.last_insert_id().unwrap(), "1");

        let mut select = conn
            .prepare("SELECT id, name FROM t WHERE id = ?", CursorKind::Scrollable)
            .unwrap();
        select.bind(Placeholder::Index(1), 1.into()).unwrap();
        select.execute().unwrap();
        assert_eq!(select.column_count(), 2);
        let row = select.fetch(FetchMode::Assoc).unwrap().unwrap();
        assert_eq!(row.get("name"), Some(&Value::Text("alice".to_string())));
        assert!(select.fetch(FetchMode::Assoc).unwrap().is_none());
    }

    #[test]
    fn test_unknown_named_placeholder() {
        let mut conn = memory();
        let mut stmt = conn.prepare("SELECT :a", CursorKind::ForwardOnly).unwrap();
        stmt.bind(Placeholder::Name("b".into()), 1.into()).unwrap();
        let err = stmt.execute().unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Bind);
    }

    #[test]
    fn test_prepare_error() {
        let mut conn = memory();
        let err = conn
            .prepare("SELEC 1", CursorKind::ForwardOnly)
            .unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Prepare);
    }

    #[test]
    fn test_transactions() {
        let mut conn = memory();
        assert!(!conn.in_transaction());
        conn.begin_transaction().unwrap();
        assert!(conn.in_transaction());
        conn.roll_back().unwrap();
        assert!(!conn.in_transaction());
        assert_eq!(conn.commit().unwrap_err().kind, DriverErrorKind::Transaction);
    }

    const COUNT_TO_MILLION: &str =
        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c LIMIT 1000000) SELECT x FROM c";

    #[test]
    fn test_scrollable_streams_rows() {
        let mut conn = memory();
        let mut stmt = conn.prepare(COUNT_TO_MILLION, CursorKind::Scrollable).unwrap();
        stmt.execute().unwrap();
        assert_eq!(stmt.row_count(), 0);

        for expected in 1..=3 {
            let row = stmt.fetch(FetchMode::Num).unwrap().unwrap();
            assert_eq!(row.values(), &[Value::Integer(expected)]);
        }
        assert_eq!(stmt.row_count(), 3);
        stmt.close_cursor().unwrap();
        assert!(stmt.fetch(FetchMode::Num).unwrap().is_none());
    }

    #[test]
    fn test_open_stream_holds_the_connection() {
        let mut conn = memory();
        let mut stmt = conn.prepare(COUNT_TO_MILLION, CursorKind::Scrollable).unwrap();
        stmt.execute().unwrap();
        stmt.fetch(FetchMode::Num).unwrap().unwrap();

        let err = conn.prepare("SELECT 1", CursorKind::ForwardOnly).unwrap_err();
        assert!(err.message.contains("busy"));
        assert!(conn.last_insert_id().is_err());

        drop(stmt);
        assert!(conn.prepare("SELECT 1", CursorKind::ForwardOnly).is_ok());
    }

    #[test]
    fn test_exhausted_stream_releases_the_connection() {
        let mut conn = memory();
        let mut stmt = conn
            .prepare("SELECT 1 UNION ALL SELECT 2", CursorKind::Scrollable)
            .unwrap();
        stmt.execute().unwrap();
        assert!(stmt.fetch(FetchMode::Num).unwrap().is_some());
        assert!(stmt.fetch(FetchMode::Num).unwrap().is_some());
        assert!(stmt.fetch(FetchMode::Num).unwrap().is_none());
        assert_eq!(stmt.row_count(), 2);

        assert!(conn.last_insert_id().is_ok());
        stmt.execute().unwrap();
        assert_eq!(stmt.row_count(), 0);
        assert!(stmt.fetch(FetchMode::Num).unwrap().is_some());
    }

    #[test]
    fn test_stream_reports_bind_errors_from_execute() {
        let mut conn = memory();
        let mut stmt = conn.prepare("SELECT :a", CursorKind::Scrollable).unwrap();
        stmt.bind(Placeholder::Name("b".into()), 1.into()).unwrap();
        let err = stmt.execute().unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Bind);
        assert!(conn.prepare("SELECT 1", CursorKind::ForwardOnly).is_ok());
    }

    #[test]
    fn test_in_transaction_while_streaming() {
        let mut conn = memory();
        conn.begin_transaction().unwrap();
        let mut stmt = conn.prepare(COUNT_TO_MILLION, CursorKind::Scrollable).unwrap();
        stmt.execute().unwrap();
        assert!(conn.in_transaction());
        stmt.close_cursor().unwrap();
        conn.roll_back().unwrap();
        assert!(!conn.in_transaction());
    }
}
