/// Driver Capability Module
///
/// The engine never talks to a database directly. It consumes a driver
/// through the traits in this module, which mirror the usual
/// connect / prepare / bind / execute / fetch cycle of a client library.
use crate::core::error::DriverResult;
use crate::core::value::{FetchMode, Row, Value};
use std::fmt;

/// Supported connection-string families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    MySql,
    PostgreSql,
    Sqlite,
}

impl DriverKind {
    /// Parses the short driver names used in configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "mysql" => Some(DriverKind::MySql),
            "pgsql" | "postgres" | "postgresql" => Some(DriverKind::PostgreSql),
            "sqlite" | "sqlite3" => Some(DriverKind::Sqlite),
            _ => None,
        }
    }

    /// Quotes a table or column name for this dialect.
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            DriverKind::MySql => format!("`{}`", name.replace('`', "``")),
            DriverKind::PostgreSql | DriverKind::Sqlite => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::MySql => f.write_str("mysql"),
            DriverKind::PostgreSql => f.write_str("pgsql"),
            DriverKind::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Everything a driver needs to open a connection.
#[derive(Clone, PartialEq)]
pub struct ConnectOptions {
    pub kind: DriverKind,
    pub dsn: String,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl ConnectOptions {
    pub fn mysql(host: &str, port: u16, database: &str, user: &str, password: &str) -> Self {
        ConnectOptions {
            kind: DriverKind::MySql,
            dsn: format!("mysql:host={host};port={port};dbname={database};charset=utf8;"),
            database: database.to_string(),
            user: user.to_string(),
            password: password.to_string(),
        }
    }

    pub fn postgres(host: &str, port: u16, database: &str, user: &str, password: &str) -> Self {
        ConnectOptions {
            kind: DriverKind::PostgreSql,
            dsn: format!("pgsql:host={host};port={port};dbname={database};"),
            database: database.to_string(),
            user: user.to_string(),
            password: password.to_string(),
        }
    }

    /// `path` is a file path or `:memory:`.
    pub fn sqlite(path: &str) -> Self {
        ConnectOptions {
            kind: DriverKind::Sqlite,
            dsn: format!("sqlite:{path}"),
            database: path.to_string(),
            user: String::new(),
            password: String::new(),
        }
    }

    /// The part of the DSN after the `<driver>:` prefix.
    pub fn target(&self) -> &str {
        self.dsn.split_once(':').map_or(self.dsn.as_str(), |(_, rest)| rest)
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("kind", &self.kind)
            .field("dsn", &self.dsn)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Where a value is bound in a prepared statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// 1-based position of a `?` marker
    Index(usize),
    /// Name of a `:name` marker, without the colon
    Name(String),
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placeholder::Index(i) => write!(f, "?{i}"),
            Placeholder::Name(n) => write!(f, ":{n}"),
        }
    }
}

/// Kind of server-side cursor requested at prepare time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorKind {
    #[default]
    ForwardOnly,
    Scrollable,
}

/// Opens connections.
pub trait Driver {
    type Connection: DriverConnection;

    fn connect(&self, options: &ConnectOptions) -> DriverResult<Self::Connection>;
}

/// A live connection handle.
pub trait DriverConnection {
    type Statement: DriverStatement;

    fn prepare(&mut self, sql: &str, cursor: CursorKind) -> DriverResult<Self::Statement>;

    fn last_insert_id(&self) -> DriverResult<String>;

    fn begin_transaction(&mut self) -> DriverResult<()>;

    fn commit(&mut self) -> DriverResult<()>;

    fn roll_back(&mut self) -> DriverResult<()>;

    fn in_transaction(&self) -> bool;
}

/// A prepared statement. Statements own whatever they need from their
/// connection so the engine can hand them out inside a row cursor.
pub trait DriverStatement {
    fn bind(&mut self, placeholder: Placeholder, value: Value) -> DriverResult<()>;

    /// Runs the statement, discarding any previous result set.
    fn execute(&mut self) -> DriverResult<()>;

    /// Fetches the next row, or `None` once the result set is exhausted.
    fn fetch(&mut self, mode: FetchMode) -> DriverResult<Option<Row>>;

    fn fetch_all(&mut self, mode: FetchMode) -> DriverResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch(mode)? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Rows affected by the last execution.
    fn row_count(&self) -> u64;

    fn column_count(&self) -> usize;

    fn close_cursor(&mut self) -> DriverResult<()>;
}
