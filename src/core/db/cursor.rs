/// Row Cursor Module
///
/// A forward-only, single-pass view over an executed statement. The cursor
/// holds at most one row ahead of the caller and closes the server-side
/// cursor the first time it finds the end of the result set. A closed cursor
/// cannot be restarted; run the query again instead.
use crate::core::driver::DriverStatement;
use crate::core::error::DriverError;
use crate::core::value::{FetchMode, Row};
use crate::core::{Result, SqlrunError};
use tracing::{debug, warn};

#[derive(Debug)]
enum Lookahead {
    /// Executed, nothing fetched yet
    Pending,
    Row(Row),
    End,
}

/// Streams rows from a statement.
pub struct RowCursor<S: DriverStatement> {
    statement: S,
    sql: String,
    mode: FetchMode,
    position: usize,
    lookahead: Lookahead,
    closed: bool,
    deferred: Option<SqlrunError>,
}

impl<S: DriverStatement> RowCursor<S> {
    /// Wraps a statement that has already been executed.
    pub(crate) fn new(statement: S, sql: impl Into<String>, mode: FetchMode) -> Self {
        RowCursor {
            statement,
            sql: sql.into(),
            mode,
            position: 0,
            lookahead: Lookahead::Pending,
            closed: false,
            deferred: None,
        }
    }

    /// Re-executes the statement and fetches the first row.
    pub fn start(&mut self) -> Result<()> {
        if self.closed {
            return Err(SqlrunError::CursorClosed);
        }
        self.statement.execute().map_err(|e| self.query_error(e))?;
        self.position = 0;
        self.fill()
    }

    /// The row under the cursor, without advancing.
    pub fn current(&mut self) -> Result<Option<&Row>> {
        self.prime()?;
        Ok(match &self.lookahead {
            Lookahead::Row(row) => Some(row),
            _ => None,
        })
    }

    /// Discards the current row and fetches the next one.
    pub fn advance(&mut self) -> Result<()> {
        if self.closed {
            return Err(SqlrunError::CursorClosed);
        }
        self.prime()?;
        self.position += 1;
        self.fill()
    }

    /// True while a row is available. Reaching the end closes the
    /// underlying cursor, once.
    pub fn has_more(&mut self) -> Result<bool> {
        self.prime()?;
        match self.lookahead {
            Lookahead::Row(_) => Ok(true),
            Lookahead::End | Lookahead::Pending => {
                self.close();
                Ok(false)
            }
        }
    }

    /// Zero-based index of the current row.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    fn prime(&mut self) -> Result<()> {
        if matches!(self.lookahead, Lookahead::Pending) && !self.closed {
            self.fill()?;
        }
        Ok(())
    }

    fn fill(&mut self) -> Result<()> {
        match self.statement.fetch(self.mode) {
            Ok(Some(row)) => self.lookahead = Lookahead::Row(row),
            Ok(None) => self.lookahead = Lookahead::End,
            Err(e) => {
                self.lookahead = Lookahead::End;
                self.close();
                return Err(self.query_error(e));
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        debug!("Closing cursor after {} rows: {}", self.position, self.sql);
        if let Err(e) = self.statement.close_cursor() {
            warn!("Failed to close cursor: {}", e);
        }
    }

    fn query_error(&self, source: DriverError) -> SqlrunError {
        SqlrunError::Query {
            source,
            sql: self.sql.clone(),
        }
    }
}

impl<S: DriverStatement> Iterator for RowCursor<S> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.deferred.take() {
            return Some(Err(e));
        }
        match self.has_more() {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => return Some(Err(e)),
        }
        let row = match std::mem::replace(&mut self.lookahead, Lookahead::Pending) {
            Lookahead::Row(row) => row,
            _ => return None,
        };
        self.position += 1;
        if let Err(e) = self.fill() {
            // Deliver the row already fetched; the failure comes next.
            self.deferred = Some(e);
        }
        Some(Ok(row))
    }
}

impl<S: DriverStatement> Drop for RowCursor<S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<S: DriverStatement> std::fmt::Debug for RowCursor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowCursor")
            .field("sql", &self.sql)
            .field("position", &self.position)
            .field("closed", &self.closed)
            .finish()
    }
}
