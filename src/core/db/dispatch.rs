/// Statement Classification Module
///
/// Decides from the leading keyword of a statement whether its result is a
/// row set, an affected-row count, or nothing worth returning. The decision
/// is made before execution and never by asking the driver for a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// SELECT, SHOW, CALL, DESCRIBE
    RowSet,
    /// INSERT, UPDATE, DELETE
    AffectedRows,
    /// Anything else (DDL, EXPLAIN, PRAGMA, ...)
    Other,
}

impl StatementKind {
    /// Classifies a statement by its first whitespace-delimited word,
    /// case-insensitively.
    pub fn classify(sql: &str) -> Self {
        let keyword = sql.split_whitespace().next().unwrap_or("").to_lowercase();
        match keyword.as_str() {
            "select" | "show" | "call" | "describe" => StatementKind::RowSet,
            "insert" | "update" | "delete" => StatementKind::AffectedRows,
            _ => StatementKind::Other,
        }
    }

    pub fn returns_rows(&self) -> bool {
        matches!(self, StatementKind::RowSet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_kind_classification() {
        assert_eq!(StatementKind::classify("select * from t"), StatementKind::RowSet);
        assert_eq!(StatementKind::classify("  SHOW tables"), StatementKind::RowSet);
        assert_eq!(StatementKind::classify("call proc()"), StatementKind::RowSet);
        assert_eq!(StatementKind::classify("describe t"), StatementKind::RowSet);
        assert_eq!(StatementKind::classify("insert into t values (1)"), StatementKind::AffectedRows);
        assert_eq!(StatementKind::classify("UPDATE t SET a = 1"), StatementKind::AffectedRows);
        assert_eq!(StatementKind::classify("delete from t"), StatementKind::AffectedRows);
        assert_eq!(StatementKind::classify("explain select 1"), StatementKind::Other);
        assert_eq!(StatementKind::classify("CREATE TABLE t (id INTEGER)"), StatementKind::Other);
        assert_eq!(StatementKind::classify(""), StatementKind::Other);
    }

    #[test]
    fn test_keyword_split_on_newlines() {
        assert_eq!(StatementKind::classify("SELECT\n*\nFROM t"), StatementKind::RowSet);
        assert_eq!(StatementKind::classify("\r\ninsert\tINTO t VALUES (1)"), StatementKind::AffectedRows);
    }
}
