/// Write Statement Builders
///
/// Builds the parameterized SQL behind `insert`, `insert_multi` and
/// `update` from column/value lists. Identifiers are quoted for the
/// connection's dialect; values are always bound, never inlined.
use crate::core::db::rewrite::is_param_name;
use crate::core::driver::DriverKind;
use crate::core::value::{Param, Params, Value};
use crate::core::{Result, SqlrunError};

/// `INSERT INTO t (a, b) VALUES (:a, :b)` with named parameters.
pub fn build_insert(
    kind: DriverKind,
    table: &str,
    values: &[(&str, Value)],
) -> Result<(String, Params)> {
    if values.is_empty() {
        return Err(SqlrunError::Shape(format!("insert into {table} has no columns")));
    }
    // Column names double as placeholder names.
    if let Some((column, _)) = values.iter().find(|(c, _)| !is_param_name(c)) {
        return Err(SqlrunError::Shape(format!(
            "column {column:?} of insert into {table} cannot be used as a parameter name"
        )));
    }
    let columns = quoted_columns(kind, values.iter().map(|(c, _)| *c));
    let placeholders = values
        .iter()
        .map(|(c, _)| format!(":{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        kind.quote_identifier(table),
        columns,
        placeholders
    );
    let params = Params::named(values.iter().map(|(c, v)| (*c, v.clone())));
    Ok((sql, params))
}

/// One multi-row `INSERT` with positional parameters in row-major order.
///
/// The column list comes from the first row; every other row must name the
/// same columns in the same order. Returns `None` for an empty row list.
pub fn build_insert_multi(
    kind: DriverKind,
    table: &str,
    rows: &[Vec<(&str, Value)>],
) -> Result<Option<(String, Params)>> {
    let first = match rows.first() {
        Some(first) => first,
        None => return Ok(None),
    };
    if first.is_empty() {
        return Err(SqlrunError::Shape(format!("insert into {table} has no columns")));
    }
    for (i, row) in rows.iter().enumerate().skip(1) {
        let same_shape = row.len() == first.len()
            && row.iter().zip(first).all(|((a, _), (b, _))| a == b);
        if !same_shape {
            return Err(SqlrunError::Shape(format!(
                "row {i} of insert into {table} does not match the columns of row 0"
            )));
        }
    }

    let tuple = format!("({})", vec!["?"; first.len()].join(", "));
    let sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        kind.quote_identifier(table),
        quoted_columns(kind, first.iter().map(|(c, _)| *c)),
        vec![tuple; rows.len()].join(", ")
    );
    let params = Params::Positional(
        rows.iter()
            .flat_map(|row| row.iter().map(|(_, v)| Param::Scalar(v.clone())))
            .collect(),
    );
    Ok(Some((sql, params)))
}

/// `UPDATE t SET a = ?, b = ? [WHERE 1=1 AND c = ? ...]`.
///
/// Conditions are always AND-combined. Returns `None` when there is nothing
/// to set.
pub fn build_update(
    kind: DriverKind,
    table: &str,
    values: &[(&str, Value)],
    conditions: &[(&str, Value)],
) -> Option<(String, Params)> {
    if values.is_empty() {
        return None;
    }
    let assignments = values
        .iter()
        .map(|(c, _)| format!("{} = ?", kind.quote_identifier(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!("UPDATE {} SET {}", kind.quote_identifier(table), assignments);
    if !conditions.is_empty() {
        sql.push_str(" WHERE 1=1");
        for (column, _) in conditions {
            sql.push_str(&format!(" AND {} = ?", kind.quote_identifier(column)));
        }
    }
    let params = Params::Positional(
        values
            .iter()
            .chain(conditions)
            .map(|(_, v)| Param::Scalar(v.clone()))
            .collect(),
    );
    Some((sql, params))
}

fn quoted_columns<'a>(kind: DriverKind, columns: impl Iterator<Item = &'a str>) -> String {
    columns
        .map(|c| kind.quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}
