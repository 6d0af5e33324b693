/// Statement Preparation Module
///
/// Prepares a statement on a connection and binds a (rewritten) parameter
/// mapping to it. Positional parameters bind to 1-based `?` markers, named
/// parameters to their `:name` markers.
use crate::core::driver::{CursorKind, DriverConnection, DriverStatement, Placeholder};
use crate::core::error::{DriverError, DriverErrorKind, DriverResult};
use crate::core::value::{Param, Params, Value};
use tracing::debug;

/// Lists the placeholder each parameter binds to, in binding order.
pub fn placeholders(params: &Params) -> Vec<(Placeholder, &Param)> {
    match params {
        Params::Positional(values) => values
            .iter()
            .enumerate()
            .map(|(i, v)| (Placeholder::Index(i + 1), v))
            .collect(),
        Params::Named(entries) => entries
            .iter()
            .map(|(name, v)| (Placeholder::Name(name.clone()), v))
            .collect(),
    }
}

/// Binds every parameter by value.
pub fn bind<S: DriverStatement>(statement: &mut S, params: &Params) -> DriverResult<()> {
    for (placeholder, param) in placeholders(params) {
        let value: Value = match param {
            Param::Scalar(value) => value.clone(),
            Param::List(_) => {
                return Err(DriverError::new(
                    DriverErrorKind::Bind,
                    format!("list parameter {placeholder} was not expanded before binding"),
                ))
            }
        };
        statement.bind(placeholder, value)?;
    }
    Ok(())
}

/// Prepares `sql` and binds `params` without executing.
pub fn prepare<C: DriverConnection>(
    connection: &mut C,
    sql: &str,
    params: &Params,
    cursor: CursorKind,
) -> DriverResult<C::Statement> {
    debug!("Preparing statement ({} params): {}", params.len(), sql);
    let mut statement = connection.prepare(sql, cursor)?;
    bind(&mut statement, params)?;
    Ok(statement)
}

/// Prepares, binds and executes `sql`.
pub fn execute<C: DriverConnection>(
    connection: &mut C,
    sql: &str,
    params: &Params,
    cursor: CursorKind,
) -> DriverResult<C::Statement> {
    let mut statement = prepare(connection, sql, params, cursor)?;
    statement.execute()?;
    Ok(statement)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_placeholders_are_one_based() {
        let params = Params::positional(["a", "b"]);
        let bound: Vec<Placeholder> = placeholders(&params).into_iter().map(|(p, _)| p).collect();
        assert_eq!(bound, vec![Placeholder::Index(1), Placeholder::Index(2)]);
    }

    #[test]
    fn test_named_placeholders() {
        let params = Params::named([("name", "a"), ("age", "5")]);
        let bound: Vec<String> = placeholders(&params)
            .into_iter()
            .map(|(p, _)| p.to_string())
            .collect();
        assert_eq!(bound, vec![":name", ":age"]);
    }
}
