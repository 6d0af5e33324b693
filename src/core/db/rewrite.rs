/// Placeholder Rewriting Module
///
/// Expands list-valued named parameters into one scalar placeholder per
/// element, so `WHERE id IN (:ids)` with `ids = [4, 8]` becomes
/// `WHERE id IN (:ids_0, :ids_1)` bound to `ids_0 = 4, ids_1 = 8`.
///
/// List parameters must be non-empty: `IN ()` is not valid SQL, and the
/// rewriter reports it instead of inventing a replacement.
use crate::core::value::{Param, Params};
use crate::core::{Result, SqlrunError};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

static PARAM_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid parameter name pattern"));

/// Whether `name` can follow a `:` as a named placeholder.
pub(crate) fn is_param_name(name: &str) -> bool {
    PARAM_NAME.is_match(name)
}

/// Rewrites `query` and `params` so that no list parameter remains.
///
/// When no parameter is a list both inputs are returned borrowed and
/// untouched.
pub fn rewrite<'a>(query: &'a str, params: &'a Params) -> Result<(Cow<'a, str>, Cow<'a, Params>)> {
    if !params.has_lists() {
        return Ok((Cow::Borrowed(query), Cow::Borrowed(params)));
    }

    let entries = match params {
        Params::Named(entries) => entries,
        Params::Positional(_) => {
            return Err(SqlrunError::Shape(
                "list parameters require named placeholders".to_string(),
            ))
        }
    };

    let mut sql = query.to_string();
    let mut expanded = Vec::with_capacity(entries.len());
    for (name, param) in entries {
        let values = match param {
            Param::List(values) => values,
            Param::Scalar(_) => {
                expanded.push((name.clone(), param.clone()));
                continue;
            }
        };
        if values.is_empty() {
            return Err(SqlrunError::Shape(format!(
                "list parameter :{name} is empty; IN () is not valid SQL"
            )));
        }
        if !PARAM_NAME.is_match(name) {
            return Err(SqlrunError::Shape(format!(
                "list parameter name {name:?} is not a valid placeholder name"
            )));
        }

        let names: Vec<String> = (0..values.len()).map(|i| format!("{name}_{i}")).collect();
        let list = names
            .iter()
            .map(|n| format!(":{n}"))
            .collect::<Vec<_>>()
            .join(", ");
        sql = replace_placeholder(&sql, name, &list)?;
        expanded.extend(
            names
                .into_iter()
                .zip(values.iter().cloned().map(Param::Scalar)),
        );
    }

    Ok((Cow::Owned(sql), Cow::Owned(Params::Named(expanded))))
}

/// Replaces every `:name` marker that is not part of a longer identifier
/// or a `::` cast.
fn replace_placeholder(sql: &str, name: &str, replacement: &str) -> Result<String> {
    let pattern = Regex::new(&format!(r"(^|[^:\w]):{}\b", regex::escape(name)))
        .map_err(|e| SqlrunError::Shape(format!("bad placeholder :{name}: {e}")))?;
    Ok(pattern
        .replace_all(sql, |caps: &Captures| format!("{}{}", &caps[1], replacement))
        .into_owned())
}
