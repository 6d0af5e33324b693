/// Values, parameters and rows
///
/// This module defines the data that crosses the driver boundary: scalar
/// values, the parameter mappings a caller supplies with a statement, and
/// the rows that come back.
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::sync::Arc;

/// A single SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Blob(b) => serializer.serialize_bytes(b),
        }
    }
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident as $conv:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(<$conv>::from(v))
                }
            }
        )*
    };
}

impl_value_from! {
    i64 => Integer as i64,
    i32 => Integer as i64,
    u32 => Integer as i64,
    i16 => Integer as i64,
    u8 => Integer as i64,
    f64 => Real as f64,
    f32 => Real as f64,
    String => Text as String,
    &str => Text as String,
    Vec<u8> => Blob as Vec<u8>,
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A parameter value: a scalar, or a list that expands into `IN (...)`
/// placeholders before binding.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Scalar(Value),
    List(Vec<Value>),
}

impl Param {
    pub fn list<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Param::List(values.into_iter().map(Into::into).collect())
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Param::List(_))
    }
}

macro_rules! impl_param_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Param {
                fn from(v: $ty) -> Self {
                    Param::Scalar(Value::from(v))
                }
            }
        )*
    };
}

impl_param_from!(i64, i32, u32, i16, u8, f64, f32, bool, String, &str, Vec<u8>);
impl_param_from!(Option<i64>, Option<f64>, Option<String>, Option<&str>);

impl From<Value> for Param {
    fn from(v: Value) -> Self {
        Param::Scalar(v)
    }
}

/// The parameter mapping of one statement.
///
/// Positional parameters bind to `?` placeholders in order; named parameters
/// bind to `:name` placeholders. A single mapping is always one or the other.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Positional(Vec<Param>),
    Named(Vec<(String, Param)>),
}

impl Default for Params {
    fn default() -> Self {
        Params::Positional(Vec::new())
    }
}

impl Params {
    pub fn none() -> Self {
        Params::default()
    }

    pub fn positional<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Param>,
    {
        Params::Positional(values.into_iter().map(Into::into).collect())
    }

    /// Builds a named mapping. A leading `:` on a key is accepted and dropped.
    pub fn named<I, K, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: AsRef<str>,
        T: Into<Param>,
    {
        Params::Named(
            entries
                .into_iter()
                .map(|(k, v)| (k.as_ref().trim_start_matches(':').to_string(), v.into()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        match self {
            Params::Positional(values) => values.len(),
            Params::Named(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_lists(&self) -> bool {
        match self {
            Params::Positional(values) => values.iter().any(Param::is_list),
            Params::Named(entries) => entries.iter().any(|(_, v)| v.is_list()),
        }
    }

    /// Looks up a named parameter.
    pub fn get(&self, name: &str) -> Option<&Param> {
        match self {
            Params::Named(entries) => entries.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            Params::Positional(_) => None,
        }
    }
}

/// How rows are shaped when fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Values keyed by column name (and still reachable by index)
    #[default]
    Assoc,
    /// Values by position only
    Num,
}

/// One fetched row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Option<Arc<[String]>>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Row {
            columns: Some(columns),
            values,
        }
    }

    pub fn positional(values: Vec<Value>) -> Self {
        Row {
            columns: None,
            values,
        }
    }

    /// Shapes a row for the requested fetch mode.
    pub fn with_mode(columns: &Arc<[String]>, values: Vec<Value>, mode: FetchMode) -> Self {
        match mode {
            FetchMode::Assoc => Row::new(Arc::clone(columns), values),
            FetchMode::Num => Row::positional(values),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        let columns = self.columns.as_ref()?;
        let idx = columns.iter().position(|c| c == column)?;
        self.values.get(idx)
    }

    pub fn get_index(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match &self.columns {
            Some(columns) => {
                let mut map = serializer.serialize_map(Some(self.values.len()))?;
                for (column, value) in columns.iter().zip(&self.values) {
                    map.serialize_entry(column, value)?;
                }
                map.end()
            }
            None => {
                let mut seq = serializer.serialize_seq(Some(self.values.len()))?;
                for value in &self.values {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
        }
    }
}
