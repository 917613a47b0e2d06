//! Owned values carried between the caller and the workers
//!
//! A [`Value`] is what a work unit transports: plain scalars, text and bytes,
//! lists, tables and (with the `array` feature) n-dimensional float arrays.
//! Values own all of their data so a work unit never borrows from the call
//! that produced it.
//!
//! [`Arg`] is the caller-side counterpart. It can additionally hold a
//! [`LazySeq`], a one-shot iterator that only the broadcast planner consumes.
//!
//! # Example
//!
//! ```
//! use fanout::value::{Table, Value};
//!
//! let mut table = Table::new(["name", "score"]);
//! table.push_row(vec![Value::from("a"), Value::from(1)]).unwrap();
//! table.push_row(vec![Value::from("b"), Value::from(2)]).unwrap();
//!
//! assert_eq!(table.num_rows(), 2);
//! assert_eq!(table.column("score"), Some(vec![Value::Int(1), Value::Int(2)]));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "array")]
use ndarray::{ArrayD, Axis};

/// Errors raised while building tables
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("row has {found} values but the table has {expected} columns")]
    RowWidth { expected: usize, found: usize },
}

/// A dynamically typed, owned value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Table(Table),
    #[cfg(feature = "array")]
    Array(ArrayD<f64>),
}

impl Value {
    /// Short type label used in diagnostics and error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Table(_) => "table",
            #[cfg(feature = "array")]
            Value::Array(_) => "array",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the value; ints widen to floats
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    #[cfg(feature = "array")]
    pub fn as_array(&self) -> Option<&ArrayD<f64>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Returns true for `Int` and `Float`
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Number of elements the value would be split into, if it has a length
    ///
    /// Text counts characters, bytes count bytes, tables count rows and arrays
    /// count entries along their first axis. Scalars and 0-d arrays have no
    /// length.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Text(s) => Some(s.chars().count()),
            Value::Bytes(b) => Some(b.len()),
            Value::List(items) => Some(items.len()),
            Value::Table(t) => Some(t.num_rows()),
            #[cfg(feature = "array")]
            Value::Array(a) if a.ndim() > 0 => Some(a.len_of(Axis(0))),
            _ => None,
        }
    }

    /// Split the value into its elements
    ///
    /// Each element is an owned value: single-character text, one `Int` per
    /// byte, single-row tables, and sub-arrays along axis 0 (a 1-d array yields
    /// `Float` elements). Values without a length split into themselves.
    pub fn into_elements(self) -> Vec<Value> {
        match self {
            Value::Text(s) => s.chars().map(|c| Value::Text(c.to_string())).collect(),
            Value::Bytes(b) => b.into_iter().map(|byte| Value::Int(i64::from(byte))).collect(),
            Value::List(items) => items,
            Value::Table(t) => (0..t.num_rows()).filter_map(|i| t.row(i)).map(Value::Table).collect(),
            #[cfg(feature = "array")]
            Value::Array(a) if a.ndim() > 0 => a
                .axis_iter(Axis(0))
                .map(|sub| {
                    if sub.ndim() == 0 {
                        Value::Float(sub.iter().copied().next().unwrap_or(f64::NAN))
                    } else {
                        Value::Array(sub.to_owned())
                    }
                })
                .collect(),
            other => vec![other],
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Table(t) => write!(f, "<table {}x{}>", t.num_rows(), t.num_columns()),
            #[cfg(feature = "array")]
            Value::Array(a) => write!(f, "<array {:?}>", a.shape()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        // Saturates above i64::MAX
        Value::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Table> for Value {
    fn from(v: Table) -> Self {
        Value::Table(v)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(feature = "array")]
impl From<ArrayD<f64>> for Value {
    fn from(v: ArrayD<f64>) -> Self {
        Value::Array(v)
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Value::List(iter.into_iter().collect())
    }
}

/// A small row-oriented table with labelled columns
///
/// Every row has exactly one value per column, including tables that were
/// deserialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Wire form of a [`Table`] before its row widths are checked
#[derive(Deserialize)]
struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl TryFrom<RawTable> for Table {
    type Error = TableError;

    fn try_from(raw: RawTable) -> Result<Self, Self::Error> {
        Table::from_rows(raw.columns, raw.rows)
    }
}

impl Table {
    /// Create an empty table with the given column labels
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Create a table from labels and rows, checking every row's width
    pub fn from_rows<I, S>(columns: I, rows: Vec<Vec<Value>>) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Append a row
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowWidth {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// All values of the named column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<Value>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        self.rows.iter().map(|row| row.get(idx).cloned()).collect()
    }

    /// Row `index` as a single-row table with the same labels
    pub fn row(&self, index: usize) -> Option<Table> {
        let row = self.rows.get(index)?;
        Some(Table {
            columns: self.columns.clone(),
            rows: vec![row.clone()],
        })
    }
}

/// A one-shot sequence of values
///
/// Like a generator, it can be consumed only once and its length is unknown
/// until then.
pub struct LazySeq {
    inner: Box<dyn Iterator<Item = Value>>,
}

impl LazySeq {
    pub fn new<I>(iter: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value> + 'static,
        I::IntoIter: 'static,
    {
        Self {
            inner: Box::new(iter.into_iter().map(Into::into)),
        }
    }

    /// Drain the sequence into an owned list
    pub fn materialize(self) -> Vec<Value> {
        self.inner.collect()
    }
}

impl fmt::Debug for LazySeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySeq").finish_non_exhaustive()
    }
}

/// A call argument as supplied by the caller
#[derive(Debug)]
pub enum Arg {
    Value(Value),
    Lazy(LazySeq),
}

impl Arg {
    /// Wrap an iterator as a one-shot lazy argument
    pub fn lazy<I>(iter: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value> + 'static,
        I::IntoIter: 'static,
    {
        Arg::Lazy(LazySeq::new(iter))
    }
}

impl From<Value> for Arg {
    fn from(v: Value) -> Self {
        Arg::Value(v)
    }
}

macro_rules! arg_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Arg {
                fn from(v: $ty) -> Self {
                    Arg::Value(Value::from(v))
                }
            }
        )*
    };
}

arg_from_value!(bool, i64, i32, usize, f64, &str, String, Table, ());

#[cfg(feature = "array")]
arg_from_value!(ArrayD<f64>);

impl<T: Into<Value>> From<Vec<T>> for Arg {
    fn from(v: Vec<T>) -> Self {
        Arg::Value(Value::from(v))
    }
}

impl From<LazySeq> for Arg {
    fn from(v: LazySeq) -> Self {
        Arg::Lazy(v)
    }
}
