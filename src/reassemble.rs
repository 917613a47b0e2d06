//! Merging per-iteration results into one aggregate
//!
//! [`try_reassemble`] applies an [`OutputPolicy`] and reports why it could
//! not. [`reassemble`] is what a call uses: any failure is logged and the raw
//! results are handed back unchanged, so a bad output policy never fails a
//! call.

use thiserror::Error;
use tracing::warn;

use crate::config::OutputPolicy;
use crate::value::{Table, Value};

#[cfg(feature = "array")]
use ndarray::{Array1, ArrayViewD, Axis};

/// Reasons an output policy could not be applied
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReassemblyError {
    #[error("no results to reassemble")]
    Empty,

    #[error("unknown output policy '{0}'")]
    UnknownPolicy(String),

    #[error("result {index} is {found}, not a table")]
    NotATable { index: usize, found: &'static str },

    #[error("result {index} has {found} columns, expected {expected}")]
    ColumnMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("result {index} is {found}, not an array")]
    NotAnArray { index: usize, found: &'static str },

    #[error("incompatible shapes: {0}")]
    Shape(String),

    #[error("array output requires the 'array' feature")]
    ArrayUnavailable,
}

impl ReassemblyError {
    /// Returns a short stable label for logs
    pub fn as_label(&self) -> &'static str {
        match self {
            ReassemblyError::Empty => "reassembly_empty",
            ReassemblyError::UnknownPolicy(_) => "reassembly_unknown_policy",
            ReassemblyError::NotATable { .. } => "reassembly_not_a_table",
            ReassemblyError::ColumnMismatch { .. } => "reassembly_column_mismatch",
            ReassemblyError::NotAnArray { .. } => "reassembly_not_an_array",
            ReassemblyError::Shape(_) => "reassembly_shape",
            ReassemblyError::ArrayUnavailable => "reassembly_array_unavailable",
        }
    }
}

/// What a call returns
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// One result per iteration, in iteration order
    Raw(Vec<Value>),
    /// The results merged by the output policy
    Aggregated(Value),
}

impl Output {
    pub fn is_aggregated(&self) -> bool {
        matches!(self, Output::Aggregated(_))
    }

    pub fn as_raw(&self) -> Option<&[Value]> {
        match self {
            Output::Raw(results) => Some(results),
            Output::Aggregated(_) => None,
        }
    }

    /// The per-iteration results, if the output was not aggregated
    pub fn into_raw(self) -> Option<Vec<Value>> {
        match self {
            Output::Raw(results) => Some(results),
            Output::Aggregated(_) => None,
        }
    }

    /// Collapse into a single value; raw results become a list
    pub fn into_value(self) -> Value {
        match self {
            Output::Raw(results) => Value::List(results),
            Output::Aggregated(value) => value,
        }
    }
}

/// Merge `results` according to `policy`
pub fn try_reassemble(results: &[Value], policy: &OutputPolicy) -> Result<Value, ReassemblyError> {
    if results.is_empty() {
        return Err(ReassemblyError::Empty);
    }

    match policy {
        OutputPolicy::TableConcat => concat_tables(results).map(Value::Table),
        OutputPolicy::FirstAxisStack => first_axis_stack(results),
        OutputPolicy::NewAxisStack => new_axis_stack(results),
        OutputPolicy::Other(token) => Err(ReassemblyError::UnknownPolicy(token.clone())),
    }
}

/// Merge `results`, falling back to the raw list on any failure
pub fn reassemble(results: Vec<Value>, policy: Option<&OutputPolicy>) -> Output {
    let Some(policy) = policy else {
        return Output::Raw(results);
    };

    match try_reassemble(&results, policy) {
        Ok(value) => Output::Aggregated(value),
        Err(err) => {
            warn!(
                policy = %policy,
                error = %err,
                label = err.as_label(),
                "could not reassemble results, returning them unaggregated"
            );
            Output::Raw(results)
        }
    }
}

/// Stack tables row-wise under the first table's column labels
fn concat_tables(results: &[Value]) -> Result<Table, ReassemblyError> {
    let tables = results
        .iter()
        .enumerate()
        .map(|(index, value)| {
            value.as_table().ok_or(ReassemblyError::NotATable {
                index,
                found: value.type_name(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Table::new(tables[0].columns().iter().cloned());
    for (index, table) in tables.iter().enumerate() {
        if table.num_columns() != out.num_columns() {
            return Err(ReassemblyError::ColumnMismatch {
                index,
                expected: out.num_columns(),
                found: table.num_columns(),
            });
        }
        for row in table.rows() {
            out.push_row(row.clone())
                .map_err(|e| ReassemblyError::Shape(e.to_string()))?;
        }
    }
    Ok(out)
}

#[cfg(feature = "array")]
fn array_views(results: &[Value]) -> Result<Vec<ArrayViewD<'_, f64>>, ReassemblyError> {
    results
        .iter()
        .enumerate()
        .map(|(index, value)| {
            value
                .as_array()
                .map(|a| a.view())
                .ok_or(ReassemblyError::NotAnArray {
                    index,
                    found: value.type_name(),
                })
        })
        .collect()
}

#[cfg(feature = "array")]
fn first_axis_stack(results: &[Value]) -> Result<Value, ReassemblyError> {
    let views = array_views(results)?;
    if let Some(index) = views.iter().position(|v| v.ndim() == 0) {
        return Err(ReassemblyError::Shape(format!(
            "result {} is 0-dimensional and has no first axis",
            index
        )));
    }
    ndarray::concatenate(Axis(0), &views)
        .map(Value::Array)
        .map_err(|e| ReassemblyError::Shape(e.to_string()))
}

#[cfg(feature = "array")]
fn new_axis_stack(results: &[Value]) -> Result<Value, ReassemblyError> {
    // Numeric scalars stack into a 1-d array
    if results.iter().all(Value::is_numeric) {
        let data: Vec<f64> = results.iter().filter_map(Value::as_float).collect();
        return Ok(Value::Array(Array1::from_vec(data).into_dyn()));
    }

    let views = array_views(results)?;
    ndarray::stack(Axis(0), &views)
        .map(Value::Array)
        .map_err(|e| ReassemblyError::Shape(e.to_string()))
}

#[cfg(not(feature = "array"))]
fn first_axis_stack(_results: &[Value]) -> Result<Value, ReassemblyError> {
    Err(ReassemblyError::ArrayUnavailable)
}

#[cfg(not(feature = "array"))]
fn new_axis_stack(_results: &[Value]) -> Result<Value, ReassemblyError> {
    Err(ReassemblyError::ArrayUnavailable)
}
