//! Tasks: the single-item functions being fanned out
//!
//! A [`Task`] has a stable name and a synchronous [`call`](Task::call) that
//! receives one iteration's arguments as [`TaskArgs`]. [`TaskFn`] adapts a
//! closure, and [`TaskRef`] is the shared handle passed to workers.
//!
//! Tasks can also be registered under a name in a [`TaskRegistry`] and looked
//! up when a wrapper is built; an unknown name is a configuration error.
//!
//! # Example
//!
//! ```
//! use fanout::task::{TaskArgs, TaskError, TaskFn, TaskRef};
//! use fanout::value::Value;
//!
//! let add: TaskRef = TaskFn::arc("add", |args: TaskArgs| {
//!     let a = args.int(0, "a")?;
//!     let b = args.int_or(1, "b", 1)?;
//!     Ok::<_, TaskError>(Value::Int(a + b))
//! });
//!
//! assert_eq!(add.name(), "add");
//! ```

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::value::Value;

/// Keyword under which process identity info is passed to a task
pub const PROCESS_INFO_KEY: &str = "_pinfo";

/// Errors raised by a task invocation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    /// The task reported a failure
    #[error("task failed: {0}")]
    Failed(String),

    /// A required argument was not supplied
    #[error("missing argument '{0}'")]
    MissingArgument(String),

    /// An argument had the wrong type
    #[error("argument '{name}' expected {expected}, found {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The task panicked
    #[error("task panicked: {0}")]
    Panicked(String),

    /// A work unit's slots did not match its positional count
    #[error("malformed work unit: {0}")]
    MalformedUnit(String),
}

impl TaskError {
    pub fn failed(msg: impl Into<String>) -> Self {
        TaskError::Failed(msg.into())
    }

    /// Returns a short stable label for logs
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Failed(_) => "task_failed",
            TaskError::MissingArgument(_) => "task_missing_argument",
            TaskError::TypeMismatch { .. } => "task_type_mismatch",
            TaskError::Panicked(_) => "task_panicked",
            TaskError::MalformedUnit(_) => "task_malformed_unit",
        }
    }
}

/// Worker identity forwarded to tasks that ask for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// Index of the worker running the unit, `0..workers`
    pub worker: usize,
    /// How many units this worker has run in the current call, starting at 1
    pub invocation: usize,
}

impl ProcessInfo {
    /// Encode as `[worker, invocation]`
    pub fn to_value(self) -> Value {
        Value::List(vec![Value::from(self.worker), Value::from(self.invocation)])
    }

    /// Decode from `[worker, invocation]`
    pub fn from_value(value: &Value) -> Option<Self> {
        match value.as_list()? {
            [worker, invocation] => Some(Self {
                worker: usize::try_from(worker.as_int()?).ok()?,
                invocation: usize::try_from(invocation.as_int()?).ok()?,
            }),
            _ => None,
        }
    }
}

/// Arguments of one task invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskArgs {
    positional: Vec<Value>,
    keyword: Vec<(String, Value)>,
}

impl TaskArgs {
    pub fn new(positional: Vec<Value>, keyword: Vec<(String, Value)>) -> Self {
        Self { positional, keyword }
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn keyword(&self) -> &[(String, Value)] {
        &self.keyword
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.keyword.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Bind a parameter the way a call would: by position, else by name
    pub fn get(&self, index: usize, name: &str) -> Result<&Value, TaskError> {
        self.arg(index)
            .or_else(|| self.kwarg(name))
            .ok_or_else(|| TaskError::MissingArgument(name.to_string()))
    }

    /// Like [`TaskArgs::get`], falling back to `default`
    pub fn get_or<'a>(&'a self, index: usize, name: &str, default: &'a Value) -> &'a Value {
        self.arg(index).or_else(|| self.kwarg(name)).unwrap_or(default)
    }

    /// Bind an integer parameter
    pub fn int(&self, index: usize, name: &str) -> Result<i64, TaskError> {
        let value = self.get(index, name)?;
        value.as_int().ok_or_else(|| mismatch(name, "int", value))
    }

    /// Bind an optional integer parameter
    pub fn int_or(&self, index: usize, name: &str, default: i64) -> Result<i64, TaskError> {
        match self.arg(index).or_else(|| self.kwarg(name)) {
            Some(value) => value.as_int().ok_or_else(|| mismatch(name, "int", value)),
            None => Ok(default),
        }
    }

    /// Bind a numeric parameter; ints widen to floats
    pub fn float(&self, index: usize, name: &str) -> Result<f64, TaskError> {
        let value = self.get(index, name)?;
        value.as_float().ok_or_else(|| mismatch(name, "float", value))
    }

    /// Bind a list parameter
    pub fn list(&self, index: usize, name: &str) -> Result<&[Value], TaskError> {
        let value = self.get(index, name)?;
        value.as_list().ok_or_else(|| mismatch(name, "list", value))
    }

    /// Bind a text parameter
    pub fn text(&self, index: usize, name: &str) -> Result<&str, TaskError> {
        let value = self.get(index, name)?;
        value.as_text().ok_or_else(|| mismatch(name, "text", value))
    }

    /// Worker identity, when the wrapper forwards it
    pub fn process_info(&self) -> Option<ProcessInfo> {
        self.kwarg(PROCESS_INFO_KEY).and_then(ProcessInfo::from_value)
    }
}

fn mismatch(name: &str, expected: &'static str, found: &Value) -> TaskError {
    TaskError::TypeMismatch {
        name: name.to_string(),
        expected,
        found: found.type_name(),
    }
}

/// A named single-item function
pub trait Task: Send + Sync + 'static {
    /// Returns a stable, human-readable task name
    fn name(&self) -> &str;

    /// Runs one iteration
    fn call(&self, args: TaskArgs) -> Result<Value, TaskError>;
}

/// Shared handle to a task
pub type TaskRef = Arc<dyn Task>;

/// Closure-backed task
pub struct TaskFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> TaskFn<F>
where
    F: Fn(TaskArgs) -> Result<Value, TaskError> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self { name: name.into(), f }
    }

    /// Create the task and return it as a [`TaskRef`]
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> TaskRef {
        Arc::new(Self::new(name, f))
    }

    /// Create a task named after the closure's type
    pub fn anonymous(f: F) -> Self {
        Self::new(std::any::type_name::<F>(), f)
    }
}

impl<F> Task for TaskFn<F>
where
    F: Fn(TaskArgs) -> Result<Value, TaskError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, args: TaskArgs) -> Result<Value, TaskError> {
        (self.f)(args)
    }
}

impl<F> fmt::Debug for TaskFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFn").field("name", &self.name).finish()
    }
}

/// Tasks addressable by name
#[derive(Default, Clone)]
pub struct TaskRegistry {
    tasks: HashMap<String, TaskRef>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task under its own name, replacing any previous one
    pub fn register(&mut self, task: TaskRef) -> Option<TaskRef> {
        self.tasks.insert(task.name().to_string(), task)
    }

    pub fn get(&self, name: &str) -> Option<TaskRef> {
        self.tasks.get(name).cloned()
    }

    /// Look up a task, failing if nothing by that name can be invoked
    pub fn resolve(&self, name: &str) -> Result<TaskRef, ConfigError> {
        self.get(name)
            .ok_or_else(|| ConfigError::NotInvocable(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.names())
            .finish()
    }
}
