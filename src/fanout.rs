//! The parallel wrapper
//!
//! A [`Fanout`] pairs a task with a [`FanoutConfig`]. Each [`Fanout::call`]
//! runs one fan-out round:
//!
//! 1. plan: infer the iteration count and broadcast every argument
//! 2. pack: build one self-contained work unit per iteration
//! 3. dispatch: run the units on a pool scoped to the call
//! 4. reassemble: merge the results if an output policy is set
//!
//! The iteration count of a call is local to that call. Only the count given
//! at construction persists, so concurrent calls on one wrapper do not
//! interfere.
//!
//! # Example
//!
//! ```
//! use fanout::{make_parallel, CallArgs, TaskArgs, TaskError, TaskFn, Value};
//!
//! let double = TaskFn::arc("double", |args: TaskArgs| {
//!     Ok::<_, TaskError>(Value::Int(args.int(0, "x")? * 2))
//! });
//! let par = make_parallel(double).unwrap();
//!
//! let out = par.call(CallArgs::new().arg(vec![1, 2, 3])).unwrap();
//! assert_eq!(
//!     out.into_raw().unwrap(),
//!     vec![Value::Int(2), Value::Int(4), Value::Int(6)]
//! );
//! ```

use std::fmt;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, FanoutConfig};
use crate::plan::{plan, CallArgs};
use crate::pool::{self, DispatchError};
use crate::reassemble::{reassemble, Output};
use crate::task::{TaskError, TaskRef, TaskRegistry};
use crate::unit::pack;

/// Errors returned by [`Fanout::call`]
#[derive(Error, Debug)]
pub enum CallError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl CallError {
    /// Returns a short stable label for logs
    pub fn as_label(&self) -> &'static str {
        match self {
            CallError::Dispatch(e) => e.as_label(),
        }
    }

    /// The task failure behind this error, if any
    pub fn task_error(&self) -> Option<&TaskError> {
        match self {
            CallError::Dispatch(e) => e.task_error(),
        }
    }
}

/// A task wrapped for data-parallel calls
#[derive(Clone)]
pub struct Fanout {
    task: TaskRef,
    config: FanoutConfig,
}

impl Fanout {
    /// Wrap `task`, rejecting configurations no call could run with
    pub fn new(task: TaskRef, config: FanoutConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { task, config })
    }

    /// Wrap the task registered as `name`
    pub fn from_registry(
        registry: &TaskRegistry,
        name: &str,
        config: FanoutConfig,
    ) -> Result<Self, ConfigError> {
        Self::new(registry.resolve(name)?, config)
    }

    pub fn task_name(&self) -> &str {
        self.task.name()
    }

    pub fn workers(&self) -> usize {
        self.config.workers
    }

    /// The iteration count fixed at construction, if any
    pub fn declared_iterations(&self) -> Option<usize> {
        self.config.iterations
    }

    pub fn config(&self) -> &FanoutConfig {
        &self.config
    }

    /// Run the task once per iteration and gather the results
    pub fn call(&self, args: CallArgs) -> Result<Output, CallError> {
        let config = &self.config;
        let plan = plan(args, config.iterations, &config.input, config.verbose);

        if config.verbose {
            info!(
                task = self.task_name(),
                iterations = plan.n(),
                workers = config.workers,
                "starting fan-out"
            );
        }
        debug!(task = self.task_name(), split = plan.split_count(), "broadcast plan ready");

        let units = pack(&self.task, &plan, config.forward_process_info, config.workers);
        let results = pool::run(units, config.workers)?;

        Ok(reassemble(results, config.output.as_ref()))
    }
}

impl fmt::Display for Fanout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Parallel wrapper for {} over {} workers",
            self.task_name(),
            self.workers()
        )
    }
}

impl fmt::Debug for Fanout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Wrap `task` with the default configuration
pub fn make_parallel(task: TaskRef) -> Result<Fanout, ConfigError> {
    Fanout::new(task, FanoutConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InputKind, InputPolicy, OutputPolicy};
    use crate::task::{TaskArgs, TaskFn};
    use crate::value::Value;

    fn add() -> TaskRef {
        TaskFn::arc("add", |args: TaskArgs| {
            Ok(Value::Int(args.int(0, "a")? + args.int(1, "b")?))
        })
    }

    #[test]
    fn test_display_matches_debug() {
        let par = Fanout::new(add(), FanoutConfig::default().with_workers(3)).unwrap();
        assert_eq!(par.to_string(), "Parallel wrapper for add over 3 workers");
        assert_eq!(format!("{:?}", par), par.to_string());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert_eq!(
            Fanout::new(add(), FanoutConfig::default().with_workers(0)).unwrap_err(),
            ConfigError::InvalidWorkerCount(0)
        );
        assert_eq!(
            Fanout::new(add(), FanoutConfig::default().with_iterations(0)).unwrap_err(),
            ConfigError::InvalidIterationCount(0)
        );
    }

    #[test]
    fn test_from_registry() {
        let mut registry = TaskRegistry::new();
        registry.register(add());

        let par = Fanout::from_registry(&registry, "add", FanoutConfig::default()).unwrap();
        assert_eq!(par.task_name(), "add");
        assert_eq!(
            Fanout::from_registry(&registry, "missing", FanoutConfig::default()).unwrap_err(),
            ConfigError::NotInvocable("missing".to_string())
        );
    }

    #[test]
    fn test_call_broadcasts_scalar() {
        let par = Fanout::new(add(), FanoutConfig::default().with_workers(2)).unwrap();
        let out = par
            .call(CallArgs::new().arg(vec![1, 2, 3]).kwarg("b", 10))
            .unwrap();
        assert_eq!(
            out.into_raw().unwrap(),
            vec![Value::Int(11), Value::Int(12), Value::Int(13)]
        );
    }

    #[test]
    fn test_declared_iterations_persist_across_calls() {
        let par = Fanout::new(add(), FanoutConfig::default().with_iterations(2)).unwrap();
        for _ in 0..2 {
            let out = par.call(CallArgs::new().arg(vec![1, 2]).arg(5)).unwrap();
            assert_eq!(out.into_raw().unwrap(), vec![Value::Int(6), Value::Int(7)]);
            assert_eq!(par.declared_iterations(), Some(2));
        }
    }

    #[test]
    fn test_output_policy_applied() {
        let par = Fanout::new(
            add(),
            FanoutConfig::default()
                .with_workers(2)
                .with_output(OutputPolicy::TableConcat),
        )
        .unwrap();
        // Ints cannot be concatenated as tables
        let out = par.call(CallArgs::new().arg(vec![1, 2]).arg(1)).unwrap();
        assert!(!out.is_aggregated());
        assert_eq!(out.as_raw(), Some(&[Value::Int(2), Value::Int(3)][..]));
    }

    #[test]
    fn test_task_error_surfaces() {
        let par = Fanout::new(add(), FanoutConfig::default().with_workers(2)).unwrap();
        let err = par.call(CallArgs::new().arg(vec![1, 2])).unwrap_err();
        assert_eq!(
            err.task_error(),
            Some(&TaskError::MissingArgument("b".to_string()))
        );
        assert_eq!(err.as_label(), "dispatch_task_failed");
    }

    #[test]
    fn test_text_policy() {
        let echo = TaskFn::arc("echo", |args: TaskArgs| Ok(args.get(0, "x")?.clone()));
        let config = FanoutConfig::default()
            .with_workers(2)
            .with_input(InputPolicy::none().with(InputKind::String));
        let par = Fanout::new(echo, config).unwrap();

        let out = par.call(CallArgs::new().arg("abc")).unwrap();
        assert_eq!(
            out.into_raw().unwrap(),
            vec![Value::from("a"), Value::from("b"), Value::from("c")]
        );
    }
}
