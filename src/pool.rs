//! Fixed-size worker pool for one fan-out round
//!
//! [`WorkerPool::map`] runs a batch of [`WorkUnit`]s and returns their results
//! in submission order. Each call gets its own pool: worker threads are
//! started inside a scope owned by the call and are all joined before it
//! returns, whether the batch succeeded, failed, or was empty.
//!
//! Units are assigned to workers statically, round-robin (see
//! [`crate::assign`]). Each worker counts its invocations from 1, which is
//! what tasks see as the second half of their process info.
//!
//! The first failing unit stops every worker from starting further units. The
//! error returned is the failure with the lowest iteration index; no partial
//! results are returned.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::Sender;
use thiserror::Error;
use tracing::debug;

use crate::assign::{round_robin, AssignError};
use crate::task::TaskError;
use crate::unit::WorkUnit;
use crate::value::Value;

/// Errors raised while dispatching a batch
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("iteration {iteration} failed: {source}")]
    Task {
        iteration: usize,
        #[source]
        source: TaskError,
    },

    #[error("failed to start worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("no result for iteration {0}")]
    MissingResult(usize),

    #[error(transparent)]
    Assign(#[from] AssignError),
}

impl DispatchError {
    /// Returns a short stable label for logs
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::Task { .. } => "dispatch_task_failed",
            DispatchError::Spawn { .. } => "dispatch_spawn_failed",
            DispatchError::MissingResult(_) => "dispatch_missing_result",
            DispatchError::Assign(_) => "dispatch_no_workers",
        }
    }

    /// The task failure behind this error, if any
    pub fn task_error(&self) -> Option<&TaskError> {
        match self {
            DispatchError::Task { source, .. } => Some(source),
            _ => None,
        }
    }
}

type UnitResult = (usize, Result<Value, TaskError>);

/// A pool of `workers` threads, started per batch
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, DispatchError> {
        if workers == 0 {
            return Err(AssignError::NoWorkers.into());
        }
        Ok(Self { workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every unit and return the results in submission order
    pub fn map(&self, units: Vec<WorkUnit>) -> Result<Vec<Value>, DispatchError> {
        let n = units.len();
        if n == 0 {
            return Ok(Vec::new());
        }

        let assignment = round_robin(n, self.workers)?;
        debug!(
            units = n,
            workers = assignment.active_workers(),
            "dispatching batch"
        );

        let mut pending: Vec<Option<WorkUnit>> = units.into_iter().map(Some).collect();
        let queues: Vec<(usize, Vec<(usize, WorkUnit)>)> = assignment
            .iter()
            .map(|shard| {
                let queue = shard
                    .indices()
                    .filter_map(|i| pending[i].take().map(|unit| (i, unit)))
                    .collect();
                (shard.worker, queue)
            })
            .collect();

        let (tx, rx) = crossbeam_channel::unbounded::<UnitResult>();
        let abort = AtomicBool::new(false);

        let started = thread::scope(|scope| {
            for (worker, queue) in queues {
                let tx = tx.clone();
                let abort = &abort;
                thread::Builder::new()
                    .name(format!("fanout-worker-{}", worker))
                    .spawn_scoped(scope, move || run_worker(worker, queue, tx, abort))
                    .map_err(|source| {
                        abort.store(true, Ordering::Release);
                        DispatchError::Spawn { worker, source }
                    })?;
            }
            Ok::<_, DispatchError>(())
        });
        drop(tx);

        let mut results: Vec<Option<Value>> = vec![None; n];
        let mut first_error: Option<(usize, TaskError)> = None;
        for (i, result) in rx.iter() {
            match result {
                Ok(value) => results[i] = Some(value),
                Err(err) => {
                    if first_error.as_ref().map_or(true, |(j, _)| i < *j) {
                        first_error = Some((i, err));
                    }
                }
            }
        }

        started?;
        if let Some((iteration, source)) = first_error {
            debug!(iteration, error = %source, "batch aborted");
            return Err(DispatchError::Task { iteration, source });
        }

        debug!(units = n, "batch complete");
        results
            .into_iter()
            .enumerate()
            .map(|(i, r)| r.ok_or(DispatchError::MissingResult(i)))
            .collect()
    }
}

/// Run one worker's queue in order until it is empty or the batch aborts
fn run_worker(
    worker: usize,
    queue: Vec<(usize, WorkUnit)>,
    tx: Sender<UnitResult>,
    abort: &AtomicBool,
) {
    let mut invocation = 0;
    for (i, unit) in queue {
        if abort.load(Ordering::Acquire) {
            debug!(worker, iteration = i, "skipping unit after failure");
            break;
        }

        invocation += 1;
        let result = panic::catch_unwind(AssertUnwindSafe(|| unit.execute(worker, invocation)))
            .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload.as_ref()))));

        if result.is_err() {
            abort.store(true, Ordering::Release);
        }
        if tx.send((i, result)).is_err() {
            break;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run `units` on a fresh pool of `worker_count` workers
pub fn run(units: Vec<WorkUnit>, worker_count: usize) -> Result<Vec<Value>, DispatchError> {
    WorkerPool::new(worker_count)?.map(units)
}
