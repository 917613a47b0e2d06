//! Fanout: data-parallel fan-out for single-item tasks
//!
//! Wrap a task that handles one element and call it with collections: the
//! arguments are broadcast to a common iteration count, each iteration runs as
//! an independent work unit on a pool of worker threads, and the results come
//! back in iteration order, optionally merged into a table or array.

pub mod assign;
pub mod classify;
pub mod config;
pub mod fanout;
pub mod plan;
pub mod pool;
pub mod reassemble;
pub mod task;
pub mod unit;
pub mod value;

// Re-export main types at crate root
pub use config::{ConfigError, FanoutConfig, InputKind, InputPolicy, OutputPolicy};
pub use fanout::{make_parallel, CallError, Fanout};
pub use plan::{BroadcastPlan, CallArgs};
pub use pool::DispatchError;
pub use reassemble::{Output, ReassemblyError};
pub use task::{ProcessInfo, Task, TaskArgs, TaskError, TaskFn, TaskRef, TaskRegistry};
pub use value::{Arg, LazySeq, Table, Value};
