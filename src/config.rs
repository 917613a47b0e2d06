//! Wrapper configuration and typing policies
//!
//! [`FanoutConfig`] holds everything a [`crate::Fanout`] needs besides the task
//! itself. It follows the usual builder pattern: start from `Default` and
//! override fields with the `with_*` methods.
//!
//! # Example
//!
//! ```
//! use fanout::config::{FanoutConfig, InputKind, InputPolicy, OutputPolicy};
//!
//! let config = FanoutConfig::default()
//!     .with_workers(4)
//!     .with_input(InputPolicy::parse(["str", "gen"]).unwrap())
//!     .with_output(OutputPolicy::NewAxisStack);
//!
//! assert_eq!(config.workers, 4);
//! assert!(config.input.contains(InputKind::String));
//! assert!(!config.input.contains(InputKind::Array));
//! ```

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors detected when a wrapper is constructed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("task '{0}' is not registered and cannot be invoked")]
    NotInvocable(String),

    #[error("input kind '{0}' not understood")]
    UnknownInputKind(String),

    #[error("worker count must be greater than 0, got {0}")]
    InvalidWorkerCount(usize),

    #[error("iteration count must be greater than 0, got {0}")]
    InvalidIterationCount(usize),

    #[error("array inputs were requested but array support is not compiled in")]
    ArrayUnavailable,
}

impl ConfigError {
    /// Returns a short stable label for logs
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::NotInvocable(_) => "config_not_invocable",
            ConfigError::UnknownInputKind(_) => "config_unknown_input_kind",
            ConfigError::InvalidWorkerCount(_) => "config_invalid_worker_count",
            ConfigError::InvalidIterationCount(_) => "config_invalid_iteration_count",
            ConfigError::ArrayUnavailable => "config_array_unavailable",
        }
    }
}

/// Argument shapes whose splitting must be opted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    /// N-dimensional arrays, split along their first axis
    Array,
    /// Text and bytes, split per character or byte
    String,
    /// One-shot lazy sequences, drained once and split per element
    Generator,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::Array => write!(f, "array"),
            InputKind::String => write!(f, "string"),
            InputKind::Generator => write!(f, "generator"),
        }
    }
}

impl FromStr for InputKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "array" | "nda" => Ok(InputKind::Array),
            "string" | "str" => Ok(InputKind::String),
            "generator" | "gen" => Ok(InputKind::Generator),
            _ => Err(ConfigError::UnknownInputKind(s.to_string())),
        }
    }
}

/// The set of input kinds that are eligible for splitting
///
/// Plain lists and tables are always eligible; this policy only gates arrays,
/// text and lazy sequences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputPolicy {
    kinds: HashSet<InputKind>,
}

impl InputPolicy {
    /// A policy with no opt-in kinds
    pub fn none() -> Self {
        Self::default()
    }

    /// Parse a policy from tokens such as `"str"` or `"generator"`
    pub fn parse<I, S>(tokens: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let kinds = tokens
            .into_iter()
            .map(|t| t.as_ref().parse::<InputKind>())
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(Self { kinds })
    }

    /// Add a kind to the policy
    pub fn with(mut self, kind: InputKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    pub fn contains(&self, kind: InputKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl FromIterator<InputKind> for InputPolicy {
    fn from_iter<I: IntoIterator<Item = InputKind>>(iter: I) -> Self {
        Self {
            kinds: iter.into_iter().collect(),
        }
    }
}

/// How per-iteration results are merged into one value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputPolicy {
    /// Stack tables row-wise, keeping the first table's column labels
    TableConcat,
    /// Concatenate arrays along their existing first axis
    FirstAxisStack,
    /// Stack equally-shaped arrays (or numeric scalars) along a new first axis
    NewAxisStack,
    /// Unrecognized token; reassembly falls back to the raw results
    Other(String),
}

impl fmt::Display for OutputPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputPolicy::TableConcat => write!(f, "table-concat"),
            OutputPolicy::FirstAxisStack => write!(f, "first-axis-stack"),
            OutputPolicy::NewAxisStack => write!(f, "new-axis-stack"),
            OutputPolicy::Other(token) => write!(f, "{}", token),
        }
    }
}

impl FromStr for OutputPolicy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "df" | "dataframe" | "table" | "table-concat" => OutputPolicy::TableConcat,
            "nd1" | "first-axis" | "first-axis-stack" => OutputPolicy::FirstAxisStack,
            "nda" | "new-axis" | "new-axis-stack" => OutputPolicy::NewAxisStack,
            _ => OutputPolicy::Other(s.to_string()),
        })
    }
}

/// Configuration for a parallel wrapper
#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// Size of the worker pool
    /// Default: number of logical cores
    pub workers: usize,

    /// Fixed iteration count; `None` infers it from the arguments of each call
    pub iterations: Option<usize>,

    /// Reassembly of the results; `None` returns the raw list
    pub output: Option<OutputPolicy>,

    /// Which opt-in argument kinds are split
    pub input: InputPolicy,

    /// Inject `_pinfo = [worker_index, invocation_counter]` into every call
    pub forward_process_info: bool,

    /// Emit per-argument diagnostics
    pub verbose: bool,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            iterations: None,
            output: None,
            input: InputPolicy::none(),
            forward_process_info: false,
            verbose: false,
        }
    }
}

impl FanoutConfig {
    /// Set the worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Fix the iteration count instead of inferring it
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = Some(iterations);
        self
    }

    /// Set the output policy
    pub fn with_output(mut self, output: OutputPolicy) -> Self {
        self.output = Some(output);
        self
    }

    /// Set the input policy
    pub fn with_input(mut self, input: InputPolicy) -> Self {
        self.input = input;
        self
    }

    /// Forward process identity info to the task
    pub fn with_process_info(mut self, forward: bool) -> Self {
        self.forward_process_info = forward;
        self
    }

    /// Enable diagnostics
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Check the configuration for values no call could run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidWorkerCount(0));
        }
        if self.iterations == Some(0) {
            return Err(ConfigError::InvalidIterationCount(0));
        }
        if self.input.contains(InputKind::Array) && !cfg!(feature = "array") {
            return Err(ConfigError::ArrayUnavailable);
        }
        Ok(())
    }
}
