//! Iteration count inference and argument broadcasting
//!
//! [`plan()`] turns the arguments of one call into per-iteration sequences.
//! After planning every argument is either a sequence of exactly `n` elements
//! (split one per iteration) or a single-element sequence holding the whole
//! value (replicated to every iteration). Values are read back with
//! [`pick`], which clamps the iteration index to the sequence length.
//!
//! # Example
//!
//! ```
//! use fanout::config::InputPolicy;
//! use fanout::plan::{plan, CallArgs};
//!
//! let args = CallArgs::new().arg(vec![1, 2]).arg(vec![0, 1, 2, 3]);
//! let plan = plan(args, None, &InputPolicy::none(), false);
//!
//! // The longest eligible argument sets n; the other is passed whole
//! assert_eq!(plan.n(), 4);
//! assert_eq!(plan.positional()[0].len(), 1);
//! assert_eq!(plan.positional()[1].len(), 4);
//! ```

use std::fmt;

use tracing::info;

use crate::classify::{classify, Disposition, Reason, Shape};
use crate::config::InputPolicy;
use crate::value::{Arg, Value};

/// Positional and keyword arguments of one call
#[derive(Debug, Default)]
pub struct CallArgs {
    positional: Vec<Arg>,
    keyword: Vec<(String, Arg)>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl Into<Arg>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a keyword argument, replacing any earlier value for the same name
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Arg>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.keyword.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.keyword.push((name, value)),
        }
        self
    }

    pub fn positional_len(&self) -> usize {
        self.positional.len()
    }

    pub fn keyword_len(&self) -> usize {
        self.keyword.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }
}

/// Planning record for one argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgPlan {
    /// Positional index (`"0"`, `"1"`, ...) or keyword name
    pub label: String,
    pub shape: Shape,
    pub disposition: Disposition,
    pub reason: Reason,
    /// Natural length, for eligible arguments
    pub len: Option<usize>,
}

/// Per-iteration sequences for every argument of a call
#[derive(Debug, Clone)]
pub struct BroadcastPlan {
    n: usize,
    inferred: bool,
    entries: Vec<ArgPlan>,
    positional: Vec<Vec<Value>>,
    keyword: Vec<(String, Vec<Value>)>,
}

impl BroadcastPlan {
    /// Iteration count; always at least 1
    pub fn n(&self) -> usize {
        self.n
    }

    /// Whether `n` was inferred from the arguments
    pub fn is_inferred(&self) -> bool {
        self.inferred
    }

    /// Planning records, positional first, then keywords in call order
    pub fn entries(&self) -> &[ArgPlan] {
        &self.entries
    }

    pub fn positional(&self) -> &[Vec<Value>] {
        &self.positional
    }

    pub fn keyword(&self) -> &[(String, Vec<Value>)] {
        &self.keyword
    }

    /// Number of arguments split across iterations
    pub fn split_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.disposition == Disposition::Split)
            .count()
    }
}

impl fmt::Display for BroadcastPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Broadcast Plan")?;
        writeln!(f, "==============")?;
        writeln!(
            f,
            "Iterations: {} ({})",
            self.n,
            if self.inferred { "inferred" } else { "declared" }
        )?;
        writeln!(f)?;

        writeln!(f, "{:<12} {:<10} {:<8} {:<8} Reason", "Arg", "Shape", "Action", "Len")?;
        writeln!(f, "{:-<60}", "")?;

        for entry in &self.entries {
            let label = if entry.label.chars().count() > 11 {
                format!("{}~", entry.label.chars().take(10).collect::<String>())
            } else {
                entry.label.clone()
            };
            let len = entry.len.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string());
            writeln!(
                f,
                "{:<12} {:<10} {:<8} {:<8} {}",
                label, entry.shape, entry.disposition, len, entry.reason
            )?;
        }

        Ok(())
    }
}

/// An argument after lazy sequences have been drained
struct Candidate {
    label: String,
    value: Value,
    shape: Shape,
    disposition: Disposition,
    reason: Reason,
    len: Option<usize>,
}

impl Candidate {
    fn new(label: String, arg: Arg, policy: &InputPolicy) -> Self {
        let class = classify(&arg, policy);
        // Lazy sequences are drained here and nowhere else
        let value = match arg {
            Arg::Value(v) => v,
            Arg::Lazy(seq) => Value::List(seq.materialize()),
        };
        let len = if class.is_eligible() { value.len() } else { None };

        Self {
            label,
            value,
            shape: class.shape,
            disposition: class.disposition,
            reason: class.reason,
            len,
        }
    }

    /// Split into `n` elements, or wrap whole when the length does not match
    fn broadcast(mut self, n: usize) -> (ArgPlan, Vec<Value>) {
        let seq = match (self.disposition, self.len) {
            (Disposition::Split, Some(len)) if len == n => self.value.into_elements(),
            (Disposition::Split, len) => {
                self.disposition = Disposition::Keep;
                self.reason = Reason::LengthMismatch {
                    len: len.unwrap_or(0),
                    n,
                };
                vec![self.value]
            }
            (Disposition::Keep, _) => vec![self.value],
        };

        let entry = ArgPlan {
            label: self.label,
            shape: self.shape,
            disposition: self.disposition,
            reason: self.reason,
            len: self.len,
        };
        (entry, seq)
    }
}

/// Compute the iteration count and broadcast every argument to it
///
/// # Arguments
///
/// * `args` - The call's arguments; lazy sequences are drained exactly once
/// * `declared_n` - Fixed iteration count, or `None` to infer it
/// * `policy` - Which opt-in argument kinds may be split
/// * `verbose` - Emit one diagnostic per argument while inferring `n`
///
/// When inferring, `n` is the largest length among eligible arguments, or 1.
/// Eligible arguments whose length differs from `n` are passed whole.
pub fn plan(
    args: CallArgs,
    declared_n: Option<usize>,
    policy: &InputPolicy,
    verbose: bool,
) -> BroadcastPlan {
    let positional: Vec<Candidate> = args
        .positional
        .into_iter()
        .enumerate()
        .map(|(i, arg)| Candidate::new(i.to_string(), arg, policy))
        .collect();
    let keyword: Vec<Candidate> = args
        .keyword
        .into_iter()
        .map(|(name, arg)| Candidate::new(name, arg, policy))
        .collect();

    let inferred = declared_n.is_none();
    let n = match declared_n {
        Some(n) => n.max(1),
        None => positional
            .iter()
            .chain(keyword.iter())
            .filter_map(|c| c.len)
            .fold(1, usize::max),
    };

    // Arguments are only measured when n is inferred
    if verbose && inferred {
        for c in positional.iter().chain(keyword.iter()) {
            match c.len {
                Some(len) => info!(arg = %c.label, shape = %c.shape, len, "argument is iterable"),
                None => info!(arg = %c.label, shape = %c.shape, reason = %c.reason, "argument skipped"),
            }
        }
    }

    let mut entries = Vec::with_capacity(positional.len() + keyword.len());
    let mut positional_seqs = Vec::with_capacity(positional.len());
    let mut keyword_seqs = Vec::with_capacity(keyword.len());

    for c in positional {
        let (entry, seq) = c.broadcast(n);
        entries.push(entry);
        positional_seqs.push(seq);
    }
    for c in keyword {
        let (entry, seq) = c.broadcast(n);
        keyword_seqs.push((entry.label.clone(), seq));
        entries.push(entry);
    }

    BroadcastPlan {
        n,
        inferred,
        entries,
        positional: positional_seqs,
        keyword: keyword_seqs,
    }
}

/// Value of a broadcast sequence for iteration `j`
///
/// The index is clamped to the last element, so single-element sequences are
/// replicated and length-`n` sequences map one to one.
pub fn pick(seq: &[Value], j: usize) -> Value {
    seq.get(j.min(seq.len().saturating_sub(1)))
        .cloned()
        .unwrap_or(Value::Null)
}
