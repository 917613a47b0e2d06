//! Broadcast eligibility of call arguments
//!
//! Every argument is reduced to a [`Shape`] and then checked against the
//! caller's [`InputPolicy`]. The first matching rule wins:
//!
//! 1. arrays are split only when the policy includes [`InputKind::Array`]
//! 2. text and bytes only with [`InputKind::String`]
//! 3. lazy sequences only with [`InputKind::Generator`]
//! 4. lists and tables are always split
//! 5. everything else is kept whole
//!
//! Classification never consumes a lazy sequence; the planner drains those
//! exactly once before measuring them.

use std::fmt;

use crate::config::{InputKind, InputPolicy};
use crate::value::{Arg, Value};

/// Runtime shape of an argument, as far as broadcasting is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Scalar,
    Sequence,
    Text,
    LazySequence,
    ArrayLike,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Scalar => write!(f, "scalar"),
            Shape::Sequence => write!(f, "sequence"),
            Shape::Text => write!(f, "text"),
            Shape::LazySequence => write!(f, "lazy"),
            Shape::ArrayLike => write!(f, "array"),
        }
    }
}

impl Shape {
    /// Shape of an owned value
    pub fn of_value(value: &Value) -> Self {
        match value {
            #[cfg(feature = "array")]
            Value::Array(a) if a.ndim() > 0 => Shape::ArrayLike,
            Value::Text(_) | Value::Bytes(_) => Shape::Text,
            Value::List(_) | Value::Table(_) => Shape::Sequence,
            _ => Shape::Scalar,
        }
    }

    /// Shape of a caller argument
    pub fn of_arg(arg: &Arg) -> Self {
        match arg {
            Arg::Value(v) => Self::of_value(v),
            Arg::Lazy(_) => Shape::LazySequence,
        }
    }

    /// The policy kind that gates this shape, if any
    pub fn gate(&self) -> Option<InputKind> {
        match self {
            Shape::ArrayLike => Some(InputKind::Array),
            Shape::Text => Some(InputKind::String),
            Shape::LazySequence => Some(InputKind::Generator),
            Shape::Sequence | Shape::Scalar => None,
        }
    }
}

/// Whether an argument is split across iterations or passed whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// One element per iteration
    Split,
    /// The whole value for every iteration
    Keep,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Split => write!(f, "split"),
            Disposition::Keep => write!(f, "keep"),
        }
    }
}

/// Why a disposition was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Shape is a collection the policy allows splitting
    Eligible,
    /// Shape needs an input kind the policy does not include
    KindNotEnabled(InputKind),
    /// Not a collection at all
    NotACollection,
    /// Eligible, but its length differs from the iteration count
    LengthMismatch { len: usize, n: usize },
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Eligible => write!(f, "eligible"),
            Reason::KindNotEnabled(kind) => write!(f, "kind_not_enabled:{}", kind),
            Reason::NotACollection => write!(f, "not_a_collection"),
            Reason::LengthMismatch { len, n } => write!(f, "length_mismatch:{}!={}", len, n),
        }
    }
}

/// Outcome of classifying one argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub shape: Shape,
    pub disposition: Disposition,
    pub reason: Reason,
}

impl Classification {
    pub fn is_eligible(&self) -> bool {
        self.disposition == Disposition::Split
    }
}

/// Classify a shape under a policy
pub fn classify_shape(shape: Shape, policy: &InputPolicy) -> Classification {
    let (disposition, reason) = match (shape, shape.gate()) {
        (Shape::Scalar, _) => (Disposition::Keep, Reason::NotACollection),
        (_, Some(kind)) if !policy.contains(kind) => (Disposition::Keep, Reason::KindNotEnabled(kind)),
        _ => (Disposition::Split, Reason::Eligible),
    };

    Classification {
        shape,
        disposition,
        reason,
    }
}

/// Classify a caller argument without consuming it
pub fn classify(arg: &Arg, policy: &InputPolicy) -> Classification {
    classify_shape(Shape::of_arg(arg), policy)
}

/// Returns true if the argument would be split across iterations
pub fn is_broadcastable(arg: &Arg, policy: &InputPolicy) -> bool {
    classify(arg, policy).is_eligible()
}
