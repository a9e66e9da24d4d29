//! Operation and transform model

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static SWAP_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([A-Za-z0-9$_]+)\[0\]\s*=\s*([A-Za-z0-9$_]+)\[\s*[A-Za-z0-9$_]+\s*%\s*([A-Za-z0-9$_]+)\.length\s*\]",
    )
    .expect("valid swap regex")
});

/// The kind of array operation a helper method performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Reverse,
    SliceFrom,
    SwapWithIndex,
}

impl OpKind {
    /// Classify a helper method body.
    ///
    /// Returns `None` for bodies that match no known shape. An unrecognized body
    /// is never mapped onto an operation.
    pub fn classify(body: &str) -> Option<OpKind> {
        if body.contains(".reverse()") {
            return Some(OpKind::Reverse);
        }
        if body.contains(".splice(") {
            return Some(OpKind::SliceFrom);
        }
        let swaps = SWAP_ASSIGNMENT
            .captures_iter(body)
            .any(|caps| caps[1] == caps[2] && caps[2] == caps[3]);
        if swaps {
            return Some(OpKind::SwapWithIndex);
        }
        None
    }

    /// Build the operation for this kind with a resolved argument
    pub fn with_arg(self, arg: usize) -> Operation {
        match self {
            OpKind::Reverse => Operation::Reverse,
            OpKind::SliceFrom => Operation::SliceFrom(arg),
            OpKind::SwapWithIndex => Operation::SwapWithIndex(arg),
        }
    }

    /// Whether the operation reads its numeric argument
    pub fn takes_arg(self) -> bool {
        !matches!(self, OpKind::Reverse)
    }
}

/// A single array operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", content = "arg", rename_all = "snake_case")]
pub enum Operation {
    Reverse,
    /// Drop the first `n` characters
    SliceFrom(usize),
    /// Swap index 0 with `n % len`; `n` is never pre-normalized
    SwapWithIndex(usize),
}

impl Operation {
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Reverse => OpKind::Reverse,
            Operation::SliceFrom(_) => OpKind::SliceFrom,
            Operation::SwapWithIndex(_) => OpKind::SwapWithIndex,
        }
    }

    /// Apply the operation in place
    pub fn apply(&self, chars: &mut Vec<char>) {
        match *self {
            Operation::Reverse => chars.reverse(),
            Operation::SliceFrom(n) => {
                let n = n.min(chars.len());
                chars.drain(..n);
            }
            Operation::SwapWithIndex(n) => {
                if !chars.is_empty() {
                    let idx = n % chars.len();
                    chars.swap(0, idx);
                }
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Reverse => write!(f, "reverse"),
            Operation::SliceFrom(n) => write!(f, "slice_from({})", n),
            Operation::SwapWithIndex(n) => write!(f, "swap({})", n),
        }
    }
}

/// An ordered operation sequence derived from one script revision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
    operations: Vec<Operation>,
}

impl Transform {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Replay every operation left to right over the characters of `input`
    pub fn apply(&self, input: &str) -> String {
        let mut chars: Vec<char> = input.chars().collect();
        for op in &self.operations {
            op.apply(&mut chars);
        }
        chars.into_iter().collect()
    }
}

impl From<Vec<Operation>> for Transform {
    fn from(operations: Vec<Operation>) -> Self {
        Self::new(operations)
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operations.is_empty() {
            return write!(f, "identity");
        }
        for (i, op) in self.operations.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{}", op)?;
        }
        Ok(())
    }
}
