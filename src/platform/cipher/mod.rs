//! Signature and throttle transform resolution.
//!
//! The [`Cipher`] orchestrator tries, in order: the resolved-signature cache,
//! the structural [`parser`], a [`synth`]esized minimal program run in the
//! [`sandbox`], the full script in the sandbox (with a sanitize-and-retry pass),
//! and finally the keyword [`heuristic`].

pub mod config;
pub mod heuristic;
pub mod metrics;
pub mod parser;
pub mod resolver;
pub mod sandbox;
pub mod sanitize;
mod scan;
pub mod synth;
pub mod transform;

#[cfg(test)]
pub(crate) mod fixtures;

pub use config::CipherConfig;
pub use metrics::{Metrics, MetricsSnapshot};
pub use parser::{parse, ParseOutcome};
pub use resolver::{Cipher, Resolution, Strategy};
pub use sandbox::{DenoEngine, ExecutionGuard, Sandbox, ScriptEngine};
pub use sanitize::sanitize;
pub use transform::{OpKind, Operation, Transform};
