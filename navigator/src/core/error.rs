//! Errors surfaced by the navigator.
//!
//! Everything else (no rule present, no match, a malformed comparison) is
//! normal control flow and never reaches this type.

use thiserror::Error;

/// Navigation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    /// A rule or result names a step identifier absent from the step tree.
    #[error("step '{referenced_by}' references unknown step '{identifier}'")]
    UnresolvableReference {
        identifier: String,
        referenced_by: String,
    },

    /// The caller asked about a step the navigator does not know.
    #[error("unknown step: {0}")]
    UnknownStep(String),

    /// Skip filtering revisited a step it had already discarded.
    #[error("skip rules form a cycle at step '{0}'")]
    SkipCycle(String),

    /// The task definition failed its invariants.
    #[error("invalid task: {}", .0.join("; "))]
    InvalidTask(Vec<String>),
}

/// Result type for navigation operations.
pub type Result<T> = std::result::Result<T, NavigationError>;
