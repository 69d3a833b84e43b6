//! Conditional step navigation for multi-step surveys and assessments.
//!
//! A task is an ordered tree of steps. At each point of a run the navigator
//! decides which step comes next, whether going back is allowed, whether the
//! task should end early, and how far along the run is. The architecture keeps
//! a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (rule evaluation, cohort tracking,
//!   traversal, progress). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (task, answers, and config files).
//!
//! [`session`] holds the per-run state and [`walk`] drives a run from scripted
//! answers for the CLI.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod result;
pub mod session;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod walk;
