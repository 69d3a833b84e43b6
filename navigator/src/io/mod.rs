//! I/O helpers for navigator commands.

pub mod answers;
pub mod config;
pub mod task_store;
