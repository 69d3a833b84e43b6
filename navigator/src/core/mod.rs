//! Deterministic, pure logic shared by the navigator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod cohort;
pub mod comparator;
pub mod error;
pub mod invariants;
pub mod navigator;
pub mod progress;
pub mod rules;
pub mod survey;
pub mod types;
