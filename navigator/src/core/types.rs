//! Shared deterministic types for navigation core logic.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Direction of a navigation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

/// Outcome of evaluating a single navigation, skip, or cohort rule.
///
/// `Continue` means the rule had no opinion and the next rule (or list order)
/// decides. The remaining variants never collide with real step identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Continue,
    /// Jump to the step (or section) with this identifier.
    GoTo(String),
    /// Terminate the task now.
    Exit,
    /// Skip only the step under evaluation.
    SkipThisStep,
    /// Skip the remainder of the enclosing section.
    NextSection,
}

impl Directive {
    pub fn is_continue(&self) -> bool {
        matches!(self, Directive::Continue)
    }
}

/// Quantifier applied to a list of requirements (cohorts or answer conditions).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Every requirement must hold.
    #[default]
    All,
    /// At least one requirement must hold.
    Any,
}

/// Cohort additions and removals produced by survey rules.
///
/// Sets are ordered so that serialized outputs stay stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortChange {
    pub add: BTreeSet<String>,
    pub remove: BTreeSet<String>,
}

impl CohortChange {
    pub fn adding(cohort: impl Into<String>) -> Self {
        Self {
            add: BTreeSet::from([cohort.into()]),
            remove: BTreeSet::new(),
        }
    }

    pub fn removing(cohort: impl Into<String>) -> Self {
        Self {
            add: BTreeSet::new(),
            remove: BTreeSet::from([cohort.into()]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// Union both sides of `other` into this change.
    pub fn merge(&mut self, other: CohortChange) {
        self.add.extend(other.add);
        self.remove.extend(other.remove);
    }
}

/// Policy for identifiers repeated across nested sections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateIdentifiers {
    /// Reject the task when two sections contain the same identifier.
    #[default]
    Reject,
    /// Accept the task; lookups resolve to the first depth-first match.
    FirstMatch,
}

/// Strategy used to find the step before the current one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackNavigation {
    /// Previous step in static list order.
    #[default]
    ListOrder,
    /// Previous entry in the step history, falling back to list order.
    History,
}

/// Load-time navigation options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorOptions {
    pub duplicate_identifiers: DuplicateIdentifiers,
    pub back_navigation: BackNavigation,
    /// When a step is skipped, evaluate its after-cohort-rules before moving on.
    pub skipped_steps_run_after_rules: bool,
}
