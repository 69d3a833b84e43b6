//! Session-scoped cohort tracking.
//!
//! The cohort set is plain data owned by one task run. Rule evaluation reads it;
//! only `apply_assignments` mutates it, and the navigator calls that on a
//! snapshot when peeking so the run's state is left untouched.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::rules::cohort_assignments;
use crate::core::types::{CohortChange, Directive, MatchMode};
use crate::result::TaskResult;
use crate::task::Step;

/// Cohort tags currently applied to a run.
///
/// Serializes as a plain sorted array of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CohortSet(BTreeSet<String>);

impl CohortSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, cohort: &str) -> bool {
        self.0.contains(cohort)
    }

    pub fn insert(&mut self, cohort: impl Into<String>) -> bool {
        self.0.insert(cohort.into())
    }

    pub fn remove(&mut self, cohort: &str) -> bool {
        self.0.remove(cohort)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Apply additions first, then removals.
    pub fn apply(&mut self, change: &CohortChange) {
        self.0.extend(change.add.iter().cloned());
        for cohort in &change.remove {
            self.0.remove(cohort);
        }
    }

    /// True if the set satisfies `required` under `mode`.
    pub fn satisfies(&self, required: &BTreeSet<String>, mode: MatchMode) -> bool {
        match mode {
            MatchMode::All => required.iter().all(|c| self.0.contains(c)),
            MatchMode::Any => required.iter().any(|c| self.0.contains(c)),
        }
    }

    pub fn into_inner(self) -> BTreeSet<String> {
        self.0
    }
}

impl<S: Into<String>> FromIterator<S> for CohortSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Skip rule attached to a step, keyed on the run's cohorts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortNavigationRule {
    pub required_cohorts: BTreeSet<String>,
    #[serde(
        default,
        rename = "operator",
        alias = "cohort_operator",
        skip_serializing_if = "Option::is_none"
    )]
    pub cohort_operator: Option<MatchMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_to_identifier: Option<String>,
}

impl CohortNavigationRule {
    /// A rule without required cohorts never matches.
    pub fn matches(&self, cohorts: &CohortSet) -> bool {
        !self.required_cohorts.is_empty()
            && cohorts.satisfies(&self.required_cohorts, self.cohort_operator.unwrap_or_default())
    }
}

/// Which list of cohort rules is being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RulePhase {
    Before,
    After,
}

/// Cohort state for one task run plus the rules that read it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortTrackingRule {
    initial_cohorts: CohortSet,
    current_cohorts: CohortSet,
}

impl CohortTrackingRule {
    pub fn new(initial_cohorts: CohortSet) -> Self {
        Self {
            current_cohorts: initial_cohorts.clone(),
            initial_cohorts,
        }
    }

    pub fn initial_cohorts(&self) -> &CohortSet {
        &self.initial_cohorts
    }

    pub fn current_cohorts(&self) -> &CohortSet {
        &self.current_cohorts
    }

    /// Restore the cohorts a run started with.
    pub fn reset(&mut self) {
        self.current_cohorts = self.initial_cohorts.clone();
    }

    /// Apply the cohort assignments of a completed step's survey rules.
    pub fn apply_assignments(&mut self, step: &Step, result: &TaskResult) -> Option<CohortChange> {
        let change = cohort_assignments(step, result)?;
        self.current_cohorts.apply(&change);
        Some(change)
    }

    /// Evaluate the before-rules of a step that is about to be shown.
    ///
    /// A matching rule without a target skips just this step.
    pub fn skip_to_step_identifier(&self, before: &Step) -> Directive {
        self.apply_rules(&before.before_cohort_rules, RulePhase::Before)
    }

    /// Evaluate the after-rules of a step that has just been completed.
    ///
    /// A matching rule without a target skips the rest of the enclosing section.
    pub fn next_step_identifier(&self, after: &Step) -> Directive {
        self.apply_rules(&after.after_cohort_rules, RulePhase::After)
    }

    fn apply_rules(&self, rules: &[CohortNavigationRule], phase: RulePhase) -> Directive {
        let Some(rule) = rules.iter().find(|rule| rule.matches(&self.current_cohorts)) else {
            return Directive::Continue;
        };
        match (&rule.skip_to_identifier, phase) {
            (Some(target), _) => Directive::GoTo(target.clone()),
            (None, RulePhase::Before) => Directive::SkipThisStep,
            (None, RulePhase::After) => Directive::NextSection,
        }
    }
}
