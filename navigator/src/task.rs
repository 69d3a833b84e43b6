//! Decoded task definition: an ordered tree of steps.

use serde::{Deserialize, Serialize};

use crate::core::cohort::CohortNavigationRule;
use crate::core::rules::{BackRule, NavigationRule, SkipRule};

/// One assessment or survey.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub identifier: String,
    pub steps: Vec<Step>,
    /// Step identifiers that progress is reported against, in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_markers: Option<Vec<String>>,
}

impl Task {
    pub fn new(identifier: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            identifier: identifier.into(),
            steps,
            progress_markers: None,
        }
    }

    pub fn with_progress_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.progress_markers = Some(markers.into_iter().map(Into::into).collect());
        self
    }
}

/// A question, instruction, or section of steps.
///
/// A step with children is a section. Rule capabilities are optional fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation: Option<NavigationRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<SkipRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back: Option<BackRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before_cohort_rules: Vec<CohortNavigationRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after_cohort_rules: Vec<CohortNavigationRule>,
}

impl Step {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Self::default()
        }
    }

    pub fn section(identifier: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            steps,
            ..Self::new(identifier)
        }
    }

    pub fn is_section(&self) -> bool {
        !self.steps.is_empty()
    }

    /// True if any rule could make the path differ from list order.
    pub fn has_branching(&self) -> bool {
        self.navigation.is_some()
            || self.skip.is_some()
            || !self.before_cohort_rules.is_empty()
            || !self.after_cohort_rules.is_empty()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_navigation(mut self, rule: NavigationRule) -> Self {
        self.navigation = Some(rule);
        self
    }

    pub fn with_skip(mut self, rule: SkipRule) -> Self {
        self.skip = Some(rule);
        self
    }

    pub fn with_back(mut self, rule: BackRule) -> Self {
        self.back = Some(rule);
        self
    }

    pub fn with_before_cohort_rule(mut self, rule: CohortNavigationRule) -> Self {
        self.before_cohort_rules.push(rule);
        self
    }

    pub fn with_after_cohort_rule(mut self, rule: CohortNavigationRule) -> Self {
        self.after_cohort_rules.push(rule);
        self
    }
}
