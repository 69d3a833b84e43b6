//! Answer-driven survey rules and the navigation rule built from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::comparator::{RuleOperator, is_matching};
use crate::core::types::{CohortChange, Directive};
use crate::result::TaskResult;

/// Compares an answer and optionally redirects navigation and/or toggles a cohort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurveyRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_to_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matching_answer: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_operator: Option<RuleOperator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cohort: Option<String>,
}

impl SurveyRule {
    /// Effective operator after defaulting.
    pub fn operator(&self) -> RuleOperator {
        RuleOperator::resolve(self.rule_operator, self.matching_answer.as_ref())
    }

    /// A comparison operator needs something to compare against.
    pub fn is_valid(&self) -> bool {
        self.operator() == RuleOperator::Skip
            || self.matching_answer.as_ref().is_some_and(|v| !v.is_null())
    }

    fn matches(&self, answer: Option<&Value>) -> bool {
        is_matching(answer, self.matching_answer.as_ref(), self.operator())
    }

    /// Navigation effect of this rule for `answer`.
    ///
    /// Cohort-only rules (cohort without a target) never navigate. A matching
    /// rule without a target exits the task.
    pub fn evaluate_rule(&self, answer: Option<&Value>) -> Directive {
        if self.cohort.is_some() && self.skip_to_identifier.is_none() {
            return Directive::Continue;
        }
        if !self.matches(answer) {
            return Directive::Continue;
        }
        match &self.skip_to_identifier {
            Some(target) => Directive::GoTo(target.clone()),
            None => Directive::Exit,
        }
    }

    /// Cohort effect of this rule for `answer`.
    ///
    /// A non-matching answer removes the cohort rather than leaving it alone.
    pub fn evaluate_cohorts(&self, answer: Option<&Value>) -> Option<CohortChange> {
        let cohort = self.cohort.as_ref()?;
        if self.matches(answer) {
            Some(CohortChange::adding(cohort.clone()))
        } else {
            Some(CohortChange::removing(cohort.clone()))
        }
    }
}

/// Navigation rule of a question step, evaluated against the step's answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurveyNavigation {
    /// Result holding the answer; defaults to the step's own identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_identifier: Option<String>,
    /// Target used on committed navigation when the question was left unanswered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_to_if_nil: Option<String>,
    #[serde(default)]
    pub rules: Vec<SurveyRule>,
}

impl SurveyNavigation {
    pub fn answer_identifier<'a>(&'a self, step_identifier: &'a str) -> &'a str {
        self.answer_identifier.as_deref().unwrap_or(step_identifier)
    }

    /// First rule (in declaration order) with a navigation effect wins.
    pub fn evaluate(
        &self,
        step_identifier: &str,
        result: &TaskResult,
        is_peeking: bool,
    ) -> Directive {
        let answer = result.find_answer(self.answer_identifier(step_identifier));
        if answer.is_none() && !is_peeking {
            if let Some(target) = &self.skip_to_if_nil {
                return Directive::GoTo(target.clone());
            }
        }
        self.rules
            .iter()
            .map(|rule| rule.evaluate_rule(answer))
            .find(|directive| !directive.is_continue())
            .unwrap_or(Directive::Continue)
    }

    /// Union of cohort changes from every rule; `None` when no rule touches cohorts.
    pub fn cohorts_to_apply(
        &self,
        step_identifier: &str,
        result: &TaskResult,
    ) -> Option<CohortChange> {
        let answer = result.find_answer(self.answer_identifier(step_identifier));
        let mut change = CohortChange::default();
        for cohorts in self.rules.iter().filter_map(|rule| rule.evaluate_cohorts(answer)) {
            change.merge(cohorts);
        }
        (!change.is_empty()).then_some(change)
    }
}
