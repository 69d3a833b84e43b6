//! Per-step navigation, skip, and back rules and their resolvers.
//!
//! Each capability is an optional field on [`Step`]; the resolvers here read
//! those fields so the navigator never has to inspect a step's kind.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::comparator::{RuleOperator, is_matching};
use crate::core::survey::SurveyNavigation;
use crate::core::types::{CohortChange, Directive, MatchMode};
use crate::result::TaskResult;
use crate::task::Step;

/// Rule deciding where to go once a step is complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NavigationRule {
    /// Unconditional jump.
    Next { next_step_identifier: String },
    /// Answer-driven jump.
    Survey(SurveyNavigation),
}

/// Comparison of a stored answer against an operand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerCondition {
    pub result_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_operator: Option<RuleOperator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matching_answer: Option<Value>,
}

impl AnswerCondition {
    pub fn operator(&self) -> RuleOperator {
        RuleOperator::resolve(self.rule_operator, self.matching_answer.as_ref())
    }

    pub fn is_valid(&self) -> bool {
        self.operator() == RuleOperator::Skip
            || self.matching_answer.as_ref().is_some_and(|v| !v.is_null())
    }

    pub fn is_met(&self, result: &TaskResult) -> bool {
        is_matching(
            result.find_answer(&self.result_identifier),
            self.matching_answer.as_ref(),
            self.operator(),
        )
    }
}

/// Rule deciding whether a step is skipped when navigation reaches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SkipRule {
    Always,
    Answer {
        conditions: Vec<AnswerCondition>,
        #[serde(default, rename = "match")]
        mode: MatchMode,
    },
    /// Skip when the history already holds a result for `identifier`
    /// (the step itself when unset).
    ResultExists {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        identifier: Option<String>,
    },
}

/// Rule that can forbid navigating back from a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackRule {
    Never,
    /// Back navigation is disallowed while the conditions hold.
    Answer {
        conditions: Vec<AnswerCondition>,
        #[serde(default, rename = "match")]
        mode: MatchMode,
    },
}

fn conditions_hold(conditions: &[AnswerCondition], mode: MatchMode, result: &TaskResult) -> bool {
    if conditions.is_empty() {
        return false;
    }
    match mode {
        MatchMode::All => conditions.iter().all(|c| c.is_met(result)),
        MatchMode::Any => conditions.iter().any(|c| c.is_met(result)),
    }
}

/// Navigation requested after completing `step`.
///
/// An explicit `skip_to_identifier` on the step's own result wins over the
/// step's navigation rule.
pub fn navigation_directive(step: &Step, result: &TaskResult, is_peeking: bool) -> Directive {
    if let Some(target) = result
        .find_result(&step.identifier)
        .and_then(|r| r.skip_to_identifier.as_ref())
    {
        return Directive::GoTo(target.clone());
    }
    match &step.navigation {
        Some(NavigationRule::Next {
            next_step_identifier,
        }) => Directive::GoTo(next_step_identifier.clone()),
        Some(NavigationRule::Survey(survey)) => {
            survey.evaluate(&step.identifier, result, is_peeking)
        }
        None => Directive::Continue,
    }
}

/// True if the step's skip rule fires for `result`.
pub fn should_skip(step: &Step, result: &TaskResult) -> bool {
    match &step.skip {
        None => false,
        Some(SkipRule::Always) => true,
        Some(SkipRule::Answer { conditions, mode }) => conditions_hold(conditions, *mode, result),
        Some(SkipRule::ResultExists { identifier }) => {
            result.contains_step(identifier.as_deref().unwrap_or(&step.identifier))
        }
    }
}

/// False if the step's back rule forbids leaving it backwards.
pub fn allows_back_navigation(step: &Step, result: &TaskResult) -> bool {
    match &step.back {
        None => true,
        Some(BackRule::Never) => false,
        Some(BackRule::Answer { conditions, mode }) => !conditions_hold(conditions, *mode, result),
    }
}

/// Cohort changes contributed by the step's survey rules.
pub fn cohort_assignments(step: &Step, result: &TaskResult) -> Option<CohortChange> {
    match &step.navigation {
        Some(NavigationRule::Survey(survey)) => survey.cohorts_to_apply(&step.identifier, result),
        _ => None,
    }
}

/// Step identifiers named by the step's rules.
pub fn referenced_identifiers(step: &Step) -> Vec<&str> {
    let mut refs = Vec::new();
    match &step.navigation {
        Some(NavigationRule::Next {
            next_step_identifier,
        }) => refs.push(next_step_identifier.as_str()),
        Some(NavigationRule::Survey(survey)) => {
            refs.extend(survey.skip_to_if_nil.as_deref());
            refs.extend(
                survey
                    .rules
                    .iter()
                    .filter_map(|rule| rule.skip_to_identifier.as_deref()),
            );
        }
        None => {}
    }
    refs.extend(
        step.before_cohort_rules
            .iter()
            .chain(&step.after_cohort_rules)
            .filter_map(|rule| rule.skip_to_identifier.as_deref()),
    );
    refs
}

/// Malformed rule payloads on `step`, reported relative to `path`.
pub fn rule_problems(step: &Step, path: &str) -> Vec<String> {
    let mut problems = Vec::new();
    if let Some(NavigationRule::Survey(survey)) = &step.navigation {
        for (idx, rule) in survey.rules.iter().enumerate() {
            if !rule.is_valid() {
                problems.push(format!(
                    "{}: survey rule {} uses {:?} without matching_answer",
                    path,
                    idx,
                    rule.operator()
                ));
            }
        }
    }
    let condition_lists = [
        ("skip", skip_conditions(step)),
        ("back", back_conditions(step)),
    ];
    for (kind, conditions) in condition_lists {
        let Some(conditions) = conditions else {
            continue;
        };
        if conditions.is_empty() {
            problems.push(format!("{}: {} rule has no conditions", path, kind));
        }
        for condition in conditions {
            if condition.result_identifier.trim().is_empty() {
                problems.push(format!("{}: {} condition missing result_identifier", path, kind));
            }
            if !condition.is_valid() {
                problems.push(format!(
                    "{}: {} condition on '{}' uses {:?} without matching_answer",
                    path,
                    kind,
                    condition.result_identifier,
                    condition.operator()
                ));
            }
        }
    }
    problems
}

fn skip_conditions(step: &Step) -> Option<&[AnswerCondition]> {
    match &step.skip {
        Some(SkipRule::Answer { conditions, .. }) => Some(conditions),
        _ => None,
    }
}

fn back_conditions(step: &Step) -> Option<&[AnswerCondition]> {
    match &step.back {
        Some(BackRule::Answer { conditions, .. }) => Some(conditions),
        _ => None,
    }
}
