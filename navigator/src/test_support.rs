//! Test-only helpers for constructing tasks, rules, and on-disk fixtures.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::core::cohort::CohortNavigationRule;
use crate::core::comparator::RuleOperator;
use crate::core::rules::{AnswerCondition, NavigationRule};
use crate::core::survey::{SurveyNavigation, SurveyRule};
use crate::core::types::MatchMode;
use crate::task::{Step, Task};

/// Create a plain step with no rules.
pub fn step(identifier: &str) -> Step {
    Step::new(identifier)
}

/// Create a task of plain steps in list order.
pub fn linear_task(identifiers: &[&str]) -> Task {
    Task::new("t", identifiers.iter().map(|id| step(id)).collect())
}

/// Create a cohort navigation rule.
pub fn cohort_rule(
    required: &[&str],
    operator: Option<MatchMode>,
    skip_to: Option<&str>,
) -> CohortNavigationRule {
    CohortNavigationRule {
        required_cohorts: required.iter().map(|c| c.to_string()).collect(),
        cohort_operator: operator,
        skip_to_identifier: skip_to.map(str::to_string),
    }
}

/// Create an answer condition.
pub fn condition(
    result_identifier: &str,
    operator: Option<RuleOperator>,
    matching_answer: Option<Value>,
) -> AnswerCondition {
    AnswerCondition {
        result_identifier: result_identifier.to_string(),
        rule_operator: operator,
        matching_answer,
    }
}

/// Create a survey navigation rule from `(operator, answer, skip_to, cohort)` tuples.
pub fn survey(
    rules: Vec<(Option<RuleOperator>, Option<Value>, Option<&str>, Option<&str>)>,
) -> NavigationRule {
    NavigationRule::Survey(SurveyNavigation {
        rules: rules
            .into_iter()
            .map(|(rule_operator, matching_answer, skip_to, cohort)| SurveyRule {
                skip_to_identifier: skip_to.map(str::to_string),
                matching_answer,
                rule_operator,
                cohort: cohort.map(str::to_string),
            })
            .collect(),
        ..SurveyNavigation::default()
    })
}

/// Age-branching survey: answers under 18 join the `minor` cohort and go to
/// `minorPath`; everyone else continues to `adultPath`, which jumps to `done`.
pub fn age_task() -> Task {
    Task::new(
        "age",
        vec![
            step("intro"),
            step("ageQuestion").with_navigation(survey(vec![(
                Some(RuleOperator::LessThan),
                Some(Value::from(18)),
                Some("minorPath"),
                Some("minor"),
            )])),
            step("adultPath").with_navigation(NavigationRule::Next {
                next_step_identifier: "done".to_string(),
            }),
            step("minorPath"),
            step("done"),
        ],
    )
}

/// Temporary directory holding task, answers, and config files.
pub struct TaskFixture {
    dir: tempfile::TempDir,
}

impl TaskFixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `task` as pretty JSON and return its path.
    pub fn write_task(&self, task: &Task) -> PathBuf {
        let value = serde_json::to_value(task).expect("serialize task");
        self.write_json("task.json", &value)
    }

    pub fn write_json(&self, name: &str, value: &Value) -> PathBuf {
        let mut payload = serde_json::to_string_pretty(value).expect("serialize json");
        payload.push('\n');
        self.write(name, &payload)
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("write fixture");
        path
    }
}

impl Default for TaskFixture {
    fn default() -> Self {
        Self::new()
    }
}
