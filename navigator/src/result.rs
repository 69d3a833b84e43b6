//! Result tree supplied by the presentation layer.
//!
//! The navigator only reads answers from it; results are appended by the caller
//! as each step completes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of a single step (or a collection of field results).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Explicit navigation requested by the step's UI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_to_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StepResult>,
}

impl StepResult {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Self::default()
        }
    }

    pub fn answer(identifier: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::new(identifier)
        }
    }

    pub fn collection(identifier: impl Into<String>, children: Vec<StepResult>) -> Self {
        Self {
            children,
            ..Self::new(identifier)
        }
    }

    pub fn with_skip_to(mut self, identifier: impl Into<String>) -> Self {
        self.skip_to_identifier = Some(identifier.into());
        self
    }

    fn find(&self, identifier: &str) -> Option<&StepResult> {
        if self.identifier == identifier {
            return Some(self);
        }
        self.children.iter().rev().find_map(|child| child.find(identifier))
    }
}

/// Ordered step history plus results not tied to path order.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskResult {
    pub identifier: String,
    #[serde(default)]
    pub step_history: Vec<StepResult>,
    #[serde(default)]
    pub async_results: Vec<StepResult>,
}

impl TaskResult {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Self::default()
        }
    }

    /// Append `result` to the history, replacing any entry with the same identifier.
    ///
    /// The replaced entry is removed from its old position so the history keeps
    /// path order. Returns the previous result, if any.
    pub fn append_step_history(&mut self, result: StepResult) -> Option<StepResult> {
        let previous = self
            .step_history
            .iter()
            .position(|r| r.identifier == result.identifier)
            .map(|idx| self.step_history.remove(idx));
        self.step_history.push(result);
        previous
    }

    /// Insert or replace an async result in place.
    pub fn append_async_result(&mut self, result: StepResult) -> Option<StepResult> {
        match self
            .async_results
            .iter_mut()
            .find(|r| r.identifier == result.identifier)
        {
            Some(existing) => Some(std::mem::replace(existing, result)),
            None => {
                self.async_results.push(result);
                None
            }
        }
    }

    /// Most recent result with `identifier`, searching the history (newest first,
    /// including nested children) and then async results.
    pub fn find_result(&self, identifier: &str) -> Option<&StepResult> {
        self.step_history
            .iter()
            .rev()
            .find_map(|r| r.find(identifier))
            .or_else(|| self.async_results.iter().find_map(|r| r.find(identifier)))
    }

    /// Non-null answer value for `identifier`.
    pub fn find_answer(&self, identifier: &str) -> Option<&Value> {
        self.find_result(identifier)
            .and_then(|r| r.value.as_ref())
            .filter(|v| !v.is_null())
    }

    /// True if the step history has a top-level entry for `identifier`.
    pub fn contains_step(&self, identifier: &str) -> bool {
        self.step_history.iter().any(|r| r.identifier == identifier)
    }
}
