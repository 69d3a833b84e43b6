//! Scripted answers for simulated walks.
//!
//! An answers file is a JSON object mapping step identifiers to answer values.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::result::StepResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Answers(BTreeMap<String, Value>);

impl Answers {
    pub fn get(&self, identifier: &str) -> Option<&Value> {
        self.0.get(identifier)
    }

    pub fn insert(&mut self, identifier: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(identifier.into(), value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Result recorded when `identifier` is presented; unanswered steps get an
    /// empty result.
    pub fn step_result(&self, identifier: &str) -> StepResult {
        match self.get(identifier) {
            Some(value) => StepResult::answer(identifier, value.clone()),
            None => StepResult::new(identifier),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Answers {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Load answers from a JSON file.
pub fn load_answers(path: &Path) -> Result<Answers> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read answers {}", path.display()))?;
    let answers: Answers = serde_json::from_str(&contents)
        .with_context(|| format!("parse answers {}", path.display()))?;
    debug!(path = %path.display(), count = answers.len(), "answers loaded");
    Ok(answers)
}
