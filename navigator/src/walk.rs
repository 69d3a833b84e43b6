//! Simulated run of a task driven by scripted answers.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::core::cohort::CohortSet;
use crate::core::navigator::ConditionalNavigator;
use crate::core::progress::Progress;
use crate::core::types::Direction;
use crate::io::answers::Answers;
use crate::session::TaskRun;

/// Walk limits and starting state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOptions {
    /// Upper bound on presented steps; guards against answer-driven loops.
    pub max_steps: usize,
    pub initial_cohorts: CohortSet,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_steps: 1000,
            initial_cohorts: CohortSet::new(),
        }
    }
}

/// One presented step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitedStep {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<Value>,
}

/// How the walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkOutcome {
    Completed,
    Exited,
    StepLimit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalkReport {
    pub task: String,
    pub path: Vec<VisitedStep>,
    pub cohorts: CohortSet,
    pub outcome: WalkOutcome,
}

/// Present each step in turn, record its scripted answer, and commit forward.
pub fn walk(
    navigator: Arc<ConditionalNavigator>,
    answers: &Answers,
    options: &WalkOptions,
) -> Result<WalkReport> {
    let task = navigator.task().identifier.clone();
    let mut run = TaskRun::new(navigator, options.initial_cohorts.clone());
    let mut path = Vec::new();

    let outcome = loop {
        let decision = run
            .advance()
            .with_context(|| format!("navigate task {} after step {}", task, last_step(&path)))?;
        let Some(step) = decision.step else {
            break if decision.exited {
                WalkOutcome::Exited
            } else {
                WalkOutcome::Completed
            };
        };
        let identifier = step.identifier.clone();
        let title = step.title.clone();
        let direction = decision.direction;

        if path.len() >= options.max_steps {
            debug!(task = %task, max_steps = options.max_steps, "step limit reached");
            break WalkOutcome::StepLimit;
        }

        let progress = run.progress();
        let answer = answers.get(&identifier).cloned();
        debug!(step = %identifier, ?direction, answered = answer.is_some(), "walk step");
        run.record(answers.step_result(&identifier));
        path.push(VisitedStep {
            identifier,
            title,
            direction,
            progress,
            answer,
        });
    };

    Ok(WalkReport {
        task,
        path,
        cohorts: run.cohorts().clone(),
        outcome,
    })
}

fn last_step(path: &[VisitedStep]) -> &str {
    path.last().map_or("<start>", |step| step.identifier.as_str())
}
