//! One run of a task.
//!
//! A [`TaskRun`] owns the per-run state (result tree, cohort tracking rule,
//! current position) and shares the immutable navigator, so concurrent runs of
//! the same task each get their own `TaskRun`.

use std::sync::Arc;

use crate::core::cohort::{CohortSet, CohortTrackingRule};
use crate::core::error::{NavigationError, Result};
use crate::core::navigator::{ConditionalNavigator, NavigationDecision};
use crate::core::progress::Progress;
use crate::core::types::Direction;
use crate::result::{StepResult, TaskResult};
use crate::task::Step;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    NotStarted,
    At(String),
    Finished { exited: bool },
}

/// Per-run navigation state.
#[derive(Debug, Clone)]
pub struct TaskRun {
    navigator: Arc<ConditionalNavigator>,
    result: TaskResult,
    tracking: CohortTrackingRule,
    position: Position,
}

impl TaskRun {
    pub fn new(navigator: Arc<ConditionalNavigator>, initial_cohorts: CohortSet) -> Self {
        let result = TaskResult::new(navigator.task().identifier.clone());
        Self {
            navigator,
            result,
            tracking: CohortTrackingRule::new(initial_cohorts),
            position: Position::NotStarted,
        }
    }

    /// Resume a persisted run at `current` (`None` = not started yet).
    ///
    /// `tracking` carries both the starting and current cohorts, so `reset`
    /// still returns to the cohorts the run originally started with.
    pub fn resume(
        navigator: Arc<ConditionalNavigator>,
        result: TaskResult,
        tracking: CohortTrackingRule,
        current: Option<String>,
    ) -> Result<Self> {
        let position = match current {
            None => Position::NotStarted,
            Some(identifier) => {
                if navigator.step_with(&identifier).is_none() {
                    return Err(NavigationError::UnknownStep(identifier));
                }
                Position::At(identifier)
            }
        };
        Ok(Self {
            navigator,
            result,
            tracking,
            position,
        })
    }

    pub fn navigator(&self) -> &ConditionalNavigator {
        &self.navigator
    }

    pub fn current_step(&self) -> Option<&Step> {
        match &self.position {
            Position::At(identifier) => self.navigator.step_with(identifier),
            _ => None,
        }
    }

    pub fn result(&self) -> &TaskResult {
        &self.result
    }

    pub fn cohorts(&self) -> &CohortSet {
        self.tracking.current_cohorts()
    }

    /// Cohort state to persist alongside the result for [`TaskRun::resume`].
    pub fn tracking(&self) -> &CohortTrackingRule {
        &self.tracking
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.position, Position::Finished { .. })
    }

    pub fn is_exited(&self) -> bool {
        matches!(self.position, Position::Finished { exited: true })
    }

    /// Record the result of the step being shown.
    pub fn record(&mut self, result: StepResult) -> Option<StepResult> {
        self.result.append_step_history(result)
    }

    pub fn record_async(&mut self, result: StepResult) -> Option<StepResult> {
        self.result.append_async_result(result)
    }

    /// Commit forward navigation from the current step.
    pub fn advance(&mut self) -> Result<NavigationDecision<'_>> {
        let current = match &self.position {
            Position::NotStarted => None,
            Position::At(identifier) => Some(identifier.clone()),
            Position::Finished { exited } => {
                return Ok(NavigationDecision {
                    step: None,
                    direction: Direction::Forward,
                    exited: *exited,
                });
            }
        };
        let decision =
            self.navigator
                .step_after(current.as_deref(), &self.result, &mut self.tracking)?;
        self.position = match decision.identifier() {
            Some(identifier) => Position::At(identifier.to_string()),
            None => Position::Finished {
                exited: decision.exited,
            },
        };
        Ok(decision)
    }

    /// Next step without committing anything.
    pub fn peek_next(&self) -> Result<Option<&Step>> {
        match &self.position {
            Position::NotStarted => Ok(self
                .navigator
                .peek_after(None, &self.result, &self.tracking)?
                .step),
            Position::At(identifier) => Ok(self
                .navigator
                .peek_after(Some(identifier), &self.result, &self.tracking)?
                .step),
            Position::Finished { .. } => Ok(None),
        }
    }

    pub fn has_next(&self) -> Result<bool> {
        Ok(self.peek_next()?.is_some())
    }

    /// True if completing the current step would end the task early.
    pub fn should_exit(&self) -> Result<bool> {
        match &self.position {
            Position::At(identifier) => {
                self.navigator
                    .should_exit(Some(identifier), &self.result, &self.tracking)
            }
            Position::NotStarted => self.navigator.should_exit(None, &self.result, &self.tracking),
            Position::Finished { exited } => Ok(*exited),
        }
    }

    /// Move back one step; `None` leaves the position unchanged.
    pub fn go_back(&mut self) -> Result<Option<&Step>> {
        let Position::At(identifier) = &self.position else {
            return Ok(None);
        };
        let Some(previous) = self.navigator.step_before(identifier, &self.result)? else {
            return Ok(None);
        };
        self.position = Position::At(previous.identifier.clone());
        Ok(Some(previous))
    }

    pub fn can_go_back(&self) -> Result<bool> {
        match &self.position {
            Position::At(identifier) => self.navigator.has_step_before(identifier, &self.result),
            _ => Ok(false),
        }
    }

    pub fn progress(&self) -> Option<Progress> {
        let Position::At(identifier) = &self.position else {
            return None;
        };
        self.navigator.progress(identifier, Some(&self.result))
    }
}
