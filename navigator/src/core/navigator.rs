//! Conditional step navigator.
//!
//! The step tree is flattened once at construction into leaf steps in
//! depth-first order; sections are kept as ranges over those leaves. All
//! traversal is a pure function of the tree, the caller's [`TaskResult`], and
//! the caller's [`CohortTrackingRule`].
//!
//! Committed traversal (`step_after`) evaluates against a snapshot of the
//! cohort state and writes it back only on success. Peeking traversal
//! evaluates against a throwaway snapshot.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::core::cohort::CohortTrackingRule;
use crate::core::error::{NavigationError, Result};
use crate::core::invariants::validate_task;
use crate::core::progress::{Progress, marker_progress};
use crate::core::rules::{allows_back_navigation, navigation_directive, should_skip};
use crate::core::types::{BackNavigation, Direction, Directive, NavigatorOptions};
use crate::result::TaskResult;
use crate::task::{Step, Task};

/// Outcome of a forward traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationDecision<'a> {
    /// Next step to present; `None` when the task is complete or exited.
    pub step: Option<&'a Step>,
    pub direction: Direction,
    /// True when a rule requested early termination.
    pub exited: bool,
}

impl NavigationDecision<'_> {
    pub fn is_complete(&self) -> bool {
        self.step.is_none()
    }

    pub fn identifier(&self) -> Option<&str> {
        self.step.map(|step| step.identifier.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Unit {
    Leaf(usize),
    Section(usize),
}

#[derive(Debug, Clone)]
struct Leaf {
    path: Vec<usize>,
    /// Enclosing sections, outermost first.
    sections: Vec<usize>,
}

#[derive(Debug, Clone)]
struct Section {
    path: Vec<usize>,
    /// Leaf range `first..end`.
    first: usize,
    end: usize,
    /// Enclosing sections, outermost first.
    parents: Vec<usize>,
}

#[derive(Debug, Default)]
struct Layout {
    leaves: Vec<Leaf>,
    sections: Vec<Section>,
    index: HashMap<String, Unit>,
}

impl Layout {
    fn build(steps: &[Step]) -> Self {
        let mut layout = Self::default();
        layout.flatten(steps, &mut Vec::new(), &mut Vec::new());
        layout
    }

    fn flatten(&mut self, steps: &[Step], path: &mut Vec<usize>, enclosing: &mut Vec<usize>) {
        for (idx, step) in steps.iter().enumerate() {
            path.push(idx);
            if step.is_section() {
                let id = self.sections.len();
                self.sections.push(Section {
                    path: path.clone(),
                    first: self.leaves.len(),
                    end: self.leaves.len(),
                    parents: enclosing.clone(),
                });
                // First depth-first match wins.
                self.index
                    .entry(step.identifier.clone())
                    .or_insert(Unit::Section(id));
                enclosing.push(id);
                self.flatten(&step.steps, path, enclosing);
                enclosing.pop();
                self.sections[id].end = self.leaves.len();
            } else {
                self.index
                    .entry(step.identifier.clone())
                    .or_insert(Unit::Leaf(self.leaves.len()));
                self.leaves.push(Leaf {
                    path: path.clone(),
                    sections: enclosing.clone(),
                });
            }
            path.pop();
        }
    }
}

enum Landing {
    Step(usize),
    Complete,
    Exit,
}

enum Filter {
    Keep,
    Skip,
    Redirect(String),
}

/// Mutable state threaded through one traversal.
struct Pass<'r> {
    result: &'r TaskResult,
    tracking: &'r mut CohortTrackingRule,
    is_peeking: bool,
    jumped: bool,
}

/// Navigator over an immutable task definition.
///
/// Safe to share between runs; per-run state lives in the caller's result and
/// cohort tracking rule.
#[derive(Debug)]
pub struct ConditionalNavigator {
    task: Task,
    options: NavigatorOptions,
    leaves: Vec<Leaf>,
    sections: Vec<Section>,
    index: HashMap<String, Unit>,
}

impl ConditionalNavigator {
    /// Validate `task` and build the navigator.
    pub fn new(task: Task, options: NavigatorOptions) -> Result<Self> {
        let errors = validate_task(&task, options.duplicate_identifiers);
        if !errors.is_empty() {
            return Err(NavigationError::InvalidTask(errors));
        }
        let Layout {
            leaves,
            sections,
            index,
        } = Layout::build(&task.steps);
        debug!(
            task = %task.identifier,
            leaves = leaves.len(),
            sections = sections.len(),
            "navigator ready"
        );
        Ok(Self {
            task,
            options,
            leaves,
            sections,
            index,
        })
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn options(&self) -> &NavigatorOptions {
        &self.options
    }

    /// Step (or section) with `identifier`, first depth-first match.
    pub fn step_with(&self, identifier: &str) -> Option<&Step> {
        self.index.get(identifier).map(|unit| self.unit_step(*unit))
    }

    /// Presentable steps in static list order.
    pub fn leaf_steps(&self) -> impl Iterator<Item = &Step> {
        (0..self.leaves.len()).map(|position| self.leaf_step(position))
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Committed forward traversal from `current` (`None` = task start).
    ///
    /// Cohort changes are written to `tracking` only when this returns `Ok`.
    pub fn step_after(
        &self,
        current: Option<&str>,
        result: &TaskResult,
        tracking: &mut CohortTrackingRule,
    ) -> Result<NavigationDecision<'_>> {
        let mut snapshot = tracking.clone();
        let decision = self.navigate(current, result, &mut snapshot, false)?;
        *tracking = snapshot;
        Ok(decision)
    }

    /// Forward traversal without side effects.
    pub fn peek_after(
        &self,
        current: Option<&str>,
        result: &TaskResult,
        tracking: &CohortTrackingRule,
    ) -> Result<NavigationDecision<'_>> {
        let mut snapshot = tracking.clone();
        self.navigate(current, result, &mut snapshot, true)
    }

    pub fn has_step_after(
        &self,
        current: Option<&str>,
        result: &TaskResult,
        tracking: &CohortTrackingRule,
    ) -> Result<bool> {
        Ok(self.peek_after(current, result, tracking)?.step.is_some())
    }

    /// True if completing `current` would terminate the task early.
    pub fn should_exit(
        &self,
        current: Option<&str>,
        result: &TaskResult,
        tracking: &CohortTrackingRule,
    ) -> Result<bool> {
        let mut snapshot = tracking.clone();
        Ok(self.navigate(current, result, &mut snapshot, false)?.exited)
    }

    /// Backward traversal from `current`.
    ///
    /// Returns `None` at the first step or when the current step's back rule
    /// forbids leaving it.
    pub fn step_before(&self, current: &str, result: &TaskResult) -> Result<Option<&Step>> {
        let unit = self.unit(current)?;
        if !allows_back_navigation(self.unit_step(unit), result) {
            debug!(step = current, "back navigation blocked");
            return Ok(None);
        }
        let position = match unit {
            Unit::Leaf(position) => position,
            Unit::Section(id) => self.sections[id].first,
        };
        let previous = match self.options.back_navigation {
            BackNavigation::ListOrder => position.checked_sub(1),
            BackNavigation::History => self
                .previous_in_history(position, result)
                .or_else(|| position.checked_sub(1)),
        };
        let step = previous.map(|position| self.leaf_step(position));
        debug!(
            from = current,
            to = ?step.map(|s| s.identifier.as_str()),
            "backward navigation"
        );
        Ok(step)
    }

    pub fn has_step_before(&self, current: &str, result: &TaskResult) -> Result<bool> {
        Ok(self.step_before(current, result)?.is_some())
    }

    /// Progress of `identifier` within the task; `None` for unknown steps.
    pub fn progress(&self, identifier: &str, result: Option<&TaskResult>) -> Option<Progress> {
        if !self.index.contains_key(identifier) {
            return None;
        }
        if let Some(markers) = &self.task.progress_markers {
            return marker_progress(markers, identifier, result);
        }
        let Some(Unit::Leaf(position)) = self.index.get(identifier).copied() else {
            return None;
        };
        let is_estimated = self.leaves[..=position]
            .iter()
            .enumerate()
            .any(|(idx, leaf)| {
                self.leaf_step(idx).has_branching()
                    || leaf
                        .sections
                        .iter()
                        .any(|&id| self.section_step(id).has_branching())
            });
        Some(Progress {
            current: position + 1,
            total: self.leaves.len(),
            is_estimated,
        })
    }

    fn navigate(
        &self,
        current: Option<&str>,
        result: &TaskResult,
        tracking: &mut CohortTrackingRule,
        is_peeking: bool,
    ) -> Result<NavigationDecision<'_>> {
        let mut pass = Pass {
            result,
            tracking,
            is_peeking,
            jumped: false,
        };
        let landing = match current {
            None => self.enter(0, &[], &mut pass)?,
            Some(identifier) => {
                let unit = self.unit(identifier)?;
                self.complete(unit, &mut pass)?
            }
        };
        let decision = match landing {
            Landing::Step(position) => {
                let step = self.leaf_step(position);
                let direction = if pass.jumped && result.contains_step(&step.identifier) {
                    Direction::Backward
                } else {
                    Direction::Forward
                };
                NavigationDecision {
                    step: Some(step),
                    direction,
                    exited: false,
                }
            }
            Landing::Complete => NavigationDecision {
                step: None,
                direction: Direction::Forward,
                exited: false,
            },
            Landing::Exit => NavigationDecision {
                step: None,
                direction: Direction::Forward,
                exited: true,
            },
        };
        debug!(
            from = ?current,
            to = ?decision.identifier(),
            direction = ?decision.direction,
            exited = decision.exited,
            is_peeking,
            "forward navigation"
        );
        Ok(decision)
    }

    /// Apply a completed unit's cohort assignments and rules.
    fn complete(&self, unit: Unit, pass: &mut Pass<'_>) -> Result<Landing> {
        let directive = self.completion_directive(unit, pass);
        self.follow(directive, unit, pass)
    }

    fn completion_directive(&self, unit: Unit, pass: &mut Pass<'_>) -> Directive {
        let step = self.unit_step(unit);
        if let Some(change) = pass.tracking.apply_assignments(step, pass.result) {
            trace!(step = %step.identifier, ?change, "cohort assignment");
        }
        let directive = navigation_directive(step, pass.result, pass.is_peeking);
        if !directive.is_continue() {
            return directive;
        }
        pass.tracking.next_step_identifier(step)
    }

    fn follow(&self, directive: Directive, origin: Unit, pass: &mut Pass<'_>) -> Result<Landing> {
        match directive {
            Directive::Continue | Directive::SkipThisStep => self.list_order_after(origin, pass),
            Directive::GoTo(target) => {
                pass.jumped = true;
                let (position, from) = self.jump_target(&target, origin)?;
                self.enter(position, from, pass)
            }
            Directive::Exit => Ok(Landing::Exit),
            Directive::NextSection => match self.enclosing(origin).last() {
                Some(&id) => self.list_order_after(Unit::Section(id), pass),
                None => Ok(Landing::Complete),
            },
        }
    }

    /// Move past `origin` in list order, running the rules of every section
    /// left on the way (innermost first).
    fn list_order_after(&self, origin: Unit, pass: &mut Pass<'_>) -> Result<Landing> {
        let next = match origin {
            Unit::Leaf(position) => position + 1,
            Unit::Section(id) => self.sections[id].end,
        };
        let enclosing = self.enclosing(origin);
        for &id in enclosing.iter().rev() {
            if self.sections[id].end > next {
                break;
            }
            let directive = self.completion_directive(Unit::Section(id), pass);
            if !directive.is_continue() {
                return self.follow(directive, Unit::Section(id), pass);
            }
        }
        self.enter(next, enclosing, pass)
    }

    /// Skip filtering: find the first presentable leaf at or after `start`.
    ///
    /// `from` lists the sections already entered; other sections enclosing a
    /// candidate have their own before-rules and skip rule applied first. A
    /// section that passes its filters counts as entered for the rest of the
    /// pass. Filtering is deterministic within a pass, so reaching the same
    /// leaf twice, or a section that already skipped or redirected, is a cycle.
    fn enter<'s>(
        &'s self,
        start: usize,
        from: &'s [usize],
        pass: &mut Pass<'_>,
    ) -> Result<Landing> {
        let mut visited: HashSet<usize> = HashSet::new();
        let mut entered: HashSet<usize> = HashSet::new();
        let mut diverted: HashSet<usize> = HashSet::new();
        let mut position = start;
        let mut from = from;

        'filter: loop {
            let Some(leaf) = self.leaves.get(position) else {
                return Ok(Landing::Complete);
            };

            let entering: Vec<usize> = leaf
                .sections
                .iter()
                .copied()
                .filter(|id| !from.contains(id) && !entered.contains(id))
                .collect();
            for id in entering {
                let unit = Unit::Section(id);
                if diverted.contains(&id) {
                    return Err(self.cycle_at(unit));
                }
                match filter(self.section_step(id), pass) {
                    Filter::Keep => {
                        entered.insert(id);
                    }
                    Filter::Skip => {
                        trace!(section = %self.section_step(id).identifier, "section skipped");
                        diverted.insert(id);
                        let section = &self.sections[id];
                        position = section.end;
                        from = &section.parents;
                        continue 'filter;
                    }
                    Filter::Redirect(target) => {
                        diverted.insert(id);
                        pass.jumped = true;
                        (position, from) = self.jump_target(&target, unit)?;
                        let section = &self.sections[id];
                        if (section.first..section.end).contains(&position) {
                            entered.insert(id);
                        }
                        continue 'filter;
                    }
                }
            }

            let unit = Unit::Leaf(position);
            if !visited.insert(position) {
                return Err(self.cycle_at(unit));
            }
            let step = self.leaf_step(position);
            match filter(step, pass) {
                Filter::Keep => return Ok(Landing::Step(position)),
                Filter::Redirect(target) => {
                    pass.jumped = true;
                    (position, from) = self.jump_target(&target, unit)?;
                }
                Filter::Skip => {
                    trace!(step = %step.identifier, "step skipped");
                    if self.options.skipped_steps_run_after_rules {
                        match pass.tracking.next_step_identifier(step) {
                            Directive::GoTo(target) => {
                                pass.jumped = true;
                                (position, from) = self.jump_target(&target, unit)?;
                                continue 'filter;
                            }
                            Directive::NextSection => {
                                let Some(&id) = leaf.sections.last() else {
                                    return Ok(Landing::Complete);
                                };
                                let section = &self.sections[id];
                                position = section.end;
                                from = &section.parents;
                                continue 'filter;
                            }
                            _ => {}
                        }
                    }
                    position += 1;
                    from = &leaf.sections;
                }
            }
        }
    }

    /// Leaf position for a jump to `target`, and the sections already entered.
    fn jump_target(&self, target: &str, origin: Unit) -> Result<(usize, &[usize])> {
        let unit = self.index.get(target).copied().ok_or_else(|| {
            NavigationError::UnresolvableReference {
                identifier: target.to_string(),
                referenced_by: self.unit_step(origin).identifier.clone(),
            }
        })?;
        let position = match unit {
            Unit::Leaf(position) => position,
            Unit::Section(id) => self.sections[id].first,
        };
        Ok((position, self.enclosing(origin)))
    }

    /// Most recent history entry before `position`'s own entry that is another leaf.
    fn previous_in_history(&self, position: usize, result: &TaskResult) -> Option<usize> {
        let identifier = &self.leaf_step(position).identifier;
        let history = &result.step_history;
        let end = history
            .iter()
            .rposition(|r| &r.identifier == identifier)
            .unwrap_or(history.len());
        history[..end]
            .iter()
            .rev()
            .find_map(|r| match self.index.get(r.identifier.as_str()) {
                Some(Unit::Leaf(idx)) if *idx != position => Some(*idx),
                _ => None,
            })
    }

    fn unit(&self, identifier: &str) -> Result<Unit> {
        self.index
            .get(identifier)
            .copied()
            .ok_or_else(|| NavigationError::UnknownStep(identifier.to_string()))
    }

    fn enclosing(&self, unit: Unit) -> &[usize] {
        match unit {
            Unit::Leaf(position) => &self.leaves[position].sections,
            Unit::Section(id) => &self.sections[id].parents,
        }
    }

    fn cycle_at(&self, unit: Unit) -> NavigationError {
        NavigationError::SkipCycle(self.unit_step(unit).identifier.clone())
    }

    fn unit_step(&self, unit: Unit) -> &Step {
        match unit {
            Unit::Leaf(position) => self.leaf_step(position),
            Unit::Section(id) => self.section_step(id),
        }
    }

    fn leaf_step(&self, position: usize) -> &Step {
        step_at(&self.task.steps, &self.leaves[position].path)
    }

    fn section_step(&self, id: usize) -> &Step {
        step_at(&self.task.steps, &self.sections[id].path)
    }
}

fn step_at<'a>(steps: &'a [Step], path: &[usize]) -> &'a Step {
    let mut step = &steps[path[0]];
    for &idx in &path[1..] {
        step = &step.steps[idx];
    }
    step
}

/// Before-rules first (first match wins), then the step's skip rule.
fn filter(step: &Step, pass: &Pass<'_>) -> Filter {
    match pass.tracking.skip_to_step_identifier(step) {
        Directive::Continue => {}
        Directive::GoTo(target) => return Filter::Redirect(target),
        _ => return Filter::Skip,
    }
    if should_skip(step, pass.result) {
        Filter::Skip
    } else {
        Filter::Keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cohort::CohortSet;
    use crate::core::comparator::RuleOperator;
    use crate::core::rules::{BackRule, NavigationRule, SkipRule};
    use crate::core::types::DuplicateIdentifiers;
    use crate::result::StepResult;
    use crate::test_support::{age_task, cohort_rule, linear_task, step, survey};
    use serde_json::json;

    fn navigator(task: Task) -> ConditionalNavigator {
        ConditionalNavigator::new(task, NavigatorOptions::default()).expect("navigator")
    }

    fn next_id(
        nav: &ConditionalNavigator,
        current: Option<&str>,
        result: &TaskResult,
        tracking: &mut CohortTrackingRule,
    ) -> Option<String> {
        nav.step_after(current, result, tracking)
            .expect("step after")
            .identifier()
            .map(str::to_string)
    }

    #[test]
    fn linear_task_walks_in_list_order() {
        let nav = navigator(linear_task(&["a", "b", "c"]));
        let result = TaskResult::new("t");
        let mut tracking = CohortTrackingRule::default();
        assert_eq!(next_id(&nav, None, &result, &mut tracking).as_deref(), Some("a"));
        assert_eq!(next_id(&nav, Some("a"), &result, &mut tracking).as_deref(), Some("b"));
        assert_eq!(next_id(&nav, Some("b"), &result, &mut tracking).as_deref(), Some("c"));
        let done = nav.step_after(Some("c"), &result, &mut tracking).expect("done");
        assert!(done.is_complete());
        assert!(!done.exited);
    }

    #[test]
    fn skipped_step_is_filtered_without_running_its_navigation() {
        let task = Task::new(
            "t",
            vec![
                step("a"),
                step("b")
                    .with_skip(SkipRule::Always)
                    .with_navigation(NavigationRule::Next {
                        next_step_identifier: "b".to_string(),
                    }),
                step("c"),
            ],
        );
        let nav = navigator(task);
        let mut tracking = CohortTrackingRule::default();
        let decision = nav
            .step_after(Some("a"), &TaskResult::new("t"), &mut tracking)
            .expect("step after");
        assert_eq!(decision.identifier(), Some("c"));
        assert_eq!(decision.direction, Direction::Forward);
    }

    #[test]
    fn peeking_is_repeatable_and_leaves_cohorts_alone() {
        let nav = navigator(age_task());
        let mut result = TaskResult::new("age");
        result.append_step_history(StepResult::answer("ageQuestion", 15));
        let tracking = CohortTrackingRule::default();

        let first = nav.peek_after(Some("ageQuestion"), &result, &tracking).expect("peek");
        let second = nav.peek_after(Some("ageQuestion"), &result, &tracking).expect("peek");
        assert_eq!(first, second);
        assert_eq!(first.identifier(), Some("minorPath"));
        assert!(tracking.current_cohorts().is_empty());
    }

    #[test]
    fn progress_without_branching_is_exact() {
        let ids = ["a", "b", "c", "d"];
        let nav = navigator(linear_task(&ids));
        for (idx, id) in ids.iter().enumerate() {
            let progress = nav.progress(id, None).expect("progress");
            assert_eq!(
                progress,
                Progress {
                    current: idx + 1,
                    total: ids.len(),
                    is_estimated: false
                }
            );
        }
    }

    #[test]
    fn progress_is_estimated_once_a_branching_step_is_passed() {
        let nav = navigator(age_task());
        assert!(!nav.progress("intro", None).expect("intro").is_estimated);
        assert!(nav.progress("ageQuestion", None).expect("age").is_estimated);
        assert!(nav.progress("done", None).expect("done").is_estimated);
        assert!(nav.progress("unknown", None).is_none());
    }

    #[test]
    fn young_answer_adds_cohort_and_branches() {
        let nav = navigator(age_task());
        let mut result = TaskResult::new("age");
        result.append_step_history(StepResult::answer("ageQuestion", 15));
        let mut tracking = CohortTrackingRule::default();

        let next = next_id(&nav, Some("ageQuestion"), &result, &mut tracking);
        assert_eq!(next.as_deref(), Some("minorPath"));
        assert_eq!(tracking.current_cohorts(), &CohortSet::from_iter(["minor"]));
    }

    #[test]
    fn adult_answer_falls_through_to_list_order() {
        let nav = navigator(age_task());
        let mut result = TaskResult::new("age");
        result.append_step_history(StepResult::answer("ageQuestion", 25));
        let mut tracking = CohortTrackingRule::default();

        let next = next_id(&nav, Some("ageQuestion"), &result, &mut tracking);
        assert_eq!(next.as_deref(), Some("adultPath"));
        assert!(tracking.current_cohorts().is_empty());
    }

    #[test]
    fn backward_navigation_follows_list_order() {
        let nav = navigator(age_task());
        let result = TaskResult::new("age");
        assert_eq!(
            nav.step_before("adultPath", &result).expect("back").map(|s| s.identifier.as_str()),
            Some("ageQuestion")
        );
        assert_eq!(
            nav.step_before("ageQuestion", &result).expect("back").map(|s| s.identifier.as_str()),
            Some("intro")
        );
        assert!(nav.step_before("intro", &result).expect("back").is_none());
        assert!(!nav.has_step_before("intro", &result).expect("has before"));
    }

    #[test]
    fn back_rule_disallows_backward_traversal() {
        let task = Task::new("t", vec![step("a"), step("b").with_back(BackRule::Never)]);
        let nav = navigator(task);
        assert!(nav.step_before("b", &TaskResult::new("t")).expect("back").is_none());
    }

    #[test]
    fn history_back_navigation_returns_previous_entry() {
        let task = Task::new(
            "t",
            vec![
                step("a").with_navigation(NavigationRule::Next {
                    next_step_identifier: "c".to_string(),
                }),
                step("b"),
                step("c"),
            ],
        );
        let options = NavigatorOptions {
            back_navigation: BackNavigation::History,
            ..NavigatorOptions::default()
        };
        let nav = ConditionalNavigator::new(task, options).expect("navigator");
        let mut result = TaskResult::new("t");
        result.append_step_history(StepResult::new("a"));
        result.append_step_history(StepResult::new("c"));
        assert_eq!(
            nav.step_before("c", &result).expect("back").map(|s| s.identifier.as_str()),
            Some("a")
        );
        assert_eq!(
            nav.step_before("b", &TaskResult::new("t"))
                .expect("back")
                .map(|s| s.identifier.as_str()),
            Some("a")
        );
    }

    #[test]
    fn matching_rule_without_target_exits() {
        let task = Task::new(
            "t",
            vec![
                step("consent").with_navigation(survey(vec![(
                    Some(RuleOperator::Equal),
                    Some(json!(false)),
                    None,
                    None,
                )])),
                step("rest"),
            ],
        );
        let nav = navigator(task);
        let mut result = TaskResult::new("t");
        result.append_step_history(StepResult::answer("consent", false));
        let tracking = CohortTrackingRule::default();
        assert!(nav.should_exit(Some("consent"), &result, &tracking).expect("exit"));
        let decision = nav.peek_after(Some("consent"), &result, &tracking).expect("peek");
        assert!(decision.exited);
        assert!(decision.step.is_none());
        assert!(!nav.has_step_after(Some("consent"), &result, &tracking).expect("has after"));
    }

    #[test]
    fn jump_to_answered_step_reports_backward_direction() {
        let task = Task::new(
            "t",
            vec![
                step("a"),
                step("b").with_navigation(NavigationRule::Next {
                    next_step_identifier: "a".to_string(),
                }),
            ],
        );
        let nav = navigator(task);
        let mut result = TaskResult::new("t");
        result.append_step_history(StepResult::new("a"));
        result.append_step_history(StepResult::new("b"));
        let mut tracking = CohortTrackingRule::default();
        let decision = nav.step_after(Some("b"), &result, &mut tracking).expect("step after");
        assert_eq!(decision.identifier(), Some("a"));
        assert_eq!(decision.direction, Direction::Backward);
    }

    #[test]
    fn unknown_result_target_is_an_unresolvable_reference() {
        let nav = navigator(linear_task(&["a", "b"]));
        let mut result = TaskResult::new("t");
        result.append_step_history(StepResult::new("a").with_skip_to("nowhere"));
        let mut tracking = CohortTrackingRule::default();
        let err = nav.step_after(Some("a"), &result, &mut tracking).unwrap_err();
        assert_eq!(
            err,
            NavigationError::UnresolvableReference {
                identifier: "nowhere".to_string(),
                referenced_by: "a".to_string(),
            }
        );
    }

    #[test]
    fn unknown_current_step_is_reported() {
        let nav = navigator(linear_task(&["a"]));
        let mut tracking = CohortTrackingRule::default();
        let err = nav
            .step_after(Some("zzz"), &TaskResult::new("t"), &mut tracking)
            .unwrap_err();
        assert_eq!(err, NavigationError::UnknownStep("zzz".to_string()));
    }

    #[test]
    fn invalid_task_is_rejected_at_construction() {
        let task = Task::new(
            "t",
            vec![step("a").with_navigation(NavigationRule::Next {
                next_step_identifier: "missing".to_string(),
            })],
        );
        let err = ConditionalNavigator::new(task, NavigatorOptions::default()).unwrap_err();
        assert!(matches!(err, NavigationError::InvalidTask(ref errors) if errors.len() == 1));
    }

    #[test]
    fn redirecting_before_rules_that_loop_report_a_cycle() {
        let task = Task::new(
            "t",
            vec![
                step("a"),
                step("b").with_before_cohort_rule(cohort_rule(&["x"], None, Some("c"))),
                step("c").with_before_cohort_rule(cohort_rule(&["x"], None, Some("b"))),
            ],
        );
        let nav = navigator(task);
        let mut tracking = CohortTrackingRule::new(CohortSet::from_iter(["x"]));
        let before = tracking.clone();
        let err = nav
            .step_after(Some("a"), &TaskResult::new("t"), &mut tracking)
            .unwrap_err();
        assert_eq!(err, NavigationError::SkipCycle("b".to_string()));
        assert_eq!(tracking, before);
    }

    #[test]
    fn redirects_back_into_an_entered_section_are_not_a_cycle() {
        let task = Task::new(
            "t",
            vec![
                step("start"),
                Step::section(
                    "s",
                    vec![
                        step("x").with_before_cohort_rule(cohort_rule(&["c"], None, Some("o"))),
                        step("y"),
                    ],
                ),
                step("o").with_before_cohort_rule(cohort_rule(&["c"], None, Some("y"))),
            ],
        );
        let nav = navigator(task);
        let mut tracking = CohortTrackingRule::new(CohortSet::from_iter(["c"]));
        assert_eq!(
            next_id(&nav, Some("start"), &TaskResult::new("t"), &mut tracking).as_deref(),
            Some("y")
        );
    }

    #[test]
    fn section_before_rule_may_target_its_own_child() {
        let task = Task::new(
            "t",
            vec![
                Step::section("s", vec![step("s1"), step("s2")])
                    .with_before_cohort_rule(cohort_rule(&["c"], None, Some("s2"))),
            ],
        );
        let nav = navigator(task);
        let mut tracking = CohortTrackingRule::new(CohortSet::from_iter(["c"]));
        assert_eq!(
            next_id(&nav, None, &TaskResult::new("t"), &mut tracking).as_deref(),
            Some("s2")
        );
    }

    #[test]
    fn section_redirect_that_loops_reports_a_cycle() {
        let task = Task::new(
            "t",
            vec![
                step("a"),
                Step::section("s", vec![step("s1")])
                    .with_before_cohort_rule(cohort_rule(&["c"], None, Some("b"))),
                step("b").with_before_cohort_rule(cohort_rule(&["c"], None, Some("s"))),
            ],
        );
        let nav = navigator(task);
        let mut tracking = CohortTrackingRule::new(CohortSet::from_iter(["c"]));
        let err = nav
            .step_after(Some("a"), &TaskResult::new("t"), &mut tracking)
            .unwrap_err();
        assert_eq!(err, NavigationError::SkipCycle("s".to_string()));
    }

    #[test]
    fn before_rule_target_is_followed_and_filtered() {
        let task = Task::new(
            "t",
            vec![
                step("a"),
                step("b").with_before_cohort_rule(cohort_rule(&["x"], None, Some("d"))),
                step("c"),
                step("d").with_skip(SkipRule::Always),
                step("e"),
            ],
        );
        let nav = navigator(task);
        let mut tracking = CohortTrackingRule::new(CohortSet::from_iter(["x"]));
        assert_eq!(
            next_id(&nav, Some("a"), &TaskResult::new("t"), &mut tracking).as_deref(),
            Some("e")
        );
    }

    #[test]
    fn skipped_section_is_skipped_as_a_whole() {
        let task = Task::new(
            "t",
            vec![
                step("a"),
                Step::section("smoking", vec![step("s1"), step("s2")])
                    .with_before_cohort_rule(cohort_rule(&["nonsmoker"], None, None)),
                step("z"),
            ],
        );
        let nav = navigator(task);
        let result = TaskResult::new("t");
        let mut tracking = CohortTrackingRule::new(CohortSet::from_iter(["nonsmoker"]));
        assert_eq!(next_id(&nav, Some("a"), &result, &mut tracking).as_deref(), Some("z"));

        let mut tracking = CohortTrackingRule::default();
        assert_eq!(next_id(&nav, Some("a"), &result, &mut tracking).as_deref(), Some("s1"));
        assert_eq!(next_id(&nav, Some("s1"), &result, &mut tracking).as_deref(), Some("s2"));
        assert_eq!(next_id(&nav, Some("s2"), &result, &mut tracking).as_deref(), Some("z"));
    }

    #[test]
    fn after_rule_without_target_leaves_the_enclosing_section() {
        let task = Task::new(
            "t",
            vec![
                Step::section(
                    "screening",
                    vec![
                        step("q1").with_after_cohort_rule(cohort_rule(&["ineligible"], None, None)),
                        step("q2"),
                    ],
                ),
                step("end"),
            ],
        );
        let nav = navigator(task);
        let result = TaskResult::new("t");
        let mut tracking = CohortTrackingRule::new(CohortSet::from_iter(["ineligible"]));
        assert_eq!(next_id(&nav, Some("q1"), &result, &mut tracking).as_deref(), Some("end"));
    }

    #[test]
    fn after_rule_at_top_level_completes_the_task() {
        let task = Task::new(
            "t",
            vec![
                step("a").with_after_cohort_rule(cohort_rule(&["done"], None, None)),
                step("b"),
            ],
        );
        let nav = navigator(task);
        let mut tracking = CohortTrackingRule::new(CohortSet::from_iter(["done"]));
        let decision = nav
            .step_after(Some("a"), &TaskResult::new("t"), &mut tracking)
            .expect("step after");
        assert!(decision.is_complete());
        assert!(!decision.exited);
    }

    #[test]
    fn leaving_a_section_runs_its_navigation_rule() {
        let task = Task::new(
            "t",
            vec![
                Step::section("intro", vec![step("i1"), step("i2")]).with_navigation(
                    NavigationRule::Next {
                        next_step_identifier: "outro".to_string(),
                    },
                ),
                step("middle"),
                step("outro"),
            ],
        );
        let nav = navigator(task);
        let result = TaskResult::new("t");
        let mut tracking = CohortTrackingRule::default();
        assert_eq!(next_id(&nav, Some("i1"), &result, &mut tracking).as_deref(), Some("i2"));
        assert_eq!(next_id(&nav, Some("i2"), &result, &mut tracking).as_deref(), Some("outro"));
    }

    #[test]
    fn jump_to_section_lands_on_its_first_step() {
        let task = Task::new(
            "t",
            vec![
                step("a").with_navigation(NavigationRule::Next {
                    next_step_identifier: "later".to_string(),
                }),
                step("b"),
                Step::section("later", vec![step("l1"), step("l2")]),
            ],
        );
        let nav = navigator(task);
        let mut tracking = CohortTrackingRule::default();
        assert_eq!(
            next_id(&nav, Some("a"), &TaskResult::new("t"), &mut tracking).as_deref(),
            Some("l1")
        );
        assert_eq!(nav.step_with("later").map(Step::is_section), Some(true));
    }

    #[test]
    fn skipped_steps_run_after_rules_when_enabled() {
        let task = Task::new(
            "t",
            vec![
                step("a"),
                step("b")
                    .with_skip(SkipRule::Always)
                    .with_after_cohort_rule(cohort_rule(&["x"], None, Some("d"))),
                step("c"),
                step("d"),
            ],
        );
        let result = TaskResult::new("t");

        let nav = navigator(task.clone());
        let mut tracking = CohortTrackingRule::new(CohortSet::from_iter(["x"]));
        assert_eq!(next_id(&nav, Some("a"), &result, &mut tracking).as_deref(), Some("c"));

        let options = NavigatorOptions {
            skipped_steps_run_after_rules: true,
            ..NavigatorOptions::default()
        };
        let nav = ConditionalNavigator::new(task, options).expect("navigator");
        assert_eq!(next_id(&nav, Some("a"), &result, &mut tracking).as_deref(), Some("d"));
    }

    #[test]
    fn first_match_policy_resolves_duplicates_depth_first() {
        let task = Task::new(
            "t",
            vec![
                Step::section("s1", vec![step("q").with_title("first")]),
                Step::section("s2", vec![step("q").with_title("second")]),
            ],
        );
        assert!(matches!(
            ConditionalNavigator::new(task.clone(), NavigatorOptions::default()),
            Err(NavigationError::InvalidTask(_))
        ));
        let options = NavigatorOptions {
            duplicate_identifiers: DuplicateIdentifiers::FirstMatch,
            ..NavigatorOptions::default()
        };
        let nav = ConditionalNavigator::new(task, options).expect("navigator");
        assert_eq!(
            nav.step_with("q").and_then(|s| s.title.as_deref()),
            Some("first")
        );
        assert_eq!(nav.leaf_count(), 2);
    }

    #[test]
    fn skip_to_if_nil_only_applies_on_commit() {
        let mut nav_rule = survey(vec![(None, Some(json!(1)), Some("one"), None)]);
        if let NavigationRule::Survey(survey) = &mut nav_rule {
            survey.skip_to_if_nil = Some("followup".to_string());
        }
        let task = Task::new(
            "t",
            vec![
                step("q").with_navigation(nav_rule),
                step("next"),
                step("one"),
                step("followup"),
            ],
        );
        let nav = navigator(task);
        let result = TaskResult::new("t");
        let mut tracking = CohortTrackingRule::default();
        let peeked = nav.peek_after(Some("q"), &result, &tracking).expect("peek");
        assert_eq!(peeked.identifier(), Some("next"));
        assert_eq!(
            next_id(&nav, Some("q"), &result, &mut tracking).as_deref(),
            Some("followup")
        );
    }

    #[test]
    fn progress_markers_override_static_list() {
        let task =
            linear_task(&["intro", "q1", "q2", "q3", "done"]).with_progress_markers(["q1", "q3"]);
        let nav = navigator(task);
        let mut result = TaskResult::new("t");
        assert!(nav.progress("intro", Some(&result)).is_none());
        result.append_step_history(StepResult::new("intro"));
        result.append_step_history(StepResult::new("q1"));
        let progress = nav.progress("q2", Some(&result)).expect("progress");
        assert_eq!((progress.current, progress.total), (1, 2));
        assert!(!progress.is_estimated);
    }

    #[test]
    fn progress_markers_do_not_cover_unknown_steps() {
        let task = linear_task(&["intro", "q1", "q2"]).with_progress_markers(["q1", "q2"]);
        let nav = navigator(task);
        let mut result = TaskResult::new("t");
        result.append_step_history(StepResult::new("q1"));
        assert!(nav.progress("injected", Some(&result)).is_none());
        assert!(nav.progress("q2", Some(&result)).is_some());
    }
}
