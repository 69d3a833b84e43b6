//! Progress estimates reported to the presentation layer.

use serde::{Deserialize, Serialize};

use crate::result::TaskResult;

/// Position of a step within a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// 1-based position.
    pub current: usize,
    pub total: usize,
    /// True when branching may make `total` inaccurate.
    pub is_estimated: bool,
}

/// Progress measured against explicit markers.
///
/// The position is the last marker reached in the history (or the current
/// step). Returns `None` before the first marker and once the run has moved
/// past the final one.
pub fn marker_progress(
    markers: &[String],
    step_identifier: &str,
    result: Option<&TaskResult>,
) -> Option<Progress> {
    let reached = |marker: &String| {
        marker == step_identifier || result.is_some_and(|r| r.contains_step(marker))
    };
    let idx = markers.iter().rposition(reached)?;
    let current = idx + 1;
    if current == markers.len() && markers[idx] != step_identifier {
        return None;
    }
    Some(Progress {
        current,
        total: markers.len(),
        is_estimated: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::StepResult;

    fn markers() -> Vec<String> {
        ["a", "c", "e"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn before_first_marker_has_no_progress() {
        assert_eq!(marker_progress(&markers(), "intro", None), None);
    }

    #[test]
    fn current_step_counts_as_reached() {
        let progress = marker_progress(&markers(), "c", None).expect("progress");
        assert_eq!(
            progress,
            Progress {
                current: 2,
                total: 3,
                is_estimated: false
            }
        );
    }

    #[test]
    fn steps_between_markers_report_the_last_marker_reached() {
        let mut result = TaskResult::new("t");
        result.append_step_history(StepResult::new("a"));
        result.append_step_history(StepResult::new("b"));
        let progress = marker_progress(&markers(), "b", Some(&result)).expect("progress");
        assert_eq!(progress.current, 1);
    }

    #[test]
    fn past_final_marker_has_no_progress() {
        let mut result = TaskResult::new("t");
        for id in ["a", "c", "e"] {
            result.append_step_history(StepResult::new(id));
        }
        assert_eq!(
            marker_progress(&markers(), "e", Some(&result)).map(|p| p.current),
            Some(3)
        );
        assert_eq!(marker_progress(&markers(), "done", Some(&result)), None);
    }
}
