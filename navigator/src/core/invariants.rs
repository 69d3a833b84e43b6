//! Semantic invariants not expressible via JSON Schema.

use std::collections::{HashMap, HashSet};

use crate::core::rules::{referenced_identifiers, rule_problems};
use crate::core::types::DuplicateIdentifiers;
use crate::task::{Step, Task};

/// Check semantic invariants not expressible in JSON Schema:
/// - Non-empty identifiers
/// - No duplicate ids within a containing list
/// - No duplicate ids across sections (unless `FirstMatch` is allowed)
/// - Every rule target names a step in the tree
/// - Comparison rules carry an operand; answer rules carry conditions
/// - Progress markers name leaf steps, once each
pub fn validate_task(task: &Task, duplicates: DuplicateIdentifiers) -> Vec<String> {
    let mut errors = Vec::new();
    if task.identifier.trim().is_empty() {
        errors.push("task identifier must be non-empty".to_string());
    }

    let root = if task.identifier.is_empty() {
        "task"
    } else {
        task.identifier.as_str()
    };
    let mut defined: HashMap<&str, String> = HashMap::new();
    let mut leaves: HashSet<&str> = HashSet::new();
    collect_steps(&task.steps, root, duplicates, &mut defined, &mut leaves, &mut errors);

    check_steps(&task.steps, root, &defined, &mut errors);

    if let Some(markers) = &task.progress_markers {
        let mut seen = HashSet::new();
        for marker in markers {
            if !seen.insert(marker.as_str()) {
                errors.push(format!("duplicate progress marker '{}'", marker));
            } else if !leaves.contains(marker.as_str()) {
                errors.push(format!("progress marker '{}' is not a step", marker));
            }
        }
    }
    errors
}

fn collect_steps<'a>(
    steps: &'a [Step],
    path: &str,
    duplicates: DuplicateIdentifiers,
    defined: &mut HashMap<&'a str, String>,
    leaves: &mut HashSet<&'a str>,
    errors: &mut Vec<String>,
) {
    let mut siblings = HashSet::new();
    for step in steps {
        let step_path = format!("{}/{}", path, step.identifier);
        if step.identifier.trim().is_empty() {
            errors.push(format!("{}: step identifier must be non-empty", path));
        } else if !siblings.insert(step.identifier.as_str()) {
            errors.push(format!("duplicate id '{}' at {}", step.identifier, step_path));
        } else if let Some(first) = defined.get(step.identifier.as_str()) {
            if duplicates == DuplicateIdentifiers::Reject {
                errors.push(format!(
                    "duplicate id '{}' at {} (first defined at {})",
                    step.identifier, step_path, first
                ));
            }
        } else {
            defined.insert(step.identifier.as_str(), step_path.clone());
        }

        if step.is_section() {
            collect_steps(&step.steps, &step_path, duplicates, defined, leaves, errors);
        } else {
            leaves.insert(step.identifier.as_str());
        }
    }
}

fn check_steps(
    steps: &[Step],
    path: &str,
    defined: &HashMap<&str, String>,
    errors: &mut Vec<String>,
) {
    for step in steps {
        let step_path = format!("{}/{}", path, step.identifier);
        for target in referenced_identifiers(step) {
            if !defined.contains_key(target) {
                errors.push(format!("{}: references unknown step '{}'", step_path, target));
            }
        }
        errors.extend(rule_problems(step, &step_path));
        check_steps(&step.steps, &step_path, defined, errors);
    }
}
