//! Answer comparison used by survey rules and answer conditions.
//!
//! Comparisons never fail: mismatched or missing operands simply do not match,
//! because partial answers are expected while a participant is still typing.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tolerance used when comparing two numbers for equality.
const NUMERIC_ACCURACY: f64 = 0.00001;

/// Comparison operator for a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    #[serde(alias = "eq")]
    Equal,
    #[serde(alias = "ne")]
    NotEqual,
    #[serde(alias = "lt")]
    LessThan,
    #[serde(alias = "gt")]
    GreaterThan,
    #[serde(alias = "le")]
    LessThanOrEqual,
    #[serde(alias = "ge")]
    GreaterThanOrEqual,
    /// None of the answer's elements equal the operand.
    #[serde(alias = "ot")]
    OtherThan,
    /// Always matches.
    #[serde(alias = "de", alias = "always")]
    Skip,
}

impl RuleOperator {
    /// Resolve the effective operator: `skip` without an operand, otherwise `equal`.
    pub fn resolve(declared: Option<RuleOperator>, operand: Option<&Value>) -> RuleOperator {
        declared.unwrap_or(if present(operand).is_none() {
            RuleOperator::Skip
        } else {
            RuleOperator::Equal
        })
    }
}

/// Compare `answer` against `operand` with `op`.
///
/// A JSON `null` is treated the same as a missing value.
pub fn is_matching(answer: Option<&Value>, operand: Option<&Value>, op: RuleOperator) -> bool {
    if op == RuleOperator::Skip {
        return true;
    }
    let (Some(answer), Some(operand)) = (present(answer), present(operand)) else {
        return false;
    };

    match op {
        RuleOperator::Equal => values_equal(answer, operand),
        RuleOperator::NotEqual => !values_equal(answer, operand),
        RuleOperator::OtherThan => !shares_element(answer, operand),
        RuleOperator::LessThan => compare(answer, operand) == Some(Ordering::Less),
        RuleOperator::GreaterThan => compare(answer, operand) == Some(Ordering::Greater),
        RuleOperator::LessThanOrEqual => {
            matches!(compare(answer, operand), Some(Ordering::Less | Ordering::Equal))
        }
        RuleOperator::GreaterThanOrEqual => {
            matches!(compare(answer, operand), Some(Ordering::Greater | Ordering::Equal))
        }
        RuleOperator::Skip => true,
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// Structural equality. Two arrays compare as sets; an array and a scalar
/// compare by membership.
fn values_equal(answer: &Value, operand: &Value) -> bool {
    match (answer, operand) {
        (Value::Array(left), Value::Array(right)) => {
            left.iter().all(|l| right.iter().any(|r| scalar_equal(l, r)))
                && right.iter().all(|r| left.iter().any(|l| scalar_equal(l, r)))
        }
        (Value::Array(items), scalar) | (scalar, Value::Array(items)) => {
            items.iter().any(|item| scalar_equal(item, scalar))
        }
        (left, right) => scalar_equal(left, right),
    }
}

fn shares_element(answer: &Value, operand: &Value) -> bool {
    as_slice(answer)
        .iter()
        .any(|a| as_slice(operand).iter().any(|o| scalar_equal(a, o)))
}

fn as_slice(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        other => std::slice::from_ref(other),
    }
}

fn scalar_equal(left: &Value, right: &Value) -> bool {
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => (l - r).abs() <= NUMERIC_ACCURACY,
        _ => left == right,
    }
}

/// Numeric ordering; `None` when either side is not a number.
fn compare(answer: &Value, operand: &Value) -> Option<Ordering> {
    as_number(answer)?.partial_cmp(&as_number(operand)?)
}

/// Numbers, and strings holding a finite number (text-entry answers).
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}
