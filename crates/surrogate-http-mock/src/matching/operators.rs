//! Comparison operator evaluation.
//!
//! `evaluate` is a pure function: side-effect-free and deterministic for
//! identical inputs. Every failure mode of untrusted input (bad regex, bad
//! numbers, bad JSON, bad schema) collapses to `false` rather than an error,
//! so one malformed rule can never take down request handling.

use crate::model::ConditionOperator;
use regex::Regex;

/// Evaluate one operator against an actual/expected value pair. `actual` is
/// `None` when the condition's source yielded no value for the request.
pub fn evaluate(operator: ConditionOperator, actual: Option<&str>, expected: &str) -> bool {
    match operator {
        ConditionOperator::Equals => {
            actual.is_some_and(|a| a.eq_ignore_ascii_case(expected))
        }
        // A missing value is still "not equal".
        ConditionOperator::NotEquals => {
            !actual.is_some_and(|a| a.eq_ignore_ascii_case(expected))
        }
        ConditionOperator::Contains => {
            actual.is_some_and(|a| a.to_lowercase().contains(&expected.to_lowercase()))
        }
        ConditionOperator::StartsWith => {
            actual.is_some_and(|a| a.to_lowercase().starts_with(&expected.to_lowercase()))
        }
        ConditionOperator::EndsWith => {
            actual.is_some_and(|a| a.to_lowercase().ends_with(&expected.to_lowercase()))
        }
        ConditionOperator::Regex => match actual {
            Some(a) if !expected.is_empty() => Regex::new(expected)
                .map(|re| re.is_match(a))
                .unwrap_or(false),
            _ => false,
        },
        ConditionOperator::GreaterThan => compare_numeric(actual, expected, |a, e| a > e),
        ConditionOperator::LessThan => compare_numeric(actual, expected, |a, e| a < e),
        ConditionOperator::Exists => actual.is_some(),
        ConditionOperator::NotExists => actual.is_none(),
        ConditionOperator::IsEmpty => actual.is_none_or(str::is_empty),
        ConditionOperator::JsonSchema => json_schema_valid(actual, expected),
    }
}

fn compare_numeric(actual: Option<&str>, expected: &str, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (
        actual.and_then(|a| a.trim().parse::<f64>().ok()),
        expected.trim().parse::<f64>().ok(),
    ) {
        (Some(a), Some(e)) => cmp(a, e),
        _ => false,
    }
}

fn json_schema_valid(actual: Option<&str>, schema: &str) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    let Ok(instance) = serde_json::from_str::<serde_json::Value>(actual) else {
        return false;
    };
    let Ok(schema) = serde_json::from_str::<serde_json::Value>(schema) else {
        return false;
    };
    match jsonschema::draft202012::options().build(&schema) {
        Ok(validator) => validator.is_valid(&instance),
        Err(_) => false,
    }
}
