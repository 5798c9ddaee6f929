//! Value-producing template helpers.
//!
//! Every helper is total: malformed arguments produce an empty string (or a
//! documented neutral value), never an error.

use chrono::format::{Item, StrftimeItems};
use chrono::{SecondsFormat, Utc};
use rand::Rng;

/// Random v4 UUID.
pub fn uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current UTC timestamp. Without a format string (or with an invalid one)
/// this is RFC 3339 with second precision.
pub fn now(format: Option<&str>) -> String {
    let now = Utc::now();
    match format {
        Some(fmt) if !fmt.is_empty() => {
            let items: Vec<Item<'_>> = StrftimeItems::new(fmt).collect();
            if items.iter().any(|item| matches!(item, Item::Error)) {
                now.to_rfc3339_opts(SecondsFormat::Secs, true)
            } else {
                now.format_with_items(items.into_iter()).to_string()
            }
        }
        _ => now.to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

/// JSONPath extraction from a JSON string. Empty on bad JSON or a bad path.
pub fn json_path(source: &str, path: &str) -> String {
    crate::matching::extract::extract_json_path(source, path).unwrap_or_default()
}

/// Random integer in the inclusive range `[low, high]`.
pub fn random_int(low: &str, high: &str) -> String {
    let (Ok(low), Ok(high)) = (low.trim().parse::<i64>(), high.trim().parse::<i64>()) else {
        return String::new();
    };
    let (low, high) = if low <= high { (low, high) } else { (high, low) };
    rand::thread_rng().gen_range(low..=high).to_string()
}

/// Decimal arithmetic on two operands. Division and modulo by zero yield 0.
/// Whole results render without a fractional part.
pub fn math(lhs: &str, op: &str, rhs: &str) -> String {
    let (Ok(lhs), Ok(rhs)) = (lhs.trim().parse::<f64>(), rhs.trim().parse::<f64>()) else {
        return String::new();
    };
    let result = match op {
        "+" => lhs + rhs,
        "-" => lhs - rhs,
        "*" => lhs * rhs,
        "/" => {
            if rhs == 0.0 {
                0.0
            } else {
                lhs / rhs
            }
        }
        "%" => {
            if rhs == 0.0 {
                0.0
            } else {
                lhs % rhs
            }
        }
        _ => return String::new(),
    };
    format_number(result)
}

/// Comparison returning `"true"`/`"false"`. Operands compare numerically
/// when both parse as decimals, otherwise as strings.
pub fn compare(op: &str, lhs: &str, rhs: &str) -> String {
    let outcome = match (lhs.trim().parse::<f64>(), rhs.trim().parse::<f64>()) {
        (Ok(l), Ok(r)) => match op {
            "eq" => l == r,
            "ne" => l != r,
            "gt" => l > r,
            "lt" => l < r,
            _ => return String::new(),
        },
        _ => match op {
            "eq" => lhs == rhs,
            "ne" => lhs != rhs,
            "gt" => lhs > rhs,
            "lt" => lhs < rhs,
            _ => return String::new(),
        },
    };
    outcome.to_string()
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}
