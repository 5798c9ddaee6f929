//! Path template matching and parameter extraction.
//!
//! Endpoint paths may contain `{name}` placeholders. A placeholder matches
//! exactly one path segment (never spans a `/`); literal segments compare
//! case-insensitively; segment counts must match exactly. Implemented
//! segment-wise so no regex is ever built from user input.

use std::collections::HashMap;

/// Does `request_path` match the `template`?
pub fn matches(template: &str, request_path: &str) -> bool {
    let template_segments: Vec<&str> = segments(template);
    let path_segments: Vec<&str> = segments(request_path);

    if template_segments.len() != path_segments.len() {
        return false;
    }

    template_segments
        .iter()
        .zip(path_segments.iter())
        .all(|(tpl, actual)| {
            placeholder_name(tpl).is_some() || tpl.eq_ignore_ascii_case(actual)
        })
}

/// Placeholder name (lower-cased) to captured segment, for every placeholder
/// in the template. Empty map when the template has no placeholders or the
/// pair does not match.
pub fn extract_params(template: &str, request_path: &str) -> HashMap<String, String> {
    if !matches(template, request_path) {
        return HashMap::new();
    }

    segments(template)
        .iter()
        .zip(segments(request_path).iter())
        .filter_map(|(tpl, actual)| {
            placeholder_name(tpl).map(|name| (name.to_lowercase(), (*actual).to_string()))
        })
        .collect()
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn placeholder_name(segment: &str) -> Option<&str> {
    segment
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_is_case_insensitive() {
        assert!(matches("/api/users", "/api/users"));
        assert!(matches("/api/users", "/API/Users"));
        assert!(!matches("/api/users", "/api/orders"));
    }

    #[test]
    fn test_placeholder_matches_single_segment() {
        assert!(matches("/api/users/{id}", "/api/users/1"));
        assert!(matches("/api/users/{id}", "/api/users/abc-123"));
        assert!(!matches("/api/users/{id}", "/api/users/1/extra"));
        assert!(!matches("/api/users/{id}", "/api/users"));
    }

    #[test]
    fn test_segment_count_must_match() {
        assert!(!matches("/api/users", "/api/users/1"));
        assert!(!matches("/api/users/{id}/orders", "/api/users/1"));
    }

    #[test]
    fn test_extract_params_returns_all_placeholders() {
        let params = extract_params("/api/users/{id}/orders/{orderId}", "/api/users/42/orders/7");
        assert_eq!(params.len(), 2);
        assert_eq!(params.get("id"), Some(&"42".to_string()));
        assert_eq!(params.get("orderid"), Some(&"7".to_string()));
    }

    #[test]
    fn test_extract_params_no_placeholders() {
        assert!(extract_params("/api/users", "/api/users").is_empty());
    }

    #[test]
    fn test_extract_params_non_matching_pair_is_empty() {
        assert!(extract_params("/api/users/{id}", "/api/orders/1").is_empty());
        assert!(extract_params("/api/users/{id}", "/api/users/1/extra").is_empty());
    }

    #[test]
    fn test_trailing_slash_is_tolerated() {
        assert!(matches("/api/users/", "/api/users"));
        assert!(matches("/api/users", "/api/users/"));
    }
}
