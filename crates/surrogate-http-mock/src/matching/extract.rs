//! Actual-value extraction for condition evaluation.
//!
//! Body values are read with JSONPath (REST) or XPath (SOAP); header and
//! query lookups are case-insensitive; path lookups resolve the parameter
//! map extracted by the path matcher. Extraction is total: malformed bodies,
//! bad expressions, and unknown keys all yield `None`, which the operators
//! treat as a non-match.

use crate::context::RequestContext;
use crate::model::{ConditionSource, MatchCondition, Protocol};
use serde_json_path::JsonPath;
use std::collections::HashMap;

/// Extract the actual value a condition compares against.
pub fn extract_value(
    ctx: &RequestContext,
    condition: &MatchCondition,
    protocol: Protocol,
    path_params: &HashMap<String, String>,
) -> Option<String> {
    match condition.source {
        ConditionSource::Body => {
            let body = ctx.body.as_deref()?;
            match protocol {
                Protocol::Rest => extract_json_path(body, &condition.field),
                Protocol::Soap => extract_xpath(body, &condition.field),
            }
        }
        ConditionSource::Header => ctx.header(&condition.field).map(str::to_string),
        ConditionSource::Query => ctx.query_param(&condition.field).map(str::to_string),
        ConditionSource::Path => {
            let name = condition.field.trim_start_matches('{').trim_end_matches('}');
            path_params
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
        }
        ConditionSource::Metadata => match condition.field.to_lowercase().as_str() {
            "method" => Some(ctx.method.clone()),
            "path" => Some(ctx.path.clone()),
            _ => None,
        },
    }
}

/// Evaluate a JSONPath expression against a JSON document, returning the
/// first result as a string. `None` on malformed JSON or a bad expression.
pub fn extract_json_path(body: &str, expression: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let path = JsonPath::parse(expression).ok()?;
    path.query(&value).first().map(value_to_string)
}

/// Evaluate an XPath expression against an XML document. Simple `/a/b/c`
/// paths are rewritten to `local-name()` form first so SOAP namespaces never
/// have to be declared in conditions.
pub fn extract_xpath(body: &str, expression: &str) -> Option<String> {
    let package = sxd_document::parser::parse(body).ok()?;
    let document = package.as_document();
    let rewritten = local_name_path(expression);

    match sxd_xpath::evaluate_xpath(&document, &rewritten) {
        Ok(sxd_xpath::Value::String(s)) => Some(s),
        Ok(sxd_xpath::Value::Number(n)) => Some(n.to_string()),
        Ok(sxd_xpath::Value::Boolean(b)) => Some(b.to_string()),
        Ok(sxd_xpath::Value::Nodeset(nodes)) => {
            nodes.document_order_first().map(|n| n.string_value())
        }
        Err(_) => None,
    }
}

/// Rewrite a plain element path into namespace-agnostic form:
/// `/Envelope/Body/Id` becomes
/// `/*[local-name()='Envelope']/*[local-name()='Body']/*[local-name()='Id']`.
/// Expressions already using predicates, attributes, or functions pass
/// through untouched.
fn local_name_path(expression: &str) -> String {
    if !expression.starts_with('/')
        || expression.contains('[')
        || expression.contains('@')
        || expression.contains("()")
    {
        return expression.to_string();
    }

    let mut rewritten = String::new();
    for segment in expression.split('/').filter(|s| !s.is_empty()) {
        rewritten.push_str("/*[local-name()='");
        rewritten.push_str(segment);
        rewritten.push_str("']");
    }
    if rewritten.is_empty() {
        expression.to_string()
    } else {
        rewritten
    }
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConditionOperator;

    fn condition(source: ConditionSource, field: &str) -> MatchCondition {
        MatchCondition {
            source,
            field: field.to_string(),
            operator: ConditionOperator::Equals,
            expected: String::new(),
        }
    }

    fn request_with_body(body: &str) -> RequestContext {
        RequestContext::new("POST", "/api/users", None, vec![], Some(body.to_string()))
    }

    #[test]
    fn test_extract_json_path_nested_field() {
        let json = r#"{"user": {"name": "Alice", "age": 30}}"#;
        assert_eq!(extract_json_path(json, "$.user.name"), Some("Alice".to_string()));
        assert_eq!(extract_json_path(json, "$.user.age"), Some("30".to_string()));
        assert_eq!(extract_json_path(json, "$.user.missing"), None);
    }

    #[test]
    fn test_extract_json_path_array_index() {
        let json = r#"{"items": ["first", "second"]}"#;
        assert_eq!(extract_json_path(json, "$.items[0]"), Some("first".to_string()));
    }

    #[test]
    fn test_extract_json_path_degrades_on_bad_input() {
        assert_eq!(extract_json_path("{not json", "$.a"), None);
        assert_eq!(extract_json_path("{}", "not a path"), None);
    }

    #[test]
    fn test_extract_xpath_ignores_namespaces() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
            <soap:Body><GetUser xmlns="urn:users"><Id>42</Id></GetUser></soap:Body>
        </soap:Envelope>"#;
        assert_eq!(
            extract_xpath(xml, "/Envelope/Body/GetUser/Id"),
            Some("42".to_string())
        );
    }

    #[test]
    fn test_extract_xpath_degrades_on_bad_input() {
        assert_eq!(extract_xpath("<not-xml", "/a"), None);
        assert_eq!(extract_xpath("<a/>", "///"), None);
    }

    #[test]
    fn test_body_extraction_uses_protocol() {
        let ctx = request_with_body(r#"{"id": 7}"#);
        let cond = condition(ConditionSource::Body, "$.id");
        assert_eq!(
            extract_value(&ctx, &cond, Protocol::Rest, &HashMap::new()),
            Some("7".to_string())
        );
    }

    #[test]
    fn test_path_source_strips_placeholder_decoration() {
        let ctx = RequestContext::new("GET", "/api/users/42", None, vec![], None);
        let mut params = HashMap::new();
        params.insert("id".to_string(), "42".to_string());

        let decorated = condition(ConditionSource::Path, "{id}");
        let plain = condition(ConditionSource::Path, "id");
        assert_eq!(
            extract_value(&ctx, &decorated, Protocol::Rest, &params),
            Some("42".to_string())
        );
        assert_eq!(
            extract_value(&ctx, &plain, Protocol::Rest, &params),
            Some("42".to_string())
        );
    }

    #[test]
    fn test_metadata_source() {
        let ctx = RequestContext::new("DELETE", "/api/users/1", None, vec![], None);
        let method = condition(ConditionSource::Metadata, "method");
        let path = condition(ConditionSource::Metadata, "path");
        let unknown = condition(ConditionSource::Metadata, "nonsense");
        assert_eq!(
            extract_value(&ctx, &method, Protocol::Rest, &HashMap::new()),
            Some("DELETE".to_string())
        );
        assert_eq!(
            extract_value(&ctx, &path, Protocol::Rest, &HashMap::new()),
            Some("/api/users/1".to_string())
        );
        assert_eq!(extract_value(&ctx, &unknown, Protocol::Rest, &HashMap::new()), None);
    }

    #[test]
    fn test_missing_body_yields_none() {
        let ctx = RequestContext::new("GET", "/api/users", None, vec![], None);
        let cond = condition(ConditionSource::Body, "$.id");
        assert_eq!(extract_value(&ctx, &cond, Protocol::Rest, &HashMap::new()), None);
    }
}
