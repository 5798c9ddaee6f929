//! Per-request context handed into the pipeline by the transport layer.

use std::collections::HashMap;

/// Normalized view of one inbound HTTP request.
///
/// Constructed once per request by the external listener and passed by
/// reference through the pipeline; never persisted. Header keys are stored
/// lower-cased so lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub query_string: Option<String>,
    pub body: Option<String>,
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
}

impl RequestContext {
    /// Build a context from raw request components. The query string is
    /// decoded into a parameter map; header keys are lower-cased.
    pub fn new(
        method: &str,
        path: &str,
        query_string: Option<&str>,
        headers: impl IntoIterator<Item = (String, String)>,
        body: Option<String>,
    ) -> Self {
        let query = query_string.map(parse_query_string).unwrap_or_default();
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();

        Self {
            method: method.to_string(),
            path: path.to_string(),
            query_string: query_string.map(str::to_string),
            body,
            headers,
            query,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Case-insensitive query parameter lookup.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Parse a query string into a map, URL-decoding both keys and values.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (
                urlencoding::decode(key).unwrap_or_default().into_owned(),
                urlencoding::decode(value).unwrap_or_default().into_owned(),
            ),
            None => (
                urlencoding::decode(pair).unwrap_or_default().into_owned(),
                String::new(),
            ),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string("name=John&age=30&city=New%20York");
        assert_eq!(params.get("name"), Some(&"John".to_string()));
        assert_eq!(params.get("age"), Some(&"30".to_string()));
        assert_eq!(params.get("city"), Some(&"New York".to_string()));
    }

    #[test]
    fn test_parse_query_string_valueless_key() {
        let params = parse_query_string("flag&name=x");
        assert_eq!(params.get("flag"), Some(&String::new()));
        assert_eq!(params.get("name"), Some(&"x".to_string()));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let ctx = RequestContext::new(
            "GET",
            "/api/users",
            None,
            vec![("Content-Type".to_string(), "application/json".to_string())],
            None,
        );
        assert_eq!(ctx.header("content-type"), Some("application/json"));
        assert_eq!(ctx.header("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(ctx.header("accept"), None);
    }

    #[test]
    fn test_query_param_lookup_is_case_insensitive() {
        let ctx = RequestContext::new("GET", "/search", Some("Term=rust"), vec![], None);
        assert_eq!(ctx.query_param("term"), Some("rust"));
        assert_eq!(ctx.query_param("TERM"), Some("rust"));
        assert_eq!(ctx.query_param("missing"), None);
    }
}
