//! Request forwarding to a configured upstream.

use super::ProxyConfig;
use crate::context::RequestContext;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error};

/// Hop-by-hop headers never forwarded upstream (plus Host, which the client
/// sets for the new connection).
const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
];

/// Response captured from the upstream, ready for the transport layer and
/// the recording service.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

/// Forwards requests to an upstream base URL over a shared client.
pub struct ProxyEngine {
    client: reqwest::Client,
}

impl Default for ProxyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyEngine {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Forward a request upstream. Any transport failure is logged and
    /// reported as `None`; the caller treats that as proxy failure, not a
    /// crash.
    pub async fn forward(
        &self,
        ctx: &RequestContext,
        config: &ProxyConfig,
    ) -> Option<ProxyResponse> {
        let url = build_upstream_url(
            &config.target_base_url,
            &ctx.path,
            config.strip_path_prefix.as_deref(),
            ctx.query_string.as_deref(),
        );
        let method = match reqwest::Method::from_bytes(ctx.method.as_bytes()) {
            Ok(method) => method,
            Err(err) => {
                error!(method = %ctx.method, %err, "invalid method for upstream request");
                return None;
            }
        };
        debug!(%url, method = %method, "forwarding upstream");

        let mut request = self
            .client
            .request(method.clone(), url.as_str())
            .timeout(Duration::from_millis(config.timeout_ms));

        let mut content_type_set = false;
        if config.forward_headers {
            for (name, value) in &ctx.headers {
                if is_hop_by_hop(name) {
                    continue;
                }
                if name.eq_ignore_ascii_case("content-type") {
                    content_type_set = true;
                }
                request = request.header(name.as_str(), value.as_str());
            }
        }
        for (name, value) in &config.extra_headers {
            if name.eq_ignore_ascii_case("content-type") {
                content_type_set = true;
            }
            request = request.header(name.as_str(), value.as_str());
        }

        let body = ctx.body.as_deref().filter(|b| !b.is_empty());
        if let Some(body) = body {
            if method != reqwest::Method::GET && method != reqwest::Method::HEAD {
                if !content_type_set {
                    request = request.header("content-type", "application/json");
                }
                request = request.body(body.to_string());
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                error!(%url, %err, "upstream request failed");
                return None;
            }
        };

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => {
                error!(%url, %err, "failed to read upstream response body");
                return None;
            }
        };

        debug!(%url, status, bytes = body.len(), "upstream responded");
        Some(ProxyResponse {
            status,
            headers,
            body,
        })
    }
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|hop| hop.eq_ignore_ascii_case(name))
}

/// Build the upstream URL: strip the configured prefix from the request
/// path (case-insensitively), append the remainder to the target base URL,
/// and preserve the original query string.
fn build_upstream_url(
    base: &str,
    path: &str,
    strip_prefix: Option<&str>,
    query: Option<&str>,
) -> String {
    let mut remaining = path;
    if let Some(prefix) = strip_prefix.filter(|p| !p.is_empty()) {
        if remaining.len() >= prefix.len() && remaining[..prefix.len()].eq_ignore_ascii_case(prefix)
        {
            remaining = &remaining[prefix.len()..];
        }
    }

    let mut url = base.trim_end_matches('/').to_string();
    if !remaining.is_empty() {
        if !remaining.starts_with('/') {
            url.push('/');
        }
        url.push_str(remaining);
    }
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_upstream_url_strips_prefix() {
        assert_eq!(
            build_upstream_url("https://up.example.com", "/api/v1/users", Some("/api/v1"), None),
            "https://up.example.com/users"
        );
    }

    #[test]
    fn test_build_upstream_url_prefix_is_case_insensitive() {
        assert_eq!(
            build_upstream_url("https://up.example.com", "/API/V1/users", Some("/api/v1"), None),
            "https://up.example.com/users"
        );
    }

    #[test]
    fn test_build_upstream_url_preserves_query() {
        assert_eq!(
            build_upstream_url(
                "https://up.example.com/",
                "/users",
                None,
                Some("page=2&size=10")
            ),
            "https://up.example.com/users?page=2&size=10"
        );
    }

    #[test]
    fn test_build_upstream_url_without_prefix_match() {
        assert_eq!(
            build_upstream_url("https://up.example.com", "/other/users", Some("/api"), None),
            "https://up.example.com/other/users"
        );
    }

    #[test]
    fn test_build_upstream_url_stripping_whole_path() {
        assert_eq!(
            build_upstream_url("https://up.example.com", "/api", Some("/api"), None),
            "https://up.example.com"
        );
    }

    #[test]
    fn test_hop_by_hop_headers_are_recognized() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(is_hop_by_hop("HOST"));
        assert!(is_hop_by_hop("Proxy-Authorization"));
        assert!(!is_hop_by_hop("content-type"));
        assert!(!is_hop_by_hop("x-request-id"));
    }
}
