//! Upstream proxying and recording.
//!
//! Unmatched (or recording-enabled) requests are forwarded to a configured
//! upstream with hop-by-hop header hygiene and a per-request timeout; a
//! proxied exchange can be persisted as a new catch-all rule for future
//! replay.

mod forward;
mod record;

pub use forward::{ProxyEngine, ProxyResponse};
pub use record::{RecordingService, RECORDED_SERVICE_NAME, RECORDING_RULE_PRIORITY};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

fn default_true() -> bool {
    true
}

fn default_proxy_timeout_ms() -> u64 {
    30_000
}

/// Upstream forwarding configuration. Owned by the external configuration
/// store; read-only to the proxy engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    /// Base URL requests are forwarded to, e.g. `https://api.example.com`.
    pub target_base_url: String,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Persist proxied exchanges as new rules.
    #[serde(default)]
    pub record: bool,
    /// Forward the original request headers (minus hop-by-hop ones).
    #[serde(default = "default_true")]
    pub forward_headers: bool,
    /// Statically configured headers added to every upstream request.
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    #[serde(default = "default_proxy_timeout_ms")]
    pub timeout_ms: u64,
    /// Prefix stripped (case-insensitively) from the request path before it
    /// is appended to the target base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_path_prefix: Option<String>,
    /// Scope: a specific endpoint, or `None` for service-wide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<Uuid>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            target_base_url: String::new(),
            active: true,
            record: false,
            forward_headers: true,
            extra_headers: HashMap::new(),
            timeout_ms: default_proxy_timeout_ms(),
            strip_path_prefix: None,
            endpoint_id: None,
        }
    }
}
