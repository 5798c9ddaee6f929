//! Type definitions for the matching pipeline.
//!
//! Two families live here: *records* (what the external configuration store
//! yields, with conditions/headers/fault config still serialized as raw JSON
//! blobs) and *cached* values (fully parsed, immutable snapshots owned by the
//! rule cache). The split keeps the parse-and-degrade behavior for malformed
//! stored JSON in one place: the cache build.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Wire protocol an endpoint speaks. Decides body inspection (JSONPath vs
/// XPath) and the default response content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Rest,
    Soap,
}

impl Protocol {
    /// Content type written when no custom header sets one.
    pub fn default_content_type(self) -> &'static str {
        match self {
            Protocol::Rest => "application/json",
            Protocol::Soap => "text/xml",
        }
    }
}

/// Where a condition reads its actual value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionSource {
    Body,
    Header,
    Query,
    Path,
    Metadata,
}

/// Comparison applied between the extracted actual value and the expected
/// value of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
    GreaterThan,
    LessThan,
    Exists,
    NotExists,
    IsEmpty,
    JsonSchema,
}

/// How a rule combines its conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConditionLogic {
    #[default]
    And,
    Or,
}

/// One comparison contributing to a rule or scenario step match decision.
///
/// `field` is interpreted per source: a JSONPath (REST) or XPath (SOAP)
/// expression for `Body`, a key for `Header`/`Query`, a `{param}` name for
/// `Path`, and a metadata key (`method`, `path`) for `Metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCondition {
    pub source: ConditionSource,
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub expected: String,
}

/// Fault behavior attached to a rule, applied before normal rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum FaultKind {
    #[default]
    None,
    FixedDelay,
    RandomDelay,
    ConnectionReset,
    EmptyResponse,
    MalformedResponse,
    Timeout,
}

// ============================================================================
// Store records
// ============================================================================

/// Endpoint as yielded by the external configuration store.
#[derive(Debug, Clone)]
pub struct EndpointRecord {
    pub id: Uuid,
    /// Owning service name (synthetic for recorded endpoints).
    pub service: String,
    /// Path template, `{name}` placeholders allowed.
    pub path: String,
    pub method: String,
    pub protocol: Protocol,
    pub active: bool,
    pub default_status: Option<u16>,
    pub default_body: Option<String>,
    pub rules: Vec<RuleRecord>,
}

/// Rule as yielded by the external configuration store.
///
/// Conditions, response headers, and fault config are raw JSON blobs here;
/// the cache build parses them and degrades to empty values on malformed
/// input instead of failing the reload.
#[derive(Debug, Clone)]
pub struct RuleRecord {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub name: String,
    pub priority: i32,
    pub logic: ConditionLogic,
    pub conditions_json: Option<String>,
    pub status_code: u16,
    pub body: Option<String>,
    pub headers_json: Option<String>,
    pub delay_ms: u64,
    pub body_is_template: bool,
    pub headers_are_templates: bool,
    pub fault: FaultKind,
    pub fault_config_json: Option<String>,
    pub active: bool,
}

/// Scenario as yielded by the external configuration store.
#[derive(Debug, Clone)]
pub struct ScenarioRecord {
    pub id: Uuid,
    pub name: String,
    pub initial_state: String,
    pub current_state: String,
    pub active: bool,
    pub steps: Vec<StepRecord>,
}

/// Scenario step as yielded by the external configuration store.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub id: Uuid,
    pub scenario_id: Uuid,
    /// State this step fires from.
    pub state_name: String,
    pub endpoint_id: Uuid,
    pub priority: i32,
    pub logic: ConditionLogic,
    pub conditions_json: Option<String>,
    /// `None` leaves the scenario in its current state.
    pub next_state: Option<String>,
    pub status_code: u16,
    pub body: Option<String>,
    pub headers_json: Option<String>,
    pub body_is_template: bool,
}

// ============================================================================
// Cached values
// ============================================================================

/// Immutable endpoint snapshot held by the rule cache. Replaced wholesale or
/// per-identity on reload, never mutated in place.
#[derive(Debug, Clone)]
pub struct CachedEndpoint {
    pub id: Uuid,
    pub service: String,
    pub path: String,
    pub method: String,
    pub protocol: Protocol,
    pub active: bool,
    pub default_status: Option<u16>,
    pub default_body: Option<String>,
    /// Sorted by ascending priority; ties keep store order.
    pub rules: Vec<CachedRule>,
}

/// Immutable rule snapshot with conditions and headers fully parsed.
#[derive(Debug, Clone)]
pub struct CachedRule {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub name: String,
    pub priority: i32,
    pub logic: ConditionLogic,
    pub conditions: Vec<MatchCondition>,
    pub status_code: u16,
    pub body: Option<String>,
    pub headers: HashMap<String, String>,
    pub delay_ms: u64,
    pub body_is_template: bool,
    pub headers_are_templates: bool,
    pub fault: FaultKind,
    pub fault_config: Option<serde_json::Value>,
    pub active: bool,
}

/// Outcome of rule matching for one request, consumed by the renderer.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub endpoint: Arc<CachedEndpoint>,
    /// `None` when the endpoint's default response matched instead of a rule.
    pub rule: Option<CachedRule>,
    pub is_default: bool,
    /// Placeholder name (lower-cased) to captured segment, extracted once.
    pub path_params: HashMap<String, String>,
}
