//! Rule-selection engine.
//!
//! Composes the path matcher, field extraction, and operator evaluation over
//! the cache snapshot: first endpoint whose method and path match decides
//! the outcome, first rule in ascending priority order whose conditions hold
//! wins, the endpoint default response is the fallback.

use crate::cache::RuleCache;
use crate::context::RequestContext;
use crate::matching::{extract, operators, path};
use crate::model::{CachedEndpoint, CachedRule, ConditionLogic, MatchCondition, MatchResult, Protocol};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub struct MatchEngine {
    cache: Arc<RuleCache>,
}

impl MatchEngine {
    pub fn new(cache: Arc<RuleCache>) -> Self {
        Self { cache }
    }

    /// Resolve the winning rule or default response for a request. `None`
    /// means nothing matched and the caller may proxy or 404.
    pub fn find_match(&self, ctx: &RequestContext) -> Option<MatchResult> {
        let (endpoint, path_params) = self.resolve_endpoint(ctx)?;

        for rule in &endpoint.rules {
            if !rule.active {
                continue;
            }
            if rule_matches(ctx, rule, endpoint.protocol, &path_params) {
                debug!(endpoint = %endpoint.path, rule = %rule.name, "rule matched");
                return Some(MatchResult {
                    rule: Some(rule.clone()),
                    is_default: false,
                    endpoint: Arc::clone(&endpoint),
                    path_params,
                });
            }
        }

        if endpoint
            .default_body
            .as_deref()
            .is_some_and(|b| !b.is_empty())
        {
            debug!(endpoint = %endpoint.path, "falling back to default response");
            return Some(MatchResult {
                rule: None,
                is_default: true,
                endpoint,
                path_params,
            });
        }

        debug!(endpoint = %endpoint.path, "endpoint matched but produced no response");
        None
    }

    /// First active endpoint matching the request method and path, with its
    /// extracted path parameters. Used both by `find_match` and by the
    /// scenario-aware control flow, which needs the endpoint identity before
    /// rule evaluation.
    pub fn resolve_endpoint(
        &self,
        ctx: &RequestContext,
    ) -> Option<(Arc<CachedEndpoint>, HashMap<String, String>)> {
        let snapshot = self.cache.get_all();
        for endpoint in snapshot.iter() {
            // The cache should not contain inactive endpoints; this is a
            // safety filter.
            if !endpoint.active {
                continue;
            }
            if !endpoint.method.eq_ignore_ascii_case(&ctx.method) {
                continue;
            }
            if !path::matches(&endpoint.path, &ctx.path) {
                continue;
            }
            let params = path::extract_params(&endpoint.path, &ctx.path);
            return Some((Arc::clone(endpoint), params));
        }
        None
    }
}

/// Does a rule match the request? Zero conditions is a catch-all.
fn rule_matches(
    ctx: &RequestContext,
    rule: &CachedRule,
    protocol: Protocol,
    path_params: &HashMap<String, String>,
) -> bool {
    if rule.conditions.is_empty() {
        return true;
    }
    match rule.logic {
        ConditionLogic::And => rule
            .conditions
            .iter()
            .all(|c| condition_holds(ctx, c, protocol, path_params)),
        ConditionLogic::Or => rule
            .conditions
            .iter()
            .any(|c| condition_holds(ctx, c, protocol, path_params)),
    }
}

/// Evaluate one condition against the request. Shared with the scenario
/// engine, which reuses the same condition semantics for its steps.
pub fn condition_holds(
    ctx: &RequestContext,
    condition: &MatchCondition,
    protocol: Protocol,
    path_params: &HashMap<String, String>,
) -> bool {
    let actual = extract::extract_value(ctx, condition, protocol, path_params);
    operators::evaluate(condition.operator, actual.as_deref(), &condition.expected)
}
