//! Response rendering.
//!
//! Orchestrates fault injection, configured delay, status code, custom
//! headers, content-type defaulting, and body writing for a resolved match.
//! Template rendering applies to rule bodies/headers flagged as templates;
//! endpoint default responses are written verbatim.

use crate::context::RequestContext;
use crate::fault::{self, FaultOutcome};
use crate::model::{CachedEndpoint, CachedRule, MatchResult, Protocol};
use crate::scenario::ScenarioStep;
use crate::template::{self, TemplateContext};
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Fully materialized response the transport layer writes to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

/// What the transport layer should do with the connection.
#[derive(Debug)]
pub enum RenderOutcome {
    /// Write status/headers/body normally.
    Response(SynthesizedResponse),
    /// Drop the connection without writing any bytes.
    Abort,
}

#[derive(Debug, Default)]
pub struct ResponseRenderer;

impl ResponseRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Render a match result. The fault injector runs first and may
    /// short-circuit the normal path entirely; the configured rule delay is
    /// the only other suspension point here.
    pub async fn render(&self, ctx: &RequestContext, result: &MatchResult) -> RenderOutcome {
        let Some(rule) = &result.rule else {
            return RenderOutcome::Response(default_response(&result.endpoint));
        };

        match fault::apply_fault(rule).await {
            FaultOutcome::Continue => {}
            FaultOutcome::Respond(response) => return RenderOutcome::Response(response),
            FaultOutcome::Abort => return RenderOutcome::Abort,
        }

        if rule.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(rule.delay_ms)).await;
        }

        let template_ctx = TemplateContext::from_request(ctx, &result.path_params);
        RenderOutcome::Response(rule_response(
            rule,
            result.endpoint.protocol,
            &template_ctx,
        ))
    }

    /// Render a scenario step's response payload. Steps carry no fault or
    /// delay configuration; only the body may be templated.
    pub fn render_step(
        &self,
        ctx: &RequestContext,
        step: &ScenarioStep,
        protocol: Protocol,
        path_params: &HashMap<String, String>,
    ) -> SynthesizedResponse {
        let template_ctx = TemplateContext::from_request(ctx, path_params);
        let mut headers = step.headers.clone();
        ensure_content_type(&mut headers, protocol);

        let body = step
            .body
            .as_deref()
            .map(|raw| {
                if step.body_is_template {
                    render_or_raw(raw, &template_ctx)
                } else {
                    raw.to_string()
                }
            })
            .unwrap_or_default();

        SynthesizedResponse {
            status: step.status_code,
            headers,
            body: Bytes::from(body),
        }
    }
}

/// Endpoint default response: default status (fallback 200), protocol
/// content type, body verbatim.
fn default_response(endpoint: &CachedEndpoint) -> SynthesizedResponse {
    let mut headers = HashMap::new();
    ensure_content_type(&mut headers, endpoint.protocol);

    SynthesizedResponse {
        status: endpoint.default_status.unwrap_or(200),
        headers,
        body: Bytes::from(endpoint.default_body.clone().unwrap_or_default()),
    }
}

fn rule_response(
    rule: &CachedRule,
    protocol: Protocol,
    template_ctx: &TemplateContext,
) -> SynthesizedResponse {
    let mut headers: HashMap<String, String> = rule
        .headers
        .iter()
        .map(|(name, value)| {
            let value = if rule.headers_are_templates {
                render_or_raw(value, template_ctx)
            } else {
                value.clone()
            };
            (name.clone(), value)
        })
        .collect();
    // Custom headers win; the protocol default only fills a gap.
    ensure_content_type(&mut headers, protocol);

    let body = rule
        .body
        .as_deref()
        .map(|raw| {
            if rule.body_is_template {
                render_or_raw(raw, template_ctx)
            } else {
                raw.to_string()
            }
        })
        .unwrap_or_default();

    SynthesizedResponse {
        status: rule.status_code,
        headers,
        body: Bytes::from(body),
    }
}

/// Serve-path template rendering: a validation error is logged and the raw
/// template text served, so one bad template never breaks an endpoint.
/// Callers wanting the hard error (preview) use `template::render` directly.
fn render_or_raw(raw: &str, template_ctx: &TemplateContext) -> String {
    match template::render(raw, template_ctx) {
        Ok(rendered) => rendered,
        Err(err) => {
            warn!(%err, "template rendering failed, serving raw text");
            raw.to_string()
        }
    }
}

fn ensure_content_type(headers: &mut HashMap<String, String>, protocol: Protocol) {
    let already_set = headers.keys().any(|k| k.eq_ignore_ascii_case("content-type"));
    if !already_set {
        headers.insert(
            "content-type".to_string(),
            protocol.default_content_type().to_string(),
        );
    }
}
