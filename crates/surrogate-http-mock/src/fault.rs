//! Fault injection.
//!
//! Applies a resolved rule's configured fault behavior before normal
//! response rendering. A handled fault short-circuits the renderer entirely;
//! an unhandled one (delays) lets processing continue. Fault-config payloads
//! that fail to parse fall back to the stated defaults.

use crate::model::{CachedRule, FaultKind};
use crate::render::SynthesizedResponse;
use bytes::Bytes;
use rand::Rng;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// What the fault injector decided for this request.
#[derive(Debug)]
pub enum FaultOutcome {
    /// No short-circuit; continue to normal rendering.
    Continue,
    /// Write this response instead of the rule's configured one.
    Respond(SynthesizedResponse),
    /// Abort the connection without writing any bytes.
    Abort,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RandomDelayConfig {
    min_delay_ms: u64,
    max_delay_ms: u64,
}

impl Default for RandomDelayConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct EmptyResponseConfig {
    status_code: u16,
}

impl Default for EmptyResponseConfig {
    fn default() -> Self {
        Self { status_code: 503 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MalformedResponseConfig {
    byte_count: usize,
}

impl Default for MalformedResponseConfig {
    fn default() -> Self {
        Self { byte_count: 256 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TimeoutConfig {
    timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

/// Apply the rule's fault behavior. Only the delay/timeout paths suspend,
/// and no shared lock is held while they do.
pub async fn apply_fault(rule: &CachedRule) -> FaultOutcome {
    match rule.fault {
        // FixedDelay is covered by the renderer's generic delay handling.
        FaultKind::None | FaultKind::FixedDelay => FaultOutcome::Continue,
        FaultKind::RandomDelay => {
            let config: RandomDelayConfig = fault_config(rule);
            let max = config.max_delay_ms.max(config.min_delay_ms);
            let delay = rand::thread_rng().gen_range(config.min_delay_ms..=max);
            debug!(rule = %rule.name, delay_ms = delay, "random delay fault");
            tokio::time::sleep(Duration::from_millis(delay)).await;
            FaultOutcome::Continue
        }
        FaultKind::ConnectionReset => {
            debug!(rule = %rule.name, "connection reset fault");
            FaultOutcome::Abort
        }
        FaultKind::EmptyResponse => {
            let config: EmptyResponseConfig = fault_config(rule);
            debug!(rule = %rule.name, status = config.status_code, "empty response fault");
            FaultOutcome::Respond(SynthesizedResponse {
                status: config.status_code,
                headers: HashMap::new(),
                body: Bytes::new(),
            })
        }
        FaultKind::MalformedResponse => {
            let config: MalformedResponseConfig = fault_config(rule);
            let mut garbage = vec![0u8; config.byte_count];
            rand::thread_rng().fill(&mut garbage[..]);
            debug!(rule = %rule.name, bytes = config.byte_count, "malformed response fault");

            let mut headers = HashMap::new();
            headers.insert(
                "content-type".to_string(),
                "application/octet-stream".to_string(),
            );
            FaultOutcome::Respond(SynthesizedResponse {
                status: 200,
                headers,
                body: Bytes::from(garbage),
            })
        }
        FaultKind::Timeout => {
            let config: TimeoutConfig = fault_config(rule);
            debug!(rule = %rule.name, timeout_ms = config.timeout_ms, "timeout fault");
            tokio::time::sleep(Duration::from_millis(config.timeout_ms)).await;
            FaultOutcome::Abort
        }
    }
}

/// Parse the rule's fault config blob, falling back to defaults when absent
/// or malformed.
fn fault_config<T: serde::de::DeserializeOwned + Default>(rule: &CachedRule) -> T {
    rule.fault_config
        .clone()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConditionLogic;
    use uuid::Uuid;

    fn rule_with_fault(fault: FaultKind, config: Option<serde_json::Value>) -> CachedRule {
        CachedRule {
            id: Uuid::new_v4(),
            endpoint_id: Uuid::new_v4(),
            name: "faulty".to_string(),
            priority: 1,
            logic: ConditionLogic::And,
            conditions: vec![],
            status_code: 200,
            body: None,
            headers: HashMap::new(),
            delay_ms: 0,
            body_is_template: false,
            headers_are_templates: false,
            fault,
            fault_config: config,
            active: true,
        }
    }

    #[tokio::test]
    async fn test_none_and_fixed_delay_continue() {
        assert!(matches!(
            apply_fault(&rule_with_fault(FaultKind::None, None)).await,
            FaultOutcome::Continue
        ));
        assert!(matches!(
            apply_fault(&rule_with_fault(FaultKind::FixedDelay, None)).await,
            FaultOutcome::Continue
        ));
    }

    #[tokio::test]
    async fn test_empty_response_defaults_to_503() {
        let outcome = apply_fault(&rule_with_fault(FaultKind::EmptyResponse, None)).await;
        match outcome {
            FaultOutcome::Respond(response) => {
                assert_eq!(response.status, 503);
                assert!(response.body.is_empty());
            }
            other => panic!("expected Respond, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_response_honors_configured_status() {
        let outcome = apply_fault(&rule_with_fault(
            FaultKind::EmptyResponse,
            Some(serde_json::json!({"statusCode": 429})),
        ))
        .await;
        match outcome {
            FaultOutcome::Respond(response) => assert_eq!(response.status, 429),
            other => panic!("expected Respond, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_response_defaults() {
        let outcome = apply_fault(&rule_with_fault(FaultKind::MalformedResponse, None)).await;
        match outcome {
            FaultOutcome::Respond(response) => {
                assert_eq!(response.body.len(), 256);
                assert_eq!(
                    response.headers.get("content-type").map(String::as_str),
                    Some("application/octet-stream")
                );
            }
            other => panic!("expected Respond, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparsable_fault_config_falls_back_to_defaults() {
        let outcome = apply_fault(&rule_with_fault(
            FaultKind::MalformedResponse,
            Some(serde_json::json!({"byteCount": "not a number"})),
        ))
        .await;
        match outcome {
            FaultOutcome::Respond(response) => assert_eq!(response.body.len(), 256),
            other => panic!("expected Respond, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_reset_aborts() {
        assert!(matches!(
            apply_fault(&rule_with_fault(FaultKind::ConnectionReset, None)).await,
            FaultOutcome::Abort
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_sleeps_then_aborts() {
        let rule = rule_with_fault(
            FaultKind::Timeout,
            Some(serde_json::json!({"timeoutMs": 30000})),
        );
        let started = tokio::time::Instant::now();
        let outcome = apply_fault(&rule).await;
        assert!(matches!(outcome, FaultOutcome::Abort));
        assert!(started.elapsed() >= Duration::from_millis(30000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_random_delay_within_configured_range() {
        let rule = rule_with_fault(
            FaultKind::RandomDelay,
            Some(serde_json::json!({"minDelayMs": 10, "maxDelayMs": 20})),
        );
        let started = tokio::time::Instant::now();
        let outcome = apply_fault(&rule).await;
        assert!(matches!(outcome, FaultOutcome::Continue));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(10));
        assert!(elapsed <= Duration::from_millis(21));
    }
}
