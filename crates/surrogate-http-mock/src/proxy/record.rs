//! Recording proxied exchanges as replayable rules.

use super::forward::ProxyResponse;
use crate::cache::RuleCache;
use crate::context::RequestContext;
use crate::model::{ConditionLogic, EndpointRecord, FaultKind, Protocol, RuleRecord};
use crate::store::{ConfigStore, StoreError};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Synthetic service name endpoints created by the recorder live under.
pub const RECORDED_SERVICE_NAME: &str = "recorded";

/// Recorded rules sit at a low priority so hand-written rules keep winning.
pub const RECORDING_RULE_PRIORITY: i32 = 100;

/// Persists proxied exchanges as catch-all rules and refreshes the cache so
/// the next identical request replays locally.
pub struct RecordingService {
    store: Arc<dyn ConfigStore>,
    cache: Arc<RuleCache>,
}

impl RecordingService {
    pub fn new(store: Arc<dyn ConfigStore>, cache: Arc<RuleCache>) -> Self {
        Self { store, cache }
    }

    /// Record one exchange. Best-effort: every failure is logged and
    /// swallowed, because the proxied response has already been decided and
    /// must not be affected.
    pub async fn record(
        &self,
        ctx: &RequestContext,
        response: &ProxyResponse,
        endpoint_id: Option<Uuid>,
    ) {
        if let Err(err) = self.record_exchange(ctx, response, endpoint_id).await {
            error!(%err, method = %ctx.method, path = %ctx.path, "failed to record proxied exchange");
        }
    }

    async fn record_exchange(
        &self,
        ctx: &RequestContext,
        response: &ProxyResponse,
        endpoint_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let endpoint_id = match endpoint_id {
            Some(id) => id,
            None => {
                let endpoint = synthesize_endpoint(ctx);
                let id = endpoint.id;
                self.store.insert_endpoint(endpoint).await?;
                info!(%id, method = %ctx.method, path = %ctx.path, "created endpoint for recording");
                id
            }
        };

        self.store
            .append_rule(recorded_rule(endpoint_id, ctx, response))
            .await?;
        self.cache.reload_one(endpoint_id).await?;
        info!(%endpoint_id, status = response.status, "recorded proxied exchange");
        Ok(())
    }
}

fn synthesize_endpoint(ctx: &RequestContext) -> EndpointRecord {
    EndpointRecord {
        id: Uuid::new_v4(),
        service: RECORDED_SERVICE_NAME.to_string(),
        path: ctx.path.clone(),
        method: ctx.method.to_uppercase(),
        protocol: Protocol::Rest,
        active: true,
        default_status: None,
        default_body: None,
        rules: vec![],
    }
}

/// A condition-free catch-all copying status/body/headers from the proxied
/// response.
fn recorded_rule(endpoint_id: Uuid, ctx: &RequestContext, response: &ProxyResponse) -> RuleRecord {
    let body = if response.body.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&response.body).into_owned())
    };

    RuleRecord {
        id: Uuid::new_v4(),
        endpoint_id,
        name: format!("Recorded {} {}", ctx.method.to_uppercase(), ctx.path),
        priority: RECORDING_RULE_PRIORITY,
        logic: ConditionLogic::And,
        conditions_json: None,
        status_code: response.status,
        body,
        headers_json: serde_json::to_string(&response.headers).ok(),
        delay_ms: 0,
        body_is_template: false,
        headers_are_templates: false,
        fault: FaultKind::None,
        fault_config_json: None,
        active: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use bytes::Bytes;
    use std::collections::HashMap;

    fn proxied_response() -> ProxyResponse {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        ProxyResponse {
            status: 200,
            headers,
            body: Bytes::from(r#"{"id": 1}"#),
        }
    }

    fn post(path: &str) -> RequestContext {
        RequestContext::new("post", path, None, vec![], Some("{}".to_string()))
    }

    async fn service() -> (Arc<MemoryStore>, Arc<RuleCache>, RecordingService) {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(RuleCache::new(
            Arc::clone(&store) as Arc<dyn ConfigStore>
        ));
        cache.load_all().await.unwrap();
        let recorder = RecordingService::new(
            Arc::clone(&store) as Arc<dyn ConfigStore>,
            Arc::clone(&cache),
        );
        (store, cache, recorder)
    }

    #[tokio::test]
    async fn test_record_creates_endpoint_and_rule() {
        let (_store, cache, recorder) = service().await;
        recorder
            .record(&post("/api/orders"), &proxied_response(), None)
            .await;

        let snapshot = cache.get_all();
        assert_eq!(snapshot.len(), 1);
        let endpoint = &snapshot[0];
        assert_eq!(endpoint.service, RECORDED_SERVICE_NAME);
        assert_eq!(endpoint.method, "POST");
        assert_eq!(endpoint.path, "/api/orders");

        let rule = &endpoint.rules[0];
        assert_eq!(rule.priority, RECORDING_RULE_PRIORITY);
        assert!(rule.conditions.is_empty());
        assert_eq!(rule.status_code, 200);
        assert_eq!(rule.body.as_deref(), Some(r#"{"id": 1}"#));
        assert_eq!(
            rule.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn test_record_appends_to_existing_endpoint() {
        let (store, cache, recorder) = service().await;
        let endpoint = EndpointRecord {
            id: Uuid::new_v4(),
            service: "orders".to_string(),
            path: "/api/orders".to_string(),
            method: "POST".to_string(),
            protocol: Protocol::Rest,
            active: true,
            default_status: None,
            default_body: None,
            rules: vec![],
        };
        let id = endpoint.id;
        store.put_endpoint(endpoint);
        cache.load_all().await.unwrap();

        recorder
            .record(&post("/api/orders"), &proxied_response(), Some(id))
            .await;

        let snapshot = cache.get_all();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, id);
        assert_eq!(snapshot[0].rules.len(), 1);
    }

    #[tokio::test]
    async fn test_record_failure_is_swallowed() {
        let (_store, cache, recorder) = service().await;
        // Appending to an endpoint that does not exist fails inside the
        // store; record() must not propagate it.
        recorder
            .record(&post("/api/orders"), &proxied_response(), Some(Uuid::new_v4()))
            .await;
        assert!(cache.get_all().is_empty());
    }
}
