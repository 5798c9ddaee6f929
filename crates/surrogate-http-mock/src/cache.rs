//! In-memory rule cache.
//!
//! Holds a point-in-time snapshot of active endpoints and their active
//! rules, rebuilt from the configuration store on demand. The snapshot is an
//! immutable `Arc`-published value: readers clone the pointer and iterate
//! without ever observing a partially rebuilt state, writers build a fresh
//! vector and swap it in under a short lock that is never held across I/O.

use crate::model::{CachedEndpoint, CachedRule, EndpointRecord, MatchCondition, RuleRecord};
use crate::store::{ConfigStore, StoreError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

type Snapshot = Arc<Vec<Arc<CachedEndpoint>>>;

/// Read-optimized cache of active endpoints, keyed by identity, preserving
/// store order.
pub struct RuleCache {
    store: Arc<dyn ConfigStore>,
    snapshot: RwLock<Snapshot>,
}

impl RuleCache {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            snapshot: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Fetch every active endpoint and atomically replace the snapshot.
    /// Returns the number of endpoints loaded.
    pub async fn load_all(&self) -> Result<usize, StoreError> {
        let records = self.store.active_endpoints().await?;
        let endpoints: Vec<Arc<CachedEndpoint>> = records
            .into_iter()
            .filter(|r| r.active)
            .map(|r| Arc::new(build_endpoint(r)))
            .collect();
        let count = endpoints.len();

        *self.snapshot.write() = Arc::new(endpoints);
        info!(count, "endpoint cache loaded");
        Ok(count)
    }

    /// Re-fetch a single endpoint after an admin mutation. A deleted or
    /// deactivated endpoint is evicted; otherwise only its entry is replaced
    /// (or appended when newly created).
    pub async fn reload_one(&self, endpoint_id: Uuid) -> Result<(), StoreError> {
        match self.store.endpoint(endpoint_id).await? {
            Some(record) if record.active => {
                let rebuilt = Arc::new(build_endpoint(record));
                let mut guard = self.snapshot.write();
                let mut next: Vec<Arc<CachedEndpoint>> = guard.as_ref().clone();
                match next.iter_mut().find(|e| e.id == endpoint_id) {
                    Some(slot) => *slot = rebuilt,
                    None => next.push(rebuilt),
                }
                *guard = Arc::new(next);
                debug!(%endpoint_id, "endpoint cache entry reloaded");
            }
            _ => self.remove(endpoint_id),
        }
        Ok(())
    }

    /// Unconditional eviction, used on delete.
    pub fn remove(&self, endpoint_id: Uuid) {
        let mut guard = self.snapshot.write();
        if guard.iter().any(|e| e.id == endpoint_id) {
            let next: Vec<Arc<CachedEndpoint>> = guard
                .iter()
                .filter(|e| e.id != endpoint_id)
                .cloned()
                .collect();
            *guard = Arc::new(next);
            debug!(%endpoint_id, "endpoint cache entry removed");
        }
    }

    /// Current snapshot. Never blocks on a concurrent reload and never
    /// changes under the caller mid-iteration.
    pub fn get_all(&self) -> Snapshot {
        self.snapshot.read().clone()
    }
}

fn build_endpoint(record: EndpointRecord) -> CachedEndpoint {
    let mut rules: Vec<CachedRule> = record
        .rules
        .into_iter()
        .filter(|r| r.active)
        .map(build_rule)
        .collect();
    // Stable sort: ties keep store insertion order.
    rules.sort_by_key(|r| r.priority);

    CachedEndpoint {
        id: record.id,
        service: record.service,
        path: record.path,
        method: record.method,
        protocol: record.protocol,
        active: record.active,
        default_status: record.default_status,
        default_body: record.default_body,
        rules,
    }
}

fn build_rule(record: RuleRecord) -> CachedRule {
    let conditions = parse_json_blob::<Vec<MatchCondition>>(
        record.conditions_json.as_deref(),
        record.id,
        "conditions",
    );
    let headers = parse_json_blob::<HashMap<String, String>>(
        record.headers_json.as_deref(),
        record.id,
        "headers",
    );
    let fault_config = record.fault_config_json.as_deref().and_then(|raw| {
        serde_json::from_str(raw)
            .map_err(|err| {
                warn!(rule = %record.id, %err, "malformed fault config, using defaults");
            })
            .ok()
    });

    CachedRule {
        id: record.id,
        endpoint_id: record.endpoint_id,
        name: record.name,
        priority: record.priority,
        logic: record.logic,
        conditions,
        status_code: record.status_code,
        body: record.body,
        headers,
        delay_ms: record.delay_ms,
        body_is_template: record.body_is_template,
        headers_are_templates: record.headers_are_templates,
        fault: record.fault,
        fault_config,
        active: record.active,
    }
}

/// Parse a stored JSON blob, falling back to the default value on malformed
/// input so one bad rule never fails a whole reload.
fn parse_json_blob<T: serde::de::DeserializeOwned + Default>(
    raw: Option<&str>,
    rule_id: Uuid,
    what: &str,
) -> T {
    match raw {
        None => T::default(),
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|err| {
            warn!(rule = %rule_id, %err, "malformed stored {what} JSON, using empty value");
            T::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConditionLogic, FaultKind, Protocol};
    use crate::store::MemoryStore;

    fn rule_record(endpoint_id: Uuid, priority: i32, conditions_json: Option<&str>) -> RuleRecord {
        RuleRecord {
            id: Uuid::new_v4(),
            endpoint_id,
            name: format!("rule-{priority}"),
            priority,
            logic: ConditionLogic::And,
            conditions_json: conditions_json.map(str::to_string),
            status_code: 200,
            body: Some("{}".to_string()),
            headers_json: None,
            delay_ms: 0,
            body_is_template: false,
            headers_are_templates: false,
            fault: FaultKind::None,
            fault_config_json: None,
            active: true,
        }
    }

    fn endpoint_record(path: &str) -> EndpointRecord {
        EndpointRecord {
            id: Uuid::new_v4(),
            service: "users".to_string(),
            path: path.to_string(),
            method: "GET".to_string(),
            protocol: Protocol::Rest,
            active: true,
            default_status: None,
            default_body: None,
            rules: vec![],
        }
    }

    #[tokio::test]
    async fn test_load_all_counts_active_endpoints() {
        let store = Arc::new(MemoryStore::new());
        store.put_endpoint(endpoint_record("/api/a"));
        store.put_endpoint(endpoint_record("/api/b"));
        let mut inactive = endpoint_record("/api/c");
        inactive.active = false;
        store.put_endpoint(inactive);

        let cache = RuleCache::new(store);
        let count = cache.load_all().await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(cache.get_all().len(), 2);
    }

    #[tokio::test]
    async fn test_rules_sorted_by_priority_with_stable_ties() {
        let store = Arc::new(MemoryStore::new());
        let mut endpoint = endpoint_record("/api/orders");
        let id = endpoint.id;
        let mut first_tie = rule_record(id, 5, None);
        first_tie.name = "first".to_string();
        let mut second_tie = rule_record(id, 5, None);
        second_tie.name = "second".to_string();
        endpoint.rules = vec![rule_record(id, 10, None), first_tie, rule_record(id, 1, None), second_tie];
        store.put_endpoint(endpoint);

        let cache = RuleCache::new(store);
        cache.load_all().await.unwrap();

        let snapshot = cache.get_all();
        let priorities: Vec<i32> = snapshot[0].rules.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![1, 5, 5, 10]);
        assert_eq!(snapshot[0].rules[1].name, "first");
        assert_eq!(snapshot[0].rules[2].name, "second");
    }

    #[tokio::test]
    async fn test_malformed_conditions_json_degrades_to_empty() {
        let store = Arc::new(MemoryStore::new());
        let mut endpoint = endpoint_record("/api/orders");
        let id = endpoint.id;
        endpoint.rules = vec![rule_record(id, 1, Some("{not valid json"))];
        store.put_endpoint(endpoint);

        let cache = RuleCache::new(store);
        cache.load_all().await.unwrap();

        let snapshot = cache.get_all();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].rules[0].conditions.is_empty());
    }

    #[tokio::test]
    async fn test_reload_one_evicts_deactivated_endpoint() {
        let store = Arc::new(MemoryStore::new());
        let endpoint = endpoint_record("/api/orders");
        let id = endpoint.id;
        store.put_endpoint(endpoint);

        let cache = RuleCache::new(Arc::clone(&store) as Arc<dyn ConfigStore>);
        cache.load_all().await.unwrap();
        assert_eq!(cache.get_all().len(), 1);

        store.set_endpoint_active(id, false);
        cache.reload_one(id).await.unwrap();
        assert!(cache.get_all().iter().all(|e| e.id != id));
    }

    #[tokio::test]
    async fn test_reload_one_appends_new_endpoint() {
        let store = Arc::new(MemoryStore::new());
        let cache = RuleCache::new(Arc::clone(&store) as Arc<dyn ConfigStore>);
        cache.load_all().await.unwrap();
        assert!(cache.get_all().is_empty());

        let endpoint = endpoint_record("/api/new");
        let id = endpoint.id;
        store.put_endpoint(endpoint);
        cache.reload_one(id).await.unwrap();
        assert_eq!(cache.get_all().len(), 1);
    }

    #[tokio::test]
    async fn test_get_all_snapshot_survives_concurrent_reload() {
        let store = Arc::new(MemoryStore::new());
        store.put_endpoint(endpoint_record("/api/a"));
        let cache = RuleCache::new(Arc::clone(&store) as Arc<dyn ConfigStore>);
        cache.load_all().await.unwrap();

        let held = cache.get_all();
        store.put_endpoint(endpoint_record("/api/b"));
        cache.load_all().await.unwrap();

        // The earlier snapshot is unchanged; a fresh read sees the reload.
        assert_eq!(held.len(), 1);
        assert_eq!(cache.get_all().len(), 2);
    }
}
