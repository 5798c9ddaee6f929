//! In-memory configuration store.
//!
//! Reference backend for embedders that configure Surrogate
//! programmatically, and the fixture the test suite runs against.

use super::{ConfigStore, StoreError};
use crate::model::{EndpointRecord, RuleRecord, ScenarioRecord};
use crate::proxy::ProxyConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    endpoints: Vec<EndpointRecord>,
    scenarios: Vec<ScenarioRecord>,
    proxy_configs: Vec<ProxyConfig>,
}

/// Thread-safe in-memory [`ConfigStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an endpoint by identity.
    pub fn put_endpoint(&self, record: EndpointRecord) {
        let mut inner = self.inner.lock();
        match inner.endpoints.iter_mut().find(|e| e.id == record.id) {
            Some(existing) => *existing = record,
            None => inner.endpoints.push(record),
        }
    }

    /// Remove an endpoint entirely (simulates a delete).
    pub fn delete_endpoint(&self, id: Uuid) {
        self.inner.lock().endpoints.retain(|e| e.id != id);
    }

    /// Flip an endpoint's active flag.
    pub fn set_endpoint_active(&self, id: Uuid, active: bool) {
        if let Some(e) = self.inner.lock().endpoints.iter_mut().find(|e| e.id == id) {
            e.active = active;
        }
    }

    /// Add or replace a scenario by identity.
    pub fn put_scenario(&self, record: ScenarioRecord) {
        let mut inner = self.inner.lock();
        match inner.scenarios.iter_mut().find(|s| s.id == record.id) {
            Some(existing) => *existing = record,
            None => inner.scenarios.push(record),
        }
    }

    /// Register a proxy configuration.
    pub fn put_proxy_config(&self, config: ProxyConfig) {
        self.inner.lock().proxy_configs.push(config);
    }

    /// Persisted current state of a scenario, for observing writes in tests.
    pub fn scenario_state(&self, id: Uuid) -> Option<String> {
        self.inner
            .lock()
            .scenarios
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.current_state.clone())
    }

    /// Endpoints currently stored, active or not.
    pub fn endpoint_count(&self) -> usize {
        self.inner.lock().endpoints.len()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn active_endpoints(&self) -> Result<Vec<EndpointRecord>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .endpoints
            .iter()
            .filter(|e| e.active)
            .cloned()
            .map(|mut e| {
                e.rules.retain(|r| r.active);
                e
            })
            .collect())
    }

    async fn endpoint(&self, id: Uuid) -> Result<Option<EndpointRecord>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.endpoints.iter().find(|e| e.id == id).cloned().map(
            |mut e| {
                e.rules.retain(|r| r.active);
                e
            },
        ))
    }

    async fn active_scenarios(&self) -> Result<Vec<ScenarioRecord>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.scenarios.iter().filter(|s| s.active).cloned().collect())
    }

    async fn persist_scenario_state(
        &self,
        scenario_id: Uuid,
        state: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let scenario = inner
            .scenarios
            .iter_mut()
            .find(|s| s.id == scenario_id)
            .ok_or(StoreError::ScenarioNotFound(scenario_id))?;
        scenario.current_state = state.to_string();
        Ok(())
    }

    async fn active_proxy_config(
        &self,
        endpoint_id: Option<Uuid>,
    ) -> Result<Option<ProxyConfig>, StoreError> {
        let inner = self.inner.lock();
        let scoped = endpoint_id.and_then(|id| {
            inner
                .proxy_configs
                .iter()
                .find(|c| c.active && c.endpoint_id == Some(id))
        });
        let global = inner
            .proxy_configs
            .iter()
            .find(|c| c.active && c.endpoint_id.is_none());
        Ok(scoped.or(global).cloned())
    }

    async fn insert_endpoint(&self, record: EndpointRecord) -> Result<(), StoreError> {
        self.inner.lock().endpoints.push(record);
        Ok(())
    }

    async fn append_rule(&self, rule: RuleRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let endpoint = inner
            .endpoints
            .iter_mut()
            .find(|e| e.id == rule.endpoint_id)
            .ok_or(StoreError::EndpointNotFound(rule.endpoint_id))?;
        endpoint.rules.push(rule);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Protocol;

    fn endpoint(active: bool) -> EndpointRecord {
        EndpointRecord {
            id: Uuid::new_v4(),
            service: "orders".to_string(),
            path: "/api/orders".to_string(),
            method: "GET".to_string(),
            protocol: Protocol::Rest,
            active,
            default_status: None,
            default_body: None,
            rules: vec![],
        }
    }

    #[tokio::test]
    async fn test_active_endpoints_filters_inactive() {
        let store = MemoryStore::new();
        store.put_endpoint(endpoint(true));
        store.put_endpoint(endpoint(false));

        let active = store.active_endpoints().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(store.endpoint_count(), 2);
    }

    #[tokio::test]
    async fn test_endpoint_returns_none_after_delete() {
        let store = MemoryStore::new();
        let record = endpoint(true);
        let id = record.id;
        store.put_endpoint(record);
        assert!(store.endpoint(id).await.unwrap().is_some());

        store.delete_endpoint(id);
        assert!(store.endpoint(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persist_scenario_state_unknown_scenario() {
        let store = MemoryStore::new();
        let err = store
            .persist_scenario_state(Uuid::new_v4(), "next")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ScenarioNotFound(_)));
    }

    #[tokio::test]
    async fn test_scoped_proxy_config_wins_over_global() {
        let store = MemoryStore::new();
        let endpoint_id = Uuid::new_v4();
        store.put_proxy_config(ProxyConfig {
            target_base_url: "https://global.example.com".to_string(),
            ..ProxyConfig::default()
        });
        store.put_proxy_config(ProxyConfig {
            target_base_url: "https://scoped.example.com".to_string(),
            endpoint_id: Some(endpoint_id),
            ..ProxyConfig::default()
        });

        let scoped = store
            .active_proxy_config(Some(endpoint_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(scoped.target_base_url, "https://scoped.example.com");

        let global = store.active_proxy_config(None).await.unwrap().unwrap();
        assert_eq!(global.target_base_url, "https://global.example.com");
    }
}
