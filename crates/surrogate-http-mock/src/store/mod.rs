//! Repository boundary towards the external configuration store.
//!
//! The pipeline never talks to storage directly: the cache, scenario engine,
//! and recording service all go through [`ConfigStore`]. Each call is a
//! short-lived, independently acquired session; nothing here is held across
//! a request's lifetime.

mod memory;

pub use memory::MemoryStore;

use crate::model::{EndpointRecord, RuleRecord, ScenarioRecord};
use crate::proxy::ProxyConfig;
use async_trait::async_trait;
use uuid::Uuid;

/// Error types for configuration storage access.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("endpoint {0} not found")]
    EndpointNotFound(Uuid),
    #[error("scenario {0} not found")]
    ScenarioNotFound(Uuid),
}

/// Data-access interface the pipeline consumes.
///
/// Admin operations (create/update/delete/toggle) live outside this crate;
/// after performing one, the admin layer is expected to call
/// `RuleCache::reload_one` / `load_all` so cache staleness stays bounded to
/// "since last mutation".
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Every active endpoint with its active rules.
    async fn active_endpoints(&self) -> Result<Vec<EndpointRecord>, StoreError>;

    /// A single endpoint by identity, active or not. `None` when deleted.
    async fn endpoint(&self, id: Uuid) -> Result<Option<EndpointRecord>, StoreError>;

    /// Every active scenario with its steps.
    async fn active_scenarios(&self) -> Result<Vec<ScenarioRecord>, StoreError>;

    /// Durably record a scenario's current state.
    async fn persist_scenario_state(&self, scenario_id: Uuid, state: &str)
        -> Result<(), StoreError>;

    /// Active proxy configuration scoped to `endpoint_id`, falling back to
    /// the service-wide configuration when no scoped one exists.
    async fn active_proxy_config(
        &self,
        endpoint_id: Option<Uuid>,
    ) -> Result<Option<ProxyConfig>, StoreError>;

    /// Persist a new endpoint (recording path).
    async fn insert_endpoint(&self, record: EndpointRecord) -> Result<(), StoreError>;

    /// Append a rule to an existing endpoint (recording path).
    async fn append_rule(&self, rule: RuleRecord) -> Result<(), StoreError>;
}
