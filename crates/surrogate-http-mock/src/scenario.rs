//! Stateful scenario engine.
//!
//! A scenario is an explicit state machine over freeform state names: a step
//! fires only when its scenario currently sits in the step's declared state
//! and its conditions hold, optionally advancing the scenario to a next
//! state. The in-memory state map is mutated synchronously so a transition
//! is immediately visible to `current_state`; the durable write is
//! dispatched onto its own task and never blocks the response path. A crash
//! between the in-memory transition and the durable write loses that
//! transition on restart.

use crate::context::RequestContext;
use crate::matching::engine::condition_holds;
use crate::model::{ConditionLogic, MatchCondition, Protocol, ScenarioRecord, StepRecord};
use crate::store::{ConfigStore, StoreError};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Parsed scenario step with conditions ready for evaluation.
#[derive(Debug, Clone)]
pub struct ScenarioStep {
    pub id: Uuid,
    pub scenario_id: Uuid,
    pub state_name: String,
    pub endpoint_id: Uuid,
    pub priority: i32,
    pub logic: ConditionLogic,
    pub conditions: Vec<MatchCondition>,
    pub next_state: Option<String>,
    pub status_code: u16,
    pub body: Option<String>,
    pub headers: HashMap<String, String>,
    pub body_is_template: bool,
}

/// A step that fired for a request.
#[derive(Debug, Clone)]
pub struct ScenarioMatch {
    pub scenario_id: Uuid,
    pub scenario_name: String,
    pub step: ScenarioStep,
}

#[derive(Debug)]
struct TrackedScenario {
    name: String,
    initial_state: String,
    current_state: String,
    /// Sorted by ascending priority; ties keep store order.
    steps: Vec<ScenarioStep>,
}

/// Tracks one current state per active scenario and advances it on
/// successful step matches.
pub struct ScenarioEngine {
    store: Arc<dyn ConfigStore>,
    scenarios: DashMap<Uuid, TrackedScenario>,
}

impl ScenarioEngine {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            scenarios: DashMap::new(),
        }
    }

    /// Load every active scenario, seeding the tracked state from the
    /// persisted current state. Returns the number of scenarios loaded.
    pub async fn load_all(&self) -> Result<usize, StoreError> {
        let records = self.store.active_scenarios().await?;
        self.scenarios.clear();
        let mut count = 0;
        for record in records.into_iter().filter(|r| r.active) {
            let id = record.id;
            self.scenarios.insert(id, build_scenario(record));
            count += 1;
        }
        info!(count, "scenario engine loaded");
        Ok(count)
    }

    /// Find a step firing for `endpoint_id` in some scenario's current
    /// state. On a hit with a next state, the tracked state advances
    /// synchronously and the durable write is dispatched in the background.
    pub fn try_match(
        &self,
        ctx: &RequestContext,
        endpoint_id: Uuid,
        protocol: Protocol,
        path_params: &HashMap<String, String>,
    ) -> Option<ScenarioMatch> {
        for mut entry in self.scenarios.iter_mut() {
            let scenario_id = *entry.key();
            let scenario = entry.value_mut();

            let step = scenario
                .steps
                .iter()
                .find(|step| {
                    step.endpoint_id == endpoint_id
                        && step.state_name == scenario.current_state
                        && step_matches(ctx, step, protocol, path_params)
                })
                .cloned();

            let Some(step) = step else {
                continue;
            };

            if let Some(next_state) = &step.next_state {
                debug!(
                    scenario = %scenario.name,
                    from = %scenario.current_state,
                    to = %next_state,
                    "scenario state transition"
                );
                scenario.current_state = next_state.clone();

                // Respond fast, persist eventually: the request that caused
                // the transition does not wait for the durable write.
                let store = Arc::clone(&self.store);
                let state = next_state.clone();
                tokio::spawn(async move {
                    if let Err(err) = store.persist_scenario_state(scenario_id, &state).await {
                        error!(scenario = %scenario_id, %err, "failed to persist scenario state");
                    }
                });
            }

            return Some(ScenarioMatch {
                scenario_id,
                scenario_name: scenario.name.clone(),
                step,
            });
        }
        None
    }

    /// Set both the persisted and tracked state back to the scenario's
    /// initial state.
    pub async fn reset(&self, scenario_id: Uuid) -> Result<(), StoreError> {
        let initial = {
            let mut scenario = self
                .scenarios
                .get_mut(&scenario_id)
                .ok_or(StoreError::ScenarioNotFound(scenario_id))?;
            scenario.current_state = scenario.initial_state.clone();
            scenario.initial_state.clone()
        };
        self.store
            .persist_scenario_state(scenario_id, &initial)
            .await
    }

    /// Synchronous read of the tracked in-memory state, independent of
    /// persistence latency.
    pub fn current_state(&self, scenario_id: Uuid) -> Option<String> {
        self.scenarios
            .get(&scenario_id)
            .map(|s| s.current_state.clone())
    }

    /// Does any loaded scenario have a step targeting this endpoint? Used by
    /// the control flow to decide whether to try the scenario engine first.
    pub fn participates(&self, endpoint_id: Uuid) -> bool {
        self.scenarios
            .iter()
            .any(|entry| entry.steps.iter().any(|s| s.endpoint_id == endpoint_id))
    }
}

/// Step conditions reuse the rule condition semantics; an empty (or
/// unparsable, degraded at build time) condition list always matches.
fn step_matches(
    ctx: &RequestContext,
    step: &ScenarioStep,
    protocol: Protocol,
    path_params: &HashMap<String, String>,
) -> bool {
    if step.conditions.is_empty() {
        return true;
    }
    match step.logic {
        ConditionLogic::And => step
            .conditions
            .iter()
            .all(|c| condition_holds(ctx, c, protocol, path_params)),
        ConditionLogic::Or => step
            .conditions
            .iter()
            .any(|c| condition_holds(ctx, c, protocol, path_params)),
    }
}

fn build_scenario(record: ScenarioRecord) -> TrackedScenario {
    let mut steps: Vec<ScenarioStep> = record.steps.into_iter().map(build_step).collect();
    steps.sort_by_key(|s| s.priority);

    TrackedScenario {
        name: record.name,
        initial_state: record.initial_state,
        current_state: record.current_state,
        steps,
    }
}

fn build_step(record: StepRecord) -> ScenarioStep {
    let conditions = record
        .conditions_json
        .as_deref()
        .map(|raw| {
            serde_json::from_str(raw).unwrap_or_else(|err| {
                warn!(step = %record.id, %err, "malformed step conditions JSON, step becomes unconditional");
                Vec::new()
            })
        })
        .unwrap_or_default();
    let headers = record
        .headers_json
        .as_deref()
        .map(|raw| {
            serde_json::from_str(raw).unwrap_or_else(|err| {
                warn!(step = %record.id, %err, "malformed step headers JSON, using empty map");
                HashMap::new()
            })
        })
        .unwrap_or_default();

    ScenarioStep {
        id: record.id,
        scenario_id: record.scenario_id,
        state_name: record.state_name,
        endpoint_id: record.endpoint_id,
        priority: record.priority,
        logic: record.logic,
        conditions,
        next_state: record.next_state,
        status_code: record.status_code,
        body: record.body,
        headers,
        body_is_template: record.body_is_template,
    }
}
