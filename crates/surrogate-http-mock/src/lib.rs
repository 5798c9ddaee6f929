//! Surrogate: request-matching and response-synthesis core for a
//! programmable service-virtualization server.
//!
//! The crate is embedded by an external HTTP listener. Per request, the
//! listener builds a [`RequestContext`] and drives the pipeline through
//! [`MockEngine`]: scenario step matching for stateful endpoints, rule
//! matching with prioritized conditions, fault injection, template-aware
//! response rendering, and upstream proxying with optional recording.
//!
//! Configuration (endpoints, rules, scenarios, proxy settings) lives in an
//! external store reached through the [`store::ConfigStore`] trait; the
//! in-memory [`cache::RuleCache`] holds an immutable published snapshot so
//! request handling never waits on storage.

// ===== Core pipeline modules =====
pub mod cache;
pub mod context;
pub mod engine;
pub mod fault;
pub mod matching;
pub mod model;
pub mod proxy;
pub mod render;
pub mod scenario;
pub mod store;
pub mod template;

// Re-export the types an embedding listener needs at the crate root.
pub use context::RequestContext;
pub use engine::{HandleOutcome, MockEngine};
pub use model::{MatchCondition, MatchResult, Protocol};
pub use render::{RenderOutcome, SynthesizedResponse};
