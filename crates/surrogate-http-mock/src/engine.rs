//! Pipeline facade.
//!
//! Wires cache, scenario engine, match engine, renderer, proxy, and
//! recording into the per-request control flow: scenario step first when the
//! endpoint participates in one, ordinary rule matching otherwise, proxy
//! fallback for unmatched traffic, and a no-match signal the transport layer
//! turns into its 404 equivalent.

use crate::cache::RuleCache;
use crate::context::RequestContext;
use crate::matching::MatchEngine;
use crate::model::MatchResult;
use crate::proxy::{ProxyEngine, ProxyResponse, RecordingService};
use crate::render::{RenderOutcome, ResponseRenderer, SynthesizedResponse};
use crate::scenario::ScenarioEngine;
use crate::store::{ConfigStore, StoreError};
use std::sync::Arc;
use tracing::debug;

/// Final disposition of one request.
#[derive(Debug)]
pub enum HandleOutcome {
    /// Write this response to the client.
    Response(SynthesizedResponse),
    /// Drop the connection without writing any bytes.
    Abort,
    /// Nothing matched and no proxy produced a response; the transport
    /// layer answers with its 404 equivalent.
    NoMatch,
}

/// Owns the pipeline components and exposes both the composed control flow
/// (`handle`) and the individual calls collaborators use directly.
pub struct MockEngine {
    store: Arc<dyn ConfigStore>,
    cache: Arc<RuleCache>,
    scenarios: Arc<ScenarioEngine>,
    matcher: MatchEngine,
    renderer: ResponseRenderer,
    proxy: ProxyEngine,
    recorder: RecordingService,
}

impl MockEngine {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        let cache = Arc::new(RuleCache::new(Arc::clone(&store)));
        let scenarios = Arc::new(ScenarioEngine::new(Arc::clone(&store)));
        let matcher = MatchEngine::new(Arc::clone(&cache));
        let recorder = RecordingService::new(Arc::clone(&store), Arc::clone(&cache));

        Self {
            store,
            cache,
            scenarios,
            matcher,
            renderer: ResponseRenderer::new(),
            proxy: ProxyEngine::new(),
            recorder,
        }
    }

    /// Load endpoints and scenarios from the configuration store.
    pub async fn load_all(&self) -> Result<(), StoreError> {
        self.cache.load_all().await?;
        self.scenarios.load_all().await?;
        Ok(())
    }

    /// Cache handle for admin-triggered `reload_one`/`remove` calls.
    pub fn cache(&self) -> &Arc<RuleCache> {
        &self.cache
    }

    /// Scenario engine handle for `try_match`/`reset`/`current_state`.
    pub fn scenarios(&self) -> &Arc<ScenarioEngine> {
        &self.scenarios
    }

    /// Resolve the winning rule or default response without rendering.
    pub fn find_match(&self, ctx: &RequestContext) -> Option<MatchResult> {
        self.matcher.find_match(ctx)
    }

    /// Render a previously resolved match.
    pub async fn render(&self, ctx: &RequestContext, result: &MatchResult) -> RenderOutcome {
        self.renderer.render(ctx, result).await
    }

    /// Forward a request to an upstream.
    pub async fn forward(
        &self,
        ctx: &RequestContext,
        config: &crate::proxy::ProxyConfig,
    ) -> Option<ProxyResponse> {
        self.proxy.forward(ctx, config).await
    }

    /// Record a proxied exchange as a replayable rule (best-effort).
    pub async fn record(
        &self,
        ctx: &RequestContext,
        response: &ProxyResponse,
        endpoint_id: Option<uuid::Uuid>,
    ) {
        self.recorder.record(ctx, response, endpoint_id).await;
    }

    /// Run the full per-request control flow.
    pub async fn handle(&self, ctx: &RequestContext) -> HandleOutcome {
        let resolved = self.matcher.resolve_endpoint(ctx);

        // Stateful endpoints are consulted first; non-scenario traffic still
        // falls through to ordinary rule matching when no step fires.
        if let Some((endpoint, path_params)) = &resolved {
            if self.scenarios.participates(endpoint.id) {
                if let Some(hit) =
                    self.scenarios
                        .try_match(ctx, endpoint.id, endpoint.protocol, path_params)
                {
                    debug!(scenario = %hit.scenario_name, "scenario step fired");
                    return HandleOutcome::Response(self.renderer.render_step(
                        ctx,
                        &hit.step,
                        endpoint.protocol,
                        path_params,
                    ));
                }
            }
        }

        if let Some(result) = self.matcher.find_match(ctx) {
            return match self.renderer.render(ctx, &result).await {
                RenderOutcome::Response(response) => HandleOutcome::Response(response),
                RenderOutcome::Abort => HandleOutcome::Abort,
            };
        }

        // Nothing matched: try the proxy path.
        let endpoint_id = resolved.as_ref().map(|(endpoint, _)| endpoint.id);
        let config = match self.store.active_proxy_config(endpoint_id).await {
            Ok(Some(config)) if config.active => config,
            Ok(_) => return HandleOutcome::NoMatch,
            Err(err) => {
                debug!(%err, "proxy config lookup failed");
                return HandleOutcome::NoMatch;
            }
        };

        match self.proxy.forward(ctx, &config).await {
            Some(response) => {
                if config.record {
                    // The proxied response is already fixed; recording can
                    // not alter it, only enrich future matching.
                    self.recorder.record(ctx, &response, endpoint_id).await;
                }
                HandleOutcome::Response(SynthesizedResponse {
                    status: response.status,
                    headers: response.headers,
                    body: response.body,
                })
            }
            None => HandleOutcome::NoMatch,
        }
    }
}
