//! Admission engine implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use config::AdmissionConfig;
use jiff::Timestamp;
use telemetry::Meter;

use crate::clock::{Clock, SystemClock};
use crate::decision::AdmissionDecision;
use crate::error::{AdmissionError, PolicyError};
use crate::fallback::{FallbackRoute, FallbackRoutes};
use crate::metrics::AdmissionMetrics;
use crate::policy::ThroughputPolicy;
use crate::request::AdmissionRequest;
use crate::resolver::{EntitlementSource, ScopeResolver, StaticEntitlements};
use crate::scope::{CounterKey, Scope};
use crate::storage::{CounterStore, InMemoryCounterStore};
use crate::weights::{EndpointWeight, WeightTable};

/// Decides, per request, whether the calling workspace or user still has throughput budget.
///
/// Budgets are tried in priority order: the workspace budget if the request carries a workspace, then
/// the user budget, then, for allow-listed routes only, a fallback budget under the default policy.
/// Every budget that is tried gets charged, including an exhausted one the request then falls through.
pub struct AdmissionEngine {
    store: Arc<dyn CounterStore>,
    resolver: ScopeResolver,
    weights: WeightTable,
    fallback: FallbackRoutes,
    clock: Arc<dyn Clock>,
    metrics: AdmissionMetrics,
}

impl AdmissionEngine {
    /// Start building an engine around the system-wide default policy.
    pub fn builder(default_policy: ThroughputPolicy) -> AdmissionEngineBuilder {
        AdmissionEngineBuilder::new(default_policy)
    }

    /// Build an engine from configuration, with its own in-memory counter store.
    pub fn from_config(config: &AdmissionConfig) -> Result<Self, PolicyError> {
        Ok(AdmissionEngineBuilder::from_config(config)?.build())
    }

    /// The weight a request would be charged.
    pub fn weight_of(&self, method: &str, path: &str) -> u32 {
        self.weights.weight_of(method, path)
    }

    /// Decide whether a request may proceed.
    ///
    /// An exhausted budget yields a denied decision. An error means the counter store failed and the
    /// request could not be judged at all.
    pub async fn decide(&self, request: &AdmissionRequest) -> Result<AdmissionDecision, AdmissionError> {
        let start = Instant::now();

        match self.evaluate(request).await {
            Ok(decision) => {
                log::debug!(
                    "Admission for {} {} by user '{}': allowed={}, scope={}, count={}, weight={}, fallback={}",
                    request.method,
                    request.path,
                    request.user_id,
                    decision.allowed,
                    decision.scope,
                    decision.current_count,
                    decision.weight,
                    decision.used_fallback,
                );

                self.metrics.record_decision(&decision, start.elapsed());

                Ok(decision)
            }
            Err(error) => {
                log::error!(
                    "Admission for {} {} by user '{}' failed: {error}",
                    request.method,
                    request.path,
                    request.user_id
                );

                self.metrics.record_counter_fault();

                Err(error)
            }
        }
    }

    async fn evaluate(&self, request: &AdmissionRequest) -> Result<AdmissionDecision, AdmissionError> {
        let weight = self.weights.weight_of(&request.method, &request.path);

        if let Some(workspace_id) = &request.workspace_id {
            let scope = Scope::workspace(workspace_id.as_str());
            let policy = self.resolver.resolve_policy(&scope).await;
            let decision = self.charge(CounterKey::primary(scope), policy, weight)?;

            if decision.allowed {
                return Ok(decision);
            }

            // The request now falls through to the user's personal budget, which gets charged for it.
            log::debug!("Workspace '{workspace_id}' exhausted its budget, falling back to the user budget");
        }

        let scope = Scope::user(request.user_id.as_str());
        let policy = self.resolver.resolve_policy(&scope).await;
        let decision = self.charge(CounterKey::primary(scope.clone()), policy, weight)?;

        if decision.allowed {
            return Ok(decision);
        }

        if !self.fallback.matches(&request.method, &request.path) {
            log::debug!("User '{}' exhausted its budget on {}", request.user_id, request.path);
            return Ok(decision);
        }

        let policy = self.resolver.default_policy();
        let mut decision = self.charge(CounterKey::fallback(scope), policy, weight)?;
        decision.used_fallback = true;

        Ok(decision)
    }

    fn charge(&self, key: CounterKey, policy: ThroughputPolicy, weight: u32) -> Result<AdmissionDecision, AdmissionError> {
        if policy.is_unlimited() {
            return Ok(AdmissionDecision {
                allowed: true,
                policy,
                scope: key.scope().clone(),
                charged_key: None,
                current_count: 0,
                used_fallback: false,
                weight,
                reset_at: None,
                retry_after: None,
            });
        }

        let current_count = self.store.increment(&key, policy.window(), u64::from(weight))?;
        let allowed = current_count <= policy.limit();
        let reset_at = self.store.window_reset(&key);

        let retry_after = (!allowed).then(|| retry_after(self.clock.now(), reset_at, policy.window()));

        Ok(AdmissionDecision {
            allowed,
            policy,
            scope: key.scope().clone(),
            charged_key: Some(key),
            current_count,
            used_fallback: false,
            weight,
            reset_at,
            retry_after,
        })
    }
}

/// Seconds until the window resets, rounded up and never below one.
fn retry_after(now: Timestamp, reset_at: Option<Timestamp>, window: Duration) -> Duration {
    let Some(reset_at) = reset_at else {
        return window.max(Duration::from_secs(1));
    };

    let remaining = now.duration_until(reset_at);
    let mut seconds = remaining.as_secs();

    if remaining.subsec_nanos() > 0 {
        seconds += 1;
    }

    Duration::from_secs(u64::try_from(seconds).unwrap_or(0).max(1))
}

/// Builder for [`AdmissionEngine`].
pub struct AdmissionEngineBuilder {
    default_policy: ThroughputPolicy,
    store: Option<Arc<dyn CounterStore>>,
    entitlements: Arc<dyn EntitlementSource>,
    entitlement_timeout: Duration,
    weights: WeightTable,
    fallback: FallbackRoutes,
    clock: Arc<dyn Clock>,
    max_entries: Option<usize>,
    meter: Option<Meter>,
}

impl AdmissionEngineBuilder {
    fn new(default_policy: ThroughputPolicy) -> Self {
        Self {
            default_policy,
            store: None,
            entitlements: Arc::new(StaticEntitlements::new()),
            entitlement_timeout: Duration::from_millis(250),
            weights: WeightTable::default(),
            fallback: FallbackRoutes::default(),
            clock: Arc::new(SystemClock),
            max_entries: None,
            meter: None,
        }
    }

    /// A builder populated from configuration: default policy, plan entitlements, weights, fallback
    /// routes and counter store capacity.
    pub fn from_config(config: &AdmissionConfig) -> Result<Self, PolicyError> {
        let default_policy = ThroughputPolicy::try_from(&config.default_policy)?;

        let mut builder = Self::new(default_policy)
            .entitlements(Arc::new(StaticEntitlements::from_config(config)?))
            .entitlement_timeout(config.entitlement_timeout)
            .weights(config.weights.iter().map(EndpointWeight::from).collect())
            .fallback_routes(config.fallback_routes.iter().map(FallbackRoute::from).collect());

        builder.max_entries = config.counters.max_entries;

        Ok(builder)
    }

    /// Use the given counter store. Defaults to a new [`InMemoryCounterStore`] on the engine's clock.
    pub fn store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use the given entitlement source. Defaults to no entitlements, so everyone gets the default policy.
    pub fn entitlements(mut self, entitlements: Arc<dyn EntitlementSource>) -> Self {
        self.entitlements = entitlements;
        self
    }

    /// How long to wait for an entitlement lookup before using the default policy.
    pub fn entitlement_timeout(mut self, timeout: Duration) -> Self {
        self.entitlement_timeout = timeout;
        self
    }

    /// Use the given endpoint weights.
    pub fn weights(mut self, weights: WeightTable) -> Self {
        self.weights = weights;
        self
    }

    /// Use the given fallback allow-list.
    pub fn fallback_routes(mut self, fallback: FallbackRoutes) -> Self {
        self.fallback = fallback;
        self
    }

    /// Use the given clock for retry hints, and for the default store.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Record decision metrics on the given meter instead of the global one.
    pub fn meter(mut self, meter: Meter) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Build the engine.
    pub fn build(self) -> AdmissionEngine {
        let store: Arc<dyn CounterStore> = match self.store {
            Some(store) => store,
            None => {
                let store = InMemoryCounterStore::with_clock(self.clock.clone());

                match self.max_entries {
                    Some(max_entries) => Arc::new(store.max_entries(max_entries)),
                    None => Arc::new(store),
                }
            }
        };

        AdmissionEngine {
            store,
            resolver: ScopeResolver::new(self.entitlements, self.default_policy, self.entitlement_timeout),
            weights: self.weights,
            fallback: self.fallback,
            clock: self.clock,
            metrics: AdmissionMetrics::new(&self.meter.unwrap_or_else(telemetry::metrics::meter)),
        }
    }
}
