//! Admission control configuration structures.

use std::{collections::BTreeMap, num::NonZeroU32, time::Duration};

use duration_str::deserialize_duration;
use serde::{Deserialize, Serialize};

/// Admission control configuration for the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdmissionConfig {
    /// Whether admission control is enabled.
    pub enabled: bool,
    /// Maximum time to wait for an entitlement lookup before using the default policy.
    #[serde(deserialize_with = "deserialize_duration")]
    pub entitlement_timeout: Duration,
    /// Policy applied to subjects without a plan, and to fallback routes.
    pub default_policy: PolicyConfig,
    /// Counter store settings.
    pub counters: CounterStoreConfig,
    /// Named plans that workspaces and users can be assigned to.
    pub plans: BTreeMap<String, PolicyConfig>,
    /// Workspace id to plan name assignments.
    pub workspaces: BTreeMap<String, String>,
    /// User id to plan name assignments.
    pub users: BTreeMap<String, String>,
    /// Per-endpoint request weights.
    pub weights: Vec<EndpointWeightConfig>,
    /// Routes that stay reachable under the default policy once the primary budgets are spent.
    pub fallback_routes: Vec<RouteConfig>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            entitlement_timeout: Duration::from_millis(250),
            default_policy: PolicyConfig::default(),
            counters: CounterStoreConfig::default(),
            plans: BTreeMap::new(),
            workspaces: BTreeMap::new(),
            users: BTreeMap::new(),
            weights: Vec::new(),
            fallback_routes: Vec::new(),
        }
    }
}

impl AdmissionConfig {
    /// Returns the plan assigned to a workspace, if any.
    pub fn workspace_plan(&self, workspace_id: &str) -> Option<&PolicyConfig> {
        self.workspaces.get(workspace_id).and_then(|plan| self.plans.get(plan))
    }

    /// Returns the plan assigned to a user, if any.
    pub fn user_plan(&self, user_id: &str) -> Option<&PolicyConfig> {
        self.users.get(user_id).and_then(|plan| self.plans.get(plan))
    }
}

/// A throughput budget: a weighted request limit per fixed window, or unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Maximum accumulated request weight within one window.
    #[serde(default)]
    pub limit: u64,
    /// Length of the fixed window. Truncated to whole seconds.
    #[serde(default = "default_window", deserialize_with = "deserialize_duration")]
    pub window: Duration,
    /// Disables counting entirely.
    #[serde(default)]
    pub unlimited: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            limit: 60,
            window: default_window(),
            unlimited: false,
        }
    }
}

fn default_window() -> Duration {
    Duration::from_secs(60)
}

/// In-memory counter store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CounterStoreConfig {
    /// Upper bound on tracked counter keys. Unbounded when unset.
    pub max_entries: Option<usize>,
    /// How often stale counters are reclaimed.
    #[serde(deserialize_with = "deserialize_duration")]
    pub sweep_interval: Duration,
    /// How long a counter is kept after its window ended.
    #[serde(deserialize_with = "deserialize_duration")]
    pub retention: Duration,
}

impl Default for CounterStoreConfig {
    fn default() -> Self {
        Self {
            max_entries: None,
            sweep_interval: Duration::from_secs(60),
            retention: Duration::from_secs(600),
        }
    }
}

/// Request weight for a method and path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointWeightConfig {
    /// HTTP method, or `*` for any method.
    #[serde(default = "any_method")]
    pub method: String,
    /// Path prefix the weight applies to.
    pub path: String,
    /// Budget units charged per matching request.
    pub weight: NonZeroU32,
}

/// A method and path prefix pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    /// HTTP method, or `*` for any method.
    #[serde(default = "any_method")]
    pub method: String,
    /// Path prefix of the route.
    pub path: String,
}

fn any_method() -> String {
    "*".to_string()
}
