//! Resolves the throughput policy of a scope from its entitlement.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use config::AdmissionConfig;

use crate::error::{EntitlementError, PolicyError};
use crate::policy::ThroughputPolicy;
use crate::scope::Scope;

/// Looks up the entitlement of a subject, typically from its active subscription or plan.
#[async_trait]
pub trait EntitlementSource: Send + Sync {
    /// The policy the subject is entitled to, or `None` if it has no specific entitlement.
    async fn entitlement(&self, scope: &Scope) -> Result<Option<ThroughputPolicy>, EntitlementError>;
}

/// Entitlements assigned in configuration: named plans, and workspaces and users mapped to them.
#[derive(Debug, Clone, Default)]
pub struct StaticEntitlements {
    workspaces: HashMap<String, ThroughputPolicy>,
    users: HashMap<String, ThroughputPolicy>,
}

impl StaticEntitlements {
    /// Create an empty set of entitlements.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entitle a workspace to a policy.
    pub fn workspace(mut self, id: impl Into<String>, policy: ThroughputPolicy) -> Self {
        self.workspaces.insert(id.into(), policy);
        self
    }

    /// Entitle a user to a policy.
    pub fn user(mut self, id: impl Into<String>, policy: ThroughputPolicy) -> Self {
        self.users.insert(id.into(), policy);
        self
    }

    /// Resolve the plan assignments of the admission configuration.
    ///
    /// Assignments to undefined plans are skipped with a warning; the loader rejects them beforehand.
    pub fn from_config(config: &AdmissionConfig) -> Result<Self, PolicyError> {
        let mut entitlements = Self::new();

        for (id, plan) in &config.workspaces {
            match config.workspace_plan(id) {
                Some(policy) => entitlements = entitlements.workspace(id, ThroughputPolicy::try_from(policy)?),
                None => log::warn!("Workspace '{id}' is assigned to undefined plan '{plan}', using the default policy"),
            }
        }

        for (id, plan) in &config.users {
            match config.user_plan(id) {
                Some(policy) => entitlements = entitlements.user(id, ThroughputPolicy::try_from(policy)?),
                None => log::warn!("User '{id}' is assigned to undefined plan '{plan}', using the default policy"),
            }
        }

        Ok(entitlements)
    }
}

#[async_trait]
impl EntitlementSource for StaticEntitlements {
    async fn entitlement(&self, scope: &Scope) -> Result<Option<ThroughputPolicy>, EntitlementError> {
        let policies = match scope {
            Scope::User(_) => &self.users,
            Scope::Workspace(_) => &self.workspaces,
        };

        Ok(policies.get(scope.id()).copied())
    }
}

/// Turns a scope into the policy that applies to it.
///
/// Never fails: a subject without an entitlement, a failing source and a slow source all get the
/// default policy.
#[derive(Clone)]
pub struct ScopeResolver {
    source: Arc<dyn EntitlementSource>,
    default_policy: ThroughputPolicy,
    timeout: Duration,
}

impl ScopeResolver {
    /// Create a resolver over an entitlement source.
    pub fn new(source: Arc<dyn EntitlementSource>, default_policy: ThroughputPolicy, timeout: Duration) -> Self {
        Self {
            source,
            default_policy,
            timeout,
        }
    }

    /// The system-wide free policy.
    pub fn default_policy(&self) -> ThroughputPolicy {
        self.default_policy
    }

    /// The policy for a scope.
    pub async fn resolve_policy(&self, scope: &Scope) -> ThroughputPolicy {
        let lookup = tokio::time::timeout(self.timeout, self.source.entitlement(scope));

        let result = match lookup.await {
            Ok(result) => result,
            Err(_) => Err(EntitlementError::Timeout(self.timeout)),
        };

        match result {
            Ok(Some(policy)) => policy,
            Ok(None) => {
                log::trace!("No entitlement for {scope}, using the default policy");
                self.default_policy
            }
            Err(error) => {
                log::warn!("Entitlement lookup for {scope} failed, using the default policy: {error}");
                self.default_policy
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use indoc::indoc;

    use super::*;

    fn policy(limit: u64) -> ThroughputPolicy {
        ThroughputPolicy::limited(limit, Duration::from_secs(60)).unwrap()
    }

    struct Failing;

    #[async_trait]
    impl EntitlementSource for Failing {
        async fn entitlement(&self, _: &Scope) -> Result<Option<ThroughputPolicy>, EntitlementError> {
            Err(EntitlementError::Unavailable("connection refused".to_string()))
        }
    }

    struct Slow(AtomicUsize);

    #[async_trait]
    impl EntitlementSource for Slow {
        async fn entitlement(&self, _: &Scope) -> Result<Option<ThroughputPolicy>, EntitlementError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;

            Ok(Some(ThroughputPolicy::unlimited()))
        }
    }

    #[tokio::test]
    async fn entitled_subjects_get_their_policy() {
        let source = StaticEntitlements::new()
            .workspace("ws_1", policy(1000))
            .user("u_1", ThroughputPolicy::unlimited());

        let resolver = ScopeResolver::new(Arc::new(source), policy(10), Duration::from_secs(1));

        assert_eq!(resolver.resolve_policy(&Scope::workspace("ws_1")).await, policy(1000));
        assert!(resolver.resolve_policy(&Scope::user("u_1")).await.is_unlimited());
    }

    #[tokio::test]
    async fn unknown_subjects_get_the_default() {
        let source = StaticEntitlements::new().workspace("shared_id", policy(1000));
        let resolver = ScopeResolver::new(Arc::new(source), policy(10), Duration::from_secs(1));

        assert_eq!(resolver.resolve_policy(&Scope::user("shared_id")).await, policy(10));
        assert_eq!(resolver.resolve_policy(&Scope::workspace("ws_2")).await, policy(10));
    }

    #[tokio::test]
    async fn failing_source_degrades_to_default() {
        let resolver = ScopeResolver::new(Arc::new(Failing), policy(10), Duration::from_secs(1));

        assert_eq!(resolver.resolve_policy(&Scope::workspace("ws_1")).await, policy(10));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_source_times_out_to_default() {
        let source = Arc::new(Slow(AtomicUsize::new(0)));
        let resolver = ScopeResolver::new(source.clone(), policy(10), Duration::from_millis(250));

        assert_eq!(resolver.resolve_policy(&Scope::user("u_1")).await, policy(10));
        assert_eq!(source.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn entitlements_from_config() {
        let config: AdmissionConfig = toml::from_str(indoc! {r#"
            [plans.pro]
            limit = 5000
            window = "1h"

            [plans.enterprise]
            unlimited = true

            [workspaces]
            ws_acme = "pro"

            [users]
            u_root = "enterprise"
            u_lost = "missing"
        "#})
        .unwrap();

        let source = StaticEntitlements::from_config(&config).unwrap();

        let acme = source.entitlement(&Scope::workspace("ws_acme")).await.unwrap();
        assert_eq!(acme, Some(ThroughputPolicy::limited(5000, Duration::from_secs(3600)).unwrap()));

        let root = source.entitlement(&Scope::user("u_root")).await.unwrap();
        assert!(root.is_some_and(|policy| policy.is_unlimited()));

        assert_eq!(source.entitlement(&Scope::user("u_lost")).await.unwrap(), None);
    }
}
