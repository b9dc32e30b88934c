//! The outcome of an admission decision.

use std::time::Duration;

use jiff::Timestamp;
use serde::Serialize;

use crate::policy::ThroughputPolicy;
use crate::scope::{CounterKey, Scope, ScopeKind};

/// Whether a request may proceed, and what the client should be told about its budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// The policy the decision was made under.
    pub policy: ThroughputPolicy,
    /// The scope the decision was made for.
    pub scope: Scope,
    /// The counter that was charged. `None` when an unlimited policy skipped counting.
    pub charged_key: Option<CounterKey>,
    /// The total of the charged counter after this request.
    pub current_count: u64,
    /// Whether the fallback budget was used.
    pub used_fallback: bool,
    /// The weight of the request.
    pub weight: u32,
    /// When the charged counter's window ends.
    pub reset_at: Option<Timestamp>,
    /// How long the client should wait before retrying. Only set on denial, and never below one second.
    pub retry_after: Option<Duration>,
}

impl AdmissionDecision {
    /// Budget left in the current window. `None` when no budget is tracked.
    pub fn remaining(&self) -> Option<u64> {
        (!self.policy.is_unlimited()).then(|| self.policy.limit().saturating_sub(self.current_count))
    }

    /// The kind of scope the decision was made for.
    pub fn scope_kind(&self) -> ScopeKind {
        self.scope.kind()
    }

    /// The structured denial to send to the client, if the request was denied.
    pub fn rejection(&self) -> Option<BudgetExceeded> {
        if self.allowed {
            return None;
        }

        Some(BudgetExceeded {
            limit: self.policy.limit(),
            window_seconds: self.policy.window().as_secs(),
            retry_after: self.retry_after.map(|retry| retry.as_secs()).unwrap_or(1),
            scope: self.scope_kind(),
            fallback: self.used_fallback,
        })
    }
}

/// A client-visible, retryable denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("Rate limit of {limit} per {window_seconds}s exceeded, retry after {retry_after}s")]
pub struct BudgetExceeded {
    /// The exhausted budget.
    pub limit: u64,
    /// The window length of the exhausted budget, in seconds.
    pub window_seconds: u64,
    /// Seconds until the budget resets.
    pub retry_after: u64,
    /// The kind of scope that was exhausted last.
    pub scope: ScopeKind,
    /// Whether the exhausted budget was the fallback budget.
    pub fallback: bool,
}
