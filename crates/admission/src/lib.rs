//! Request admission for Turnstile.
//!
//! This crate decides whether an inbound request may proceed based on the throughput budget of the
//! subjects it is metered against:
//! - The workspace the request acts in, if any
//! - The authenticated user
//! - A fallback budget under the default policy, for allow-listed routes only
//!
//! Budgets are weighted fixed windows, counted in memory.

#![deny(missing_docs)]

mod clock;
mod decision;
mod engine;
mod error;
mod fallback;
mod metrics;
mod policy;
mod request;
mod resolver;
mod scope;
mod storage;
mod weights;

pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::{AdmissionDecision, BudgetExceeded};
pub use engine::{AdmissionEngine, AdmissionEngineBuilder};
pub use error::{AdmissionError, EntitlementError, PolicyError};
pub use fallback::{FallbackRoute, FallbackRoutes};
pub use policy::ThroughputPolicy;
pub use request::{AdmissionRequest, AdmissionRequestBuilder};
pub use resolver::{EntitlementSource, ScopeResolver, StaticEntitlements};
pub use scope::{CounterKey, Namespace, Scope, ScopeKind};
pub use storage::{CounterStore, InMemoryCounterStore, StorageError, spawn_sweeper};
pub use weights::{EndpointWeight, MethodMatcher, WeightTable};
