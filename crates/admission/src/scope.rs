//! Metered subjects and the keys their counters are stored under.

use std::fmt;

use serde::Serialize;

/// The entity a request is metered against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// An individual user, identified by user id.
    User(String),
    /// A tenant workspace, identified by workspace id.
    Workspace(String),
}

impl Scope {
    /// Create a user scope.
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }

    /// Create a workspace scope.
    pub fn workspace(id: impl Into<String>) -> Self {
        Self::Workspace(id.into())
    }

    /// The subject identifier.
    pub fn id(&self) -> &str {
        match self {
            Self::User(id) | Self::Workspace(id) => id,
        }
    }

    /// Which kind of subject this is.
    pub fn kind(&self) -> ScopeKind {
        match self {
            Self::User(_) => ScopeKind::User,
            Self::Workspace(_) => ScopeKind::Workspace,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// The kind of a [`Scope`], without its identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    /// A user scope.
    User,
    /// A workspace scope.
    Workspace,
}

impl ScopeKind {
    /// The lowercase name used in logs, metrics and response headers.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Workspace => "workspace",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Separates the fallback budget of a subject from its primary budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// The budget granted by the subject's entitlement.
    Primary,
    /// The free-tier budget that keeps fallback routes reachable.
    Fallback,
}

/// Identifies one counter in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    scope: Scope,
    namespace: Namespace,
}

impl CounterKey {
    /// The primary counter of a scope.
    pub fn primary(scope: Scope) -> Self {
        Self {
            scope,
            namespace: Namespace::Primary,
        }
    }

    /// The fallback counter of a scope.
    pub fn fallback(scope: Scope) -> Self {
        Self {
            scope,
            namespace: Namespace::Fallback,
        }
    }

    /// The scope this counter meters.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The budget namespace of this counter.
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace {
            Namespace::Primary => write!(f, "{}", self.scope),
            Namespace::Fallback => write!(f, "{}:fallback", self.scope),
        }
    }
}
