//! Per-endpoint request weights.

use std::num::NonZeroU32;

use config::EndpointWeightConfig;

/// Matches an HTTP method, case-insensitively, or any method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodMatcher {
    /// Matches every method.
    Any,
    /// Matches one method, stored uppercase.
    Exact(String),
}

impl MethodMatcher {
    /// Parses `*` as any method, everything else as an exact method.
    pub fn parse(method: &str) -> Self {
        match method.trim() {
            "*" => Self::Any,
            method => Self::Exact(method.to_ascii_uppercase()),
        }
    }

    /// Whether the given method matches.
    pub fn matches(&self, method: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected.eq_ignore_ascii_case(method),
        }
    }

    fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }
}

/// The cost of requests to a method and path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointWeight {
    /// Which methods this weight applies to.
    pub method: MethodMatcher,
    /// The path prefix this weight applies to.
    pub path_prefix: String,
    /// Budget units per request.
    pub weight: NonZeroU32,
}

impl EndpointWeight {
    /// Create a weight for a method (or `*`) and a path prefix.
    pub fn new(method: &str, path_prefix: impl Into<String>, weight: NonZeroU32) -> Self {
        Self {
            method: MethodMatcher::parse(method),
            path_prefix: path_prefix.into(),
            weight,
        }
    }

    fn matches(&self, method: &str, path: &str) -> bool {
        self.method.matches(method) && path.starts_with(&self.path_prefix)
    }
}

impl From<&EndpointWeightConfig> for EndpointWeight {
    fn from(config: &EndpointWeightConfig) -> Self {
        Self::new(&config.method, config.path.clone(), config.weight)
    }
}

/// Resolves a request to its weight. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct WeightTable {
    entries: Vec<EndpointWeight>,
}

impl WeightTable {
    /// Build a table. Order of entries does not matter.
    pub fn new(entries: Vec<EndpointWeight>) -> Self {
        Self { entries }
    }

    /// The weight of the most specific matching entry, or 1 if nothing matches.
    ///
    /// The longest matching prefix wins; between equally long prefixes an exact method beats `*`.
    pub fn weight_of(&self, method: &str, path: &str) -> u32 {
        self.entries
            .iter()
            .filter(|entry| entry.matches(method, path))
            .max_by_key(|entry| (entry.path_prefix.len(), entry.method.is_exact()))
            .map(|entry| entry.weight.get())
            .unwrap_or(1)
    }
}

impl FromIterator<EndpointWeight> for WeightTable {
    fn from_iter<T: IntoIterator<Item = EndpointWeight>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
