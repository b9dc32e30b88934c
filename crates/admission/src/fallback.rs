//! Routes that stay reachable after every primary budget is spent.

use config::RouteConfig;

use crate::weights::MethodMatcher;

/// A method and path prefix on the fallback allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackRoute {
    /// Which methods the route covers.
    pub method: MethodMatcher,
    /// The path prefix of the route.
    pub path_prefix: String,
}

impl FallbackRoute {
    /// Create a route for a method (or `*`) and a path prefix.
    pub fn new(method: &str, path_prefix: impl Into<String>) -> Self {
        Self {
            method: MethodMatcher::parse(method),
            path_prefix: path_prefix.into(),
        }
    }
}

impl From<&RouteConfig> for FallbackRoute {
    fn from(config: &RouteConfig) -> Self {
        Self::new(&config.method, config.path.clone())
    }
}

/// The static fallback allow-list, loaded at startup.
///
/// Account, billing and upgrade routes belong here: a subject that spent its paid budget must still be
/// able to reach the pages that let it buy more.
#[derive(Debug, Clone, Default)]
pub struct FallbackRoutes {
    routes: Vec<FallbackRoute>,
}

impl FallbackRoutes {
    /// Build the allow-list. Routes are checked in order.
    pub fn new(routes: Vec<FallbackRoute>) -> Self {
        Self { routes }
    }

    /// Whether the request matches a route on the list.
    pub fn matches(&self, method: &str, path: &str) -> bool {
        self.routes
            .iter()
            .any(|route| route.method.matches(method) && path.starts_with(&route.path_prefix))
    }
}

impl FromIterator<FallbackRoute> for FallbackRoutes {
    fn from_iter<T: IntoIterator<Item = FallbackRoute>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
