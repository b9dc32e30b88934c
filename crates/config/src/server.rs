//! HTTP server configuration settings.

use std::{borrow::Cow, net::SocketAddr, path::PathBuf};

use serde::Deserialize;

/// HTTP server configuration settings.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server should listen on.
    pub listen_address: Option<SocketAddr>,
    /// TLS configuration for secure connections.
    pub tls: Option<TlsServerConfig>,
    /// Health endpoint configuration.
    #[serde(default)]
    pub health: HealthConfig,
    /// Where the caller identity is read from.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Forward-auth check endpoint configuration.
    #[serde(default)]
    pub check: CheckEndpointConfig,
}

/// Trusted request headers carrying the identity resolved by an upstream proxy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    /// Header holding the authenticated user id. Requests without it are rejected.
    pub user_header: String,
    /// Header holding the active workspace id, if the request has one.
    pub workspace_header: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_header: "x-user-id".to_string(),
            workspace_header: "x-workspace-id".to_string(),
        }
    }
}

/// Forward-auth check endpoint, for reverse proxies that delegate admission.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckEndpointConfig {
    /// Whether the check endpoint is exposed.
    pub enabled: bool,
    /// The path for the check endpoint.
    pub path: Cow<'static, str>,
}

impl Default for CheckEndpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: Cow::Borrowed("/check"),
        }
    }
}

/// Certificate and key used to serve HTTPS.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsServerConfig {
    /// Path to the TLS certificate PEM file.
    pub certificate: PathBuf,
    /// Path to the TLS private key PEM file.
    pub key: PathBuf,
}

/// Health endpoint configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    /// Whether the health endpoint is enabled.
    pub enabled: bool,
    /// Serve health on a dedicated listener instead of the main one.
    pub listen: Option<SocketAddr>,
    /// The path for the health endpoint.
    pub path: Cow<'static, str>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: None,
            path: Cow::Borrowed("/health"),
        }
    }
}
