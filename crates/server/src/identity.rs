//! Caller identity, as resolved by the authenticating proxy in front of us.

use config::IdentityConfig;
use http::HeaderMap;

/// Who is making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Identity {
    pub user_id: String,
    pub workspace_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum IdentityError {
    #[error("Missing user identity header '{0}'")]
    MissingUser(String),
}

impl Identity {
    /// Reads the identity headers. An empty workspace header counts as no workspace.
    pub fn from_headers(headers: &HeaderMap, config: &IdentityConfig) -> Result<Self, IdentityError> {
        let user_id = header_value(headers, &config.user_header)
            .ok_or_else(|| IdentityError::MissingUser(config.user_header.clone()))?;

        let workspace_id = header_value(headers, &config.workspace_header);

        Ok(Self { user_id, workspace_id })
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?.trim();

    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(value));
        }

        headers
    }

    #[test]
    fn user_and_workspace() {
        let identity = Identity::from_headers(
            &headers(&[("x-user-id", "u_1"), ("x-workspace-id", "ws_1")]),
            &IdentityConfig::default(),
        )
        .unwrap();

        assert_eq!(identity.user_id, "u_1");
        assert_eq!(identity.workspace_id.as_deref(), Some("ws_1"));
    }

    #[test]
    fn blank_workspace_is_no_workspace() {
        let identity = Identity::from_headers(
            &headers(&[("x-user-id", "u_1"), ("x-workspace-id", "  ")]),
            &IdentityConfig::default(),
        )
        .unwrap();

        assert_eq!(identity.workspace_id, None);
    }

    #[test]
    fn missing_user_is_rejected() {
        let error = Identity::from_headers(&headers(&[("x-workspace-id", "ws_1")]), &IdentityConfig::default())
            .unwrap_err();

        insta::assert_snapshot!(error, @"Missing user identity header 'x-user-id'");
    }

    #[test]
    fn custom_header_names() {
        let config = IdentityConfig {
            user_header: "x-auth-subject".to_string(),
            workspace_header: "x-auth-tenant".to_string(),
        };

        let identity = Identity::from_headers(
            &headers(&[("x-auth-subject", "u_9"), ("x-user-id", "ignored")]),
            &config,
        )
        .unwrap();

        assert_eq!(identity.user_id, "u_9");
        assert_eq!(identity.workspace_id, None);
    }
}
