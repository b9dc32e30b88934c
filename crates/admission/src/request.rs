//! Request information for admission control.

/// What the admission engine needs to know about an inbound request.
///
/// The user is mandatory: unauthenticated requests are turned away before admission runs.
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    /// HTTP method, verbatim.
    pub method: String,
    /// Request path, verbatim.
    pub path: String,
    /// The workspace the request acts in, if any.
    pub workspace_id: Option<String>,
    /// The authenticated user.
    pub user_id: String,
}

impl AdmissionRequest {
    /// Create a new builder for an authenticated user.
    pub fn builder(user_id: impl Into<String>) -> AdmissionRequestBuilder {
        AdmissionRequestBuilder {
            method: "GET".to_string(),
            path: "/".to_string(),
            workspace_id: None,
            user_id: user_id.into(),
        }
    }
}

/// Builder for creating admission requests.
#[derive(Debug)]
pub struct AdmissionRequestBuilder {
    method: String,
    path: String,
    workspace_id: Option<String>,
    user_id: String,
}

impl AdmissionRequestBuilder {
    /// Set the HTTP method. Defaults to `GET`.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Set the request path. Defaults to `/`.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Attach the workspace the request acts in.
    pub fn workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    /// Attach the workspace if there is one.
    pub fn maybe_workspace(mut self, workspace_id: Option<impl Into<String>>) -> Self {
        self.workspace_id = workspace_id.map(Into::into);
        self
    }

    /// Build the admission request.
    pub fn build(self) -> AdmissionRequest {
        AdmissionRequest {
            method: self.method,
            path: self.path,
            workspace_id: self.workspace_id,
            user_id: self.user_id,
        }
    }
}
