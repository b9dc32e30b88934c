//! Admission middleware for HTTP requests.

use std::{
    fmt::Display,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use admission::{AdmissionDecision, AdmissionEngine, AdmissionRequest};
use axum::{body::Body, response::IntoResponse};
use config::IdentityConfig;
use http::{HeaderMap, Request, Response};
use tower::Layer;

use crate::{headers::signaling_headers, identity::Identity, response::Refusal};

/// The engine together with where to find the caller identity.
pub(crate) struct Gate {
    engine: Arc<AdmissionEngine>,
    identity: IdentityConfig,
}

impl Gate {
    pub fn new(engine: Arc<AdmissionEngine>, identity: IdentityConfig) -> Self {
        Self { engine, identity }
    }

    /// Decide on a request. Only admitted requests yield a decision.
    pub async fn admit(&self, method: &str, path: &str, headers: &HeaderMap) -> Result<AdmissionDecision, Refusal> {
        let identity = match Identity::from_headers(headers, &self.identity) {
            Ok(identity) => identity,
            Err(error) => {
                log::debug!("Rejecting {method} {path}: {error}");
                return Err(Refusal::Unauthorized(error));
            }
        };

        let request = AdmissionRequest::builder(identity.user_id)
            .method(method)
            .path(path)
            .maybe_workspace(identity.workspace_id)
            .build();

        let decision = match self.engine.decide(&request).await {
            Ok(decision) => decision,
            // Already logged by the engine.
            Err(_) => return Err(Refusal::Fault),
        };

        match decision.rejection() {
            Some(rejection) => Err(Refusal::Exhausted(Box::new(decision), rejection)),
            None => Ok(decision),
        }
    }
}

/// Tower layer admitting requests before they reach the wrapped service.
///
/// Admitted responses carry the throughput signaling headers.
#[derive(Clone)]
pub struct AdmissionLayer(Arc<Gate>);

impl AdmissionLayer {
    /// Create a layer around an engine, reading the caller identity from the configured headers.
    pub fn new(engine: Arc<AdmissionEngine>, identity: IdentityConfig) -> Self {
        Self(Arc::new(Gate::new(engine, identity)))
    }
}

impl<Service> Layer<Service> for AdmissionLayer
where
    Service: Send + Clone,
{
    type Service = AdmissionService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        AdmissionService {
            next,
            gate: self.0.clone(),
        }
    }
}

/// Service produced by [`AdmissionLayer`].
#[derive(Clone)]
pub struct AdmissionService<Service> {
    next: Service,
    gate: Arc<Gate>,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for AdmissionService<Service>
where
    Service: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    Service::Future: Send,
    Service::Error: Display + 'static,
    ReqBody: http_body::Body + Send + 'static,
{
    type Response = Response<Body>;
    type Error = Service::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let mut next = self.next.clone();
        let gate = self.gate.clone();

        Box::pin(async move {
            let decision = match gate.admit(req.method().as_str(), req.uri().path(), req.headers()).await {
                Ok(decision) => decision,
                Err(refusal) => return Ok(refusal.into_response()),
            };

            let mut response = next.call(req).await?;
            response.headers_mut().extend(signaling_headers(&decision));

            Ok(response)
        })
    }
}
