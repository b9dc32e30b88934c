//! Forward-auth endpoint, for reverse proxies that delegate admission of the requests they route.
//!
//! The proxy sends a subrequest carrying the identity headers and the original method and URI. A `204`
//! lets the original request through, anything else is returned to the client as is.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    response::{IntoResponse, Response},
    routing::any,
};
use http::{HeaderMap, Method, StatusCode, Uri};

use crate::{admission::Gate, headers::signaling_headers};

const FORWARDED_METHOD: &str = "x-forwarded-method";
const FORWARDED_URI: &str = "x-forwarded-uri";
const ORIGINAL_METHOD: &str = "x-original-method";
const ORIGINAL_URI: &str = "x-original-uri";

/// The check route. Without a gate, admission is disabled and every request is let through.
pub(crate) fn router(path: &str, gate: Option<Arc<Gate>>) -> Router {
    Router::new().route(path, any(check)).with_state(gate)
}

async fn check(State(gate): State<Option<Arc<Gate>>>, method: Method, uri: Uri, headers: HeaderMap) -> Response<Body> {
    let Some(gate) = gate else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let method = forwarded(&headers, FORWARDED_METHOD, ORIGINAL_METHOD).unwrap_or(method.as_str());

    let path = forwarded(&headers, FORWARDED_URI, ORIGINAL_URI)
        .map(|uri| uri.split_once('?').map_or(uri, |(path, _)| path))
        .unwrap_or(uri.path());

    match gate.admit(method, path, &headers).await {
        Ok(decision) => (StatusCode::NO_CONTENT, signaling_headers(&decision)).into_response(),
        Err(refusal) => refusal.into_response(),
    }
}

fn forwarded<'a>(headers: &'a HeaderMap, primary: &str, secondary: &str) -> Option<&'a str> {
    [primary, secondary]
        .into_iter()
        .filter_map(|name| headers.get(name)?.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use admission::{
        AdmissionEngine, CounterKey, CounterStore, FallbackRoute, FallbackRoutes, StorageError, ThroughputPolicy,
    };
    use config::IdentityConfig;
    use http::Request;
    use jiff::Timestamp;
    use tower::ServiceExt;

    use super::*;

    fn gate() -> Arc<Gate> {
        let engine = AdmissionEngine::builder(ThroughputPolicy::limited(1, Duration::from_secs(60)).unwrap())
            .fallback_routes(FallbackRoutes::new(vec![FallbackRoute::new("GET", "/billing")]))
            .build();

        Arc::new(Gate::new(Arc::new(engine), IdentityConfig::default()))
    }

    struct BrokenStore;

    impl CounterStore for BrokenStore {
        fn increment(&self, _: &CounterKey, _: Duration, _: u64) -> Result<u64, StorageError> {
            Err(StorageError::Internal("connection reset".into()))
        }

        fn window_reset(&self, _: &CounterKey) -> Option<Timestamp> {
            None
        }
    }

    fn check_request(headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri("/check");

        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn disabled_admission_lets_everything_through() {
        let response = router("/check", None).oneshot(check_request(&[])).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().is_empty());
    }

    #[tokio::test]
    async fn unknown_caller_is_unauthorized() {
        let response = router("/check", Some(gate()))
            .oneshot(check_request(&[("x-forwarded-uri", "/v1/projects")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admits_then_denies_the_forwarded_request() {
        let app = router("/check", Some(gate()));
        let headers = [
            ("x-user-id", "u_1"),
            ("x-forwarded-method", "POST"),
            ("x-forwarded-uri", "/v1/projects?page=2"),
        ];

        let allowed = app.clone().oneshot(check_request(&headers)).await.unwrap();

        assert_eq!(allowed.status(), StatusCode::NO_CONTENT);
        assert_eq!(allowed.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(allowed.headers()["x-ratelimit-scope"], "u_1");

        let denied = app.oneshot(check_request(&headers)).await.unwrap();

        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(denied.headers().contains_key("retry-after"));
    }

    #[tokio::test]
    async fn original_headers_select_the_fallback_route() {
        let app = router("/check", Some(gate()));

        app.clone()
            .oneshot(check_request(&[("x-user-id", "u_1")]))
            .await
            .unwrap();

        let response = app
            .oneshot(check_request(&[
                ("x-user-id", "u_1"),
                ("x-original-method", "GET"),
                ("x-original-uri", "/billing/invoices"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()["x-ratelimit-fallback"], "true");
    }

    #[tokio::test]
    async fn counter_failure_is_an_opaque_server_error() {
        let engine = AdmissionEngine::builder(ThroughputPolicy::limited(1, Duration::from_secs(60)).unwrap())
            .store(Arc::new(BrokenStore))
            .build();

        let gate = Arc::new(Gate::new(Arc::new(engine), IdentityConfig::default()));

        let response = router("/check", Some(gate))
            .oneshot(check_request(&[("x-user-id", "u_1"), ("x-forwarded-uri", "/v1/projects")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
        assert!(response.headers().get("retry-after").is_none());

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();

        insta::assert_snapshot!(String::from_utf8_lossy(&body), @r#"{"error":"internal_error","error_description":"Internal server error"}"#);
    }

    #[test]
    fn forwarded_headers_win_over_original_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGINAL_URI, "/original".parse().unwrap());
        headers.insert(FORWARDED_URI, "/forwarded".parse().unwrap());

        assert_eq!(forwarded(&headers, FORWARDED_URI, ORIGINAL_URI), Some("/forwarded"));

        headers.insert(FORWARDED_URI, "".parse().unwrap());

        assert_eq!(forwarded(&headers, FORWARDED_URI, ORIGINAL_URI), Some("/original"));
        assert_eq!(forwarded(&headers, FORWARDED_METHOD, ORIGINAL_METHOD), None);
    }
}
