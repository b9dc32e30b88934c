//! Error responses of the admission surfaces.

use admission::{AdmissionDecision, BudgetExceeded};
use axum::{
    Json,
    body::Body,
    response::{IntoResponse, Response},
};
use http::StatusCode;
use serde::Serialize;

use crate::{headers::signaling_headers, identity::IdentityError};

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    error_description: String,
    #[serde(flatten)]
    budget: Option<&'a BudgetExceeded>,
}

/// Why a request was turned away.
#[derive(Debug)]
pub(crate) enum Refusal {
    /// Nobody to meter the request against.
    Unauthorized(IdentityError),
    /// The last budget tried is spent.
    Exhausted(Box<AdmissionDecision>, BudgetExceeded),
    /// The counters failed, so the request could not be judged.
    Fault,
}

impl IntoResponse for Refusal {
    fn into_response(self) -> Response<Body> {
        match self {
            Refusal::Unauthorized(error) => unauthorized(&error),
            Refusal::Exhausted(decision, rejection) => too_many_requests(&decision, &rejection),
            Refusal::Fault => internal_error(),
        }
    }
}

/// `401`: nobody to meter the request against.
fn unauthorized(error: &IdentityError) -> Response<Body> {
    let body = ErrorBody {
        error: "unauthorized",
        error_description: error.to_string(),
        budget: None,
    };

    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

/// `429` with the signaling headers, `Retry-After` and the structured denial.
fn too_many_requests(decision: &AdmissionDecision, rejection: &BudgetExceeded) -> Response<Body> {
    let body = ErrorBody {
        error: "rate_limit_exceeded",
        error_description: rejection.to_string(),
        budget: Some(rejection),
    };

    (StatusCode::TOO_MANY_REQUESTS, signaling_headers(decision), Json(body)).into_response()
}

/// `500` without details. Admission could not be decided.
fn internal_error() -> Response<Body> {
    let body = ErrorBody {
        error: "internal_error",
        error_description: "Internal server error".to_string(),
        budget: None,
    };

    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
