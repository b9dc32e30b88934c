//! Throughput signaling headers.

use admission::AdmissionDecision;
use http::{HeaderMap, HeaderName, HeaderValue, header::RETRY_AFTER};

pub(crate) const LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub(crate) const REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub(crate) const RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub(crate) const SCOPE: HeaderName = HeaderName::from_static("x-ratelimit-scope");
pub(crate) const SCOPE_KIND: HeaderName = HeaderName::from_static("x-ratelimit-scope-kind");
pub(crate) const FALLBACK: HeaderName = HeaderName::from_static("x-ratelimit-fallback");

/// The headers telling the client where it stands with the budget that decided its request.
///
/// Unlimited decisions only carry the `unlimited` marker instead of limit, remaining and reset.
pub(crate) fn signaling_headers(decision: &AdmissionDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if decision.policy.is_unlimited() {
        headers.insert(LIMIT, HeaderValue::from_static("unlimited"));
    } else {
        headers.insert(LIMIT, HeaderValue::from(decision.policy.limit()));

        if let Some(remaining) = decision.remaining() {
            headers.insert(REMAINING, HeaderValue::from(remaining));
        }

        if let Some(reset_at) = decision.reset_at {
            headers.insert(RESET, HeaderValue::from(reset_at.as_second()));
        }
    }

    match HeaderValue::from_str(decision.scope.id()) {
        Ok(id) => {
            headers.insert(SCOPE, id);
        }
        Err(_) => log::debug!("Scope id of {} is not a valid header value, omitting it", decision.scope),
    }

    headers.insert(SCOPE_KIND, HeaderValue::from_static(decision.scope_kind().as_str()));

    let fallback = if decision.used_fallback { "true" } else { "false" };
    headers.insert(FALLBACK, HeaderValue::from_static(fallback));

    if let Some(retry_after) = decision.retry_after {
        headers.insert(RETRY_AFTER, HeaderValue::from(retry_after.as_secs()));
    }

    headers
}
