use indoc::indoc;
use integration_tests::TestServer;
use serde_json::{Value, json};

const CONFIG: &str = indoc! {r#"
    [admission]
    enabled = true
    default_policy = { limit = 2, window = "60s" }

    [admission.plans.team]
    limit = 3
    window = "60s"

    [admission.plans.internal]
    unlimited = true

    [admission.workspaces]
    ws_acme = "team"

    [admission.users]
    u_staff = "internal"

    [[admission.weights]]
    method = "POST"
    path = "/v1/exports"
    weight = 3

    [[admission.fallback_routes]]
    path = "/billing"

    [[admission.fallback_routes]]
    method = "POST"
    path = "/subscriptions/upgrade"
"#};

fn header(response: &reqwest::Response, name: &str) -> Value {
    response
        .headers()
        .get(name)
        .map(|value| Value::from(value.to_str().unwrap()))
        .unwrap_or(Value::Null)
}

/// Status and the stable signaling headers. Reset and retry hints depend on the wall clock.
fn summary(response: &reqwest::Response) -> Value {
    json!({
        "fallback": header(response, "x-ratelimit-fallback"),
        "has_retry_after": response.headers().contains_key("retry-after"),
        "limit": header(response, "x-ratelimit-limit"),
        "remaining": header(response, "x-ratelimit-remaining"),
        "scope": header(response, "x-ratelimit-scope"),
        "scope_kind": header(response, "x-ratelimit-scope-kind"),
        "status": response.status().as_u16()
    })
}

#[tokio::test]
async fn budgets_are_tried_workspace_user_fallback() {
    let server = TestServer::start(CONFIG).await;
    let mut results = Vec::new();

    // Three on the team plan, two more on the user default.
    for _ in 0..5 {
        let response = server.client.check("u_1", Some("ws_acme"), "GET", "/v1/projects").await;
        results.push(summary(&response));
    }

    let denied = server.client.check("u_1", Some("ws_acme"), "GET", "/v1/projects").await;
    results.push(summary(&denied));

    let billing = server.client.check("u_1", Some("ws_acme"), "GET", "/billing/invoices").await;
    results.push(summary(&billing));

    insta::assert_json_snapshot!(results, @r#"
    [
      {
        "fallback": "false",
        "has_retry_after": false,
        "limit": "3",
        "remaining": "2",
        "scope": "ws_acme",
        "scope_kind": "workspace",
        "status": 204
      },
      {
        "fallback": "false",
        "has_retry_after": false,
        "limit": "3",
        "remaining": "1",
        "scope": "ws_acme",
        "scope_kind": "workspace",
        "status": 204
      },
      {
        "fallback": "false",
        "has_retry_after": false,
        "limit": "3",
        "remaining": "0",
        "scope": "ws_acme",
        "scope_kind": "workspace",
        "status": 204
      },
      {
        "fallback": "false",
        "has_retry_after": false,
        "limit": "2",
        "remaining": "1",
        "scope": "u_1",
        "scope_kind": "user",
        "status": 204
      },
      {
        "fallback": "false",
        "has_retry_after": false,
        "limit": "2",
        "remaining": "0",
        "scope": "u_1",
        "scope_kind": "user",
        "status": 204
      },
      {
        "fallback": "false",
        "has_retry_after": true,
        "limit": "2",
        "remaining": "0",
        "scope": "u_1",
        "scope_kind": "user",
        "status": 429
      },
      {
        "fallback": "true",
        "has_retry_after": false,
        "limit": "2",
        "remaining": "1",
        "scope": "u_1",
        "scope_kind": "user",
        "status": 204
      }
    ]
    "#);
}

#[tokio::test]
async fn denial_body() {
    let server = TestServer::start(CONFIG).await;

    for _ in 0..2 {
        server.client.check("u_1", None, "GET", "/v1/projects").await;
    }

    let response = server.client.check("u_1", None, "GET", "/v1/projects").await;
    assert_eq!(response.status(), 429);

    let retry_after: u64 = response.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after));

    let reset: i64 = response.headers()["x-ratelimit-reset"].to_str().unwrap().parse().unwrap();
    assert!(reset > 0);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["retry_after"], retry_after);

    let description = body["error_description"].as_str().unwrap();
    assert!(description.starts_with("Rate limit of 2 per 60s exceeded"));

    insta::assert_json_snapshot!(json!({
        "error": body["error"],
        "fallback": body["fallback"],
        "limit": body["limit"],
        "scope": body["scope"],
        "window_seconds": body["window_seconds"],
    }), @r#"
    {
      "error": "rate_limit_exceeded",
      "fallback": false,
      "limit": 2,
      "scope": "user",
      "window_seconds": 60
    }
    "#);
}

#[tokio::test]
async fn unauthenticated_requests_are_not_metered() {
    let server = TestServer::start(CONFIG).await;

    let response = server
        .client
        .request(reqwest::Method::GET, "/check")
        .header("x-workspace-id", "ws_acme")
        .header("x-forwarded-uri", "/v1/projects")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);

    let body: Value = response.json().await.unwrap();

    insta::assert_json_snapshot!(body, @r#"
    {
      "error": "unauthorized",
      "error_description": "Missing user identity header 'x-user-id'"
    }
    "#);

    // The workspace budget is untouched.
    let response = server.client.check("u_1", Some("ws_acme"), "GET", "/v1/projects").await;
    assert_eq!(header(&response, "x-ratelimit-remaining"), "2");
}

#[tokio::test]
async fn weighted_endpoints_spend_more_budget() {
    let server = TestServer::start(CONFIG).await;

    let export = server.client.check("u_1", Some("ws_acme"), "POST", "/v1/exports").await;
    let read = server.client.check("u_1", Some("ws_acme"), "GET", "/v1/exports").await;

    insta::assert_json_snapshot!([summary(&export), summary(&read)], @r#"
    [
      {
        "fallback": "false",
        "has_retry_after": false,
        "limit": "3",
        "remaining": "0",
        "scope": "ws_acme",
        "scope_kind": "workspace",
        "status": 204
      },
      {
        "fallback": "false",
        "has_retry_after": false,
        "limit": "2",
        "remaining": "1",
        "scope": "u_1",
        "scope_kind": "user",
        "status": 204
      }
    ]
    "#);
}

#[tokio::test]
async fn unlimited_plan_is_never_exhausted() {
    let server = TestServer::start(CONFIG).await;

    for _ in 0..20 {
        let response = server.client.check("u_staff", None, "POST", "/v1/exports").await;

        assert_eq!(response.status(), 204);
        assert_eq!(header(&response, "x-ratelimit-limit"), "unlimited");
        assert_eq!(header(&response, "x-ratelimit-remaining"), Value::Null);
        assert_eq!(header(&response, "x-ratelimit-reset"), Value::Null);
    }
}

#[tokio::test]
async fn fallback_route_is_method_specific() {
    let server = TestServer::start(CONFIG).await;

    for _ in 0..2 {
        server.client.check("u_1", None, "GET", "/v1/projects").await;
    }

    let upgrade = server.client.check("u_1", None, "POST", "/subscriptions/upgrade").await;
    let peek = server.client.check("u_1", None, "GET", "/subscriptions/upgrade").await;

    assert_eq!(upgrade.status(), 204);
    assert_eq!(header(&upgrade, "x-ratelimit-fallback"), "true");

    assert_eq!(peek.status(), 429);
    assert_eq!(header(&peek, "x-ratelimit-fallback"), "false");
}

#[tokio::test]
async fn users_have_independent_budgets() {
    let server = TestServer::start(CONFIG).await;

    for _ in 0..3 {
        server.client.check("u_1", None, "GET", "/").await;
    }

    let other = server.client.check("u_2", None, "GET", "/").await;

    assert_eq!(other.status(), 204);
    assert_eq!(header(&other, "x-ratelimit-remaining"), "1");
}

#[tokio::test]
async fn original_uri_headers_are_understood() {
    let server = TestServer::start(CONFIG).await;

    for _ in 0..2 {
        server.client.check("u_1", None, "GET", "/v1/projects").await;
    }

    let response = server
        .client
        .request(reqwest::Method::GET, "/check")
        .header("x-user-id", "u_1")
        .header("x-original-method", "GET")
        .header("x-original-uri", "/billing?tab=invoices")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 204);
    assert_eq!(header(&response, "x-ratelimit-fallback"), "true");
}
