//! Integration tests for rate limiting against a quota backend.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::http::request::Parts;
use config::Phase;
use indoc::formatdoc;
use integration_tests::{QuotaBackend, TestServer, quota::Take};
use jiff::Timestamp;
use rate_limit::{
    BucketType, Completion, HttpError, HttpQuotaClient, Interceptor, RateLimitError, bucket_type_fn, key_fn,
};
use serde_json::json;

fn registration(backend: &QuotaBackend, event: &str, bucket_type: &str, extract_key: &str) -> String {
    formatdoc! {r#"
        [[rate_limits]]
        event = "{event}"
        type = "{bucket_type}"
        address = "{url}"
        extract_key = {extract_key}
    "#, url = backend.url()}
}

fn header(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .map(|value| value.to_str().unwrap().to_string())
}

#[tokio::test]
async fn exceeded_limit_is_rejected_with_headers() {
    let backend = QuotaBackend::start().await;
    let config = registration(&backend, "onRequest", "empty", r#"{ http_header = "x-user-id" }"#);

    let server = TestServer::start(&config).await;
    let response = server.client.get_with_headers("/", &[("x-user-id", "alice")]).await;

    assert_eq!(response.status(), 429);
    assert_eq!(header(&response, "x-ratelimit-limit").as_deref(), Some("0"));
    assert_eq!(header(&response, "x-ratelimit-remaining").as_deref(), Some("0"));
    assert_eq!(header(&response, "x-ratelimit-reset").as_deref(), Some("0"));

    let body: serde_json::Value = response.json().await.unwrap();

    insta::assert_json_snapshot!(body, @r#"
    {
      "error": "Too Many Requests",
      "message": "Rate limit exceeded",
      "statusCode": 429
    }
    "#);
}

#[tokio::test]
async fn conformant_request_passes_with_headers() {
    let backend = QuotaBackend::start().await;
    let config = registration(&backend, "onPostAuth", "users", r#"{ http_header = "x-user-id" }"#);

    let server = TestServer::start(&config).await;

    let start = Timestamp::now().as_second();
    let response = server.client.get_with_headers("/", &[("x-user-id", "alice")]).await;

    assert_eq!(response.status(), 204);
    assert_eq!(header(&response, "x-ratelimit-limit").as_deref(), Some("1000000"));
    assert_eq!(header(&response, "x-ratelimit-remaining").as_deref(), Some("999999"));

    let reset: i64 = header(&response, "x-ratelimit-reset").unwrap().parse().unwrap();
    assert!(reset > start);

    assert_eq!(
        backend.takes(),
        vec![Take {
            bucket_type: "users".to_string(),
            key: "alice".to_string(),
            count: 1,
        }]
    );
}

#[tokio::test]
async fn missing_key_skips_the_check() {
    let backend = QuotaBackend::start().await;
    let config = registration(&backend, "onRequest", "empty", r#"{ http_header = "x-user-id" }"#);

    let server = TestServer::start(&config).await;
    let response = server.client.get("/").await;

    assert_eq!(response.status(), 204);
    assert_eq!(header(&response, "x-ratelimit-limit"), None);
    assert!(backend.takes().is_empty());
}

#[tokio::test]
async fn client_ip_is_taken_from_the_forwarding_headers() {
    let backend = QuotaBackend::start().await;
    let config = registration(&backend, "onRequest", "users", r#""client_ip""#);

    let server = TestServer::start(&config).await;
    let response = server
        .client
        .get_with_headers("/", &[("x-forwarded-for", "203.0.113.7, 10.0.0.1")])
        .await;

    assert_eq!(response.status(), 204);
    assert_eq!(backend.takes()[0].key, "203.0.113.7");
}

#[tokio::test]
async fn most_restrictive_registration_sets_the_headers() {
    let backend = QuotaBackend::start().await;

    let config = [
        registration(&backend, "onPreHandler", "users", r#"{ http_header = "x-user-id" }"#),
        registration(&backend, "onRequest", "tight", r#""client_ip""#),
    ]
    .join("\n");

    let server = TestServer::start(&config).await;
    let response = server.client.get_with_headers("/", &[("x-user-id", "alice")]).await;

    assert_eq!(response.status(), 204);
    assert_eq!(header(&response, "x-ratelimit-limit").as_deref(), Some("10"));
    assert_eq!(header(&response, "x-ratelimit-remaining").as_deref(), Some("1"));

    let types: Vec<_> = backend.takes().into_iter().map(|take| take.bucket_type).collect();
    assert_eq!(types, vec!["tight", "users"]);
}

#[tokio::test]
async fn consecutive_requests_run_out_of_quota() {
    let backend = QuotaBackend::start().await;
    let config = registration(&backend, "onRequest", "three", r#"{ http_header = "x-user-id" }"#);

    let server = TestServer::start(&config).await;

    let mut results = Vec::new();

    for i in 1..=5 {
        let response = server.client.get_with_headers("/", &[("x-user-id", "alice")]).await;

        results.push(json!({
            "request": i,
            "status": response.status().as_u16(),
            "remaining": header(&response, "x-ratelimit-remaining"),
        }));
    }

    insta::assert_json_snapshot!(results, @r#"
    [
      {
        "remaining": "2",
        "request": 1,
        "status": 204
      },
      {
        "remaining": "1",
        "request": 2,
        "status": 204
      },
      {
        "remaining": "0",
        "request": 3,
        "status": 204
      },
      {
        "remaining": "0",
        "request": 4,
        "status": 429
      },
      {
        "remaining": "0",
        "request": 5,
        "status": 429
      }
    ]
    "#);
}

#[tokio::test]
async fn keys_have_separate_quotas() {
    let backend = QuotaBackend::start().await;
    let config = registration(&backend, "onRequest", "three", r#"{ http_header = "x-user-id" }"#);

    let server = TestServer::start(&config).await;

    for _ in 0..3 {
        server.client.get_with_headers("/", &[("x-user-id", "alice")]).await;
    }

    let alice = server.client.get_with_headers("/", &[("x-user-id", "alice")]).await;
    let bob = server.client.get_with_headers("/", &[("x-user-id", "bob")]).await;

    assert_eq!(alice.status(), 429);
    assert_eq!(bob.status(), 204);
}

#[tokio::test]
async fn backend_failure_fails_open() {
    let backend = QuotaBackend::start().await;
    let config = registration(&backend, "onRequest", "failing", r#"{ http_header = "x-user-id" }"#);

    let server = TestServer::start(&config).await;
    let response = server.client.get_with_headers("/", &[("x-user-id", "alice")]).await;

    assert_eq!(response.status(), 204);
    assert_eq!(header(&response, "x-ratelimit-limit"), None);
}

#[tokio::test]
async fn backend_failure_can_reject() {
    let backend = QuotaBackend::start().await;
    let config = formatdoc! {r#"
        {registration}
        on_error = "reject"
    "#, registration = registration(&backend, "onRequest", "failing", r#"{ http_header = "x-user-id" }"#)};

    let server = TestServer::start(&config).await;
    let response = server.client.get_with_headers("/", &[("x-user-id", "alice")]).await;

    assert_eq!(response.status(), 500);

    let body: serde_json::Value = response.json().await.unwrap();

    insta::assert_json_snapshot!(body, @r#"
    {
      "error": "Internal Server Error",
      "message": "An internal server error occurred",
      "statusCode": 500
    }
    "#);
}

#[tokio::test]
async fn health_is_not_rate_limited() {
    let backend = QuotaBackend::start().await;
    let config = registration(&backend, "onRequest", "empty", r#""client_ip""#);

    let server = TestServer::start(&config).await;
    let response = server.client.get("/health").await;

    assert_eq!(response.status(), 200);
    assert_eq!(header(&response, "x-ratelimit-limit"), None);

    let body: serde_json::Value = response.json().await.unwrap();
    insta::assert_json_snapshot!(body, @r#"
    {
      "status": "healthy"
    }
    "#);
}

type Completions = Arc<Mutex<Vec<Completion>>>;

fn recording(
    completions: &Completions,
) -> impl Fn(Option<&RateLimitError>, &Parts, Duration, Completion) + Send + Sync + 'static {
    let completions = completions.clone();

    move |_: Option<&RateLimitError>, _: &Parts, _: Duration, completion: Completion| {
        completions.lock().unwrap().push(completion)
    }
}

#[tokio::test]
async fn failing_key_extractor_answers_with_its_error() {
    let completions = Completions::default();

    let interceptor = Interceptor::builder()
        .event(Phase::OnPreAuth)
        .bucket_type("users")
        .extract_key(key_fn(|_: &Parts| Err(HttpError::internal("no session store"))))
        .on_finished(recording(&completions))
        .build()
        .unwrap();

    let server = TestServer::builder().interceptor(interceptor).build("").await;
    let response = server.client.get("/").await;

    assert_eq!(response.status(), 500);
    assert_eq!(
        *completions.lock().unwrap(),
        vec![Completion {
            rate_limited: false,
            error: true
        }]
    );
}

#[tokio::test]
async fn missing_quota_client_lets_requests_through() {
    let completions = Completions::default();

    let interceptor = Interceptor::builder()
        .event(Phase::OnRequest)
        .bucket_type("users")
        .extract_key(key_fn(|_: &Parts| Ok(Some("alice".to_string()))))
        .on_finished(recording(&completions))
        .build()
        .unwrap();

    let server = TestServer::builder().interceptor(interceptor).build("").await;
    let response = server.client.get("/").await;

    assert_eq!(response.status(), 204);
    assert_eq!(
        *completions.lock().unwrap(),
        vec![Completion {
            rate_limited: false,
            error: true
        }]
    );
}

#[tokio::test]
async fn bucket_type_can_depend_on_the_request() {
    let backend = QuotaBackend::start().await;
    let completions = Completions::default();
    let client = HttpQuotaClient::new(&backend.url().parse().unwrap(), None).unwrap();

    let interceptor = Interceptor::builder()
        .event(Phase::OnPreHandler)
        .bucket_type(BucketType::dynamic(bucket_type_fn(|request: &Parts| {
            let plan = request
                .headers
                .get("x-plan")
                .ok_or("no plan")?
                .to_str()?;

            Ok(plan.to_string())
        })))
        .quota_client(Arc::new(client))
        .extract_key(key_fn(|_: &Parts| Ok(Some("alice".to_string()))))
        .on_finished(recording(&completions))
        .build()
        .unwrap();

    let server = TestServer::builder().interceptor(interceptor).build("").await;

    let limited = server.client.get_with_headers("/", &[("x-plan", "empty")]).await;
    let allowed = server.client.get_with_headers("/", &[("x-plan", "users")]).await;
    let unknown = server.client.get("/").await;

    assert_eq!(limited.status(), 429);
    assert_eq!(allowed.status(), 204);
    assert_eq!(unknown.status(), 500);

    let types: Vec<_> = backend.takes().into_iter().map(|take| take.bucket_type).collect();
    assert_eq!(types, vec!["empty", "users"]);

    assert_eq!(
        *completions.lock().unwrap(),
        vec![
            Completion {
                rate_limited: true,
                error: false
            },
            Completion::default(),
            Completion {
                rate_limited: false,
                error: true
            },
        ]
    );
}
