//! Integration tests for the GitHub gateway against a local mock server.
//!
//! Covers the initialization probe sequence, HTTP status mapping,
//! rate-limit gating, and the minimum inter-request interval.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use teamflow::gateway::{Gateway, GatewayError, GitHubGateway};

fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Mount the successful initialization probes (user, repo, permission).
async fn mount_init(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"login": "tester"})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/repo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/repo/collaborators/tester/permission"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"permission": "write"})),
        )
        .mount(server)
        .await;
}

async fn connected_gateway(server: &MockServer) -> GitHubGateway {
    GitHubGateway::connect_with(
        reqwest::Client::new(),
        "ghp_token",
        "owner".to_string(),
        "repo".to_string(),
        server.uri(),
    )
    .await
}

#[tokio::test]
async fn initialization_probes_and_captures_identity() {
    let server = MockServer::start().await;
    mount_init(&server).await;

    let gateway = connected_gateway(&server).await;
    assert!(gateway.available());
    assert_eq!(gateway.identity().as_deref(), Some("tester"));
}

#[tokio::test]
async fn bad_token_leaves_gateway_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Bad credentials"})),
        )
        .mount(&server)
        .await;

    let gateway = connected_gateway(&server).await;
    assert!(!gateway.available());
    assert!(gateway.unavailable_reason().is_some());

    let err = gateway.list_open_issues().await.unwrap_err();
    assert!(matches!(err, GatewayError::NotAvailable { .. }));
}

#[tokio::test]
async fn repo_probe_failure_leaves_gateway_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"login": "tester"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/repo"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .mount(&server)
        .await;

    let gateway = connected_gateway(&server).await;
    assert!(!gateway.available());
}

#[tokio::test]
async fn issues_endpoint_decodes_and_filters_prs() {
    let server = MockServer::start().await;
    mount_init(&server).await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/repo/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "number": 12,
                "title": "ログインが壊れている",
                "body": "詳細",
                "labels": [{"name": "bug"}],
                "assignees": [],
                "state": "open",
                "updated_at": "2024-06-01T10:00:00Z",
                "html_url": "https://github.com/owner/repo/issues/12"
            },
            {
                "number": 13,
                "title": "A PR, not an issue",
                "body": null,
                "labels": [],
                "assignees": [],
                "state": "open",
                "updated_at": "2024-06-01T11:00:00Z",
                "html_url": "https://github.com/owner/repo/pull/13",
                "pull_request": {"url": "https://api.github.com/..."}
            }
        ])))
        .mount(&server)
        .await;

    let gateway = connected_gateway(&server).await;
    let issues = gateway.list_open_issues().await.unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].number, 12);
    assert!(issues[0].labels.contains("bug"));
}

#[tokio::test]
async fn not_found_maps_to_not_found_error() {
    let server = MockServer::start().await;
    mount_init(&server).await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/repo/issues/99"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .mount(&server)
        .await;

    let gateway = connected_gateway(&server).await;
    assert!(matches!(
        gateway.get_issue(99).await.unwrap_err(),
        GatewayError::NotFound { .. }
    ));
}

#[tokio::test]
async fn validation_error_recognizes_pr_duplicates() {
    let server = MockServer::start().await;
    mount_init(&server).await;
    Mock::given(method("POST"))
        .and(path("/repos/owner/repo/pulls"))
        .respond_with(ResponseTemplate::new(422).set_body_json(
            json!({"message": "A pull request already exists for owner:feature."}),
        ))
        .mount(&server)
        .await;

    let gateway = connected_gateway(&server).await;
    let err = gateway
        .create_pr(teamflow::gateway::CreatePrRequest {
            head: "feature".to_string(),
            base: "main".to_string(),
            title: "x".to_string(),
            body: None,
            draft: false,
            reviewers: vec![],
        })
        .await
        .unwrap_err();
    assert!(err.is_already_exists());
}

#[tokio::test]
async fn forbidden_without_rate_limit_markers_is_forbidden() {
    let server = MockServer::start().await;
    mount_init(&server).await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/repo/issues/1"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({"message": "Resource not accessible by integration"})),
        )
        .mount(&server)
        .await;

    let gateway = connected_gateway(&server).await;
    assert!(matches!(
        gateway.get_issue(1).await.unwrap_err(),
        GatewayError::Forbidden { .. }
    ));
}

#[tokio::test]
async fn rate_limited_403_sleeps_until_reset_then_retries() {
    let server = MockServer::start().await;
    mount_init(&server).await;

    // First response: 403 with exhausted window resetting in ~2s
    let reset = epoch_now() + 2;
    Mock::given(method("GET"))
        .and(path("/repos/owner/repo/issues"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", reset.to_string().as_str())
                .set_body_json(json!({"message": "API rate limit exceeded"})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    // After the window: success
    Mock::given(method("GET"))
        .and(path("/repos/owner/repo/issues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let gateway = connected_gateway(&server).await;
    let started = Instant::now();
    let issues = gateway.list_open_issues().await.unwrap();
    let elapsed = started.elapsed();

    assert!(issues.is_empty());
    // Slept at least until the reset; the +1s slack applies on top
    assert!(elapsed >= Duration::from_secs(2), "elapsed: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(6), "elapsed: {:?}", elapsed);
}

#[tokio::test]
async fn exhausted_window_from_headers_gates_the_next_call() {
    let server = MockServer::start().await;
    mount_init(&server).await;

    let reset = epoch_now() + 2;
    // A successful response that reports the window as exhausted
    Mock::given(method("GET"))
        .and(path("/repos/owner/repo/issues"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", reset.to_string().as_str())
                .set_body_json(json!([])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/repo/issues/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "number": 1,
            "title": "x",
            "body": null,
            "labels": [],
            "assignees": [],
            "state": "open",
            "updated_at": "2024-06-01T10:00:00Z",
            "html_url": "https://github.com/owner/repo/issues/1"
        })))
        .mount(&server)
        .await;

    let gateway = connected_gateway(&server).await;
    gateway.list_open_issues().await.unwrap();
    assert!(gateway.rate_limit().is_exhausted());

    let started = Instant::now();
    gateway.get_issue(1).await.unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(2), "elapsed: {:?}", elapsed);
}

#[tokio::test]
async fn minimum_interval_spaces_consecutive_requests() {
    let server = MockServer::start().await;
    mount_init(&server).await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/repo/branches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let gateway = connected_gateway(&server).await;
    // Warm-up dispatch records last_dispatch
    gateway.list_branches().await.unwrap();

    let started = Instant::now();
    gateway.list_branches().await.unwrap();
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(90),
        "elapsed: {:?}",
        elapsed
    );
}

#[tokio::test]
async fn repo_metrics_aggregates_commits_and_prs() {
    let server = MockServer::start().await;
    mount_init(&server).await;

    let now = chrono::Utc::now();
    let recent = (now - chrono::Duration::days(1)).to_rfc3339();
    Mock::given(method("GET"))
        .and(path("/repos/owner/repo/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"sha": "a1", "commit": {"message": "one", "author": {"name": "alice", "date": recent}}},
            {"sha": "b2", "commit": {"message": "two", "author": {"name": "bob", "date": recent}}}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/repo/pulls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "number": 1,
                "title": "merged already",
                "body": null,
                "head": {"ref": "feature/a"},
                "base": {"ref": "main"},
                "state": "closed",
                "draft": false,
                "requested_reviewers": [],
                "created_at": recent,
                "merged_at": recent,
                "html_url": "https://github.com/owner/repo/pull/1"
            }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/repo/pulls/1/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let gateway = connected_gateway(&server).await;
    let metrics = gateway.repo_metrics(7).await.unwrap();
    assert_eq!(metrics.commits, 2);
    assert_eq!(metrics.prs_created, 1);
    assert_eq!(metrics.prs_merged, 1);
    assert!(metrics.mean_review_hours.is_none());
}
