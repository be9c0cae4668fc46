// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end tests over the REST surface: router, token filter, error
//! mapping, and the services behind them.

mod common;

use common::{ROOT_PASSWORD, harness};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

fn request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

async fn root_login(app: &Router) -> String {
    let credentials = BASE64.encode(format!("root:{ROOT_PASSWORD}"));
    let req = Request::builder()
        .method("POST")
        .uri("/v2/sessions")
        .header(header::AUTHORIZATION, format!("Basic {credentials}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    body["value"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_healthz_needs_no_auth() {
    let h = harness();
    let app = h.router();
    let (status, body) = send(&app, request("GET", "/healthz", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["healthy"], json!(true));
}

#[tokio::test]
async fn test_anonymous_access_is_rejected() {
    let h = harness();
    let app = h.router();
    let (status, body) = send(&app, request("GET", "/v2/users", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["type"], json!("NOT_AUTHENTICATED"));
}

#[tokio::test]
async fn test_root_session_lifecycle() {
    let h = harness();
    let app = h.router();

    // Root login with the correct password returns a token...
    let token = root_login(&app).await;

    // ...which authenticates requests...
    let (status, _) = send(&app, request("GET", "/v2/users", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);

    // ...until the session is deleted, after which it is a 401.
    let (status, _) = send(&app, request("DELETE", "/v2/session", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, request("GET", "/v2/users", Some(&token), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bad_root_password_is_401() {
    let h = harness();
    let app = h.router();
    let credentials = BASE64.encode("root:wrong");
    let req = Request::builder()
        .method("POST")
        .uri("/v2/sessions")
        .header(header::AUTHORIZATION, format!("Basic {credentials}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["type"], json!("NOT_AUTHENTICATED"));
}

#[tokio::test]
async fn test_service_account_needs_a_role_for_project_create() {
    let h = harness();
    let app = h.router();
    let root = root_login(&app).await;

    // Create a service account; its token comes back exactly once.
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/v2/service-accounts",
            Some(&root),
            Some(json!({"id": "ci"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let sa_token = body["value"].as_str().unwrap().to_string();

    let project = json!({
        "id": "hello",
        "spec": {
            "workerTemplate": {"container": {"image": "alpine", "command": ["echo", "hi"]}}
        }
    });

    // No role yet: 403.
    let (status, body) = send(
        &app,
        request("POST", "/v2/projects", Some(&sa_token), Some(project.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["type"], json!("AUTHORIZATION"));

    // Grant PROJECT_CREATOR and retry: 201.
    let (status, _) = send(
        &app,
        request(
            "POST",
            "/v2/role-assignments",
            Some(&root),
            Some(json!({
                "principalType": "SERVICE_ACCOUNT",
                "principalId": "ci",
                "role": {"name": "PROJECT_CREATOR"}
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        request("POST", "/v2/projects", Some(&sa_token), Some(project)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["kubernetes"]["namespace"], json!("gantry-project-hello"));
}

#[tokio::test]
async fn test_event_round_trip_over_the_wire() {
    let h = harness();
    let app = h.router();
    let root = root_login(&app).await;

    let project = json!({
        "id": "hello",
        "spec": {
            "eventSubscriptions": [{"source": "forge.sh/cli", "types": ["exec"]}],
            "workerTemplate": {"container": {"image": "alpine", "command": ["echo", "hi"]}}
        }
    });
    let (status, _) = send(&app, request("POST", "/v2/projects", Some(&root), Some(project))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/v2/events",
            Some(&root),
            Some(json!({"source": "forge.sh/cli", "type": "exec", "projectId": "hello"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    let event_id = items[0]["id"].as_str().unwrap().to_string();
    assert_eq!(event_id.len(), 26);
    assert_eq!(items[0]["worker"]["status"]["phase"], json!("PENDING"));

    // GET echoes it back.
    let (status, body) = send(
        &app,
        request("GET", &format!("/v2/events/{event_id}"), Some(&root), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], json!(event_id));

    // Cancel, then a second cancel conflicts.
    let (status, _) = send(
        &app,
        request("PUT", &format!("/v2/events/{event_id}/cancel"), Some(&root), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(
        &app,
        request("PUT", &format!("/v2/events/{event_id}/cancel"), Some(&root), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["type"], json!("CONFLICT"));
}

#[tokio::test]
async fn test_worker_status_transition_rejection_over_the_wire() {
    let h = harness();
    let app = h.router();
    let root = root_login(&app).await;

    let project = json!({
        "id": "hello",
        "spec": {"workerTemplate": {"container": {"image": "alpine"}}}
    });
    send(&app, request("POST", "/v2/projects", Some(&root), Some(project))).await;
    let (_, body) = send(
        &app,
        request(
            "POST",
            "/v2/events",
            Some(&root),
            Some(json!({"source": "forge.sh/cli", "type": "exec", "projectId": "hello"})),
        ),
    )
    .await;
    let event_id = body["items"][0]["id"].as_str().unwrap().to_string();
    let status_uri = format!("/v2/events/{event_id}/worker/status");

    // Drive to SUCCEEDED via the shared-secret daemon tokens.
    for (token, phase) in [
        (common::SCHEDULER_TOKEN, "STARTING"),
        (common::OBSERVER_TOKEN, "RUNNING"),
        (common::OBSERVER_TOKEN, "SUCCEEDED"),
    ] {
        let (status, _) = send(
            &app,
            request("PUT", &status_uri, Some(token), Some(json!({"phase": phase}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "transition to {phase}");
    }

    // SUCCEEDED -> RUNNING is a 409 and the stored phase stays SUCCEEDED.
    let (status, _) = send(
        &app,
        request(
            "PUT",
            &status_uri,
            Some(common::OBSERVER_TOKEN),
            Some(json!({"phase": "RUNNING"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send(
        &app,
        request("GET", &format!("/v2/events/{event_id}"), Some(&root), None),
    )
    .await;
    assert_eq!(body["worker"]["status"]["phase"], json!("SUCCEEDED"));
}

#[tokio::test]
async fn test_project_delete_cascades_over_the_wire() {
    let h = harness();
    let app = h.router();
    let root = root_login(&app).await;

    let project = json!({
        "id": "hello",
        "spec": {"workerTemplate": {"container": {"image": "alpine"}}}
    });
    send(&app, request("POST", "/v2/projects", Some(&root), Some(project))).await;
    let (_, body) = send(
        &app,
        request(
            "POST",
            "/v2/events",
            Some(&root),
            Some(json!({"source": "forge.sh/cli", "type": "exec", "projectId": "hello"})),
        ),
    )
    .await;
    let event_id = body["items"][0]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        request("DELETE", "/v2/projects/hello", Some(&root), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, request("GET", "/v2/projects/hello", Some(&root), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(
        &app,
        request("GET", &format!("/v2/events/{event_id}"), Some(&root), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_event_list_filters_and_pagination() {
    let h = harness();
    let app = h.router();
    let root = root_login(&app).await;

    let project = json!({
        "id": "hello",
        "spec": {"workerTemplate": {"container": {"image": "alpine"}}}
    });
    send(&app, request("POST", "/v2/projects", Some(&root), Some(project))).await;
    for _ in 0..3 {
        send(
            &app,
            request(
                "POST",
                "/v2/events",
                Some(&root),
                Some(json!({"source": "forge.sh/cli", "type": "exec", "projectId": "hello"})),
            ),
        )
        .await;
    }

    let (status, body) = send(
        &app,
        request(
            "GET",
            "/v2/events?projectId=hello&workerPhases=PENDING&limit=2",
            Some(&root),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    let continue_token = body["continue"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        request(
            "GET",
            &format!("/v2/events?projectId=hello&continue={continue_token}"),
            Some(&root),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert!(body["continue"].is_null());

    // An unknown phase in the filter is a 400.
    let (status, _) = send(
        &app,
        request("GET", "/v2/events?workerPhases=DANCING", Some(&root), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
