
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use clusterm::api::router;
use test_harness::{Script, TestManager};

/// Send a request to the app and decode the JSON body, if any.
async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn app_with_nodes(script: Script, names: &[&str]) -> (TestManager, Router) {
    let t = TestManager::new(script);
    let app = router(t.manager.clone());
    for (i, name) in names.iter().enumerate() {
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/monitor/discovered",
            Some(json!({"name": name, "addr": format!("10.0.0.{}", i + 1)})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    (t, app)
}

#[tokio::test]
async fn test_nodes_endpoints() {
    let (_t, app) = app_with_nodes(Script::Succeed, &[]).await;
    let (status, body) = send(&app, Method::GET, "/api/v1/nodes", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (_t, app) = app_with_nodes(Script::Succeed, &["n2", "n1"]).await;
    let (status, body) = send(&app, Method::GET, "/api/v1/nodes", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["n1", "n2"]);

    let (status, body) = send(&app, Method::GET, "/api/v1/node/n1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mgmt_addr"], "10.0.0.2");
    assert_eq!(body["inv"]["state"], "discovered");
    assert_eq!(body["inv"]["status"], "unallocated");

    let (status, body) = send(&app, Method::GET, "/api/v1/node/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn test_commission_and_job_views() {
    let (t, app) = app_with_nodes(Script::Succeed, &["n1"]).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/nodes/commission",
        Some(json!({"nodes": ["n1"], "host_group": "service-master"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["desc"].as_str().unwrap().starts_with("commissionEvent"));
    t.wait_idle().await;

    let (status, body) = send(&app, Method::GET, "/api/v1/jobs/last", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["logs"], json!(["Commission: ok"]));

    let (status, body) = send(&app, Method::GET, "/api/v1/node/n1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cfg"]["group"], "service-master");
    assert_eq!(body["inv"]["status"], "allocated");

    let (status, _) = send(&app, Method::GET, "/api/v1/jobs/active", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::POST, "/api/v1/jobs/active/cancel", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_error_status_codes() {
    let (t, app) = app_with_nodes(Script::Succeed, &["m1", "w1"]).await;

    let cases = [
        (
            "/api/v1/nodes/commission",
            json!({"nodes": [], "host_group": "service-master"}),
            StatusCode::BAD_REQUEST,
        ),
        (
            "/api/v1/nodes/commission",
            json!({"nodes": ["m1"], "host_group": "masters"}),
            StatusCode::BAD_REQUEST,
        ),
        (
            "/api/v1/nodes/commission",
            json!({"nodes": ["ghost"], "host_group": "service-master"}),
            StatusCode::NOT_FOUND,
        ),
        (
            "/api/v1/nodes/discover",
            json!({"addrs": ["10.0.0.300"]}),
            StatusCode::BAD_REQUEST,
        ),
        (
            "/api/v1/nodes/discover",
            json!({"addrs": ["10.0.0.1"]}),
            StatusCode::PRECONDITION_FAILED,
        ),
        (
            "/api/v1/nodes/update",
            json!({"nodes": ["m1"]}),
            StatusCode::PRECONDITION_FAILED,
        ),
    ];
    for (uri, body, expected) in cases {
        let (status, resp) = send(&app, Method::POST, uri, Some(body.clone())).await;
        assert_eq!(status, expected, "{uri} {body}");
        assert!(resp["error"].is_string());
    }

    t.commissioned(&["m1"], "service-master").await;
    t.commissioned(&["w1"], "service-worker").await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/nodes/decommission",
        Some(json!({"nodes": ["m1"]})),
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("will leave only worker nodes"));
}

#[tokio::test]
async fn test_busy_manager_returns_conflict() {
    let (t, app) = app_with_nodes(Script::Manual, &["n1", "n2"]).await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/nodes/commission",
        Some(json!({"nodes": ["n1"], "host_group": "service-master"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let run = t.configuration.next_run().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/nodes/commission",
        Some(json!({"nodes": ["n2"], "host_group": "service-worker"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("there is already an active job"));

    let (status, body) = send(&app, Method::GET, "/api/v1/jobs/active", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");

    let (status, body) = send(&app, Method::POST, "/api/v1/jobs/active/cancel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["cancelled"].as_str().unwrap().starts_with("commissionEvent"));

    let job = t.wait_idle().await;
    assert_eq!(job.status.to_string(), "cancelled");
    drop(run);
}

#[tokio::test]
async fn test_globals_and_config() {
    let (_t, app) = app_with_nodes(Script::Succeed, &[]).await;

    let (status, body) = send(&app, Method::GET, "/api/v1/globals", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["extra_vars"], "{}");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/globals",
        Some(json!({"extra_vars": r#"{"env": "prod"}"#})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = send(&app, Method::GET, "/api/v1/globals", None).await;
    assert_eq!(body["extra_vars"], r#"{"env": "prod"}"#);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/globals",
        Some(json!({"extra_vars": "not json"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/config",
        Some(json!({"ansible": {"extra_vars": r#"{"a": 1}"#, "user": "ops"}})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = send(&app, Method::GET, "/api/v1/globals", None).await;
    assert_eq!(body["extra_vars"], r#"{"a": 1}"#);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/config",
        Some(json!({"jobs": {"cancel_ack_timeout_secs": "soon"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_monitor_disappeared() {
    let (_t, app) = app_with_nodes(Script::Succeed, &["n1"]).await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/monitor/disappeared",
        Some(json!({"name": "n1"})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(&app, Method::GET, "/api/v1/node/n1", None).await;
    assert_eq!(body["inv"]["state"], "not_discovered");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/monitor/disappeared",
        Some(json!({"name": "ghost"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_node_view_accepts_any_name() {
    let (_t, app) = app_with_nodes(Script::Succeed, &["commission", "discover"]).await;

    for (name, addr) in [("commission", "10.0.0.1"), ("discover", "10.0.0.2")] {
        let (status, body) = send(&app, Method::GET, &format!("/api/v1/node/{name}"), None).await;
        assert_eq!(status, StatusCode::OK, "{name}");
        assert_eq!(body["name"], name);
        assert_eq!(body["mgmt_addr"], addr);
    }
}
