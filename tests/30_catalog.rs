mod common;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::{fake_row, get, point_descriptor, scoped_token, send, test_app, FakeSource};

fn names(body: &Value) -> Vec<String> {
    body["datasets"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn app() -> common::TestApp {
    test_app(
        FakeSource::default(),
        vec![fake_row("fake_secret", Some("FAKE/SECRET")), fake_row("fake_public", None)],
        vec![point_descriptor("nap", "peilmerk")],
    )
}

#[tokio::test]
async fn catalogus_lists_only_visible_keys() {
    let app = app();

    let (status, body) = get(&app.router, "/catalogus/", None).await;
    assert_eq!(status, StatusCode::OK);
    let anonymous = names(&body);
    assert!(anonymous.contains(&"fake/fake_public".to_string()));
    assert!(anonymous.contains(&"peilmerk".to_string()));
    assert!(anonymous.contains(&"fake".to_string()));
    assert!(!anonymous.iter().any(|n| n.contains("fake_secret")));

    let (_, body) = get(&app.router, "/catalogus/", Some(&scoped_token(&["FAKE/SECRET"]))).await;
    let granted = names(&body);
    assert!(granted.contains(&"fake_secret".to_string()));
    assert!(granted.contains(&"fake/fake_secret".to_string()));
    assert_eq!(granted.len(), anonymous.len() + 2);
}

#[tokio::test]
async fn refresh_requires_authentication() {
    let app = app();

    let (status, body) = send(&app.router, Method::POST, "/catalogus/refresh", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Authentication required"}));

    let (status, body) = send(&app.router, Method::POST, "/catalogus/refresh", Some(&scoped_token(&[]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["datasets"], 3);
    assert_eq!(app.registry.generation(), 1);
}

#[tokio::test]
async fn health_without_databases_is_ok() {
    let (status, body) = get(&app().router, "/status/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Connectivity OK");
}
