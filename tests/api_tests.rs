//! Control surface routing, exercised through the request handler.

use hyper::{Body, Method, Request, StatusCode};
use shelter_loadtest::api::handle;
use shelter_loadtest::catalog::Catalog;
use shelter_loadtest::executor::RequestExecutor;
use shelter_loadtest::metrics::register_metrics;
use shelter_loadtest::run::{LoadRunner, RunnerSettings};
use std::sync::Arc;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup() -> (MockServer, Arc<LoadRunner>) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let executor = RequestExecutor::new(reqwest::Client::new(), server.uri());
    let runner = Arc::new(LoadRunner::new(
        executor,
        Catalog::animal_shelter(),
        RunnerSettings::default(),
    ));
    (server, runner)
}

async fn call(
    runner: &Arc<LoadRunner>,
    method: Method,
    uri: &str,
    body: &str,
) -> (StatusCode, String) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = handle(req, runner.clone()).await.unwrap();
    let status = resp.status();
    let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_status_stop_round() {
    let (_server, runner) = setup().await;

    let (status, body) = call(
        &runner,
        Method::POST,
        "/start",
        r#"{"endpoint":"/animals","rps":5,"profile":"wave"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("/animals"), "body was: {}", body);
    assert!(body.contains("wave"), "body was: {}", body);

    let (status, body) = call(&runner, Method::GET, "/status", "").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["running"], true);
    assert_eq!(json["phase"], "running");
    assert_eq!(json["endpoint"], "/animals");
    assert_eq!(json["rps"], 5);
    assert_eq!(json["profile"], "wave");
    assert!(json["total_requests"].is_u64());
    assert!(json["success_requests"].is_u64());
    assert!(json["error_requests"].is_u64());

    let (status, body) = call(&runner, Method::POST, "/stop", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Stopped");

    let (_, body) = call(&runner, Method::POST, "/stop", "").await;
    assert_eq!(body, "Not running");

    let (_, body) = call(&runner, Method::GET, "/status", "").await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["running"], false);
    assert_eq!(json["current_rps"], 0);
}

#[tokio::test]
async fn start_rejects_bad_input() {
    let (_server, runner) = setup().await;

    let (status, body) = call(&runner, Method::POST, "/start", "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid request body");

    let (status, body) = call(
        &runner,
        Method::POST,
        "/start",
        r#"{"endpoint":"/","rps":1001,"profile":"constant"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("between 1 and 1000"), "body was: {}", body);
    assert!(!runner.status().running);
}

#[tokio::test]
async fn unknown_profile_falls_back_to_constant() {
    let (_server, runner) = setup().await;

    let (status, _) = call(
        &runner,
        Method::POST,
        "/start",
        r#"{"endpoint":"/","rps":3,"profile":"zigzag"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let status = runner.status();
    assert_eq!(
        status.profile,
        Some(shelter_loadtest::load_models::ProfileKind::Constant)
    );
    assert_eq!(status.current_rps, 3);
    runner.stop().await;
}

#[tokio::test]
async fn catalog_lists_endpoints_and_profiles() {
    let (_server, runner) = setup().await;

    let (status, body) = call(&runner, Method::GET, "/catalog", "").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["endpoints"].as_array().unwrap().len(), 6);
    assert_eq!(json["profiles"].as_array().unwrap().len(), 6);
    assert!(json["profiles"]
        .as_array()
        .unwrap()
        .iter()
        .any(|p| p["type"] == "ramp_up"));
}

#[tokio::test]
async fn metrics_are_exposed() {
    let (_server, runner) = setup().await;
    // Another test in this binary may have registered already
    let _ = register_metrics();

    let (status, body) = call(&runner, Method::GET, "/metrics", "").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("requests_total"), "body was: {}", body);
    assert!(body.contains("target_rps"), "body was: {}", body);
}

#[tokio::test]
async fn wrong_method_and_unknown_path() {
    let (_server, runner) = setup().await;

    let (status, _) = call(&runner, Method::GET, "/start", "").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = call(&runner, Method::DELETE, "/status", "").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = call(&runner, Method::GET, "/nope", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
