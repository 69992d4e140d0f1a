//! Request executor behavior against a stub target.

use shelter_loadtest::catalog::{Catalog, EndpointConfig};
use shelter_loadtest::errors::RequestError;
use shelter_loadtest::executor::{RequestExecutor, USER_AGENT_VALUE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn executor_for(server: &MockServer) -> RequestExecutor {
    RequestExecutor::new(reqwest::Client::new(), server.uri())
}

#[tokio::test]
async fn get_sends_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/animals"))
        .and(header("user-agent", USER_AGENT_VALUE))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let endpoint = Catalog::animal_shelter().resolve_endpoint("/animals");

    let status = executor.execute(&endpoint).await.unwrap();
    assert_eq!(status, 200);
}

#[tokio::test]
async fn post_animal_carries_generated_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/animals"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    let endpoint = Catalog::animal_shelter().resolve_endpoint("/api/animals");
    assert!(endpoint.needs_body);

    executor.execute(&endpoint).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];

    let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
    assert!(!body["name"].as_str().unwrap().is_empty());
    assert!(!body["type"].as_str().unwrap().is_empty());
    assert!(!body["health"].as_str().unwrap().is_empty());
    let age = body["age"].as_u64().unwrap();
    assert!((1..=15).contains(&age), "age {} out of range", age);
}

#[tokio::test]
async fn get_endpoint_sends_no_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let executor = executor_for(&server);
    executor.execute(&EndpointConfig::ad_hoc_get("/docs")).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].body.is_empty());
}

#[tokio::test]
async fn server_and_client_errors_fail() {
    let server = MockServer::start().await;
    Mock::given(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let executor = executor_for(&server);

    let err = executor
        .execute(&EndpointConfig::ad_hoc_get("/broken"))
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::Status(500)));

    // Nothing mounted for this path, wiremock answers 404
    let err = executor
        .execute(&EndpointConfig::ad_hoc_get("/missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::Status(404)));
}

#[tokio::test]
async fn unreachable_target_is_transport_error() {
    // Port 9 (discard) on localhost is closed in test environments
    let executor = RequestExecutor::new(reqwest::Client::new(), "http://127.0.0.1:9");
    let err = executor
        .execute(&EndpointConfig::ad_hoc_get("/"))
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::Transport(_)));
}

#[tokio::test]
async fn truncated_body_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Promise 100 bytes, send 7, then hang up
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await.unwrap();
        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial")
            .await
            .unwrap();
        socket.flush().await.unwrap();
    });

    let executor = RequestExecutor::new(reqwest::Client::new(), format!("http://{}", addr));
    let err = executor
        .execute(&EndpointConfig::ad_hoc_get("/animals"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, RequestError::Transport(_)),
        "expected transport error, got {:?}",
        err
    );

    server.await.unwrap();
}
