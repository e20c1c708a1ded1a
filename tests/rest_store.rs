//! HTTP contract tests for the REST record store.

use std::time::Duration;

use presenced::{Config, FetchError, PollConfig, RecordStore, RestStore, WatchTarget};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn poll_config(server: &MockServer) -> PollConfig {
    Config {
        base_url: format!("{}/", server.uri()),
        auth_token: Some("secret-token".into()),
        self_id: Some("me".into()),
        ..Config::default()
    }
    .poll_config()
}

fn store() -> RestStore {
    RestStore::new(Duration::from_millis(500)).unwrap()
}

#[tokio::test]
async fn collection_read_sends_status_filter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users.json"))
        .and(query_param("auth", "secret-token"))
        .and(query_param("orderBy", "\"status\""))
        .and(query_param("equalTo", "\"available\""))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "u1": {"nombre": "Ana", "status": "available"},
            "me": {"nombre": "Me", "status": "available"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = store()
        .fetch(&poll_config(&server), &WatchTarget::Available)
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records["u1"].display_name(), "Ana");
}

#[tokio::test]
async fn null_collection_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .mount(&server)
        .await;

    let records = store()
        .fetch(&poll_config(&server), &WatchTarget::Available)
        .await
        .unwrap();

    assert!(records.is_empty());
}

#[tokio::test]
async fn entity_read_has_no_filter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/u7.json"))
        .and(query_param("auth", "secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "nombre": "Lu",
            "latitud": 4.65,
            "longitud": -74.05
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = store()
        .fetch(&poll_config(&server), &WatchTarget::Entity("u7".into()))
        .await
        .unwrap();

    assert_eq!(records["u7"].coordinates(), Some((4.65, -74.05)));
}

#[tokio::test]
async fn error_status_keeps_code_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users.json"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "Auth token is expired"})),
        )
        .mount(&server)
        .await;

    let err = store()
        .fetch(&poll_config(&server), &WatchTarget::Available)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert!(matches!(err, FetchError::Protocol { ref body, .. } if body.contains("expired")));
    assert_eq!(err.summary(), "HTTP 401: Auth token is expired");
}

#[tokio::test]
async fn malformed_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = store()
        .fetch(&poll_config(&server), &WatchTarget::Available)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Parse(_)));
}

#[tokio::test]
async fn slow_store_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("{}")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = store()
        .fetch(&poll_config(&server), &WatchTarget::Available)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Transport(_)));
}

#[tokio::test]
async fn set_status_patches_status_field() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/users/me.json"))
        .and(query_param("auth", "secret-token"))
        .and(body_json(json!({"status": "offline"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "offline"})))
        .expect(1)
        .mount(&server)
        .await;

    store()
        .set_status(&poll_config(&server), "me", "offline")
        .await
        .unwrap();
}

#[tokio::test]
async fn rejected_status_update_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/users/me.json"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "Permission denied"}
        })))
        .mount(&server)
        .await;

    let err = store()
        .set_status(&poll_config(&server), "me", "available")
        .await
        .unwrap_err();

    assert_eq!(err.summary(), "HTTP 403: Permission denied");
}

#[tokio::test]
async fn truncated_error_body_still_reports_status() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = socket.read(&mut request).await;
        // Promise 100 bytes, send 5, hang up.
        let _ = socket
            .write_all(b"HTTP/1.1 403 Forbidden\r\ncontent-length: 100\r\n\r\ndenie")
            .await;
        let _ = socket.shutdown().await;
    });

    let config = Config {
        base_url: format!("http://{}", addr),
        auth_token: Some("secret-token".into()),
        self_id: Some("me".into()),
        ..Config::default()
    }
    .poll_config();

    let err = store()
        .set_status(&config, "me", "available")
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(403));
    assert!(matches!(err, FetchError::Protocol { ref body, .. } if body == "<unreadable body>"));
}
