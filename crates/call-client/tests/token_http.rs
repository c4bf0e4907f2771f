//! Integration tests for joining through the HTTP token provider.
//!
//! Uses wiremock as the token server and the mock engine behind it.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;

use call_client::config::Config;
use call_client::errors::SessionError;
use call_client::session::{SessionConfig, SessionController, SessionState};
use call_test_utils::*;
use common::token_client::{HttpTokenProvider, TokenError};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn controller_for(
    server: &MockServer,
    engine: Arc<MockMediaEngine>,
) -> (SessionController, Arc<RecordingSurface>) {
    let vars: HashMap<String, String> = [
        ("CALL_APP_ID", "app-123"),
        ("CALL_CHANNEL_NAME", "main"),
        ("TOKEN_SERVER_URL", server.uri().as_str()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let config = Config::from_vars(&vars).unwrap();

    let tokens = HttpTokenProvider::new(config.token_client_config()).unwrap();
    let surface = Arc::new(RecordingSurface::new());
    let controller = SessionController::new(
        SessionConfig::from(&config),
        Arc::new(tokens),
        engine,
        Arc::clone(&surface) as Arc<dyn call_client::views::ViewSurface>,
    );
    (controller, surface)
}

#[tokio::test]
async fn test_join_with_token_from_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get-token"))
        .and(query_param("channelName", "main"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": "006xyz" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let engine = Arc::new(MockMediaEngine::succeeding());
    let (controller, _surface) = controller_for(&server, Arc::clone(&engine));

    controller.join().await.unwrap();

    assert_eq!(controller.state(), SessionState::Joined);
    assert!(engine.calls().contains(&EngineCall::Join {
        app_id: "app-123".to_string(),
        channel: "main".to_string(),
        token: "006xyz".to_string(),
        local_id: None,
    }));
}

#[tokio::test]
async fn test_token_server_error_never_reaches_engine() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get-token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let engine = Arc::new(MockMediaEngine::succeeding());
    let (controller, surface) = controller_for(&server, Arc::clone(&engine));

    let err = controller.join().await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Token(TokenError::Status { status: 500 })
    ));
    assert_eq!(err.error_code(), 1);
    assert_eq!(engine.join_count(), 0);
    assert!(engine.calls().is_empty());
    assert!(surface.events().is_empty());
    assert_eq!(controller.state(), SessionState::Idle);
    assert!(controller.snapshot().await.is_pristine());
}

#[tokio::test]
async fn test_malformed_token_response_fails_join() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get-token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let engine = Arc::new(MockMediaEngine::succeeding());
    let (controller, _surface) = controller_for(&server, Arc::clone(&engine));

    let err = controller.join().await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Token(TokenError::InvalidResponse(_))
    ));
    assert_eq!(engine.join_count(), 0);
}
