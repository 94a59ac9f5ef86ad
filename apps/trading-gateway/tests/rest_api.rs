//! REST API Integration Tests
//!
//! Sends requests through the full axum router in mock mode without
//! binding a socket.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use trading_gateway::application::services::{
    FeedControl, ModeGate, SessionConfig, SessionRegistry, SubscriptionService, TradingService,
};
use trading_gateway::domain::mode::Mode;
use trading_gateway::domain::streaming::{Symbol, Tick, TickPayload};
use trading_gateway::domain::subscription::{
    ConsumerId, SubscriptionConfig, SubscriptionId, SubscriptionManager, SubscriptionState,
};
use trading_gateway::infrastructure::broadcast::TradingEventHub;
use trading_gateway::infrastructure::http::{AppState, router};
use trading_gateway::infrastructure::simulation::SimulatedBackend;

// =============================================================================
// Helpers
// =============================================================================

struct TestApp {
    router: Router,
    manager: Arc<SubscriptionManager>,
}

fn app() -> TestApp {
    app_with(SubscriptionConfig::default())
}

fn app_with(config: SubscriptionConfig) -> TestApp {
    let events = Arc::new(TradingEventHub::with_defaults());
    let backend = SimulatedBackend::new().with_events(Arc::clone(&events) as _);
    let registry = Arc::new(SessionRegistry::new(
        Arc::new(backend),
        Mode::Mock,
        SessionConfig::default(),
    ));
    let trading = Arc::new(TradingService::new(
        registry,
        Arc::new(ModeGate::new(Mode::Mock)),
        Duration::from_secs(2),
    ));
    let manager = Arc::new(SubscriptionManager::new(config));
    let subscriptions = Arc::new(SubscriptionService::new(
        Arc::clone(&manager),
        Arc::new(FeedControl::new()),
        Duration::from_millis(100),
    ));

    let state = AppState {
        trading,
        subscriptions,
        events,
        shutdown: CancellationToken::new(),
    };
    TestApp {
        router: router(state),
        manager,
    }
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn connect(router: &Router, account: &str) -> String {
    let (status, body) = send(
        router,
        Method::POST,
        "/api/v1/trading/connect",
        Some(json!({ "account_id": account, "password": "secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "connect failed: {body}");
    body["session_id"].as_str().unwrap().to_string()
}

// =============================================================================
// Trading
// =============================================================================

#[tokio::test]
async fn connect_returns_session_and_account() {
    let app = app();
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/v1/trading/connect",
        Some(json!({ "account_id": "55009640", "password": "secret" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["account_id"], "55009640");
    assert_eq!(body["mode"], "mock");
    assert_eq!(body["state"], "connected");
    assert_eq!(body["account"]["account_type"], "STOCK");
}

#[tokio::test]
async fn connect_with_malformed_body_is_bad_request() {
    let app = app();
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/v1/trading/connect",
        Some(json!({ "password": "secret" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let app = app();
    let (status, body) = send(
        &app.router,
        Method::GET,
        "/api/v1/trading/positions/does-not-exist",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn order_and_cancel_round_trip_through_router() {
    let app = app();
    let session = connect(&app.router, "55009640").await;

    let (status, positions) = send(
        &app.router,
        Method::GET,
        &format!("/api/v1/trading/positions/{session}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(positions.as_array().unwrap().len(), 2);

    let (status, order) = send(
        &app.router,
        Method::POST,
        &format!("/api/v1/trading/order/{session}"),
        Some(json!({
            "symbol": "000001.SZ",
            "side": "BUY",
            "order_type": "LIMIT",
            "volume": 100,
            "price": "12.00"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "submit failed: {order}");
    assert_eq!(order["status"], "SUBMITTED");
    assert_eq!(order["intercepted"], false);
    let order_id = order["order_id"].as_str().unwrap().to_string();

    let (status, cancelled) = send(
        &app.router,
        Method::POST,
        &format!("/api/v1/trading/cancel/{session}"),
        Some(json!({ "order_id": order_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["success"], true);

    let (_, orders) = send(
        &app.router,
        Method::GET,
        &format!("/api/v1/trading/orders/{session}"),
        None,
    )
    .await;
    assert_eq!(orders[0]["status"], "CANCELLED");
}

#[tokio::test]
async fn backend_rejection_maps_to_bad_gateway() {
    let app = app();
    let session = connect(&app.router, "55009640").await;

    let (status, body) = send(
        &app.router,
        Method::POST,
        &format!("/api/v1/trading/cancel/{session}"),
        Some(json!({ "order_id": "mock_order_424242" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "UPSTREAM_FAILURE");
}

#[tokio::test]
async fn disconnect_invalidates_session() {
    let app = app();
    let session = connect(&app.router, "55009640").await;

    let (status, body) = send(
        &app.router,
        Method::POST,
        &format!("/api/v1/trading/disconnect/{session}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = send(
        &app.router,
        Method::GET,
        &format!("/api/v1/trading/status/{session}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app.router,
        Method::POST,
        &format!("/api/v1/trading/disconnect/{session}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Subscriptions
// =============================================================================

#[tokio::test]
async fn subscribe_then_pull_delivers_tick() {
    let app = app();
    let request = json!({ "consumer_id": "dashboard", "symbols": ["000001.SZ"] });

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/v1/data/subscriptions",
        Some(request.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["created"], true);
    let id = body["subscription"]["id"].as_str().unwrap().to_string();

    let (status, again) = send(
        &app.router,
        Method::POST,
        "/api/v1/data/subscriptions",
        Some(request),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["subscription"]["id"], id.as_str());

    app.manager.publish(Tick::new(
        Symbol::parse("000001.SZ").unwrap(),
        42,
        TickPayload::default(),
    ));

    let (status, delivery) = send(
        &app.router,
        Method::GET,
        &format!("/api/v1/data/subscriptions/{id}/next?timeout_ms=500"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(delivery["type"], "quote");
    assert_eq!(delivery["data"]["sequence"], 42);
    assert_eq!(delivery["missed"], 0);
}

#[tokio::test]
async fn pull_without_data_times_out() {
    let app = app();
    let (_, body) = send(
        &app.router,
        Method::POST,
        "/api/v1/data/subscriptions",
        Some(json!({ "symbols": ["AAPL"] })),
    )
    .await;
    let id = body["subscription"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app.router,
        Method::GET,
        &format!("/api/v1/data/subscriptions/{id}/next?timeout_ms=20"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"]["code"], "TIMEOUT");
}

#[tokio::test]
async fn unsubscribe_ends_stream_and_is_idempotent() {
    let app = app();
    let (_, body) = send(
        &app.router,
        Method::POST,
        "/api/v1/data/subscriptions",
        Some(json!({ "consumer_id": "a", "symbols": ["AAPL"] })),
    )
    .await;
    let id = body["subscription"]["id"].as_str().unwrap().to_string();
    let handle = app
        .manager
        .handle(&id.as_str().into())
        .unwrap();

    let (status, body) = send(
        &app.router,
        Method::DELETE,
        &format!("/api/v1/data/subscriptions/{id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], true);
    assert!(
        handle
            .dequeue(Duration::from_millis(100))
            .await
            .unwrap()
            .is_end_of_stream()
    );

    let (status, body) = send(
        &app.router,
        Method::DELETE,
        &format!("/api/v1/data/subscriptions/{id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], false);

    let (status, _) = send(
        &app.router,
        Method::GET,
        &format!("/api/v1/data/subscriptions/{id}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_symbol_is_bad_request() {
    let app = app();
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/v1/data/subscriptions",
        Some(json!({ "symbols": ["not a symbol!"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn list_reports_stats() {
    let app = app();
    for consumer in ["a", "b"] {
        send(
            &app.router,
            Method::POST,
            "/api/v1/data/subscriptions",
            Some(json!({ "consumer_id": consumer, "symbols": ["AAPL", "MSFT"] })),
        )
        .await;
    }

    let (status, body) = send(&app.router, Method::GET, "/api/v1/data/subscriptions", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscriptions"].as_array().unwrap().len(), 2);
    assert_eq!(body["stats"]["symbol_count"], 2);
    assert_eq!(body["stats"]["consumer_count"], 2);
}

#[tokio::test]
async fn whole_quote_subscription_takes_no_symbols() {
    let app = app_with(SubscriptionConfig {
        whole_market_enabled: true,
        ..SubscriptionConfig::default()
    });

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/v1/data/subscriptions",
        Some(json!({ "consumer_id": "all", "subscription_type": "whole_quote" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "subscribe failed: {body}");
    assert_eq!(body["subscription"]["whole_market"], true);
    assert_eq!(body["subscription"]["symbols"], json!([]));
    assert!(app.manager.wants_whole_market());

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/v1/data/subscriptions",
        Some(json!({ "subscription_type": "whole_quote", "symbols": ["AAPL"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn whole_quote_is_refused_when_disabled() {
    let app = app();
    let (status, body) = send(
        &app.router,
        Method::POST,
        "/api/v1/data/subscriptions",
        Some(json!({ "subscription_type": "whole_quote" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

// =============================================================================
// WebSocket
// =============================================================================

#[tokio::test]
async fn closing_quote_socket_releases_only_its_subscription() {
    let app = app();
    let consumer = ConsumerId::new("dashboard");
    let streamed = app
        .manager
        .subscribe(consumer.clone(), [Symbol::parse("AAPL").unwrap()])
        .unwrap();
    let other = app
        .manager
        .subscribe(consumer, [Symbol::parse("MSFT").unwrap()])
        .unwrap();
    let streamed_id: SubscriptionId = streamed.handle.id().clone();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move { axum::serve(listener, router).await });

    let (mut socket, _) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/ws/quote/{streamed_id}"))
            .await
            .unwrap();
    let Some(Ok(Message::Text(hello))) = socket.next().await else {
        panic!("expected a hello frame");
    };
    let hello: Value = serde_json::from_str(hello.as_str()).unwrap();
    assert_eq!(hello["type"], "connected");

    socket.close(None).await.unwrap();
    let released = async {
        while app.manager.info(&streamed_id).is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(2), released)
        .await
        .unwrap();

    let info = app.manager.info(other.handle.id()).unwrap();
    assert_eq!(info.state, SubscriptionState::Active);
}
