//! WebSocket delivery: quote streams per subscription and the trading
//! event stream.

use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;

use super::AppState;
use super::rest::DeliveryBody;
use crate::domain::error::GatewayError;
use crate::domain::session::AccountId;
use crate::domain::subscription::{Delivery, SubscriptionId};

/// How long a quote socket waits on its queue before re-checking the
/// socket.
const POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Events replayed to a new trading socket.
const RECENT_EVENTS: usize = 10;

type Sender = SplitSink<WebSocket, Message>;

async fn send_json<T: Serialize + Sync>(tx: &mut Sender, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(text) => tx.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode frame");
            true
        }
    }
}

/// Whether an inbound text frame is a ping (`ping` or `{"type":"ping"}`).
fn is_ping(text: &str) -> bool {
    let text = text.trim();
    text.eq_ignore_ascii_case("ping")
        || serde_json::from_str::<serde_json::Value>(text)
            .is_ok_and(|v| v.get("type").and_then(|t| t.as_str()) == Some("ping"))
}

// =============================================================================
// Quotes
// =============================================================================

pub(super) async fn quote_socket(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| stream_quotes(socket, state, SubscriptionId::from(id.as_str())))
}

async fn stream_quotes(socket: WebSocket, state: AppState, id: SubscriptionId) {
    let (mut tx, mut rx) = socket.split();

    let handle = match state.subscriptions.handle(&id) {
        Ok(handle) => handle,
        Err(e) => {
            let _ = send_json(
                &mut tx,
                &json!({"type": "error", "code": e.code(), "message": e.to_string()}),
            )
            .await;
            let _ = tx
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: Utf8Bytes::from("unknown subscription"),
                })))
                .await;
            return;
        }
    };

    tracing::info!(subscription_id = %id, "Quote socket opened");
    let hello = json!({
        "type": "connected",
        "subscription_id": handle.id(),
        "symbols": handle.symbols(),
        "whole_market": handle.is_whole_market(),
    });
    if !send_json(&mut tx, &hello).await {
        state.subscriptions.unsubscribe(&id);
        return;
    }

    loop {
        tokio::select! {
            () = state.shutdown.cancelled() => {
                let _ = tx.send(Message::Close(None)).await;
                break;
            }
            inbound = rx.next() => match inbound {
                Some(Ok(Message::Text(text))) if is_ping(&text) => {
                    if !send_json(&mut tx, &json!({"type": "pong"})).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            delivery = handle.dequeue(POLL_INTERVAL) => match delivery {
                Ok(delivery) => {
                    if delivery.tick().is_some() {
                        crate::infrastructure::metrics::record_tick_delivered();
                    }
                    if !send_json(&mut tx, &DeliveryBody::from(&delivery)).await {
                        break;
                    }
                    if let Delivery::EndOfStream(reason) = delivery {
                        tracing::info!(subscription_id = %id, reason = reason.as_str(), "Quote stream ended");
                        let _ = tx.send(Message::Close(None)).await;
                        break;
                    }
                }
                Err(_) => {}
            },
        }
    }

    // Only the streamed subscription is released; the consumer's others
    // stay live.
    tracing::info!(subscription_id = %id, "Quote socket closed");
    state.subscriptions.unsubscribe(&id);
}

// =============================================================================
// Trading Events
// =============================================================================

#[derive(Debug, Deserialize)]
pub(super) struct EventParams {
    account_id: Option<String>,
}

pub(super) async fn trading_socket(
    ws: WebSocketUpgrade,
    Query(params): Query<EventParams>,
    State(state): State<AppState>,
) -> Result<Response, GatewayError> {
    let account = params.account_id.as_deref().map(AccountId::parse).transpose()?;
    Ok(ws.on_upgrade(move |socket| stream_events(socket, state, account)))
}

async fn stream_events(socket: WebSocket, state: AppState, account: Option<AccountId>) {
    let (mut tx, mut rx) = socket.split();
    let subscription = state.events.subscribe(state.events.history_size());
    let mut events = subscription.receiver;
    let wanted = |account_id: &AccountId| account.as_ref().is_none_or(|a| a == account_id);

    let hello = json!({"type": "connected", "account_id": account});
    if !send_json(&mut tx, &hello).await {
        return;
    }

    let recent: Vec<_> = subscription
        .recent
        .into_iter()
        .filter(|e| wanted(&e.account_id))
        .collect();
    let skip = recent.len().saturating_sub(RECENT_EVENTS);
    for event in recent.iter().skip(skip) {
        if !send_json(&mut tx, event).await {
            return;
        }
    }

    loop {
        tokio::select! {
            () = state.shutdown.cancelled() => {
                let _ = tx.send(Message::Close(None)).await;
                break;
            }
            inbound = rx.next() => match inbound {
                Some(Ok(Message::Text(text))) if is_ping(&text) => {
                    if !send_json(&mut tx, &json!({"type": "pong"})).await {
                        break;
                    }
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            event = events.recv() => match event {
                Ok(event) if wanted(&event.account_id) => {
                    if !send_json(&mut tx, &event).await {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Trading event socket lagged");
                    if !send_json(&mut tx, &json!({"type": "lagged", "skipped": skipped})).await {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}
