//! REST handlers for trading sessions and pull-based subscriptions.

use std::time::Duration;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use super::AppState;
use super::error::rejected;
use crate::application::services::{Connected, SubscribeRequest};
use crate::domain::error::GatewayError;
use crate::domain::session::{AccountCredentials, AccountId, SessionId, SessionInfo};
use crate::domain::streaming::Tick;
use crate::domain::subscription::{
    Delivery, EndReason, OverflowPolicy, SubscriptionId, SubscriptionInfo, SubscriptionStats,
};
use crate::domain::trading::{
    AccountInfo, AssetInfo, CancelRequest, CancelResponse, OrderInfo, OrderRequest, OrderResponse,
    PositionInfo, RiskSnapshot, TradeInfo,
};

/// Longest a single pull may wait.
const MAX_PULL_TIMEOUT: Duration = Duration::from_secs(300);

type ApiResult<T> = Result<Json<T>, GatewayError>;

// =============================================================================
// Trading
// =============================================================================

#[derive(Debug, Deserialize)]
pub(super) struct ConnectBody {
    account_id: String,
    #[serde(default)]
    password: String,
}

pub(super) async fn connect(
    State(state): State<AppState>,
    body: Result<Json<ConnectBody>, JsonRejection>,
) -> ApiResult<Connected> {
    let Json(body) = body.map_err(rejected)?;
    let account_id = AccountId::parse(&body.account_id)?;
    let credentials = AccountCredentials::new(body.password);
    state.trading.connect(account_id, &credentials).await.map(Json)
}

#[derive(Debug, Serialize)]
pub(super) struct Disconnected {
    session_id: SessionId,
    success: bool,
}

pub(super) async fn disconnect(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Disconnected> {
    let session_id = SessionId::from(session_id.as_str());
    state.trading.disconnect(&session_id).await?;
    Ok(Json(Disconnected {
        session_id,
        success: true,
    }))
}

pub(super) async fn status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionInfo> {
    state
        .trading
        .status(&SessionId::from(session_id.as_str()))
        .map(Json)
}

pub(super) async fn account(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<AccountInfo> {
    let id = SessionId::from(session_id.as_str());
    state.trading.account(&id).await.map(Json)
}

pub(super) async fn asset(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<AssetInfo> {
    let id = SessionId::from(session_id.as_str());
    state.trading.asset(&id).await.map(Json)
}

pub(super) async fn positions(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Vec<PositionInfo>> {
    let id = SessionId::from(session_id.as_str());
    state.trading.positions(&id).await.map(Json)
}

pub(super) async fn orders(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Vec<OrderInfo>> {
    let id = SessionId::from(session_id.as_str());
    state.trading.orders(&id).await.map(Json)
}

pub(super) async fn trades(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Vec<TradeInfo>> {
    let id = SessionId::from(session_id.as_str());
    state.trading.trades(&id).await.map(Json)
}

pub(super) async fn risk(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<RiskSnapshot> {
    let id = SessionId::from(session_id.as_str());
    state.trading.risk(&id).await.map(Json)
}

pub(super) async fn submit_order(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Result<Json<OrderRequest>, JsonRejection>,
) -> ApiResult<OrderResponse> {
    let Json(request) = body.map_err(rejected)?;
    let id = SessionId::from(session_id.as_str());
    state.trading.submit_order(&id, request).await.map(Json)
}

pub(super) async fn cancel_order(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Result<Json<CancelRequest>, JsonRejection>,
) -> ApiResult<CancelResponse> {
    let Json(request) = body.map_err(rejected)?;
    let id = SessionId::from(session_id.as_str());
    state.trading.cancel_order(&id, request).await.map(Json)
}

// =============================================================================
// Subscriptions
// =============================================================================

/// What a subscribe request asks for.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(super) enum SubscriptionType {
    /// Quotes for the listed symbols.
    #[default]
    Quote,
    /// Quotes for every symbol.
    WholeQuote,
}

#[derive(Debug, Deserialize)]
pub(super) struct SubscribeBody {
    #[serde(default)]
    consumer_id: Option<String>,
    #[serde(default)]
    subscription_type: SubscriptionType,
    #[serde(default)]
    symbols: Vec<String>,
    #[serde(default)]
    overflow_policy: Option<OverflowPolicy>,
    #[serde(default)]
    strict: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct SubscribeResponse {
    created: bool,
    subscription: SubscriptionInfo,
}

pub(super) async fn subscribe(
    State(state): State<AppState>,
    body: Result<Json<SubscribeBody>, JsonRejection>,
) -> Result<impl IntoResponse, GatewayError> {
    let Json(body) = body.map_err(rejected)?;
    let subscribed = state.subscriptions.subscribe(SubscribeRequest {
        consumer: body.consumer_id,
        symbols: body.symbols,
        overflow_policy: body.overflow_policy,
        strict: body.strict,
        whole_market: matches!(body.subscription_type, SubscriptionType::WholeQuote),
    })?;
    let status = if subscribed.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(SubscribeResponse {
            created: subscribed.created,
            subscription: subscribed.handle.info(),
        }),
    ))
}

#[derive(Debug, Serialize)]
pub(super) struct SubscriptionList {
    subscriptions: Vec<SubscriptionInfo>,
    stats: SubscriptionStats,
}

pub(super) async fn list_subscriptions(State(state): State<AppState>) -> Json<SubscriptionList> {
    Json(SubscriptionList {
        subscriptions: state.subscriptions.list(),
        stats: state.subscriptions.stats(),
    })
}

pub(super) async fn subscription_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SubscriptionInfo> {
    state
        .subscriptions
        .info(&SubscriptionId::from(id.as_str()))
        .map(Json)
}

#[derive(Debug, Serialize)]
pub(super) struct UnsubscribeResponse {
    subscription_id: String,
    removed: bool,
}

pub(super) async fn unsubscribe(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<UnsubscribeResponse> {
    let removed = state
        .subscriptions
        .unsubscribe(&SubscriptionId::from(id.as_str()))
        .was_removed();
    Json(UnsubscribeResponse {
        subscription_id: id,
        removed,
    })
}

#[derive(Debug, Deserialize)]
pub(super) struct NextParams {
    timeout_ms: Option<u64>,
}

/// A pulled delivery as sent to clients.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliveryBody<'a> {
    /// A tick.
    Quote {
        /// The tick.
        data: &'a Tick,
        /// Sequence numbers skipped before this tick.
        missed: u64,
    },
    /// The subscription ended.
    EndOfStream {
        /// Why.
        reason: EndReason,
    },
}

impl<'a> From<&'a Delivery> for DeliveryBody<'a> {
    fn from(delivery: &'a Delivery) -> Self {
        match delivery {
            Delivery::Tick { tick, missed } => Self::Quote {
                data: tick.as_ref(),
                missed: *missed,
            },
            Delivery::EndOfStream(reason) => Self::EndOfStream { reason: *reason },
        }
    }
}

pub(super) async fn next_delivery(
    State(state): State<AppState>,
    Path(id): Path<String>,
    params: Result<Query<NextParams>, QueryRejection>,
) -> Result<impl IntoResponse, GatewayError> {
    let Query(params) = params.map_err(rejected)?;
    let timeout = params
        .timeout_ms
        .map(|ms| Duration::from_millis(ms).min(MAX_PULL_TIMEOUT));
    let delivery = state
        .subscriptions
        .next(&SubscriptionId::from(id.as_str()), timeout)
        .await?;
    let body = serde_json::to_value(DeliveryBody::from(&delivery))
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    Ok(Json(body))
}
