//! WebSocket bridge feed.
//!
//! Client for the sidecar's market data socket. The gateway sends
//! `{"action":"subscribe"|"unsubscribe","symbols":[..]}`; the sidecar
//! answers with JSON frames tagged by `type`:
//!
//! ```json
//! {"type":"tick","symbol":"600000.SH","sequence":12,"last_price":"10.21","volume":500}
//! {"type":"heartbeat"}
//! {"type":"subscribed","symbols":["600000.SH"]}
//! {"type":"error","message":"unknown symbol"}
//! ```

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{FeedConnector, FeedError, FeedMessage, FeedStream};
use crate::domain::streaming::{Symbol, Tick, TickPayload};
use crate::domain::subscription::SubscriptionChanges;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Wire Format
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeFrame {
    Tick(BridgeTick),
    Heartbeat,
    Subscribed {
        #[serde(default)]
        symbols: Vec<String>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Deserialize)]
struct BridgeTick {
    symbol: Symbol,
    sequence: u64,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    last_price: Decimal,
    #[serde(default)]
    bid_price: Option<Decimal>,
    #[serde(default)]
    ask_price: Option<Decimal>,
    #[serde(default)]
    volume: u64,
}

impl From<BridgeTick> for Tick {
    fn from(wire: BridgeTick) -> Self {
        let mut tick = Self::new(
            wire.symbol,
            wire.sequence,
            TickPayload {
                last_price: wire.last_price,
                bid_price: wire.bid_price,
                ask_price: wire.ask_price,
                volume: wire.volume,
            },
        );
        if let Some(ts) = wire.timestamp {
            tick.timestamp = ts;
        }
        tick
    }
}

#[derive(Debug, Serialize)]
struct ControlMessage<'a> {
    action: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    symbols: Vec<&'a str>,
}

/// Decode one text frame. A frame is either a single object or an array.
fn decode(text: &str) -> Result<Vec<BridgeFrame>, FeedError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| FeedError::Protocol(e.to_string()))?;
    let frames = if value.is_array() {
        serde_json::from_value(value)
    } else {
        serde_json::from_value(value).map(|frame| vec![frame])
    };
    frames.map_err(|e| FeedError::Protocol(e.to_string()))
}

// =============================================================================
// Connector
// =============================================================================

/// Connector for the sidecar's market data socket.
#[derive(Clone)]
pub struct WsBridgeFeed {
    url: String,
    token: Option<String>,
}

impl WsBridgeFeed {
    /// Create a connector for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            url: url.into(),
            token,
        }
    }
}

#[async_trait]
impl FeedConnector for WsBridgeFeed {
    fn name(&self) -> &'static str {
        "bridge"
    }

    async fn connect(&self) -> Result<Box<dyn FeedStream>, FeedError> {
        tracing::info!(url = %self.url, "Connecting to bridge feed");

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;
            request.headers_mut().insert("authorization", value);
        }

        let (socket, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;
        let (write, read) = socket.split();

        Ok(Box::new(WsBridgeStream {
            write,
            read,
            pending: VecDeque::new(),
        }))
    }
}

struct WsBridgeStream {
    write: SplitSink<Socket, Message>,
    read: SplitStream<Socket>,
    pending: VecDeque<FeedMessage>,
}

impl WsBridgeStream {
    async fn send_control(&mut self, action: &str, symbols: Vec<&str>) -> Result<(), FeedError> {
        if symbols.is_empty() {
            return Ok(());
        }
        self.send_frame(&ControlMessage { action, symbols }).await
    }

    async fn send_frame(&mut self, message: &ControlMessage<'_>) -> Result<(), FeedError> {
        let json =
            serde_json::to_string(message).map_err(|e| FeedError::Protocol(e.to_string()))?;
        self.write
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))
    }

    fn absorb(&mut self, text: &str) -> Result<(), FeedError> {
        for frame in decode(text)? {
            match frame {
                BridgeFrame::Tick(tick) => self.pending.push_back(FeedMessage::Tick(tick.into())),
                BridgeFrame::Heartbeat => self.pending.push_back(FeedMessage::Heartbeat),
                BridgeFrame::Subscribed { symbols } => {
                    tracing::debug!(count = symbols.len(), "Bridge subscription confirmed");
                    self.pending.push_back(FeedMessage::Heartbeat);
                }
                BridgeFrame::Error { message } => {
                    tracing::warn!(message = %message, "Bridge feed error");
                    self.pending.push_back(FeedMessage::Heartbeat);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FeedStream for WsBridgeStream {
    async fn next_message(&mut self) -> Result<FeedMessage, FeedError> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return Ok(message);
            }
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => self.absorb(&text)?,
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => return Ok(FeedMessage::Heartbeat),
                Some(Ok(Message::Close(_))) | None => return Err(FeedError::Closed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(FeedError::Transport(e.to_string())),
            }
        }
    }

    async fn update_subscriptions(
        &mut self,
        changes: &SubscriptionChanges,
    ) -> Result<(), FeedError> {
        let subscribe = changes.subscribe.iter().map(Symbol::as_str).collect();
        let unsubscribe = changes.unsubscribe.iter().map(Symbol::as_str).collect();
        self.send_control("subscribe", subscribe).await?;
        self.send_control("unsubscribe", unsubscribe).await?;
        if let Some(on) = changes.whole_market {
            let action = if on {
                "subscribe_whole_quote"
            } else {
                "unsubscribe_whole_quote"
            };
            self.send_frame(&ControlMessage {
                action,
                symbols: Vec::new(),
            })
            .await?;
        }
        Ok(())
    }
}
