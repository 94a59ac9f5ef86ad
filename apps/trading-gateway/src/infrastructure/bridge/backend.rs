//! HTTP bridge backend.
//!
//! Talks JSON over HTTP to a sidecar that hosts the vendor trading SDK.
//! Each gateway session opens one sidecar connection:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | open      | `POST /connections` `{account_id, password}` → `{connection_id}` |
//! | queries   | `GET /connections/{id}/{account,asset,positions,orders,trades}` |
//! | submit    | `POST /connections/{id}/orders` |
//! | cancel    | `POST /connections/{id}/cancel` |
//! | close     | `DELETE /connections/{id}` |
//!
//! Every call is a single attempt. Mutations are never retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::application::ports::{BackendConnection, BackendKind, TradingBackend};
use crate::domain::error::BackendError;
use crate::domain::session::{AccountCredentials, AccountId};
use crate::domain::trading::{
    AccountInfo, AssetInfo, CancelRequest, CancelResponse, OrderInfo, OrderRequest, OrderResponse,
    PositionInfo, TradeInfo,
};

#[derive(Debug, Serialize)]
struct OpenRequest<'a> {
    account_id: &'a AccountId,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenResponse {
    connection_id: String,
}

/// Error body returned by the sidecar.
#[derive(Debug, Deserialize)]
struct BridgeErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Shared HTTP plumbing.
#[derive(Clone)]
struct BridgeHttp {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl BridgeHttp {
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, BackendError> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if status.is_success() {
            let body = if body.is_empty() { "null" } else { body.as_str() };
            return serde_json::from_str(body)
                .map_err(|e| BackendError::Protocol(format!("invalid bridge response: {e}")));
        }
        Err(status_error(status, &body))
    }
}

fn transport_error(error: reqwest::Error) -> BackendError {
    if error.is_decode() {
        BackendError::Protocol(error.to_string())
    } else {
        BackendError::Unavailable(error.to_string())
    }
}

fn status_error(status: StatusCode, body: &str) -> BackendError {
    let parsed = serde_json::from_str::<BridgeErrorBody>(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|b| b.code.clone())
        .unwrap_or_else(|| status.as_u16().to_string());
    let message = parsed
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::GONE => BackendError::ConnectionLost(message),
        s if s.is_server_error() => BackendError::Unavailable(format!("{code}: {message}")),
        _ => BackendError::Rejected { code, message },
    }
}

// =============================================================================
// Backend
// =============================================================================

/// Backend that forwards to the SDK sidecar.
#[derive(Clone)]
pub struct HttpBridgeBackend {
    http: BridgeHttp,
}

impl HttpBridgeBackend {
    /// Create a backend for the sidecar at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(Self {
            http: BridgeHttp {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                token,
            },
        })
    }
}

#[async_trait]
impl TradingBackend for HttpBridgeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Live
    }

    async fn open(
        &self,
        account_id: &AccountId,
        credentials: &AccountCredentials,
    ) -> Result<Box<dyn BackendConnection>, BackendError> {
        let body = OpenRequest {
            account_id,
            password: credentials.password(),
        };
        let opened: OpenResponse = self
            .http
            .send(self.http.request(Method::POST, "/connections").json(&body))
            .await?;
        tracing::info!(
            account_id = %account_id,
            connection_id = %opened.connection_id,
            "Bridge connection opened"
        );
        Ok(Box::new(HttpBridgeConnection {
            http: self.http.clone(),
            path: format!("/connections/{}", opened.connection_id),
            closed: false,
        }))
    }
}

/// One sidecar connection.
pub struct HttpBridgeConnection {
    http: BridgeHttp,
    path: String,
    closed: bool,
}

impl HttpBridgeConnection {
    async fn get<T: DeserializeOwned>(&self, resource: &str) -> Result<T, BackendError> {
        self.ensure_open()?;
        let path = format!("{}/{resource}", self.path);
        self.http.send(self.http.request(Method::GET, &path)).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        resource: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        self.ensure_open()?;
        let path = format!("{}/{resource}", self.path);
        self.http
            .send(self.http.request(Method::POST, &path).json(body))
            .await
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.closed {
            return Err(BackendError::ConnectionLost("bridge connection closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BackendConnection for HttpBridgeConnection {
    async fn account(&mut self) -> Result<AccountInfo, BackendError> {
        self.get("account").await
    }

    async fn asset(&mut self) -> Result<AssetInfo, BackendError> {
        self.get("asset").await
    }

    async fn positions(&mut self) -> Result<Vec<PositionInfo>, BackendError> {
        self.get("positions").await
    }

    async fn orders(&mut self) -> Result<Vec<OrderInfo>, BackendError> {
        self.get("orders").await
    }

    async fn trades(&mut self) -> Result<Vec<TradeInfo>, BackendError> {
        self.get("trades").await
    }

    async fn submit_order(
        &mut self,
        request: &OrderRequest,
    ) -> Result<OrderResponse, BackendError> {
        self.post("orders", request).await
    }

    async fn cancel_order(
        &mut self,
        request: &CancelRequest,
    ) -> Result<CancelResponse, BackendError> {
        self.post("cancel", request).await
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let _: serde_json::Value = self
            .http
            .send(self.http.request(Method::DELETE, &self.path))
            .await?;
        Ok(())
    }
}
