use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("wallet provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
}

impl ProviderError {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    pub const METHOD_NOT_FOUND: i64 = -32601;

    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        ProviderError::Rpc {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn code(&self) -> Option<i64> {
        match self {
            ProviderError::Rpc { code, .. } => Some(*code),
            ProviderError::Unavailable(_) => None,
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code() == Some(Self::USER_REJECTED)
    }
}

/// The only surface the gateway needs from a wallet: an EIP-1193 style
/// request that resolves to a JSON result or a coded error.
#[allow(async_fn_in_trait)]
pub trait WalletProvider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;
}

impl<T: WalletProvider> WalletProvider for Arc<T> {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        (**self).request(method, params).await
    }
}

/// JSON-RPC 2.0 provider speaking to a node endpoint over HTTP.
///
/// Intended for development chains that sign with unlocked accounts, so the
/// node itself plays the wallet's role.
#[derive(Debug)]
pub struct RpcWallet {
    http: Client,
    endpoint: String,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl RpcWallet {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent("VoteChain/0.3")
            .build()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        tracing::debug!(method, id, "rpc request");

        let resp = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("{}: {e}", self.endpoint)))?;
        if !resp.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "request to {} returned {}",
                self.endpoint,
                resp.status()
            )));
        }
        let parsed: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("invalid rpc response: {e}")))?;

        if let Some(err) = parsed.error {
            return Err(ProviderError::Rpc {
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }
}

impl WalletProvider for RpcWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        match self.send(method, params.clone()).await {
            Err(err)
                if method == "eth_requestAccounts"
                    && err.code() == Some(ProviderError::METHOD_NOT_FOUND) =>
            {
                self.send("eth_accounts", params).await
            }
            other => other,
        }
    }
}
