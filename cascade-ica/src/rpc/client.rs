//! Tendermint (CometBFT) JSON-RPC client.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::trace;

use crate::error::{IcaError, Result};

/// Response of an `abci_query`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AbciResponse {
    pub code: u32,
    pub log: String,
    pub value: Vec<u8>,
}

impl AbciResponse {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    /// Whether the query failed because the object does not exist.
    pub fn is_not_found(&self) -> bool {
        self.code != 0 && self.log.to_ascii_lowercase().contains("not found")
    }
}

/// Result of `broadcast_tx_sync` (CheckTx only).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastResult {
    pub code: u32,
    pub log: String,
    pub hash: String,
}

/// ABCI event with string attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// A delivered transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxResult {
    pub hash: String,
    pub height: i64,
    pub code: u32,
    pub log: String,
    pub events: Vec<Event>,
}

impl TxResult {
    /// First value of `key` in the first event of type `kind`.
    pub fn attribute(&self, kind: &str, key: &str) -> Option<&str> {
        self.events
            .iter()
            .filter(|e| e.kind == kind)
            .flat_map(|e| e.attributes.iter())
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

// Wire shapes. Numbers arrive as strings.

#[derive(Deserialize)]
struct RawAbciQuery {
    response: RawAbciResponse,
}

#[derive(Deserialize)]
struct RawAbciResponse {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    log: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Deserialize)]
struct RawBroadcast {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    log: String,
    hash: String,
}

#[derive(Deserialize)]
struct RawTx {
    hash: String,
    height: String,
    tx_result: RawTxResult,
}

#[derive(Deserialize)]
struct RawTxResult {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    log: String,
    #[serde(default)]
    events: Vec<Event>,
}

#[derive(Deserialize)]
struct RawTxSearch {
    #[serde(default)]
    txs: Vec<RawTx>,
}

impl From<RawTx> for TxResult {
    fn from(raw: RawTx) -> Self {
        Self {
            hash: raw.hash,
            height: raw.height.parse().unwrap_or_default(),
            code: raw.tx_result.code,
            log: raw.tx_result.log,
            events: raw.tx_result.events,
        }
    }
}

/// JSON-RPC client for one chain node.
#[derive(Clone)]
pub struct TendermintClient {
    url: String,
    http_client: reqwest::Client,
}

impl TendermintClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into().trim_end_matches('/').to_string();
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IcaError::Transport {
                endpoint: url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { url, http_client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Run a gRPC query through ABCI.
    pub async fn abci_query(&self, path: &str, data: &[u8]) -> Result<AbciResponse> {
        let result: RawAbciQuery = self
            .call(
                "abci_query",
                json!({ "path": path, "data": hex::encode(data), "prove": false }),
            )
            .await?;
        let value = match result.response.value {
            Some(v) if !v.is_empty() => STANDARD
                .decode(v)
                .map_err(|e| self.invalid(format!("abci value: {e}")))?,
            _ => Vec::new(),
        };
        Ok(AbciResponse {
            code: result.response.code,
            log: result.response.log,
            value,
        })
    }

    pub async fn broadcast_tx_sync(&self, tx: &[u8]) -> Result<BroadcastResult> {
        let raw: RawBroadcast = self
            .call("broadcast_tx_sync", json!({ "tx": STANDARD.encode(tx) }))
            .await?;
        Ok(BroadcastResult {
            code: raw.code,
            log: raw.log,
            hash: raw.hash,
        })
    }

    /// Look up a transaction by hex hash; `None` while it is not yet indexed.
    pub async fn tx(&self, hash: &str) -> Result<Option<TxResult>> {
        let bytes = hex::decode(hash)
            .map_err(|e| IcaError::InvalidInput(format!("tx hash {hash:?}: {e}")))?;
        match self
            .call::<RawTx>("tx", json!({ "hash": STANDARD.encode(bytes), "prove": false }))
            .await
        {
            Ok(raw) => Ok(Some(raw.into())),
            Err(IcaError::Transport { reason, .. }) if reason.contains("not found") => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn tx_search(&self, query: &str) -> Result<Vec<TxResult>> {
        let raw: RawTxSearch = self
            .call(
                "tx_search",
                json!({
                    "query": query,
                    "prove": false,
                    "page": "1",
                    "per_page": "30",
                    "order_by": "asc",
                }),
            )
            .await?;
        Ok(raw.txs.into_iter().map(TxResult::from).collect())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // HTTP HELPERS
    // ═══════════════════════════════════════════════════════════════════════════

    async fn call<T: serde::de::DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        trace!(endpoint = %self.url, method, "rpc call");
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http_client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| self.invalid(format!("HTTP {status}: {e}")))?;

        if let Some(error) = body.get("error") {
            let data = error.get("data").and_then(Value::as_str).unwrap_or_default();
            let message = error.get("message").and_then(Value::as_str).unwrap_or_default();
            return Err(self.transport(format!("{method}: {message} {data}").trim().to_string()));
        }

        let result = body
            .get("result")
            .cloned()
            .ok_or_else(|| self.invalid(format!("{method}: missing result")))?;
        serde_json::from_value(result).map_err(|e| self.invalid(format!("{method}: {e}")))
    }

    fn transport(&self, reason: String) -> IcaError {
        IcaError::Transport {
            endpoint: self.url.clone(),
            reason,
        }
    }

    fn invalid(&self, reason: String) -> IcaError {
        IcaError::InvalidResponse {
            endpoint: self.url.clone(),
            reason,
        }
    }
}
