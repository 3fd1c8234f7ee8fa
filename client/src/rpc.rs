//! JSON-RPC 2.0 provider over HTTP.
//!
//! Talks to a wallet or node that exposes the standard `eth_*` methods. The
//! endpoint holds the keys: transactions go out unsigned through
//! `eth_sendTransaction` and the wallet signs them.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use timestore_common::abi;
use timestore_common::address::{Address, TxHash};
use tracing::debug;

use crate::provider::{Provider, ProviderError, METHOD_NOT_FOUND};

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl From<RpcErrorObject> for ProviderError {
    fn from(e: RpcErrorObject) -> Self {
        // reverts carry the ABI-encoded reason in `data`
        let reason = e
            .data
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|d| decode_data(d).ok())
            .and_then(|bytes| abi::decode_revert_reason(&bytes));
        let message = match reason {
            Some(r) => format!("{}: {r}", e.message),
            None => e.message,
        };
        ProviderError::Rpc {
            code: e.code,
            message,
        }
    }
}

#[derive(Serialize)]
struct CallObject {
    from: Address,
    to: Address,
    data: String,
}

/// Provider backed by a JSON-RPC endpoint such as a local node or a wallet
/// bridge.
pub struct JsonRpcProvider {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, method, "rpc request");
        let resp: RpcResponse = self
            .client
            .post(&self.url)
            .json(&RpcRequest {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = resp.error {
            return Err(err.into());
        }
        let result = resp
            .result
            .ok_or_else(|| ProviderError::InvalidResponse(format!("{method}: no result")))?;
        serde_json::from_value(result)
            .map_err(|e| ProviderError::InvalidResponse(format!("{method}: {e}")))
    }
}

impl Provider for JsonRpcProvider {
    async fn is_present(&self) -> bool {
        match self.chain_id().await {
            Ok(_) => true,
            Err(e) => {
                debug!(url = %self.url, error = %e, "provider probe failed");
                false
            }
        }
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        match self.request("eth_requestAccounts", json!([])).await {
            // plain nodes only know eth_accounts
            Err(ProviderError::Rpc { code, .. }) if code == METHOD_NOT_FOUND => {
                self.request("eth_accounts", json!([])).await
            }
            other => other,
        }
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        let quantity: String = self.request("eth_chainId", json!([])).await?;
        parse_quantity(&quantity)
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Vec<u8>,
    ) -> Result<TxHash, ProviderError> {
        let tx = CallObject {
            from,
            to,
            data: encode_data(&data),
        };
        let hash: String = self.request("eth_sendTransaction", json!([tx])).await?;
        hash.parse::<TxHash>()
            .map_err(|e| ProviderError::InvalidResponse(format!("transaction hash: {e}")))
    }

    async fn call(&self, from: Address, to: Address, data: Vec<u8>) -> Result<Vec<u8>, ProviderError> {
        let call = CallObject {
            from,
            to,
            data: encode_data(&data),
        };
        let result: String = self.request("eth_call", json!([call, "latest"])).await?;
        decode_data(&result)
    }

    fn provider_name(&self) -> &str {
        "json-rpc"
    }
}

/// Parse a hex quantity such as `0x539`.
pub fn parse_quantity(s: &str) -> Result<u64, ProviderError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| ProviderError::InvalidResponse(format!("quantity without 0x: {s}")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| ProviderError::InvalidResponse(format!("quantity {s}: {e}")))
}

pub fn encode_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn decode_data(s: &str) -> Result<Vec<u8>, ProviderError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| ProviderError::InvalidResponse(format!("data without 0x: {s}")))?;
    hex::decode(digits).map_err(|e| ProviderError::InvalidResponse(format!("data: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities() {
        assert_eq!(parse_quantity("0x539").unwrap(), 1337);
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert!(parse_quantity("539").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn data_hex() {
        assert_eq!(encode_data(&[0x54, 0x90, 0xeb, 0xdf]), "0x5490ebdf");
        assert_eq!(decode_data("0x").unwrap(), Vec::<u8>::new());
        assert!(decode_data("0x1").is_err());
    }

    #[test]
    fn revert_reason_appended_to_message() {
        let payload = hex::decode(format!(
            "08c379a0{:064x}{:064x}{:0<64}",
            0x20,
            4,
            hex::encode("nope")
        ))
        .unwrap();

        let err: ProviderError = RpcErrorObject {
            code: 3,
            message: "execution reverted".into(),
            data: Some(Value::String(encode_data(&payload))),
        }
        .into();
        assert_eq!(err.to_string(), "rpc error 3: execution reverted: nope");
    }

    #[test]
    fn call_object_shape() {
        let call = CallObject {
            from: Address([0x11; 20]),
            to: Address([0x22; 20]),
            data: "0x5490ebdf".into(),
        };
        let v = serde_json::to_value(&call).unwrap();
        assert_eq!(v["from"], format!("0x{}", "11".repeat(20)));
        assert_eq!(v["data"], "0x5490ebdf");
    }
}
