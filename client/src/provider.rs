//! Abstraction over the wallet/provider the client runs against.
//!
//! Implementations:
//! - [`JsonRpcProvider`](crate::rpc::JsonRpcProvider): an EIP-1193 style node or
//!   wallet reachable over JSON-RPC. The wallet signs transactions itself.
//! - [`MockProvider`](crate::mock::MockProvider): in-memory contract for
//!   development and tests.

use std::future::Future;

use timestore_common::address::{Address, TxHash};

/// EIP-1193 code for a request the user declined in the wallet UI.
pub const USER_REJECTED: i64 = 4001;

/// JSON-RPC code for an unsupported method.
pub const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, Self::Rpc { code, .. } if *code == USER_REJECTED)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Wallet/provider capabilities the client depends on.
///
/// `send_transaction` hands unsigned calldata to the wallet, which signs and
/// broadcasts it; `call` is a read-only execution at the latest block.
pub trait Provider: Send + Sync + 'static {
    /// Whether a usable provider exists in this environment.
    fn is_present(&self) -> impl Future<Output = bool> + Send;

    /// Ask the wallet for account access. May prompt the user.
    fn request_accounts(&self) -> impl Future<Output = Result<Vec<Address>, ProviderError>> + Send;

    /// Chain id of the active network.
    fn chain_id(&self) -> impl Future<Output = Result<u64, ProviderError>> + Send;

    fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Vec<u8>,
    ) -> impl Future<Output = Result<TxHash, ProviderError>> + Send;

    fn call(
        &self,
        from: Address,
        to: Address,
        data: Vec<u8>,
    ) -> impl Future<Output = Result<Vec<u8>, ProviderError>> + Send;

    /// Human-readable provider name (e.g. "json-rpc", "mock").
    fn provider_name(&self) -> &str;
}
