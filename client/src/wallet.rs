use serde::{Deserialize, Serialize};
use timestore_common::address::{Address, TxHash};
use tracing::{info, warn};

use crate::provider::{Provider, ProviderError};

/// Where the session stands with respect to the wallet.
///
/// `Unavailable` is terminal: nothing retries a failed connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Uninitialized,
    Connected,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("no wallet provider detected")]
    NoProvider,
    #[error("wallet authorization failed: {0}")]
    AuthorizationFailed(String),
}

/// An authorized account on the active network.
///
/// Only the [`ContractClient`](crate::contract::ContractClient) holds one; it
/// is never handed to presentation code.
pub struct SigningHandle<P> {
    provider: P,
    account: Address,
    chain_id: u64,
}

impl<P: Provider> SigningHandle<P> {
    pub fn account(&self) -> Address {
        self.account
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub(crate) async fn send_transaction(
        &self,
        to: Address,
        data: Vec<u8>,
    ) -> Result<TxHash, ProviderError> {
        self.provider.send_transaction(self.account, to, data).await
    }

    pub(crate) async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, ProviderError> {
        self.provider.call(self.account, to, data).await
    }
}

impl<P> std::fmt::Debug for SigningHandle<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningHandle")
            .field("account", &self.account)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

/// Detects the provider and obtains account authorization, once.
pub struct WalletConnector<P> {
    provider: P,
}

impl<P: Provider> WalletConnector<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Connect to the wallet. Consumes the connector so it cannot run twice.
    ///
    /// The first authorized account becomes the signing account.
    pub async fn connect(self) -> Result<SigningHandle<P>, ConnectionError> {
        let name = self.provider.provider_name().to_string();
        if !self.provider.is_present().await {
            warn!(provider = %name, "no wallet provider present");
            return Err(ConnectionError::NoProvider);
        }

        let accounts = self.provider.request_accounts().await.map_err(|e| {
            if e.is_user_rejection() {
                warn!(provider = %name, "user rejected account access");
            }
            ConnectionError::AuthorizationFailed(e.to_string())
        })?;
        let Some(account) = accounts.first().copied() else {
            return Err(ConnectionError::AuthorizationFailed(
                "wallet returned no accounts".into(),
            ));
        };

        let chain_id = self
            .provider
            .chain_id()
            .await
            .map_err(|e| ConnectionError::AuthorizationFailed(e.to_string()))?;

        info!(provider = %name, %account, chain_id, "wallet connected");
        Ok(SigningHandle {
            provider: self.provider,
            account,
            chain_id,
        })
    }
}
