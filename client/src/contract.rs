use timestore_common::abi::AbiError;
use timestore_common::address::{Address, TxHash};
use timestore_common::filter;
use timestore_common::interface::InterfaceDescriptor;
use timestore_common::message::{StoredMessage, SubmissionRequest};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::provider::Provider;
use crate::wallet::SigningHandle;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("submission rejected: {0}")]
    RemoteRejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("contract unavailable: {0}")]
    RemoteUnavailable(String),
    #[error("malformed contract response: {0}")]
    Malformed(#[from] AbiError),
}

/// Typed access to one deployed TimeStore contract.
///
/// Shared behind an `Arc` by the poll scheduler and user-action handlers for
/// the whole session.
pub struct ContractClient<P> {
    signer: SigningHandle<P>,
    address: Address,
    interface: InterfaceDescriptor,
    // at most one getMsgTimed call in flight per client
    fetch_gate: Mutex<()>,
}

impl<P: Provider> ContractClient<P> {
    pub fn new(signer: SigningHandle<P>, address: Address, interface: InterfaceDescriptor) -> Self {
        Self {
            signer,
            address,
            interface,
            fetch_gate: Mutex::new(()),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// The account submissions are sent from.
    pub fn account(&self) -> Address {
        self.signer.account()
    }

    pub fn chain_id(&self) -> u64 {
        self.signer.chain_id()
    }

    /// Send `storeMsg(text, unlockAt)` through the wallet.
    ///
    /// Returns once the wallet accepts the transaction; block confirmation is
    /// not awaited. The contract enforces the time lock.
    pub async fn submit(&self, request: SubmissionRequest) -> Result<TxHash, SubmitError> {
        let data = self.interface.encode_store(&request);
        match self.signer.send_transaction(self.address, data).await {
            Ok(hash) => {
                info!(tx = %hash, unlock_at = request.unlock_at(), "message submitted");
                Ok(hash)
            }
            Err(e) => {
                warn!(error = %e, "message submission rejected");
                Err(SubmitError::RemoteRejected(e.to_string()))
            }
        }
    }

    /// Every record `getMsgTimed()` returns for this account, placeholders
    /// included. Callers must run the result through [`filter::filter`]
    /// before display; see [`ContractClient::fetch_unlocked`].
    pub async fn fetch_all(&self) -> Result<Vec<StoredMessage>, FetchError> {
        let _gate = self.fetch_gate.lock().await;
        let raw = self
            .signer
            .call(self.address, self.interface.encode_fetch())
            .await
            .map_err(|e| FetchError::RemoteUnavailable(e.to_string()))?;
        let records = self.interface.decode_fetch(&raw)?;
        debug!(count = records.len(), "fetched stored messages");
        Ok(records)
    }

    /// Fetch and drop placeholders. The single refresh path for both the
    /// scheduler and manual refreshes.
    pub async fn fetch_unlocked(&self) -> Result<Vec<StoredMessage>, FetchError> {
        self.fetch_all().await.map(filter::into_unlocked)
    }
}

impl<P> std::fmt::Debug for ContractClient<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractClient")
            .field("address", &self.address)
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}
