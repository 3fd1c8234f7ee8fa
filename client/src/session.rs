//! The owned connection object for one client session.

use std::sync::Arc;

use timestore_common::address::Address;
use timestore_common::interface::InterfaceDescriptor;
use tracing::error;

use crate::contract::ContractClient;
use crate::provider::Provider;
use crate::wallet::{ConnectionError, ConnectionState, WalletConnector};

/// Outcome of connecting to the wallet at startup.
///
/// Only a connected session yields a [`ContractClient`], so nothing can poll
/// or submit after a failed connection. The client is built once and shared
/// for the rest of the session.
pub enum Session<P> {
    Connected(Arc<ContractClient<P>>),
    Unavailable(ConnectionError),
}

impl<P: Provider> Session<P> {
    /// Run the connector once and build the contract client on success.
    pub async fn establish(
        connector: WalletConnector<P>,
        contract_address: Address,
        interface: InterfaceDescriptor,
    ) -> Self {
        match connector.connect().await {
            Ok(signer) => Session::Connected(Arc::new(ContractClient::new(
                signer,
                contract_address,
                interface,
            ))),
            Err(e) => {
                error!(error = %e, "wallet unavailable, client disabled for this session");
                Session::Unavailable(e)
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self {
            Session::Connected(_) => ConnectionState::Connected,
            Session::Unavailable(_) => ConnectionState::Unavailable,
        }
    }

    pub fn client(&self) -> Option<&Arc<ContractClient<P>>> {
        match self {
            Session::Connected(client) => Some(client),
            Session::Unavailable(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ConnectionError> {
        match self {
            Session::Connected(_) => None,
            Session::Unavailable(e) => Some(e),
        }
    }
}

impl<P> std::fmt::Debug for Session<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Session::Connected(client) => f.debug_tuple("Connected").field(client).finish(),
            Session::Unavailable(e) => f.debug_tuple("Unavailable").field(e).finish(),
        }
    }
}
