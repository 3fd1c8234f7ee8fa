#![allow(dead_code)]

use std::sync::Arc;

use timestore_client::mock::MockProvider;
use timestore_client::{ContractClient, Session, WalletConnector};
use timestore_common::address::Address;
use timestore_common::config::DEFAULT_CONTRACT_ADDRESS;
use timestore_common::interface::InterfaceDescriptor;
use timestore_common::message::StoredMessage;

pub fn contract_address() -> Address {
    DEFAULT_CONTRACT_ADDRESS.parse().unwrap()
}

/// Connect a session to `mock` and return its contract client.
pub async fn connect(mock: &MockProvider) -> Arc<ContractClient<MockProvider>> {
    let session = Session::establish(
        WalletConnector::new(mock.clone()),
        contract_address(),
        InterfaceDescriptor::time_store(),
    )
    .await;
    session.client().cloned().expect("mock wallet should connect")
}

pub fn msg(id: u64, unlock_time: u64, text: &str) -> StoredMessage {
    StoredMessage {
        id,
        unlock_time,
        text: text.into(),
    }
}
