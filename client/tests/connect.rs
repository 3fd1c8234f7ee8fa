mod common;

use timestore_client::mock::{MockProvider, MOCK_ACCOUNT, MOCK_CHAIN_ID};
use timestore_client::{ConnectionError, ConnectionState, Session, WalletConnector};
use timestore_common::address::Address;
use timestore_common::interface::InterfaceDescriptor;

use common::contract_address;

async fn establish(mock: &MockProvider) -> Session<MockProvider> {
    Session::establish(
        WalletConnector::new(mock.clone()),
        contract_address(),
        InterfaceDescriptor::time_store(),
    )
    .await
}

/// With no provider the session is terminally unavailable and the wallet and
/// contract are never touched.
#[tokio::test]
async fn absent_provider_is_terminal() {
    let mock = MockProvider::absent();
    let session = establish(&mock).await;

    assert_eq!(session.state(), ConnectionState::Unavailable);
    assert_eq!(session.error(), Some(&ConnectionError::NoProvider));
    assert!(session.client().is_none());
    assert_eq!(mock.account_requests(), 0);
    assert_eq!(mock.call_count(), 0);
    assert_eq!(mock.send_count(), 0);
}

#[tokio::test]
async fn connector_reports_no_provider() {
    let err = WalletConnector::new(MockProvider::absent())
        .connect()
        .await
        .unwrap_err();
    assert_eq!(err, ConnectionError::NoProvider);
}

/// A user declining account access is an authorization failure, not a
/// missing provider.
#[tokio::test]
async fn rejected_authorization() {
    let mock = MockProvider::new();
    mock.reject_authorization();
    let session = establish(&mock).await;

    assert_eq!(session.state(), ConnectionState::Unavailable);
    match session.error() {
        Some(ConnectionError::AuthorizationFailed(reason)) => {
            assert!(reason.contains("4001"), "unexpected reason: {reason}");
        }
        other => panic!("expected AuthorizationFailed, got {other:?}"),
    }
    assert_eq!(mock.account_requests(), 1);
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn no_accounts_is_authorization_failure() {
    let mock = MockProvider::new();
    mock.set_accounts(vec![]);
    let session = establish(&mock).await;
    assert!(matches!(
        session.error(),
        Some(ConnectionError::AuthorizationFailed(_))
    ));
}

/// The first authorized account signs; the client is bound to the network
/// the wallet reported.
#[tokio::test]
async fn connected_session_binds_first_account() {
    let mock = MockProvider::new();
    let second = Address([0x22; 20]);
    mock.set_accounts(vec![MOCK_ACCOUNT, second]);
    let session = establish(&mock).await;

    assert_eq!(session.state(), ConnectionState::Connected);
    let client = session.client().unwrap();
    assert_eq!(client.account(), MOCK_ACCOUNT);
    assert_eq!(client.chain_id(), MOCK_CHAIN_ID);
    assert_eq!(client.address(), contract_address());
    assert!(session.error().is_none());
}

#[test]
fn state_defaults_to_uninitialized() {
    assert_eq!(ConnectionState::default(), ConnectionState::Uninitialized);
}
