use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use timestore_common::abi;
use timestore_common::address::{Address, TxHash};
use timestore_common::interface::InterfaceDescriptor;
use timestore_common::message::StoredMessage;

use crate::provider::{Provider, ProviderError, USER_REJECTED};

/// Account the mock wallet authorizes unless told otherwise.
pub const MOCK_ACCOUNT: Address = Address([0x11; 20]);

/// Chain id reported by the mock (the usual local devnet id).
pub const MOCK_CHAIN_ID: u64 = 1337;

/// In-memory wallet plus TimeStore contract.
///
/// Messages are kept per sender. `getMsgTimed()` returns one entry per stored
/// message: unlocked ones in full, locked ones zero-filled, which is how the
/// deployed contract answers. Clones share state, so a test can keep a handle
/// after giving one to the connector.
#[derive(Clone)]
pub struct MockProvider {
    inner: Arc<MockInner>,
}

struct MockInner {
    present: bool,
    accounts: Mutex<Vec<Address>>,
    reject_authorization: AtomicBool,
    interface: InterfaceDescriptor,
    contract: Mutex<MockContract>,
    block_time: AtomicU64,
    fail_calls: AtomicBool,
    fail_sends: AtomicBool,
    raw_response: Mutex<Option<Vec<u8>>>,
    call_delay: Mutex<Duration>,
    account_requests: AtomicUsize,
    calls: AtomicUsize,
    sends: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[derive(Default)]
struct MockContract {
    next_id: u64,
    by_sender: HashMap<Address, Vec<StoredMessage>>,
}

impl MockContract {
    fn store(&mut self, sender: Address, text: String, unlock_time: u64) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.by_sender.entry(sender).or_default().push(StoredMessage {
            id,
            unlock_time,
            text,
        });
        id
    }

    fn visible_to(&self, sender: &Address, now: u64) -> Vec<StoredMessage> {
        self.by_sender
            .get(sender)
            .map(|msgs| {
                msgs.iter()
                    .map(|m| {
                        if m.unlock_time <= now {
                            m.clone()
                        } else {
                            StoredMessage {
                                id: 0,
                                unlock_time: 0,
                                text: String::new(),
                            }
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// A present wallet with [`MOCK_ACCOUNT`] authorized.
    pub fn new() -> Self {
        Self::build(true)
    }

    /// No wallet in the environment.
    pub fn absent() -> Self {
        Self::build(false)
    }

    fn build(present: bool) -> Self {
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        Self {
            inner: Arc::new(MockInner {
                present,
                accounts: Mutex::new(vec![MOCK_ACCOUNT]),
                reject_authorization: AtomicBool::new(false),
                interface: InterfaceDescriptor::time_store(),
                contract: Mutex::new(MockContract::default()),
                block_time: AtomicU64::new(now),
                fail_calls: AtomicBool::new(false),
                fail_sends: AtomicBool::new(false),
                raw_response: Mutex::new(None),
                call_delay: Mutex::new(Duration::ZERO),
                account_requests: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                sends: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn set_accounts(&self, accounts: Vec<Address>) {
        *lock(&self.inner.accounts) = accounts;
    }

    /// Make the wallet refuse account access as a user would.
    pub fn reject_authorization(&self) {
        self.inner.reject_authorization.store(true, Ordering::SeqCst);
    }

    /// Timestamp the contract compares unlock times against.
    pub fn set_block_time(&self, unix_secs: u64) {
        self.inner.block_time.store(unix_secs, Ordering::SeqCst);
    }

    pub fn set_fail_calls(&self, fail: bool) {
        self.inner.fail_calls.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.inner.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Answer every `eth_call` with these bytes instead of the contract state.
    pub fn set_raw_response(&self, data: Option<Vec<u8>>) {
        *lock(&self.inner.raw_response) = data;
    }

    /// Hold each read call for `delay` (tokio time).
    pub fn set_call_delay(&self, delay: Duration) {
        *lock(&self.inner.call_delay) = delay;
    }

    /// Store a message directly, bypassing the wallet. Returns its id.
    pub fn seed(&self, sender: Address, text: &str, unlock_time: u64) -> u64 {
        lock(&self.inner.contract).store(sender, text.to_string(), unlock_time)
    }

    pub fn account_requests(&self) -> usize {
        self.inner.account_requests.load(Ordering::SeqCst)
    }

    /// Number of read-only calls received.
    pub fn call_count(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Number of transactions received.
    pub fn send_count(&self) -> usize {
        self.inner.sends.load(Ordering::SeqCst)
    }

    /// Highest number of read calls that were ever running at once.
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Counts one read call as in flight until dropped, even if the call is
/// cancelled mid-delay.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn reverted(reason: &str) -> ProviderError {
    ProviderError::Rpc {
        code: -32000,
        message: format!("execution reverted: {reason}"),
    }
}

impl Provider for MockProvider {
    async fn is_present(&self) -> bool {
        self.inner.present
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.inner.account_requests.fetch_add(1, Ordering::SeqCst);
        if self.inner.reject_authorization.load(Ordering::SeqCst) {
            return Err(ProviderError::Rpc {
                code: USER_REJECTED,
                message: "User rejected the request.".into(),
            });
        }
        Ok(lock(&self.inner.accounts).clone())
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(MOCK_CHAIN_ID)
    }

    async fn send_transaction(
        &self,
        from: Address,
        _to: Address,
        data: Vec<u8>,
    ) -> Result<TxHash, ProviderError> {
        let n = self.inner.sends.fetch_add(1, Ordering::SeqCst) + 1;
        if self.inner.fail_sends.load(Ordering::SeqCst) {
            return Err(ProviderError::Rpc {
                code: USER_REJECTED,
                message: "User denied transaction signature.".into(),
            });
        }
        let (selector, text, unlock_at) = abi::decode_store_msg(&data)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        if selector != self.inner.interface.store_msg.selector {
            return Err(reverted("unknown selector"));
        }
        lock(&self.inner.contract).store(from, text, unlock_at);

        let mut hash = [0u8; 32];
        hash[24..].copy_from_slice(&(n as u64).to_be_bytes());
        Ok(TxHash(hash))
    }

    async fn call(&self, from: Address, _to: Address, data: Vec<u8>) -> Result<Vec<u8>, ProviderError> {
        let inner = &self.inner;
        inner.calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&inner.in_flight, &inner.max_in_flight);

        let delay = *lock(&inner.call_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let raw = lock(&inner.raw_response).clone();
        if inner.fail_calls.load(Ordering::SeqCst) {
            Err(ProviderError::Transport("connection refused".into()))
        } else if data != inner.interface.encode_fetch() {
            Err(reverted("unknown selector"))
        } else if let Some(raw) = raw {
            Ok(raw)
        } else {
            let now = inner.block_time.load(Ordering::SeqCst);
            let visible = lock(&inner.contract).visible_to(&from, now);
            Ok(abi::encode_messages(&visible))
        }
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}
