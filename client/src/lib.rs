//! Client for the TimeStore contract: wallet connection, message submission,
//! and periodic retrieval of unlocked messages.

pub mod board;
pub mod contract;
pub mod mock;
pub mod provider;
pub mod rpc;
pub mod scheduler;
pub mod session;
pub mod wallet;

pub use board::MessageBoard;
pub use contract::{ContractClient, FetchError, SubmitError};
pub use provider::{Provider, ProviderError};
pub use scheduler::{PollHandle, PollScheduler, PollStatus, ScheduleError};
pub use session::Session;
pub use wallet::{ConnectionError, ConnectionState, SigningHandle, WalletConnector};
