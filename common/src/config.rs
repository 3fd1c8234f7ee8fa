//! Deploy-time constants.
//!
//! Both values are fixed when the client is built. `TIMESTORE_CONTRACT_ADDRESS`
//! and `TIMESTORE_PROVIDER_URL` may be set in the build environment to target
//! a different network.

use crate::address::{Address, HexError};

/// TimeStore deployment the client talks to by default.
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x2c93564045502dBC5e90009e8408C0B7b888523e";

/// JSON-RPC endpoint of the wallet/node when none is compiled in.
pub const DEFAULT_PROVIDER_URL: &str = "http://localhost:8545";

/// Minutes between scheduled polls of the contract.
pub const REFRESH_MINUTES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub contract_address: Address,
    pub provider_url: String,
    pub refresh_minutes: u32,
}

impl ClientConfig {
    /// Configuration baked in at compile time.
    pub fn compiled() -> Result<Self, HexError> {
        let address = option_env!("TIMESTORE_CONTRACT_ADDRESS")
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_CONTRACT_ADDRESS);
        let provider_url = option_env!("TIMESTORE_PROVIDER_URL")
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_PROVIDER_URL);
        Ok(Self {
            contract_address: address.parse()?,
            provider_url: provider_url.to_string(),
            refresh_minutes: REFRESH_MINUTES,
        })
    }
}
