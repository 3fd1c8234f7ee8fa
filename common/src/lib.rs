pub mod abi;
pub mod address;
pub mod config;
pub mod filter;
pub mod interface;
pub mod message;
pub mod schedule;
