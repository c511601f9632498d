//! Tendermint-RPC adapters for the controller and host chains.

pub mod chain;
pub mod client;
pub mod proto;

pub use chain::{RpcHostLedger, RpcIcaTransport};
pub use client::TendermintClient;
