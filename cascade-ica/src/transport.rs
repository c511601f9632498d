//! Collaborator seams: the delegated-account channel, the host ledger and
//! the storage mesh.
//!
//! Each is a trait so the workflow can run against the RPC and HTTP adapters
//! in production and against in-memory fakes in tests.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AckResult, Action, ClientStatus, DownloadOutcome, HostMsg};

/// Controller-side access to interchain accounts.
#[async_trait]
pub trait IcaTransport: Send + Sync {
    /// Delegated account address for (owner, connection), if registered.
    async fn query_ica_address(&self, owner: &str, connection_id: &str) -> Result<Option<String>>;

    /// Client id behind a connection, or `None` if the connection is unknown.
    async fn connection_client(&self, connection_id: &str) -> Result<Option<String>>;

    async fn client_status(&self, client_id: &str) -> Result<ClientStatus>;

    /// Submit a registration transaction; returns the controller tx hash.
    async fn register(&self, owner: &str, connection_id: &str, version: &str) -> Result<String>;

    /// Wrap `msg` for the delegated account, broadcast it and block until the
    /// host acknowledgement is observed.
    async fn send(&self, owner: &str, connection_id: &str, msg: &HostMsg) -> Result<AckResult>;
}

/// Read access to the host ledger's action module.
#[async_trait]
pub trait HostLedger: Send + Sync {
    /// Fails with `NotFound` when no such action exists.
    async fn get_action(&self, action_id: &str) -> Result<Action>;

    /// Fee amount (in the fee denomination) for a payload of `size_kib`.
    async fn action_fee(&self, size_kib: u64) -> Result<String>;
}

/// Off-chain byte transfer keyed by action id.
#[async_trait]
pub trait StorageMesh: Send + Sync {
    /// Upload `file` for `action_id`; returns the mesh task id.
    async fn upload(&self, action_id: &str, file: &Path, signer: &str) -> Result<String>;

    /// Download the artefact of `action_id` into `out_dir`.
    async fn download(
        &self,
        action_id: &str,
        out_dir: &Path,
        signer: &str,
    ) -> Result<DownloadOutcome>;
}
