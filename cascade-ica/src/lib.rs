//! # Cascade storage actions over interchain accounts
//!
//! A controller chain key drives a Lumera host chain through an ICS-27
//! interchain account. This crate holds everything a command needs:
//!
//! - typed two-chain configuration loaded from TOML
//! - a keyring provider and bech32 address derivation
//! - the interchain-account coordinator (query, register, send)
//! - the upload / approve / download / status workflows and their JSON reports
//!
//! ## Flow
//!
//! ```text
//! config ──► keyring ──► addresses ──► coordinator ──► workflow ──► JSON
//!                                          │               │
//!                                   IcaTransport     HostLedger / StorageMesh
//! ```
//!
//! Network collaborators sit behind [`IcaTransport`], [`HostLedger`] and
//! [`StorageMesh`]; the [`rpc`] and [`mesh`] modules provide the production
//! implementations.

pub mod address;
pub mod config;
pub mod deadline;
pub mod error;
pub mod ica;
pub mod keyring;
pub mod keystore;
pub mod mesh;
pub mod report;
pub mod rpc;
pub mod transport;
pub mod types;
pub mod workflow;

pub use address::{derive_address, ResolvedIdentity};
pub use config::{
    Config, ControllerChainConfig, HostChainConfig, KeyAlgorithm, KeyringBackend, MeshConfig,
};
pub use deadline::{Deadline, DEFAULT_COMMAND_TIMEOUT, MAX_COMMAND_TIMEOUT};
pub use error::{ConfigError, IcaError, KeyringError, Result};
pub use ica::IcaCoordinator;
pub use keyring::{KeyInfo, KeyStore, KeyringHandle, KeyringProvider, KeystoreBackend};
pub use keystore::LocalKeystore;
pub use mesh::HttpMesh;
pub use report::{ActionStatusReport, WorkflowResult};
pub use transport::{HostLedger, IcaTransport, StorageMesh};
pub use types::{Action, ActionState, ActionType, AckResult, DelegatedAccount, HostMsg};
pub use workflow::{ActionWorkflow, UploadRequest};
