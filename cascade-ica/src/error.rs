//! Error types for the interchain-account client.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::KeyAlgorithm;
use crate::types::ActionState;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, IcaError>;

/// Malformed, missing or contradictory settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decode config: {0}")]
    Decode(#[from] toml::de::Error),

    #[error("expand {0}: home directory is not available")]
    HomeDirUnavailable(&'static str),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("host.log_level must be one of: debug, info, warn, error (got {0:?})")]
    InvalidLogLevel(String),

    #[error("controller.keyring_backend must be one of: os, file, test (got {0:?})")]
    InvalidKeyringBackend(String),

    #[error("{field} must be one of: secp256k1, eth_secp256k1 (got {value:?})")]
    InvalidKeyType { field: &'static str, value: String },

    #[error("controller.keyring_dir is required for file backend")]
    KeyringDirRequired,

    #[error(
        "only one of controller.keyring_passphrase_plain or \
         controller.keyring_passphrase_file may be set"
    )]
    ConflictingPassphrase,

    #[error("read controller.keyring_passphrase_file {path}: {source}")]
    PassphraseFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("controller.keyring_passphrase_file {0} is empty")]
    PassphraseFileEmpty(PathBuf),

    #[error("parse controller.gas_prices: {0}")]
    InvalidGasPrice(String),

    #[error("{field} must be a positive integer (got {value})")]
    InvalidNumber { field: &'static str, value: u64 },
}

/// Keystore open, lookup and sanity failures.
#[derive(Debug, Error)]
pub enum KeyringError {
    #[error("keyring backend {0:?} is not supported by this build")]
    UnsupportedBackend(String),

    #[error("open keyring at {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("keyring passphrase: {0}")]
    Passphrase(String),

    #[error("key {0:?} not found in keyring")]
    KeyNotFound(String),

    #[error("key {name:?} uses {actual} but configuration declares {expected}")]
    AlgorithmMismatch {
        name: String,
        expected: KeyAlgorithm,
        actual: KeyAlgorithm,
    },

    #[error("key {name:?} record is invalid: {reason}")]
    InvalidRecord { name: String, reason: String },

    #[error("sign with key {name:?}: {reason}")]
    Signing { name: String, reason: String },
}

/// Top-level error for every workflow step.
#[derive(Debug, Error)]
pub enum IcaError {
    // ═══════════════════════════════════════════════════════════════════════════════
    // CONFIGURATION & KEYS
    // ═══════════════════════════════════════════════════════════════════════════════
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Keyring(#[from] KeyringError),

    #[error("derive address for key {key:?} with prefix {prefix:?}: {reason}")]
    AddressDerivation {
        key: String,
        prefix: String,
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════════════════
    // REGISTRATION
    // ═══════════════════════════════════════════════════════════════════════════════
    #[error("precondition failed: connection {0} does not exist on the controller chain")]
    ConnectionMissing(String),

    #[error(
        "precondition failed: client {client_id} of connection {connection_id} is {status}, \
         expected Active"
    )]
    ClientInactive {
        connection_id: String,
        client_id: String,
        status: String,
    },

    #[error("interchain account for {owner} on {connection_id} did not appear before the deadline")]
    RegistrationTimeout {
        owner: String,
        connection_id: String,
    },

    // ═══════════════════════════════════════════════════════════════════════════════
    // SEND & ACTION STATE
    // ═══════════════════════════════════════════════════════════════════════════════
    #[error("send via interchain account: {0}")]
    SendAck(String),

    #[error("action {action_id} state is {actual}; expected {expected}")]
    ActionStateMismatch {
        action_id: String,
        actual: ActionState,
        expected: ActionState,
    },

    // ═══════════════════════════════════════════════════════════════════════════════
    // STORAGE MESH
    // ═══════════════════════════════════════════════════════════════════════════════
    #[error("upload to storage mesh: {0}")]
    Upload(String),

    #[error("download from storage mesh: {0}")]
    Download(String),

    // ═══════════════════════════════════════════════════════════════════════════════
    // LOOKUPS, DEADLINE & TRANSPORT
    // ═══════════════════════════════════════════════════════════════════════════════
    #[error("{0} not found")]
    NotFound(String),

    #[error("deadline exceeded while {0}")]
    DeadlineExceeded(String),

    #[error("request to {endpoint} failed: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl IcaError {
    /// Whether this error belongs to the timeout class.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            IcaError::DeadlineExceeded(_) | IcaError::RegistrationTimeout { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IcaError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        assert!(IcaError::DeadlineExceeded("downloading".into()).is_timeout());
        assert!(IcaError::RegistrationTimeout {
            owner: "cosmos1owner".into(),
            connection_id: "connection-0".into(),
        }
        .is_timeout());
        assert!(!IcaError::SendAck("rejected".into()).is_timeout());
    }

    #[test]
    fn test_missing_field_names_field() {
        let err = IcaError::from(ConfigError::MissingField("controller.connection_id"));
        assert_eq!(err.to_string(), "controller.connection_id is required");
    }

    #[test]
    fn test_state_mismatch_message() {
        let err = IcaError::ActionStateMismatch {
            action_id: "42".into(),
            actual: ActionState::Done,
            expected: ActionState::Pending,
        };
        assert_eq!(
            err.to_string(),
            "action 42 state is ACTION_STATE_DONE; expected ACTION_STATE_PENDING"
        );
    }
}
