//! Keyring provider.
//!
//! Opens one signing-key store per command from the controller settings and
//! checks that every key the configuration references has the declared
//! algorithm before anything is signed with it.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::config::{Config, ControllerChainConfig, KeyAlgorithm, KeyringBackend};
use crate::error::KeyringError;

/// Application name used when neither a binary nor a chain id is configured.
pub const DEFAULT_KEYRING_APP_NAME: &str = "lumera";

// ═══════════════════════════════════════════════════════════════════════════════
// BACKEND SEAM
// ═══════════════════════════════════════════════════════════════════════════════

/// Public half of a stored key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyInfo {
    pub name: String,
    pub algorithm: KeyAlgorithm,
    /// SEC1 compressed public key (33 bytes).
    pub public_key: Vec<u8>,
}

/// An opened key store. Read-only for the lifetime of a command.
pub trait KeyStore: Send + Sync {
    /// Look up a key by name.
    fn key(&self, name: &str) -> Result<KeyInfo, KeyringError>;

    /// Sign `message` with the named key, returning a 64-byte `r || s` signature.
    fn sign(&self, name: &str, message: &[u8]) -> Result<Vec<u8>, KeyringError>;
}

/// Parameters handed to a backend when opening a store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenRequest {
    pub backend: KeyringBackend,
    pub dir: Option<PathBuf>,
    pub app_name: String,
    /// Keys the command will use. Other records in the store are left alone.
    pub keys: Vec<String>,
}

/// Something that can open key stores.
pub trait KeystoreBackend: Send + Sync {
    fn open(
        &self,
        request: &OpenRequest,
        passphrase: Option<PassphraseReader>,
    ) -> Result<Arc<dyn KeyStore>, KeyringError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASSPHRASE READER
// ═══════════════════════════════════════════════════════════════════════════════

/// Endless byte stream that replays `passphrase + "\n"`, so a backend may
/// prompt once per key or once per unlock.
#[derive(Clone)]
pub struct PassphraseReader {
    data: Vec<u8>,
    pos: usize,
}

impl PassphraseReader {
    pub fn new(passphrase: &str) -> Self {
        let mut data = passphrase.as_bytes().to_vec();
        data.push(b'\n');
        Self { data, pos: 0 }
    }

    /// Next prompt answer, without the trailing newline.
    pub fn read_line(&mut self) -> io::Result<String> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            self.read_exact(&mut byte)?;
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
        }
        String::from_utf8(line).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl Read for PassphraseReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            if self.pos == self.data.len() {
                self.pos = 0;
            }
            let chunk = (self.data.len() - self.pos).min(buf.len() - n);
            buf[n..n + chunk].copy_from_slice(&self.data[self.pos..self.pos + chunk]);
            n += chunk;
            self.pos += chunk;
        }
        Ok(n)
    }
}

impl std::fmt::Debug for PassphraseReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PassphraseReader(<redacted>)")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROVIDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Opened keyring, shared read-only by every component of one command.
#[derive(Clone)]
pub struct KeyringHandle {
    store: Arc<dyn KeyStore>,
    app_name: String,
}

impl KeyringHandle {
    pub fn new(store: Arc<dyn KeyStore>, app_name: impl Into<String>) -> Self {
        Self {
            store,
            app_name: app_name.into(),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn key(&self, name: &str) -> Result<KeyInfo, KeyringError> {
        self.store.key(name)
    }

    pub fn sign(&self, name: &str, message: &[u8]) -> Result<Vec<u8>, KeyringError> {
        self.store.sign(name, message)
    }

    /// Fail unless `name` exists and uses `expected`.
    pub fn check_algorithm(
        &self,
        name: &str,
        expected: KeyAlgorithm,
    ) -> Result<KeyInfo, KeyringError> {
        let info = self.store.key(name)?;
        if info.algorithm != expected {
            return Err(KeyringError::AlgorithmMismatch {
                name: name.to_string(),
                expected,
                actual: info.algorithm,
            });
        }
        Ok(info)
    }
}

impl std::fmt::Debug for KeyringHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringHandle")
            .field("app_name", &self.app_name)
            .finish_non_exhaustive()
    }
}

/// Builds [`KeyringHandle`]s on top of a concrete backend.
pub struct KeyringProvider<B> {
    backend: B,
}

impl<B: KeystoreBackend> KeyringProvider<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Open the controller keyring and check every referenced key.
    pub fn open(
        &self,
        controller: &ControllerChainConfig,
        referenced: &[(&str, KeyAlgorithm)],
    ) -> Result<KeyringHandle, KeyringError> {
        let request = OpenRequest {
            backend: controller.keyring_backend,
            dir: controller.keyring_dir.clone(),
            app_name: keyring_app_name(controller),
            keys: referenced.iter().map(|(name, _)| name.to_string()).collect(),
        };
        debug!(
            backend = %request.backend,
            app = %request.app_name,
            dir = ?request.dir,
            keys = ?request.keys,
            "opening keyring"
        );

        let passphrase = controller.passphrase.passphrase().map(PassphraseReader::new);
        let store = self.backend.open(&request, passphrase)?;
        let handle = KeyringHandle::new(store, request.app_name);

        for (name, expected) in referenced {
            handle.check_algorithm(name, *expected)?;
        }
        Ok(handle)
    }

    /// Open for a full configuration: controller key and host key are both checked.
    pub fn open_for(&self, config: &Config) -> Result<KeyringHandle, KeyringError> {
        self.open(&config.controller, &referenced_keys(config))
    }
}

/// Keys a configuration refers to, with their declared algorithms.
pub fn referenced_keys(config: &Config) -> Vec<(&str, KeyAlgorithm)> {
    let mut keys = vec![(config.controller.key_name.as_str(), config.controller.key_type)];
    if config.host.key_name != config.controller.key_name
        || config.host.key_type != config.controller.key_type
    {
        keys.push((config.host.key_name.as_str(), config.host.key_type));
    }
    keys
}

/// Keyring namespace: basename of the binary, else chain id, else `lumera`.
pub fn keyring_app_name(controller: &ControllerChainConfig) -> String {
    if let Some(base) = controller
        .binary
        .as_deref()
        .and_then(|b| Path::new(b).file_name())
        .and_then(|b| b.to_str())
    {
        return base.to_string();
    }
    if !controller.chain_id.is_empty() {
        return controller.chain_id.clone();
    }
    DEFAULT_KEYRING_APP_NAME.to_string()
}
