//! Local file keystore.
//!
//! Keys live as JSON records in `<dir>/keyring-<backend>/<name>.json`. The
//! `test` backend stores the secret in the clear; the `file` backend seals
//! it with ChaCha20-Poly1305 under a passphrase-derived key. Opening reads
//! only the records for the requested key names and consumes one passphrase
//! line per sealed record it unlocks.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use hkdf::Hkdf;
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Signature, SigningKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sha3::Keccak256;
use tracing::debug;

use crate::config::{KeyAlgorithm, KeyringBackend};
use crate::error::KeyringError;
use crate::keyring::{KeyInfo, KeyStore, KeystoreBackend, OpenRequest, PassphraseReader};

const SEAL_INFO: &[u8] = b"cascade-ica keyring v1";

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

/// On-disk key record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyRecord {
    pub name: String,
    pub algorithm: String,
    /// Base64 SEC1 compressed public key.
    pub public_key: String,
    /// Hex secret, `test` backend only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sealed: Option<SealedSecret>,
}

/// Passphrase-sealed secret, hex fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SealedSecret {
    pub salt: String,
    pub nonce: String,
    pub ciphertext: String,
}

fn seal_key(passphrase: &str, salt: &[u8]) -> Result<ChaCha20Poly1305, String> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), passphrase.as_bytes());
    let mut key = [0u8; 32];
    hkdf.expand(SEAL_INFO, &mut key)
        .map_err(|e| format!("derive key: {e}"))?;
    Ok(ChaCha20Poly1305::new((&key).into()))
}

impl SealedSecret {
    pub fn seal(secret: &[u8], passphrase: &str) -> Result<Self, String> {
        let salt = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = seal_key(passphrase, &salt)?
            .encrypt(&nonce, secret)
            .map_err(|e| format!("encrypt: {e}"))?;
        Ok(Self {
            salt: hex::encode(salt),
            nonce: hex::encode(nonce),
            ciphertext: hex::encode(ciphertext),
        })
    }

    pub fn open(&self, passphrase: &str) -> Result<Vec<u8>, String> {
        let salt = hex::decode(&self.salt).map_err(|e| format!("salt: {e}"))?;
        let nonce = hex::decode(&self.nonce).map_err(|e| format!("nonce: {e}"))?;
        if nonce.len() != 12 {
            return Err(format!("nonce must be 12 bytes, got {}", nonce.len()));
        }
        let ciphertext = hex::decode(&self.ciphertext).map_err(|e| format!("ciphertext: {e}"))?;
        seal_key(passphrase, &salt)?
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| "wrong passphrase or corrupted record".to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BACKEND
// ═══════════════════════════════════════════════════════════════════════════════

/// `test` and `file` backends over a directory of JSON records.
#[derive(Clone, Debug, Default)]
pub struct LocalKeystore;

impl LocalKeystore {
    /// Directory holding the records for `request`.
    pub fn records_dir(request: &OpenRequest) -> Result<PathBuf, KeyringError> {
        let base = match &request.dir {
            Some(dir) => dir.clone(),
            None => dirs::home_dir()
                .map(|home| home.join(format!(".{}", request.app_name)))
                .ok_or_else(|| KeyringError::Open {
                    path: PathBuf::from("~"),
                    reason: "home directory is not available".into(),
                })?,
        };
        Ok(base.join(format!("keyring-{}", request.backend)))
    }

    /// Write a record for `secret` (32-byte scalar). `file` records need a passphrase.
    pub fn write_key(
        dir: &Path,
        backend: KeyringBackend,
        name: &str,
        algorithm: KeyAlgorithm,
        secret: &[u8],
        passphrase: Option<&str>,
    ) -> Result<KeyInfo, KeyringError> {
        let invalid = |reason: String| KeyringError::InvalidRecord {
            name: name.to_string(),
            reason,
        };
        let signing = SigningKey::from_slice(secret).map_err(|e| invalid(e.to_string()))?;
        let public_key = compressed(&signing);

        let (private_key, sealed) = match backend {
            KeyringBackend::Test => (Some(hex::encode(secret)), None),
            KeyringBackend::File => {
                let passphrase = passphrase.ok_or_else(missing_passphrase)?;
                (None, Some(SealedSecret::seal(secret, passphrase).map_err(invalid)?))
            }
            KeyringBackend::Os => {
                return Err(KeyringError::UnsupportedBackend(backend.to_string()))
            }
        };
        let record = KeyRecord {
            name: name.to_string(),
            algorithm: algorithm.to_string(),
            public_key: STANDARD.encode(&public_key),
            private_key,
            sealed,
        };

        let root = dir.join(format!("keyring-{backend}"));
        let open_error = |e: std::io::Error| KeyringError::Open {
            path: root.clone(),
            reason: e.to_string(),
        };
        fs::create_dir_all(&root).map_err(open_error)?;
        let json = serde_json::to_vec_pretty(&record).map_err(|e| invalid(e.to_string()))?;
        fs::write(root.join(format!("{name}.json")), json).map_err(open_error)?;

        Ok(KeyInfo {
            name: name.to_string(),
            algorithm,
            public_key,
        })
    }
}

impl KeystoreBackend for LocalKeystore {
    fn open(
        &self,
        request: &OpenRequest,
        mut passphrase: Option<PassphraseReader>,
    ) -> Result<Arc<dyn KeyStore>, KeyringError> {
        if request.backend == KeyringBackend::Os {
            return Err(KeyringError::UnsupportedBackend(request.backend.to_string()));
        }
        let root = Self::records_dir(request)?;
        let open_error = |reason: String| KeyringError::Open {
            path: root.clone(),
            reason,
        };
        if !root.is_dir() {
            return Err(open_error("keyring directory does not exist".into()));
        }

        let mut keys = HashMap::new();
        for name in &request.keys {
            if keys.contains_key(name) {
                continue;
            }
            let Some(record) = read_record(&root, name)? else {
                debug!(name, "no record for key");
                continue;
            };
            let key = LoadedKey::from_record(&record, request.backend, passphrase.as_mut())?;
            keys.insert(name.clone(), key);
        }
        debug!(dir = %root.display(), keys = keys.len(), "keyring opened");

        Ok(Arc::new(LocalKeys { keys }))
    }
}

/// Record stored for `name`, or `None` when the store has no such key.
fn read_record(root: &Path, name: &str) -> Result<Option<KeyRecord>, KeyringError> {
    let invalid = |reason: String| KeyringError::InvalidRecord {
        name: name.to_string(),
        reason,
    };
    if name.is_empty() || Path::new(name).file_name() != Some(std::ffi::OsStr::new(name)) {
        return Err(invalid("key name must be a plain file name".into()));
    }

    let path = root.join(format!("{name}.json"));
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(KeyringError::Open {
                path,
                reason: e.to_string(),
            })
        }
    };
    let record: KeyRecord = serde_json::from_slice(&bytes).map_err(|e| invalid(e.to_string()))?;
    if record.name != name {
        return Err(invalid(format!("record is named {:?}", record.name)));
    }
    Ok(Some(record))
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPENED STORE
// ═══════════════════════════════════════════════════════════════════════════════

struct LoadedKey {
    info: KeyInfo,
    signing: SigningKey,
}

impl LoadedKey {
    fn from_record(
        record: &KeyRecord,
        backend: KeyringBackend,
        passphrase: Option<&mut PassphraseReader>,
    ) -> Result<Self, KeyringError> {
        let invalid = |reason: String| KeyringError::InvalidRecord {
            name: record.name.clone(),
            reason,
        };
        let algorithm = KeyAlgorithm::parse(&record.algorithm, "algorithm")
            .map_err(|e| invalid(e.to_string()))?;

        let secret = match (backend, &record.private_key, &record.sealed) {
            (KeyringBackend::Test, Some(hex_secret), _) => {
                hex::decode(hex_secret).map_err(|e| invalid(e.to_string()))?
            }
            (KeyringBackend::File, _, Some(sealed)) => {
                let reader = passphrase.ok_or_else(missing_passphrase)?;
                let line = reader
                    .read_line()
                    .map_err(|e| KeyringError::Passphrase(e.to_string()))?;
                sealed.open(&line).map_err(|reason| {
                    KeyringError::Passphrase(format!("unlock {:?}: {reason}", record.name))
                })?
            }
            _ => return Err(invalid(format!("no secret usable by the {backend} backend"))),
        };

        let signing = SigningKey::from_slice(&secret).map_err(|e| invalid(e.to_string()))?;
        let public_key = compressed(&signing);
        let recorded = STANDARD
            .decode(&record.public_key)
            .map_err(|e| invalid(e.to_string()))?;
        if recorded != public_key {
            return Err(invalid("public key does not match secret".into()));
        }

        Ok(Self {
            info: KeyInfo {
                name: record.name.clone(),
                algorithm,
                public_key,
            },
            signing,
        })
    }
}

struct LocalKeys {
    keys: HashMap<String, LoadedKey>,
}

impl KeyStore for LocalKeys {
    fn key(&self, name: &str) -> Result<KeyInfo, KeyringError> {
        self.keys
            .get(name)
            .map(|k| k.info.clone())
            .ok_or_else(|| KeyringError::KeyNotFound(name.to_string()))
    }

    fn sign(&self, name: &str, message: &[u8]) -> Result<Vec<u8>, KeyringError> {
        let key = self
            .keys
            .get(name)
            .ok_or_else(|| KeyringError::KeyNotFound(name.to_string()))?;
        let digest = match key.info.algorithm {
            KeyAlgorithm::Secp256k1 => Sha256::digest(message).to_vec(),
            KeyAlgorithm::EthSecp256k1 => Keccak256::digest(message).to_vec(),
        };
        let signature: Signature = key
            .signing
            .sign_prehash(&digest)
            .map_err(|e| KeyringError::Signing {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        let signature = signature.normalize_s().unwrap_or(signature);
        Ok(signature.to_bytes().to_vec())
    }
}

fn missing_passphrase() -> KeyringError {
    KeyringError::Passphrase("file backend needs a passphrase".into())
}

fn compressed(signing: &SigningKey) -> Vec<u8> {
    k256::PublicKey::from(signing.verifying_key())
        .to_encoded_point(true)
        .as_bytes()
        .to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::signature::hazmat::PrehashVerifier;

    const SECRET: [u8; 32] = [0x11; 32];

    fn request(dir: &Path, backend: KeyringBackend, keys: &[&str]) -> OpenRequest {
        OpenRequest {
            backend,
            dir: Some(dir.to_path_buf()),
            app_name: "simd".into(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn write(dir: &Path, backend: KeyringBackend, name: &str, passphrase: Option<&str>) {
        LocalKeystore::write_key(dir, backend, name, KeyAlgorithm::Secp256k1, &SECRET, passphrase)
            .unwrap();
    }

    #[test]
    fn test_test_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let written = LocalKeystore::write_key(
            dir.path(),
            KeyringBackend::Test,
            "alice",
            KeyAlgorithm::Secp256k1,
            &SECRET,
            None,
        )
        .unwrap();

        let store = LocalKeystore
            .open(&request(dir.path(), KeyringBackend::Test, &["alice", "bob"]), None)
            .unwrap();
        assert_eq!(store.key("alice").unwrap(), written);
        assert!(matches!(store.key("bob"), Err(KeyringError::KeyNotFound(_))));
    }

    #[test]
    fn test_file_backend_consumes_passphrase_per_key() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["alice", "bob"] {
            write(dir.path(), KeyringBackend::File, name, Some("correct horse"));
        }
        let both = request(dir.path(), KeyringBackend::File, &["alice", "bob"]);

        let store = LocalKeystore
            .open(
                &both,
                Some(PassphraseReader::new("correct horse")),
            )
            .unwrap();
        assert!(store.key("alice").is_ok());
        assert!(store.key("bob").is_ok());

        let err = LocalKeystore
            .open(&both, Some(PassphraseReader::new("wrong")))
            .err()
            .unwrap();
        assert!(matches!(err, KeyringError::Passphrase(_)));

        let err = LocalKeystore.open(&both, None).err().unwrap();
        assert!(matches!(err, KeyringError::Passphrase(_)));
    }

    #[test]
    fn test_os_backend_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalKeystore
            .open(&request(dir.path(), KeyringBackend::Os, &["alice"]), None)
            .err()
            .unwrap();
        assert!(matches!(err, KeyringError::UnsupportedBackend(_)));
    }

    #[test]
    fn test_signatures_verify_with_algorithm_digest() {
        let dir = tempfile::tempdir().unwrap();
        for (name, algorithm) in [
            ("cosmos", KeyAlgorithm::Secp256k1),
            ("evm", KeyAlgorithm::EthSecp256k1),
        ] {
            LocalKeystore::write_key(
                dir.path(),
                KeyringBackend::Test,
                name,
                algorithm,
                &SECRET,
                None,
            )
            .unwrap();
        }
        let store = LocalKeystore
            .open(&request(dir.path(), KeyringBackend::Test, &["cosmos", "evm"]), None)
            .unwrap();
        let verifying = *SigningKey::from_slice(&SECRET).unwrap().verifying_key();

        let sig = Signature::from_slice(&store.sign("cosmos", b"payload").unwrap()).unwrap();
        verifying
            .verify_prehash(&Sha256::digest(b"payload"), &sig)
            .unwrap();

        let sig = Signature::from_slice(&store.sign("evm", b"payload").unwrap()).unwrap();
        verifying
            .verify_prehash(&Keccak256::digest(b"payload"), &sig)
            .unwrap();
    }

    #[test]
    fn test_missing_directory_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalKeystore
            .open(
                &request(&dir.path().join("absent"), KeyringBackend::Test, &["alice"]),
                None,
            )
            .err()
            .unwrap();
        assert!(matches!(err, KeyringError::Open { .. }));
    }

    #[test]
    fn test_unrelated_records_are_not_unlocked() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), KeyringBackend::File, "alice", Some("pw-a"));
        write(dir.path(), KeyringBackend::File, "zed", Some("pw-other"));
        std::fs::write(dir.path().join("keyring-file/notes.json"), b"{\"todo\": []}").unwrap();

        let store = LocalKeystore
            .open(
                &request(dir.path(), KeyringBackend::File, &["alice"]),
                Some(PassphraseReader::new("pw-a")),
            )
            .unwrap();
        assert!(store.key("alice").is_ok());
        assert!(matches!(store.key("zed"), Err(KeyringError::KeyNotFound(_))));
    }

    #[test]
    fn test_requested_key_without_record_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), KeyringBackend::Test, "alice", None);
        std::fs::write(dir.path().join("keyring-test/notes.json"), b"not json").unwrap();

        let store = LocalKeystore
            .open(&request(dir.path(), KeyringBackend::Test, &["alice", "alice", "bob"]), None)
            .unwrap();
        assert!(store.key("alice").is_ok());
        assert!(matches!(store.key("bob"), Err(KeyringError::KeyNotFound(_))));

        let err = LocalKeystore
            .open(&request(dir.path(), KeyringBackend::Test, &["notes"]), None)
            .err()
            .unwrap();
        assert!(matches!(err, KeyringError::InvalidRecord { .. }));

        let err = LocalKeystore
            .open(&request(dir.path(), KeyringBackend::Test, &["../alice"]), None)
            .err()
            .unwrap();
        assert!(matches!(err, KeyringError::InvalidRecord { .. }));
    }
}
