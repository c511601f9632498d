//! Bech32 address derivation.
//!
//! The prefix is always passed in explicitly; nothing here holds a global
//! address configuration.

use bech32::{Bech32, Hrp};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use sha3::Keccak256;

use crate::config::{Config, KeyAlgorithm};
use crate::error::{IcaError, Result};
use crate::keyring::{KeyInfo, KeyringHandle};

/// Controller and host addresses of the configured identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedIdentity {
    /// Owner address on the controller chain.
    pub controller_address: String,
    /// Address of the host-chain key under the host prefix.
    pub host_address: String,
}

impl ResolvedIdentity {
    /// Derive both addresses. The host address uses `host.key_name`, which is
    /// the controller key unless the configuration names a different one.
    pub fn resolve(keyring: &KeyringHandle, config: &Config) -> Result<Self> {
        Ok(Self {
            controller_address: derive_address(
                keyring,
                &config.controller.key_name,
                &config.controller.account_hrp,
            )?,
            host_address: derive_address(keyring, &config.host.key_name, &config.host.account_hrp)?,
        })
    }
}

/// Address of `key_name` under `prefix`.
pub fn derive_address(keyring: &KeyringHandle, key_name: &str, prefix: &str) -> Result<String> {
    let info = keyring.key(key_name)?;
    address_from_key(&info, prefix)
}

/// Address of an already-loaded key under `prefix`.
pub fn address_from_key(info: &KeyInfo, prefix: &str) -> Result<String> {
    let failure = |reason: String| IcaError::AddressDerivation {
        key: info.name.clone(),
        prefix: prefix.to_string(),
        reason,
    };
    let bytes = account_bytes(info.algorithm, &info.public_key).map_err(failure)?;
    encode_address(prefix, &bytes).map_err(failure)
}

/// 20-byte account identifier of a public key.
pub fn account_bytes(
    algorithm: KeyAlgorithm,
    public_key: &[u8],
) -> std::result::Result<[u8; 20], String> {
    let key = k256::PublicKey::from_sec1_bytes(public_key)
        .map_err(|_| format!("invalid secp256k1 public key ({} bytes)", public_key.len()))?;

    let mut out = [0u8; 20];
    match algorithm {
        KeyAlgorithm::Secp256k1 => {
            let compressed = key.to_encoded_point(true);
            let sha = Sha256::digest(compressed.as_bytes());
            out.copy_from_slice(&Ripemd160::digest(sha));
        }
        KeyAlgorithm::EthSecp256k1 => {
            let uncompressed = key.to_encoded_point(false);
            let hash = Keccak256::digest(&uncompressed.as_bytes()[1..]);
            out.copy_from_slice(&hash[12..]);
        }
    }
    Ok(out)
}

/// Bech32-encode `bytes` under `prefix`.
pub fn encode_address(prefix: &str, bytes: &[u8]) -> std::result::Result<String, String> {
    let hrp = Hrp::parse(prefix).map_err(|e| format!("invalid prefix: {e}"))?;
    bech32::encode::<Bech32>(hrp, bytes).map_err(|e| format!("encode: {e}"))
}

/// Split an address into its prefix and payload bytes.
pub fn decode_address(address: &str) -> Result<(String, Vec<u8>)> {
    let (hrp, data) = bech32::decode(address)
        .map_err(|e| IcaError::InvalidInput(format!("address {address:?}: {e}")))?;
    Ok((hrp.as_str().to_string(), data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use k256::ecdsa::SigningKey;

    use crate::error::KeyringError;
    use crate::keyring::KeyStore;

    fn key_info(secret: u8, algorithm: KeyAlgorithm) -> KeyInfo {
        let mut bytes = [0u8; 32];
        bytes[31] = secret;
        let signing = SigningKey::from_slice(&bytes).unwrap();
        KeyInfo {
            name: "alice".into(),
            algorithm,
            public_key: signing.verifying_key().to_encoded_point(true).as_bytes().to_vec(),
        }
    }

    struct OneKey(KeyInfo);

    impl KeyStore for OneKey {
        fn key(&self, name: &str) -> std::result::Result<KeyInfo, KeyringError> {
            if name == self.0.name {
                Ok(self.0.clone())
            } else {
                Err(KeyringError::KeyNotFound(name.into()))
            }
        }

        fn sign(&self, _name: &str, _message: &[u8]) -> std::result::Result<Vec<u8>, KeyringError> {
            Ok(vec![0; 64])
        }
    }

    #[test]
    fn test_eth_address_matches_known_vector() {
        let info = key_info(1, KeyAlgorithm::EthSecp256k1);
        let bytes = account_bytes(info.algorithm, &info.public_key).unwrap();
        assert_eq!(hex::encode(bytes), "7e5f4552091a69125d5dfcb7b8c2659029395bdf");
    }

    fn one_key_ring(algorithm: KeyAlgorithm) -> KeyringHandle {
        KeyringHandle::new(Arc::new(OneKey(key_info(7, algorithm))), "test")
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let keyring = one_key_ring(KeyAlgorithm::Secp256k1);
        let a = derive_address(&keyring, "alice", "cosmos").unwrap();
        let b = derive_address(&keyring, "alice", "cosmos").unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("cosmos1"));
    }

    #[test]
    fn test_prefixes_share_underlying_bytes() {
        let keyring = one_key_ring(KeyAlgorithm::Secp256k1);
        let controller = derive_address(&keyring, "alice", "cosmos").unwrap();
        let host = derive_address(&keyring, "alice", "lumera").unwrap();
        assert_ne!(controller, host);

        let (hrp_a, bytes_a) = decode_address(&controller).unwrap();
        let (hrp_b, bytes_b) = decode_address(&host).unwrap();
        assert_eq!(hrp_a, "cosmos");
        assert_eq!(hrp_b, "lumera");
        assert_eq!(bytes_a, bytes_b);
        assert_eq!(bytes_a.len(), 20);
    }

    #[test]
    fn test_invalid_prefix_is_derivation_error() {
        let info = key_info(7, KeyAlgorithm::Secp256k1);
        let err = address_from_key(&info, "").unwrap_err();
        assert!(matches!(err, IcaError::AddressDerivation { .. }));
    }

    #[test]
    fn test_invalid_public_key_rejected() {
        assert!(account_bytes(KeyAlgorithm::Secp256k1, &[1, 2, 3]).is_err());
    }
}
