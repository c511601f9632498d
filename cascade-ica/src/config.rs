//! Two-chain configuration.
//!
//! The file is decoded into loosely-typed raw sections first, `~` paths are
//! expanded, and the result is validated into the typed [`Config`]. Every
//! failure names the offending field so the command can stop before any
//! network call is made.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Default bech32 prefix of host-chain addresses.
pub const DEFAULT_HOST_ACCOUNT_HRP: &str = "lumera";
/// Default denomination used for action prices.
pub const DEFAULT_HOST_FEE_DENOM: &str = "ulume";
/// Gas limit used for controller transactions when none is configured.
pub const DEFAULT_GAS_LIMIT: u64 = 300_000;
/// Seconds between polls of controller, host and mesh state.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
/// Per-request timeout of the storage-mesh gateway.
pub const DEFAULT_MESH_REQUEST_TIMEOUT_SECS: u64 = 30;

// ═══════════════════════════════════════════════════════════════════════════════
// ENUMERATED SETTINGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Log verbosity accepted in `host.log_level`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Normalize a configured token. Blank means `info`, `warning` means `warn`.
    pub fn normalize(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ConfigError::InvalidLogLevel(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keystore backend kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyringBackend {
    /// Operating-system keychain.
    Os,
    /// Passphrase-protected files under `keyring_dir`.
    File,
    /// Unencrypted files, for development chains.
    Test,
}

impl KeyringBackend {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "os" => Ok(KeyringBackend::Os),
            "file" => Ok(KeyringBackend::File),
            "test" => Ok(KeyringBackend::Test),
            _ => Err(ConfigError::InvalidKeyringBackend(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyringBackend::Os => "os",
            KeyringBackend::File => "file",
            KeyringBackend::Test => "test",
        }
    }
}

impl fmt::Display for KeyringBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signature algorithm family of a stored key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// Cosmos-style secp256k1 (ripemd160 over sha256 addresses).
    #[default]
    Secp256k1,
    /// Ethereum-style secp256k1 (keccak256 addresses).
    EthSecp256k1,
}

impl KeyAlgorithm {
    pub fn parse(value: &str, field: &'static str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "secp256k1" => Ok(KeyAlgorithm::Secp256k1),
            "eth_secp256k1" => Ok(KeyAlgorithm::EthSecp256k1),
            _ => Err(ConfigError::InvalidKeyType {
                field,
                value: value.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAlgorithm::Secp256k1 => "secp256k1",
            KeyAlgorithm::EthSecp256k1 => "eth_secp256k1",
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the keystore passphrase comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum PassphraseSource {
    /// No passphrase configured; the backend runs without one.
    None,
    /// Given inline in the config file.
    Plain(String),
    /// Read eagerly from a file at load time.
    File { path: PathBuf, passphrase: String },
}

impl PassphraseSource {
    /// The passphrase text, if any.
    pub fn passphrase(&self) -> Option<&str> {
        match self {
            PassphraseSource::None => None,
            PassphraseSource::Plain(p) => Some(p),
            PassphraseSource::File { passphrase, .. } => Some(passphrase),
        }
    }
}

impl fmt::Debug for PassphraseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassphraseSource::None => f.write_str("None"),
            PassphraseSource::Plain(_) => f.write_str("Plain(<redacted>)"),
            PassphraseSource::File { path, .. } => {
                write!(f, "File({}, <redacted>)", path.display())
            }
        }
    }
}

/// Fractional digits carried by a gas price amount.
pub const GAS_PRICE_DECIMALS: u32 = 18;
const GAS_PRICE_SCALE: u128 = 10u128.pow(GAS_PRICE_DECIMALS);

/// A single decimal coin, e.g. `0.025stake`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GasPrice {
    /// Amount scaled by 10^[`GAS_PRICE_DECIMALS`].
    pub scaled_amount: u128,
    pub denom: String,
}

impl GasPrice {
    /// Parse `controller.gas_prices`. Blank means no price; more than one
    /// coin is rejected.
    pub fn parse(value: &str) -> Result<Option<Self>, ConfigError> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(None);
        }
        if value.contains(',') {
            return Err(ConfigError::InvalidGasPrice(format!(
                "expected a single coin, got {value:?}"
            )));
        }

        let split = value
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| ConfigError::InvalidGasPrice(format!("missing denom in {value:?}")))?;
        let (amount, denom) = value.split_at(split);

        let scaled_amount = parse_scaled(amount).ok_or_else(|| {
            ConfigError::InvalidGasPrice(format!("invalid amount in {value:?}"))
        })?;
        if !is_valid_denom(denom) {
            return Err(ConfigError::InvalidGasPrice(format!(
                "invalid denom {denom:?}"
            )));
        }

        Ok(Some(Self {
            scaled_amount,
            denom: denom.to_string(),
        }))
    }

    /// Fee for `gas_limit`, rounded up to a whole unit.
    pub fn fee_for(&self, gas_limit: u64) -> u128 {
        let gas = u128::from(gas_limit);
        let whole = (self.scaled_amount / GAS_PRICE_SCALE).saturating_mul(gas);
        let fraction = (self.scaled_amount % GAS_PRICE_SCALE) * gas;
        whole.saturating_add(fraction.div_ceil(GAS_PRICE_SCALE))
    }
}

/// `12.345` as `12_345 * 10^15`; `None` for malformed or over-precise input.
fn parse_scaled(amount: &str) -> Option<u128> {
    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (amount, None),
    };
    if whole.is_empty() && fraction.map_or(true, str::is_empty) {
        return None;
    }
    let fraction = fraction.unwrap_or_default();
    if fraction.len() > GAS_PRICE_DECIMALS as usize || fraction.contains('.') {
        return None;
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut scaled_fraction: u128 = if fraction.is_empty() { 0 } else { fraction.parse().ok()? };
    scaled_fraction *= 10u128.pow(GAS_PRICE_DECIMALS - fraction.len() as u32);
    whole.checked_mul(GAS_PRICE_SCALE)?.checked_add(scaled_fraction)
}

fn is_valid_denom(denom: &str) -> bool {
    let mut chars = denom.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    first_ok
        && (3..=128).contains(&denom.len())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | ':' | '.' | '_' | '-'))
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALIDATED CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Host chain settings: where actions are executed.
#[derive(Clone, Debug, PartialEq)]
pub struct HostChainConfig {
    pub chain_id: String,
    pub grpc_endpoint: String,
    /// Tendermint RPC endpoint used for queries and acknowledgement search.
    pub rpc_endpoint: String,
    pub log_level: LogLevel,
    /// Key whose address represents this client on the host chain.
    pub key_name: String,
    pub key_type: KeyAlgorithm,
    pub account_hrp: String,
    pub fee_denom: String,
}

/// Controller chain settings: where the signing key lives.
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerChainConfig {
    pub chain_id: String,
    pub grpc_endpoint: String,
    pub rpc_endpoint: String,
    /// Chain binary; its basename names the keyring application.
    pub binary: Option<String>,
    pub home: Option<PathBuf>,
    pub key_name: String,
    pub key_type: KeyAlgorithm,
    pub keyring_backend: KeyringBackend,
    /// `keyring_dir`, or `home` for the test backend.
    pub keyring_dir: Option<PathBuf>,
    pub passphrase: PassphraseSource,
    pub gas_price: Option<GasPrice>,
    pub gas_limit: u64,
    pub account_hrp: String,
    pub connection_id: String,
    pub counterparty_connection_id: Option<String>,
    pub poll_interval: Duration,
}

/// Storage-mesh gateway settings.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshConfig {
    pub endpoint: Option<String>,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout: Duration::from_secs(DEFAULT_MESH_REQUEST_TIMEOUT_SECS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

impl MeshConfig {
    /// The gateway URL; commands that move bytes cannot run without it.
    pub fn require_endpoint(&self) -> Result<&str, ConfigError> {
        self.endpoint
            .as_deref()
            .ok_or(ConfigError::MissingField("mesh.endpoint"))
    }
}

/// Validated configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub host: HostChainConfig,
    pub controller: ControllerChainConfig,
    pub mesh: MeshConfig,
}

impl Config {
    /// Read, expand and validate the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Validate configuration text. Only reads the passphrase file, if any.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut raw: RawConfig = toml::from_str(text)?;
        raw.expand_paths()?;
        raw.validate()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RAW DECODING
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    #[serde(alias = "lumera")]
    host: RawHost,
    controller: RawController,
    mesh: Option<RawMesh>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHost {
    chain_id: String,
    grpc_endpoint: String,
    rpc_endpoint: String,
    log_level: String,
    key_name: String,
    key_type: String,
    account_hrp: String,
    fee_denom: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawController {
    chain_id: String,
    grpc_endpoint: String,
    rpc_endpoint: String,
    binary: String,
    home: String,
    key_name: String,
    key_type: String,
    keyring_backend: String,
    keyring_dir: String,
    keyring_passphrase_plain: String,
    keyring_passphrase_file: String,
    gas_prices: String,
    gas_limit: Option<u64>,
    account_hrp: String,
    connection_id: String,
    counterparty_connection_id: String,
    poll_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMesh {
    endpoint: String,
    request_timeout_secs: Option<u64>,
    poll_interval_secs: Option<u64>,
}

impl RawConfig {
    fn expand_paths(&mut self) -> Result<(), ConfigError> {
        let c = &mut self.controller;
        c.home = expand_home(&c.home, "controller.home")?;
        c.keyring_dir = expand_home(&c.keyring_dir, "controller.keyring_dir")?;
        c.keyring_passphrase_file = expand_home(
            &c.keyring_passphrase_file,
            "controller.keyring_passphrase_file",
        )?;
        Ok(())
    }

    fn validate(self) -> Result<Config, ConfigError> {
        let RawConfig {
            host,
            controller,
            mesh,
        } = self;

        let log_level = LogLevel::normalize(&host.log_level)?;

        let host = HostChainConfig {
            chain_id: required(&host.chain_id, "host.chain_id")?,
            grpc_endpoint: required(&host.grpc_endpoint, "host.grpc_endpoint")?,
            rpc_endpoint: required(&host.rpc_endpoint, "host.rpc_endpoint")?,
            key_name: required(&host.key_name, "host.key_name")?,
            log_level,
            key_type: KeyAlgorithm::parse(&host.key_type, "host.key_type")?,
            account_hrp: or_default(&host.account_hrp, DEFAULT_HOST_ACCOUNT_HRP),
            fee_denom: or_default(&host.fee_denom, DEFAULT_HOST_FEE_DENOM),
        };

        let chain_id = required(&controller.chain_id, "controller.chain_id")?;
        let grpc_endpoint = required(&controller.grpc_endpoint, "controller.grpc_endpoint")?;
        let rpc_endpoint = required(&controller.rpc_endpoint, "controller.rpc_endpoint")?;
        let key_name = required(&controller.key_name, "controller.key_name")?;
        let backend = required(&controller.keyring_backend, "controller.keyring_backend")?;
        let account_hrp = required(&controller.account_hrp, "controller.account_hrp")?;
        let connection_id = required(&controller.connection_id, "controller.connection_id")?;

        let keyring_backend = KeyringBackend::parse(&backend)?;
        let home = optional(&controller.home).map(PathBuf::from);
        let keyring_dir = match (optional(&controller.keyring_dir), keyring_backend) {
            (Some(dir), _) => Some(PathBuf::from(dir)),
            (None, KeyringBackend::File) => return Err(ConfigError::KeyringDirRequired),
            (None, KeyringBackend::Test) => home.clone(),
            (None, KeyringBackend::Os) => None,
        };

        let passphrase = resolve_passphrase(
            &controller.keyring_passphrase_plain,
            &controller.keyring_passphrase_file,
        )?;

        let controller = ControllerChainConfig {
            chain_id,
            grpc_endpoint,
            rpc_endpoint,
            binary: optional(&controller.binary),
            home,
            key_name,
            key_type: KeyAlgorithm::parse(&controller.key_type, "controller.key_type")?,
            keyring_backend,
            keyring_dir,
            passphrase,
            gas_price: GasPrice::parse(&controller.gas_prices)?,
            gas_limit: positive(
                controller.gas_limit.unwrap_or(DEFAULT_GAS_LIMIT),
                "controller.gas_limit",
            )?,
            account_hrp,
            connection_id,
            counterparty_connection_id: optional(&controller.counterparty_connection_id),
            poll_interval: Duration::from_secs(positive(
                controller
                    .poll_interval_secs
                    .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
                "controller.poll_interval_secs",
            )?),
        };

        let mesh = match mesh {
            None => MeshConfig::default(),
            Some(raw) => MeshConfig {
                endpoint: optional(&raw.endpoint).map(|e| e.trim_end_matches('/').to_string()),
                request_timeout: Duration::from_secs(positive(
                    raw.request_timeout_secs
                        .unwrap_or(DEFAULT_MESH_REQUEST_TIMEOUT_SECS),
                    "mesh.request_timeout_secs",
                )?),
                poll_interval: Duration::from_secs(positive(
                    raw.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
                    "mesh.poll_interval_secs",
                )?),
            },
        };

        Ok(Config {
            host,
            controller,
            mesh,
        })
    }
}

fn resolve_passphrase(plain: &str, file: &str) -> Result<PassphraseSource, ConfigError> {
    let plain = optional(plain);
    let file = optional(file);
    match (plain, file) {
        (Some(_), Some(_)) => Err(ConfigError::ConflictingPassphrase),
        (Some(p), None) => Ok(PassphraseSource::Plain(p)),
        (None, Some(path)) => {
            let path = PathBuf::from(path);
            let contents =
                fs::read_to_string(&path).map_err(|source| ConfigError::PassphraseFileUnreadable {
                    path: path.clone(),
                    source,
                })?;
            let passphrase = contents.trim_end_matches(['\r', '\n']).to_string();
            if passphrase.trim().is_empty() {
                return Err(ConfigError::PassphraseFileEmpty(path));
            }
            Ok(PassphraseSource::File { path, passphrase })
        }
        (None, None) => Ok(PassphraseSource::None),
    }
}

fn required(value: &str, field: &'static str) -> Result<String, ConfigError> {
    optional(value).ok_or(ConfigError::MissingField(field))
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn or_default(value: &str, default: &str) -> String {
    optional(value).unwrap_or_else(|| default.to_string())
}

fn positive(value: u64, field: &'static str) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNumber { field, value });
    }
    Ok(value)
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(value: &str, field: &'static str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    let rest = if trimmed == "~" {
        ""
    } else if let Some(rest) = trimmed
        .strip_prefix("~/")
        .or_else(|| trimmed.strip_prefix("~\\"))
    {
        rest
    } else {
        return Ok(trimmed.to_string());
    };

    let home = dirs::home_dir().ok_or(ConfigError::HomeDirUnavailable(field))?;
    let expanded = if rest.is_empty() { home } else { home.join(rest) };
    Ok(expanded.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HOST: &[(&str, &str)] = &[
        ("chain_id", "lumera-devnet-1"),
        ("grpc_endpoint", "localhost:9090"),
        ("rpc_endpoint", "http://localhost:26657"),
        ("key_name", "alice"),
    ];

    const CONTROLLER: &[(&str, &str)] = &[
        ("chain_id", "controller-1"),
        ("grpc_endpoint", "localhost:9091"),
        ("rpc_endpoint", "http://localhost:26658"),
        ("key_name", "alice"),
        ("keyring_backend", "test"),
        ("keyring_dir", "/tmp/controller-keys"),
        ("account_hrp", "cosmos"),
        ("connection_id", "connection-0"),
    ];

    fn render(host: &[(&str, &str)], controller: &[(&str, &str)]) -> String {
        let mut out = String::from("[host]\n");
        for (k, v) in host {
            out.push_str(&format!("{k} = {v:?}\n"));
        }
        out.push_str("\n[controller]\n");
        for (k, v) in controller {
            out.push_str(&format!("{k} = {v:?}\n"));
        }
        out
    }

    fn with(
        base: &[(&str, &str)],
        overrides: &[(&'static str, &'static str)],
    ) -> Vec<(String, String)> {
        let mut fields: Vec<(String, String)> = base
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (k, v) in overrides {
            match fields.iter_mut().find(|(key, _)| key == k) {
                Some(entry) => entry.1 = v.to_string(),
                None => fields.push((k.to_string(), v.to_string())),
            }
        }
        fields
    }

    fn render_owned(host: &[(String, String)], controller: &[(String, String)]) -> String {
        let host: Vec<(&str, &str)> = host.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let controller: Vec<(&str, &str)> = controller
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        render(&host, &controller)
    }

    fn load_controller(overrides: &[(&'static str, &'static str)]) -> Result<Config, ConfigError> {
        let host = with(HOST, &[]);
        let controller = with(CONTROLLER, overrides);
        Config::from_toml_str(&render_owned(&host, &controller))
    }

    #[test]
    fn test_valid_config_applies_defaults() {
        let config = Config::from_toml_str(&render(HOST, CONTROLLER)).unwrap();

        assert_eq!(config.host.log_level, LogLevel::Info);
        assert_eq!(config.host.account_hrp, "lumera");
        assert_eq!(config.host.fee_denom, "ulume");
        assert_eq!(config.host.key_type, KeyAlgorithm::Secp256k1);
        assert_eq!(config.controller.keyring_backend, KeyringBackend::Test);
        assert_eq!(config.controller.gas_limit, DEFAULT_GAS_LIMIT);
        assert_eq!(config.controller.passphrase, PassphraseSource::None);
        assert_eq!(config.controller.counterparty_connection_id, None);
        assert_eq!(config.mesh, MeshConfig::default());
    }

    #[test]
    fn test_missing_required_field_is_named() {
        for (field, _) in HOST {
            let host: Vec<_> = HOST.iter().copied().filter(|(k, _)| k != field).collect();
            let err = Config::from_toml_str(&render(&host, CONTROLLER)).unwrap_err();
            assert_eq!(err.to_string(), format!("host.{field} is required"));
        }

        let required = [
            "chain_id",
            "grpc_endpoint",
            "rpc_endpoint",
            "key_name",
            "keyring_backend",
            "account_hrp",
            "connection_id",
        ];
        for field in required {
            let controller: Vec<_> = CONTROLLER
                .iter()
                .copied()
                .filter(|(k, _)| *k != field)
                .collect();
            let err = Config::from_toml_str(&render(HOST, &controller)).unwrap_err();
            assert_eq!(err.to_string(), format!("controller.{field} is required"));
        }
    }

    #[test]
    fn test_blank_field_counts_as_missing() {
        let err = load_controller(&[("connection_id", "   ")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("controller.connection_id")));
    }

    #[test]
    fn test_lumera_section_alias() {
        let text = render(HOST, CONTROLLER).replace("[host]", "[lumera]");
        let config = Config::from_toml_str(&text).unwrap();
        assert_eq!(config.host.chain_id, "lumera-devnet-1");
    }

    #[test]
    fn test_log_level_normalization() {
        for (input, expected) in [
            ("debug", LogLevel::Debug),
            ("info", LogLevel::Info),
            ("warn", LogLevel::Warn),
            ("error", LogLevel::Error),
            ("warning", LogLevel::Warn),
            ("", LogLevel::Info),
        ] {
            let host = with(HOST, &[("log_level", input)]);
            let controller = with(CONTROLLER, &[]);
            let config = Config::from_toml_str(&render_owned(&host, &controller)).unwrap();
            assert_eq!(config.host.log_level, expected, "input {input:?}");
        }

        let host = with(HOST, &[("log_level", "verbose")]);
        let controller = with(CONTROLLER, &[]);
        let err = Config::from_toml_str(&render_owned(&host, &controller)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLogLevel(_)));
    }

    #[test]
    fn test_keyring_backend_is_case_insensitive() {
        let config = load_controller(&[("keyring_backend", "TEST")]).unwrap();
        assert_eq!(config.controller.keyring_backend, KeyringBackend::Test);

        let err = load_controller(&[("keyring_backend", "ledger")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKeyringBackend(_)));
    }

    #[test]
    fn test_file_backend_requires_keyring_dir() {
        let err = load_controller(&[("keyring_backend", "file"), ("keyring_dir", "")]).unwrap_err();
        assert!(matches!(err, ConfigError::KeyringDirRequired));
    }

    #[test]
    fn test_test_backend_falls_back_to_home() {
        let config = load_controller(&[("keyring_dir", ""), ("home", "/srv/controller")]).unwrap();
        assert_eq!(
            config.controller.keyring_dir,
            Some(PathBuf::from("/srv/controller"))
        );
    }

    #[test]
    fn test_conflicting_passphrases_rejected() {
        let err = load_controller(&[
            ("keyring_passphrase_plain", "secret"),
            ("keyring_passphrase_file", "/does/not/matter"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::ConflictingPassphrase));
    }

    #[test]
    fn test_passphrase_file_is_read_eagerly() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hunter2").unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let host = with(HOST, &[]);
        let mut controller = with(CONTROLLER, &[]);
        controller.push(("keyring_passphrase_file".into(), path));
        let config = Config::from_toml_str(&render_owned(&host, &controller)).unwrap();
        assert_eq!(config.controller.passphrase.passphrase(), Some("hunter2"));
    }

    #[test]
    fn test_empty_or_missing_passphrase_file_fails() {
        let empty = tempfile::NamedTempFile::new().unwrap();
        let host = with(HOST, &[]);
        let mut controller = with(CONTROLLER, &[]);
        controller.push((
            "keyring_passphrase_file".into(),
            empty.path().to_string_lossy().into_owned(),
        ));
        let err = Config::from_toml_str(&render_owned(&host, &controller)).unwrap_err();
        assert!(matches!(err, ConfigError::PassphraseFileEmpty(_)));

        let err = load_controller(&[("keyring_passphrase_file", "/nonexistent/passphrase")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::PassphraseFileUnreadable { .. }));
    }

    #[test]
    fn test_gas_price_parsing() {
        let price = GasPrice::parse("0.025stake").unwrap().unwrap();
        assert_eq!(price.denom, "stake");
        assert_eq!(price.fee_for(300_000), 7_500);

        assert_eq!(GasPrice::parse("").unwrap(), None);
        assert!(GasPrice::parse("1..2stake").is_err());
        assert!(GasPrice::parse(".stake").is_err());
        assert!(GasPrice::parse("0.0000000000000000001stake").is_err());
        assert!(GasPrice::parse("1stake,2ulume").is_err());
        assert!(GasPrice::parse("stake").is_err());
        assert!(GasPrice::parse("0.5").is_err());
    }

    #[test]
    fn test_gas_fee_is_exact() {
        let fee = |price: &str, gas| GasPrice::parse(price).unwrap().unwrap().fee_for(gas);
        assert_eq!(fee("0.07stake", 200_000), 14_000);
        assert_eq!(fee("0.1stake", 3), 1);
        assert_eq!(fee("0.000001stake", 1_000_001), 2);
        assert_eq!(fee("2ulume", 100_000), 200_000);
        assert_eq!(fee("1.5ulume", 3), 5);
        assert_eq!(fee(".5ulume", 4), 2);
        assert_eq!(fee("0ulume", 200_000), 0);
    }

    #[test]
    fn test_invalid_gas_price_fails_load() {
        let err = load_controller(&[("gas_prices", "1stake,2ulume")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidGasPrice(_)));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path", "f").unwrap(), "/abs/path");
        assert_eq!(expand_home("", "f").unwrap(), "");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~", "f").unwrap(), home.to_string_lossy());
            assert_eq!(
                expand_home("~/keys", "f").unwrap(),
                home.join("keys").to_string_lossy()
            );
        }
    }

    #[test]
    fn test_mesh_section() {
        let text = format!(
            "{}\n[mesh]\nendpoint = \"http://mesh:8080/\"\nrequest_timeout_secs = 5\n",
            render(HOST, CONTROLLER)
        );
        let config = Config::from_toml_str(&text).unwrap();
        assert_eq!(config.mesh.require_endpoint().unwrap(), "http://mesh:8080");
        assert_eq!(config.mesh.request_timeout, Duration::from_secs(5));

        let bare = Config::from_toml_str(&render(HOST, CONTROLLER)).unwrap();
        let err = bare.mesh.require_endpoint().unwrap_err();
        assert_eq!(err.to_string(), "mesh.endpoint is required");
    }
}
