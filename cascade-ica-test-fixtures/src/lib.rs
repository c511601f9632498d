//! In-memory collaborators and sample configuration shared by cascade-ica tests.
//!
//! Every fake records what it was asked to do so tests can assert on call
//! counts (no registration, no upload, no send) as well as on results.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use cascade_ica::config::{Config, KeyAlgorithm};
use cascade_ica::error::{IcaError, KeyringError, Result};
use cascade_ica::keyring::{
    KeyInfo, KeyStore, KeyringHandle, KeystoreBackend, OpenRequest, PassphraseReader,
};
use cascade_ica::transport::{HostLedger, IcaTransport, StorageMesh};
use cascade_ica::types::{
    AckResult, Action, ActionMetadata, ActionState, ActionType, CascadeMetadata, ClientStatus,
    DownloadOutcome, HostMsg,
};
use chrono::{TimeZone, Utc};
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Signature, SigningKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::{Digest, Sha256};
use sha3::Keccak256;

pub const CONTROLLER_KEY: &str = "alice";
pub const CONTROLLER_SECRET: [u8; 32] = [0x11; 32];
pub const CONNECTION_ID: &str = "connection-0";
pub const CLIENT_ID: &str = "07-tendermint-0";
pub const MESH_ENDPOINT: &str = "http://127.0.0.1:8080";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Two-chain configuration text using the test keyring under `keyring_dir`.
pub fn sample_config_toml(keyring_dir: &Path) -> String {
    format!(
        r#"
[host]
chain_id = "lumera-devnet-1"
grpc_endpoint = "localhost:9090"
rpc_endpoint = "http://localhost:26657"
key_name = "{CONTROLLER_KEY}"
log_level = "debug"

[controller]
chain_id = "simd-1"
grpc_endpoint = "localhost:9092"
rpc_endpoint = "http://localhost:26659"
binary = "/usr/local/bin/simd"
key_name = "{CONTROLLER_KEY}"
keyring_backend = "test"
keyring_dir = "{}"
account_hrp = "cosmos"
connection_id = "{CONNECTION_ID}"
gas_prices = "0.025stake"
poll_interval_secs = 1

[mesh]
endpoint = "{MESH_ENDPOINT}"
poll_interval_secs = 1
"#,
        keyring_dir.display()
    )
}

pub fn sample_config(keyring_dir: &Path) -> Config {
    match Config::from_toml_str(&sample_config_toml(keyring_dir)) {
        Ok(config) => config,
        Err(e) => panic!("sample configuration must validate: {e}"),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEYRING
// ═══════════════════════════════════════════════════════════════════════════════

struct MemoryKey {
    info: KeyInfo,
    signing: SigningKey,
}

/// Key store holding raw secrets in memory.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: HashMap<String, MemoryKey>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, name: &str, algorithm: KeyAlgorithm, secret: [u8; 32]) -> Self {
        let signing = match SigningKey::from_slice(&secret) {
            Ok(key) => key,
            Err(e) => panic!("fixture secret for {name} is not a valid scalar: {e}"),
        };
        let public_key = k256::PublicKey::from(signing.verifying_key())
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        let info = KeyInfo {
            name: name.to_string(),
            algorithm,
            public_key,
        };
        self.keys.insert(name.to_string(), MemoryKey { info, signing });
        self
    }

    /// The controller key used by [`sample_config`].
    pub fn sample() -> Self {
        Self::new().with_key(CONTROLLER_KEY, KeyAlgorithm::Secp256k1, CONTROLLER_SECRET)
    }

    pub fn handle(self, app_name: &str) -> KeyringHandle {
        KeyringHandle::new(Arc::new(self), app_name)
    }
}

impl KeyStore for MemoryKeyStore {
    fn key(&self, name: &str) -> std::result::Result<KeyInfo, KeyringError> {
        self.keys
            .get(name)
            .map(|k| k.info.clone())
            .ok_or_else(|| KeyringError::KeyNotFound(name.to_string()))
    }

    fn sign(&self, name: &str, message: &[u8]) -> std::result::Result<Vec<u8>, KeyringError> {
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
        Ok(signature.to_bytes().to_vec())
    }
}

/// Backend that hands out one shared [`MemoryKeyStore`] and remembers what it was opened with.
pub struct MemoryBackend {
    store: Arc<MemoryKeyStore>,
    opened: Mutex<Vec<(OpenRequest, Option<String>)>>,
}

impl MemoryBackend {
    pub fn new(store: MemoryKeyStore) -> Self {
        Self {
            store: Arc::new(store),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Requests seen so far, with the first passphrase line if one was supplied.
    pub fn opened(&self) -> Vec<(OpenRequest, Option<String>)> {
        lock(&self.opened).clone()
    }
}

impl KeystoreBackend for MemoryBackend {
    fn open(
        &self,
        request: &OpenRequest,
        passphrase: Option<PassphraseReader>,
    ) -> std::result::Result<Arc<dyn KeyStore>, KeyringError> {
        let line = match passphrase {
            Some(mut reader) => Some(
                reader
                    .read_line()
                    .map_err(|e| KeyringError::Passphrase(e.to_string()))?,
            ),
            None => None,
        };
        lock(&self.opened).push((request.clone(), line));
        Ok(self.store.clone())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DELEGATED-ACCOUNT TRANSPORT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct IcaState {
    accounts: HashMap<(String, String), String>,
    /// Registered but not yet observable: (owner, connection) -> (address, queries left).
    pending: HashMap<(String, String), (String, u32)>,
    connections: HashMap<String, String>,
    clients: HashMap<String, ClientStatus>,
    registrations: Vec<(String, String, String)>,
    sent: Vec<HostMsg>,
    next_action: u64,
    send_failure: Option<String>,
}

/// In-memory controller chain.
pub struct FakeIcaTransport {
    state: Mutex<IcaState>,
    reveal_after: u32,
    queries: AtomicUsize,
}

impl Default for FakeIcaTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeIcaTransport {
    /// One open connection ([`CONNECTION_ID`]) backed by an active client, no accounts.
    pub fn new() -> Self {
        let mut state = IcaState {
            next_action: 1,
            ..IcaState::default()
        };
        state.connections.insert(CONNECTION_ID.into(), CLIENT_ID.into());
        state.clients.insert(CLIENT_ID.into(), ClientStatus::Active);
        Self {
            state: Mutex::new(state),
            reveal_after: 1,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn with_account(self, owner: &str, connection_id: &str, address: &str) -> Self {
        lock(&self.state)
            .accounts
            .insert((owner.into(), connection_id.into()), address.into());
        self
    }

    pub fn with_client_status(self, status: ClientStatus) -> Self {
        lock(&self.state).clients.insert(CLIENT_ID.into(), status);
        self
    }

    pub fn without_connection(self) -> Self {
        lock(&self.state).connections.clear();
        self
    }

    /// Number of address queries that still miss after a registration.
    pub fn reveal_after(mut self, queries: u32) -> Self {
        self.reveal_after = queries;
        self
    }

    pub fn failing_sends(self, reason: &str) -> Self {
        lock(&self.state).send_failure = Some(reason.into());
        self
    }

    pub fn registrations(&self) -> Vec<(String, String, String)> {
        lock(&self.state).registrations.clone()
    }

    pub fn sent(&self) -> Vec<HostMsg> {
        lock(&self.state).sent.clone()
    }

    pub fn address_queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Address handed out to the n-th registration.
    pub fn delegated_address(n: usize) -> String {
        format!("lumera1delegated{n:04}")
    }
}

#[async_trait]
impl IcaTransport for FakeIcaTransport {
    async fn query_ica_address(&self, owner: &str, connection_id: &str) -> Result<Option<String>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let key = (owner.to_string(), connection_id.to_string());
        let mut state = lock(&self.state);
        if let Some(address) = state.accounts.get(&key) {
            return Ok(Some(address.clone()));
        }
        let revealed = match state.pending.get_mut(&key) {
            Some((_, 0)) => true,
            Some((_, left)) => {
                *left -= 1;
                false
            }
            None => false,
        };
        if revealed {
            if let Some((address, _)) = state.pending.remove(&key) {
                state.accounts.insert(key, address.clone());
                return Ok(Some(address));
            }
        }
        Ok(None)
    }

    async fn connection_client(&self, connection_id: &str) -> Result<Option<String>> {
        Ok(lock(&self.state).connections.get(connection_id).cloned())
    }

    async fn client_status(&self, client_id: &str) -> Result<ClientStatus> {
        Ok(lock(&self.state)
            .clients
            .get(client_id)
            .cloned()
            .unwrap_or(ClientStatus::Unknown(String::new())))
    }

    async fn register(&self, owner: &str, connection_id: &str, version: &str) -> Result<String> {
        let mut state = lock(&self.state);
        state
            .registrations
            .push((owner.into(), connection_id.into(), version.into()));
        let n = state.registrations.len();
        state.pending.insert(
            (owner.into(), connection_id.into()),
            (Self::delegated_address(n), self.reveal_after),
        );
        Ok(format!("REGISTER{n:04}"))
    }

    async fn send(&self, _owner: &str, _connection_id: &str, msg: &HostMsg) -> Result<AckResult> {
        let mut state = lock(&self.state);
        if let Some(reason) = &state.send_failure {
            return Err(IcaError::SendAck(reason.clone()));
        }
        state.sent.push(msg.clone());
        let tx_hash = format!("SEND{:04}", state.sent.len());
        let action_id = match msg {
            HostMsg::RequestAction(_) => {
                let id = state.next_action;
                state.next_action += 1;
                Some(id.to_string())
            }
            HostMsg::ApproveAction(_) => None,
        };
        Ok(AckResult { tx_hash, action_id })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOST LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// A stored cascade action with the given state and creator.
pub fn cascade_action(id: &str, state: ActionState, creator: &str) -> Action {
    Action {
        id: id.to_string(),
        state,
        creator: creator.to_string(),
        action_type: ActionType::Cascade,
        price: "10000ulume".into(),
        expiration_time: Utc
            .timestamp_opt(1_750_000_000, 0)
            .single()
            .unwrap_or_default(),
        block_height: 1234,
        metadata: ActionMetadata::Cascade(CascadeMetadata {
            data_hash: "aGFzaA==".into(),
            file_name: "report.pdf".into(),
            public: true,
            ..CascadeMetadata::default()
        }),
        app_pubkey: Some(vec![2; 33]),
    }
}

/// In-memory host ledger.
pub struct FakeHostLedger {
    actions: Mutex<HashMap<String, Action>>,
    fee: String,
    lookups: AtomicUsize,
    unavailable: bool,
}

impl Default for FakeHostLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHostLedger {
    pub fn new() -> Self {
        Self {
            actions: Mutex::new(HashMap::new()),
            fee: "10000".into(),
            lookups: AtomicUsize::new(0),
            unavailable: false,
        }
    }

    pub fn with_action(self, action: Action) -> Self {
        lock(&self.actions).insert(action.id.clone(), action);
        self
    }

    /// Every lookup fails with a transport error.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn outage(&self) -> IcaError {
        IcaError::Transport {
            endpoint: "fake-ledger".into(),
            reason: "connection refused".into(),
        }
    }
}

#[async_trait]
impl HostLedger for FakeHostLedger {
    async fn get_action(&self, action_id: &str) -> Result<Action> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(self.outage());
        }
        lock(&self.actions)
            .get(action_id)
            .cloned()
            .ok_or_else(|| IcaError::NotFound(format!("action {action_id}")))
    }

    async fn action_fee(&self, _size_kib: u64) -> Result<String> {
        if self.unavailable {
            return Err(self.outage());
        }
        Ok(self.fee.clone())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STORAGE MESH
// ═══════════════════════════════════════════════════════════════════════════════

/// One recorded upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadCall {
    pub action_id: String,
    pub file: PathBuf,
    pub signer: String,
}

/// In-memory storage mesh. Downloads write `payload` as `file_name`.
pub struct FakeMesh {
    uploads: Mutex<Vec<UploadCall>>,
    downloads: AtomicUsize,
    delay: Option<Duration>,
    file_name: String,
    payload: Vec<u8>,
}

impl Default for FakeMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMesh {
    pub fn new() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            downloads: AtomicUsize::new(0),
            delay: None,
            file_name: "report.pdf".into(),
            payload: b"cascade payload".to_vec(),
        }
    }

    /// Every call waits this long before doing anything.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn uploads(&self) -> Vec<UploadCall> {
        lock(&self.uploads).clone()
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl StorageMesh for FakeMesh {
    async fn upload(&self, action_id: &str, file: &Path, signer: &str) -> Result<String> {
        self.pause().await;
        let mut uploads = lock(&self.uploads);
        uploads.push(UploadCall {
            action_id: action_id.into(),
            file: file.to_path_buf(),
            signer: signer.into(),
        });
        Ok(format!("upload-task-{}", uploads.len()))
    }

    async fn download(
        &self,
        action_id: &str,
        out_dir: &Path,
        _signer: &str,
    ) -> Result<DownloadOutcome> {
        self.pause().await;
        let n = self.downloads.fetch_add(1, Ordering::SeqCst) + 1;
        let output = out_dir.join(&self.file_name);
        tokio::fs::write(&output, &self.payload)
            .await
            .map_err(|e| IcaError::Io {
                path: output.clone(),
                source: e,
            })?;
        Ok(DownloadOutcome {
            action_id: action_id.into(),
            task_id: format!("download-task-{n}"),
            output_path: output.display().to_string(),
        })
    }
}
