//! Upload, approve, download and status flows.
//!
//! Steps run strictly in order and every network-facing step runs under the
//! command's [`Deadline`]. Nothing is retried here: the first failure ends
//! the command. The only tolerated failure is the file-name lookup that
//! enriches a download report.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::config::DEFAULT_HOST_FEE_DENOM;
use crate::deadline::Deadline;
use crate::error::{ConfigError, IcaError, Result};
use crate::ica::IcaCoordinator;
use crate::report::{ActionStatusReport, WorkflowResult};
use crate::transport::{HostLedger, StorageMesh};
use crate::types::{ActionState, ActionType, ApproveActionMsg, HostMsg, RequestActionMsg};

/// Lifetime of a freshly requested action, in hours.
pub const ACTION_EXPIRATION_HOURS: i64 = 25;

const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// What `upload` was asked to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadRequest {
    pub file: PathBuf,
    pub public: bool,
    /// Existing pending action; skips registration and the request.
    pub action_id: Option<String>,
}

/// Metadata carried by an action request and verified by the host ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RequestMetadata {
    pub data_hash: String,
    pub file_name: String,
    pub rq_ids_ic: u64,
    pub signatures: String,
    pub public: bool,
}

impl RequestMetadata {
    /// Encode the file digest and sign it with `sign`.
    pub fn build(
        file_name: &str,
        digest: &blake3::Hash,
        public: bool,
        sign: impl FnOnce(&[u8]) -> Result<Vec<u8>>,
    ) -> Result<Self> {
        let data_hash = STANDARD.encode(digest.as_bytes());
        let signature = sign(data_hash.as_bytes())?;
        let signatures = format!(
            "{}.{}",
            STANDARD.encode(data_hash.as_bytes()),
            STANDARD.encode(signature)
        );
        Ok(Self {
            data_hash,
            file_name: file_name.to_string(),
            rq_ids_ic: 0,
            signatures,
            public,
        })
    }
}

/// Size in KiB, rounded up, as priced by the host ledger.
pub fn size_kib(len: u64) -> u64 {
    len.div_ceil(1024)
}

/// BLAKE3 digest and length of a file, read in fixed-size chunks.
pub async fn hash_file(path: &Path) -> Result<(blake3::Hash, u64)> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| IcaError::io(path, e))?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    let mut len = 0u64;
    loop {
        let n = file.read(&mut buf).await.map_err(|e| IcaError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        len += n as u64;
    }
    Ok((hasher.finalize(), len))
}

/// Drives one command against the collaborators.
pub struct ActionWorkflow {
    coordinator: IcaCoordinator,
    ledger: Arc<dyn HostLedger>,
    mesh: Option<Arc<dyn StorageMesh>>,
    fee_denom: String,
    deadline: Deadline,
}

impl ActionWorkflow {
    pub fn new(
        coordinator: IcaCoordinator,
        ledger: Arc<dyn HostLedger>,
        deadline: Deadline,
    ) -> Self {
        Self {
            coordinator,
            ledger,
            mesh: None,
            fee_denom: DEFAULT_HOST_FEE_DENOM.to_string(),
            deadline,
        }
    }

    pub fn with_mesh(mut self, mesh: Arc<dyn StorageMesh>) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_fee_denom(mut self, denom: impl Into<String>) -> Self {
        self.fee_denom = denom.into();
        self
    }

    fn mesh(&self) -> Result<&dyn StorageMesh> {
        self.mesh
            .as_deref()
            .ok_or(IcaError::Config(ConfigError::MissingField("mesh.endpoint")))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // UPLOAD
    // ═══════════════════════════════════════════════════════════════════════════

    pub async fn upload(&self, request: &UploadRequest) -> Result<WorkflowResult> {
        let file = absolute_file(&request.file).await?;
        let mesh = self.mesh()?;

        match request.action_id.as_deref().map(str::trim) {
            Some(action_id) if !action_id.is_empty() => {
                self.resume_upload(mesh, action_id, &file).await
            }
            _ => self.fresh_upload(mesh, &file, request.public).await,
        }
    }

    async fn fresh_upload(
        &self,
        mesh: &dyn StorageMesh,
        file: &Path,
        public: bool,
    ) -> Result<WorkflowResult> {
        let ica_address = self.coordinator.ensure_address(&self.deadline).await?;

        let (digest, len) = hash_file(file).await?;
        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let metadata = RequestMetadata::build(file_name, &digest, public, |hash| {
            self.coordinator.sign_app_data(hash)
        })?;
        let metadata = serde_json::to_string(&metadata)
            .map_err(|e| IcaError::InvalidInput(format!("encode action metadata: {e}")))?;

        let fee = self
            .deadline
            .run("querying action fee", self.ledger.action_fee(size_kib(len)))
            .await?;
        let expiration = Utc::now() + chrono::Duration::hours(ACTION_EXPIRATION_HOURS);

        let msg = HostMsg::RequestAction(RequestActionMsg {
            creator: ica_address.clone(),
            action_type: ActionType::Cascade,
            metadata,
            price: format!("{fee}{}", self.fee_denom),
            expiration_time: expiration.timestamp().to_string(),
            app_pubkey: self.coordinator.app_pubkey().to_vec(),
        });
        let ack = self.coordinator.send(&msg, &self.deadline).await?;
        let action_id = ack
            .action_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| IcaError::SendAck("acknowledgement carried no action id".into()))?;

        let task_id = self.upload_bytes(mesh, &action_id, file, &ica_address).await?;

        Ok(WorkflowResult {
            tx_hash: Some(ack.tx_hash),
            task_id: Some(task_id),
            ica_address: Some(ica_address),
            ica_owner_address: Some(self.coordinator.owner_address().to_string()),
            is_public: Some(public),
            file: Some(file.display().to_string()),
            ..WorkflowResult::ok(action_id)
        })
    }

    async fn resume_upload(
        &self,
        mesh: &dyn StorageMesh,
        action_id: &str,
        file: &Path,
    ) -> Result<WorkflowResult> {
        let action = self
            .deadline
            .run("querying action", self.ledger.get_action(action_id))
            .await?;
        if action.state != ActionState::Pending {
            return Err(IcaError::ActionStateMismatch {
                action_id: action.id,
                actual: action.state,
                expected: ActionState::Pending,
            });
        }

        let signer = action.creator.trim();
        info!(action_id = %action.id, signer, "resuming upload for pending action");
        let task_id = self.upload_bytes(mesh, &action.id, file, signer).await?;

        Ok(WorkflowResult {
            tx_hash: Some(String::new()),
            task_id: Some(task_id),
            ica_address: Some(action.creator.clone()),
            ica_owner_address: Some(self.coordinator.owner_address().to_string()),
            is_public: action.metadata.is_public(),
            file: Some(file.display().to_string()),
            ..WorkflowResult::ok(action.id.clone())
        })
    }

    async fn upload_bytes(
        &self,
        mesh: &dyn StorageMesh,
        action_id: &str,
        file: &Path,
        signer: &str,
    ) -> Result<String> {
        info!(action_id, file = %file.display(), "upload started");
        let task_id = self
            .deadline
            .run("uploading to storage mesh", mesh.upload(action_id, file, signer))
            .await?;
        info!(action_id, task_id = %task_id, "upload finished");
        Ok(task_id)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // APPROVE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Approve `action_id`. Never registers: the account must already exist
    /// unless `ica_address` is given.
    pub async fn approve(
        &self,
        action_id: &str,
        ica_address: Option<&str>,
    ) -> Result<WorkflowResult> {
        let ica_address = match ica_address.map(str::trim).filter(|a| !a.is_empty()) {
            Some(address) => address.to_string(),
            None => self.coordinator.require_address(&self.deadline).await?,
        };

        let msg = HostMsg::ApproveAction(ApproveActionMsg {
            creator: ica_address.clone(),
            action_id: action_id.to_string(),
        });
        let ack = self.coordinator.send(&msg, &self.deadline).await?;

        Ok(WorkflowResult {
            tx_hash: Some(ack.tx_hash),
            ica_address: Some(ica_address),
            ica_owner_address: Some(self.coordinator.owner_address().to_string()),
            ..WorkflowResult::ok(action_id)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DOWNLOAD
    // ═══════════════════════════════════════════════════════════════════════════

    /// Download into `out_dir`, signed by the controller owner address.
    pub async fn download(&self, action_id: &str, out_dir: &Path) -> Result<WorkflowResult> {
        let mesh = self.mesh()?;
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|e| IcaError::io(out_dir, e))?;

        let signer = self.coordinator.owner_address();
        info!(action_id, out_dir = %out_dir.display(), signer, "download started");
        let outcome = self
            .deadline
            .run(
                "downloading from storage mesh",
                mesh.download(action_id, out_dir, signer),
            )
            .await?;
        info!(action_id, output = %outcome.output_path, "download finished");

        let file_name = self.best_effort_file_name(action_id).await;

        Ok(WorkflowResult {
            task_id: Some(outcome.task_id),
            output_path: Some(outcome.output_path),
            file_name: Some(file_name.unwrap_or_default()),
            ..WorkflowResult::ok(outcome.action_id)
        })
    }

    /// Original file name of the action. Any lookup failure yields `None`.
    async fn best_effort_file_name(&self, action_id: &str) -> Option<String> {
        match self.lookup_file_name(action_id).await {
            Ok(name) => name,
            Err(discarded) => {
                debug!(action_id, error = %discarded, "file name lookup skipped");
                None
            }
        }
    }

    async fn lookup_file_name(&self, action_id: &str) -> Result<Option<String>> {
        let action = self
            .deadline
            .run("querying action", self.ledger.get_action(action_id))
            .await?;
        Ok(action.metadata.file_name().map(str::to_string))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATUS
    // ═══════════════════════════════════════════════════════════════════════════

    pub async fn status(&self, action_id: &str) -> Result<ActionStatusReport> {
        let action = self
            .deadline
            .run("querying action", self.ledger.get_action(action_id))
            .await?;
        Ok(ActionStatusReport::from(&action))
    }
}

/// Absolute path of an existing regular file.
async fn absolute_file(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| IcaError::io(".", e))?
            .join(path)
    };
    let meta = tokio::fs::metadata(&absolute)
        .await
        .map_err(|e| IcaError::io(&absolute, e))?;
    if !meta.is_file() {
        return Err(IcaError::InvalidInput(format!(
            "{} is not a regular file",
            absolute.display()
        )));
    }
    Ok(absolute)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_kib_rounds_up() {
        assert_eq!(size_kib(0), 0);
        assert_eq!(size_kib(1), 1);
        assert_eq!(size_kib(1024), 1);
        assert_eq!(size_kib(1025), 2);
    }

    #[test]
    fn test_request_metadata_signs_data_hash() {
        let digest = blake3::hash(b"hello");
        let meta = RequestMetadata::build("a.txt", &digest, true, |hash| {
            assert_eq!(hash, STANDARD.encode(blake3::hash(b"hello").as_bytes()).as_bytes());
            Ok(vec![9; 64])
        })
        .unwrap();

        let (hash_part, sig_part) = meta.signatures.split_once('.').unwrap();
        assert_eq!(STANDARD.decode(hash_part).unwrap(), meta.data_hash.as_bytes());
        assert_eq!(STANDARD.decode(sig_part).unwrap(), vec![9u8; 64]);
        assert_eq!(meta.file_name, "a.txt");
        assert!(meta.public);
    }

    #[test]
    fn test_request_metadata_propagates_signing_failure() {
        let err = RequestMetadata::build("a.txt", &blake3::hash(b"x"), false, |_| {
            Err(IcaError::InvalidInput("no key".into()))
        })
        .unwrap_err();
        assert!(matches!(err, IcaError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_absolute_file_rejects_missing() {
        let err = absolute_file(Path::new("/definitely/not/here.bin"))
            .await
            .unwrap_err();
        assert!(matches!(err, IcaError::Io { .. }));
    }

    #[tokio::test]
    async fn test_absolute_file_keeps_absolute_and_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.bin");
        std::fs::write(&file, b"abc").unwrap();
        assert_eq!(absolute_file(&file).await.unwrap(), file);

        let err = absolute_file(dir.path()).await.unwrap_err();
        assert!(matches!(err, IcaError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_absolute_file_resolves_relative() {
        let cwd = std::env::current_dir().unwrap();
        let file = tempfile::Builder::new()
            .suffix(".bin")
            .tempfile_in(&cwd)
            .unwrap();
        let name = file.path().file_name().unwrap();

        let resolved = absolute_file(Path::new(name)).await.unwrap();
        assert!(resolved.is_absolute());
        assert_eq!(resolved, cwd.join(name));

        let nested = Path::new(".").join(name);
        assert_eq!(absolute_file(&nested).await.unwrap(), cwd.join(&nested));
    }

    #[tokio::test]
    async fn test_hash_file_matches_one_shot_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.bin");
        let bytes: Vec<u8> = (0..HASH_CHUNK_SIZE * 2 + 17).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &bytes).unwrap();

        let (digest, len) = hash_file(&path).await.unwrap();
        assert_eq!(digest, blake3::hash(&bytes));
        assert_eq!(len, bytes.len() as u64);

        let empty = dir.path().join("empty.bin");
        std::fs::write(&empty, b"").unwrap();
        assert_eq!(hash_file(&empty).await.unwrap(), (blake3::hash(b""), 0));

        let err = hash_file(&dir.path().join("missing.bin")).await.unwrap_err();
        assert!(matches!(err, IcaError::Io { .. }));
    }
}
