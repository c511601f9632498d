//! Integration tests for the cascade-ica workflows.
//!
//! Each test wires an `ActionWorkflow` to the in-memory collaborators and
//! checks both the reported record and which collaborator calls happened.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cascade_ica::address::{decode_address, derive_address};
use cascade_ica::config::{Config, KeyAlgorithm, KeyringBackend};
use cascade_ica::keyring::{KeyringHandle, KeyringProvider};
use cascade_ica::types::{ActionState, ActionType, ClientStatus, HostMsg};
use cascade_ica::{
    ActionWorkflow, Deadline, IcaCoordinator, IcaError, LocalKeystore, ResolvedIdentity,
    UploadRequest,
};
use cascade_ica_test_fixtures::{
    cascade_action, sample_config, FakeHostLedger, FakeIcaTransport, FakeMesh, MemoryBackend,
    MemoryKeyStore, CONNECTION_ID, CONTROLLER_KEY, CONTROLLER_SECRET,
};
use tempfile::TempDir;

// === Test Fixtures ===

struct Harness {
    dir: TempDir,
    config: Config,
    keyring: KeyringHandle,
    transport: Arc<FakeIcaTransport>,
    ledger: Arc<FakeHostLedger>,
    mesh: Arc<FakeMesh>,
}

impl Harness {
    fn new(transport: FakeIcaTransport, ledger: FakeHostLedger, mesh: FakeMesh) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = sample_config(dir.path());
        config.controller.poll_interval = Duration::from_millis(10);
        Self {
            dir,
            config,
            keyring: MemoryKeyStore::sample().handle("simd"),
            transport: Arc::new(transport),
            ledger: Arc::new(ledger),
            mesh: Arc::new(mesh),
        }
    }

    fn standard() -> Self {
        Self::new(FakeIcaTransport::new(), FakeHostLedger::new(), FakeMesh::new())
    }

    fn owner(&self) -> String {
        derive_address(&self.keyring, CONTROLLER_KEY, "cosmos").unwrap()
    }

    fn coordinator(&self) -> IcaCoordinator {
        let identity = ResolvedIdentity::resolve(&self.keyring, &self.config).unwrap();
        IcaCoordinator::new(
            self.transport.clone(),
            self.keyring.clone(),
            identity,
            &self.config.controller,
        )
        .unwrap()
    }

    fn workflow(&self, deadline: Deadline) -> ActionWorkflow {
        ActionWorkflow::new(self.coordinator(), self.ledger.clone(), deadline)
            .with_mesh(self.mesh.clone())
            .with_fee_denom(self.config.host.fee_denom.clone())
    }

    fn file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }
}

fn upload_request(file: PathBuf, action_id: Option<&str>) -> UploadRequest {
    UploadRequest {
        file,
        public: false,
        action_id: action_id.map(str::to_string),
    }
}

// === Upload ===

#[tokio::test]
async fn test_fresh_upload_registers_requests_and_uploads() {
    let h = Harness::standard();
    let file = h.file("report.pdf", b"some bytes to store");

    let result = h
        .workflow(Deadline::default())
        .upload(&upload_request(file.clone(), None))
        .await
        .unwrap();

    let ica = FakeIcaTransport::delegated_address(1);
    assert_eq!(result.status, "ok");
    assert_eq!(result.action_id, "1");
    assert!(!result.tx_hash.as_deref().unwrap().is_empty());
    assert!(!result.task_id.as_deref().unwrap().is_empty());
    assert_eq!(result.ica_address.as_deref(), Some(ica.as_str()));
    assert_eq!(result.ica_owner_address, Some(h.owner()));
    assert_eq!(result.file, Some(file.display().to_string()));
    assert_eq!(result.is_public, Some(false));

    let registrations = h.transport.registrations();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].0, h.owner());
    assert_eq!(registrations[0].1, CONNECTION_ID);
    assert_eq!(registrations[0].2, "", "no counterparty, empty version");

    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    let HostMsg::RequestAction(request) = &sent[0] else {
        panic!("expected an action request, got {:?}", sent[0]);
    };
    assert_eq!(request.creator, ica);
    assert_eq!(request.action_type, ActionType::Cascade);
    assert_eq!(request.price, "10000ulume");
    assert_eq!(request.app_pubkey.len(), 33);
    let metadata: serde_json::Value = serde_json::from_str(&request.metadata).unwrap();
    assert_eq!(metadata["file_name"], "report.pdf");
    assert_eq!(metadata["public"], false);

    let uploads = h.mesh.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].action_id, "1");
    assert_eq!(uploads[0].signer, ica);
    assert_eq!(uploads[0].file, file);
}

#[tokio::test]
async fn test_existing_account_is_not_registered_again() {
    let h = Harness::standard();
    let file = h.file("a.bin", b"a");
    let workflow = h.workflow(Deadline::default());

    workflow.upload(&upload_request(file.clone(), None)).await.unwrap();
    let second = workflow.upload(&upload_request(file, None)).await.unwrap();

    assert_eq!(h.transport.registrations().len(), 1);
    assert_eq!(second.action_id, "2");
    assert_eq!(
        second.ica_address,
        Some(FakeIcaTransport::delegated_address(1))
    );
}

#[tokio::test]
async fn test_resume_pending_action_skips_registration() {
    let ledger = FakeHostLedger::new().with_action(cascade_action(
        "42",
        ActionState::Pending,
        "lumera1creator",
    ));
    let h = Harness::new(FakeIcaTransport::new(), ledger, FakeMesh::new());
    let file = h.file("report.pdf", b"resumed bytes");

    let result = h
        .workflow(Deadline::default())
        .upload(&upload_request(file, Some("42")))
        .await
        .unwrap();

    assert_eq!(result.action_id, "42");
    assert_eq!(result.tx_hash.as_deref(), Some(""));
    assert_eq!(result.ica_address.as_deref(), Some("lumera1creator"));
    assert_eq!(result.is_public, Some(true));
    assert!(h.transport.registrations().is_empty());
    assert!(h.transport.sent().is_empty());
    assert_eq!(h.transport.address_queries(), 0);

    let uploads = h.mesh.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].signer, "lumera1creator");
}

#[tokio::test]
async fn test_resume_rejects_non_pending_action() {
    let ledger = FakeHostLedger::new()
        .with_action(cascade_action("42", ActionState::Done, "lumera1creator"));
    let h = Harness::new(FakeIcaTransport::new(), ledger, FakeMesh::new());
    let file = h.file("report.pdf", b"late bytes");

    let err = h
        .workflow(Deadline::default())
        .upload(&upload_request(file, Some("42")))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IcaError::ActionStateMismatch {
            actual: ActionState::Done,
            expected: ActionState::Pending,
            ..
        }
    ));
    assert_eq!(
        err.to_string(),
        "action 42 state is ACTION_STATE_DONE; expected ACTION_STATE_PENDING"
    );
    assert!(h.mesh.uploads().is_empty());
}

#[tokio::test]
async fn test_upload_of_missing_file_fails_before_network() {
    let h = Harness::standard();

    let err = h
        .workflow(Deadline::default())
        .upload(&upload_request(h.dir.path().join("absent.bin"), None))
        .await
        .unwrap_err();

    assert!(matches!(err, IcaError::Io { .. }));
    assert_eq!(h.transport.address_queries(), 0);
    assert!(h.mesh.uploads().is_empty());
}

#[tokio::test]
async fn test_upload_without_mesh_endpoint_is_config_error() {
    let h = Harness::standard();
    let file = h.file("a.bin", b"a");
    let workflow = ActionWorkflow::new(h.coordinator(), h.ledger.clone(), Deadline::default());

    let err = workflow.upload(&upload_request(file, None)).await.unwrap_err();

    assert_eq!(err.to_string(), "mesh.endpoint is required");
    assert!(h.transport.registrations().is_empty());
}

#[tokio::test]
async fn test_failed_send_stops_before_upload() {
    let h = Harness::new(
        FakeIcaTransport::new().failing_sends("acknowledgement error: insufficient fee"),
        FakeHostLedger::new(),
        FakeMesh::new(),
    );
    let file = h.file("a.bin", b"a");

    let err = h
        .workflow(Deadline::default())
        .upload(&upload_request(file, None))
        .await
        .unwrap_err();

    assert!(matches!(err, IcaError::SendAck(_)));
    assert!(!err.is_timeout());
    assert!(h.mesh.uploads().is_empty());
}

// === Registration preconditions ===

#[tokio::test]
async fn test_inactive_client_blocks_registration() {
    let h = Harness::new(
        FakeIcaTransport::new().with_client_status(ClientStatus::Frozen),
        FakeHostLedger::new(),
        FakeMesh::new(),
    );
    let file = h.file("a.bin", b"a");

    let err = h
        .workflow(Deadline::default())
        .upload(&upload_request(file, None))
        .await
        .unwrap_err();

    assert!(matches!(err, IcaError::ClientInactive { ref status, .. } if status == "Frozen"));
    assert!(h.transport.registrations().is_empty());
}

#[tokio::test]
async fn test_missing_connection_blocks_registration() {
    let h = Harness::new(
        FakeIcaTransport::new().without_connection(),
        FakeHostLedger::new(),
        FakeMesh::new(),
    );
    let file = h.file("a.bin", b"a");

    let err = h
        .workflow(Deadline::default())
        .upload(&upload_request(file, None))
        .await
        .unwrap_err();

    assert!(matches!(err, IcaError::ConnectionMissing(ref id) if id == CONNECTION_ID));
    assert!(h.transport.registrations().is_empty());
}

#[tokio::test]
async fn test_registration_that_never_appears_times_out() {
    let h = Harness::new(
        FakeIcaTransport::new().reveal_after(u32::MAX),
        FakeHostLedger::new(),
        FakeMesh::new(),
    );
    let coordinator = h.coordinator();

    let err = coordinator
        .ensure_address(&Deadline::after(Duration::from_millis(100)))
        .await
        .unwrap_err();

    assert!(matches!(err, IcaError::RegistrationTimeout { .. }));
    assert!(err.is_timeout());
    assert_eq!(h.transport.registrations().len(), 1);
}

#[tokio::test]
async fn test_ensure_address_is_idempotent() {
    let h = Harness::standard();
    let coordinator = h.coordinator();

    let first = coordinator.ensure_address(&Deadline::default()).await.unwrap();
    let second = coordinator.ensure_address(&Deadline::default()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.transport.registrations().len(), 1);
}

// === Approve ===

#[tokio::test]
async fn test_approve_without_account_fails_before_send() {
    let h = Harness::standard();

    let err = h
        .workflow(Deadline::default())
        .approve("42", None)
        .await
        .unwrap_err();

    assert!(matches!(err, IcaError::NotFound(_)));
    assert!(h.transport.sent().is_empty());
    assert!(h.transport.registrations().is_empty());
}

#[tokio::test]
async fn test_approve_with_registered_account() {
    let h = Harness::standard();
    let owner = h.owner();
    let h = Harness {
        transport: Arc::new(FakeIcaTransport::new().with_account(
            &owner,
            CONNECTION_ID,
            "lumera1existing",
        )),
        ..h
    };

    let result = h
        .workflow(Deadline::default())
        .approve("42", None)
        .await
        .unwrap();

    assert_eq!(result.action_id, "42");
    assert_eq!(result.ica_address.as_deref(), Some("lumera1existing"));
    assert_eq!(result.ica_owner_address, Some(owner));
    assert!(!result.tx_hash.as_deref().unwrap().is_empty());

    let sent = h.transport.sent();
    assert!(matches!(
        &sent[..],
        [HostMsg::ApproveAction(msg)] if msg.creator == "lumera1existing" && msg.action_id == "42"
    ));
}

#[tokio::test]
async fn test_approve_with_explicit_address_skips_query() {
    let h = Harness::standard();

    let result = h
        .workflow(Deadline::default())
        .approve("7", Some(" lumera1explicit "))
        .await
        .unwrap();

    assert_eq!(result.ica_address.as_deref(), Some("lumera1explicit"));
    assert_eq!(h.transport.address_queries(), 0);
    assert_eq!(h.transport.sent().len(), 1);
}

#[tokio::test]
async fn test_coordinator_owner_comes_from_resolved_identity() {
    let h = Harness::standard();
    let identity = ResolvedIdentity::resolve(&h.keyring, &h.config).unwrap();
    assert_eq!(identity.controller_address, h.owner());
    assert!(identity.host_address.starts_with("lumera1"));

    let coordinator = IcaCoordinator::new(
        h.transport.clone(),
        h.keyring.clone(),
        identity.clone(),
        &h.config.controller,
    )
    .unwrap();
    assert_eq!(coordinator.owner_address(), identity.controller_address);

    let result = ActionWorkflow::new(coordinator, h.ledger.clone(), Deadline::default())
        .approve("7", Some("lumera1explicit"))
        .await
        .unwrap();
    assert_eq!(result.ica_owner_address, Some(identity.controller_address));
}

// === Download ===

#[tokio::test]
async fn test_download_reports_file_name_from_ledger() {
    let ledger = FakeHostLedger::new()
        .with_action(cascade_action("9", ActionState::Done, "lumera1creator"));
    let h = Harness::new(FakeIcaTransport::new(), ledger, FakeMesh::new());
    let out = h.dir.path().join("nested/out");

    let result = h
        .workflow(Deadline::default())
        .download("9", &out)
        .await
        .unwrap();

    assert_eq!(result.action_id, "9");
    assert_eq!(result.file_name.as_deref(), Some("report.pdf"));
    assert_eq!(result.task_id.as_deref(), Some("download-task-1"));
    let output = PathBuf::from(result.output_path.unwrap());
    assert_eq!(std::fs::read(output).unwrap(), h.mesh.payload());
}

#[tokio::test]
async fn test_download_tolerates_failed_file_name_lookup() {
    let h = Harness::new(
        FakeIcaTransport::new(),
        FakeHostLedger::new().unavailable(),
        FakeMesh::new(),
    );

    let result = h
        .workflow(Deadline::default())
        .download("9", h.dir.path())
        .await
        .unwrap();

    assert_eq!(result.status, "ok");
    assert_eq!(result.file_name.as_deref(), Some(""));
    assert_eq!(h.ledger.lookups(), 1);
}

#[tokio::test]
async fn test_download_past_deadline_leaves_no_output() {
    let h = Harness::new(
        FakeIcaTransport::new(),
        FakeHostLedger::new(),
        FakeMesh::new().with_delay(Duration::from_secs(30)),
    );
    let out = h.dir.path().join("out");

    let err = h
        .workflow(Deadline::after(Duration::from_millis(50)))
        .download("9", &out)
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "expected timeout, got {err}");
    assert!(out.is_dir());
    assert_eq!(std::fs::read_dir(&out).unwrap().count(), 0);
    assert_eq!(h.mesh.downloads(), 0);
}

// === Status ===

#[tokio::test]
async fn test_status_reports_action() {
    let ledger = FakeHostLedger::new()
        .with_action(cascade_action("5", ActionState::Approved, "lumera1creator"));
    let h = Harness::new(FakeIcaTransport::new(), ledger, FakeMesh::new());

    let report = h.workflow(Deadline::default()).status("5").await.unwrap();

    assert_eq!(report.state, "ACTION_STATE_APPROVED");
    assert_eq!(report.action_type, "ACTION_TYPE_CASCADE");
    assert_eq!(report.creator, "lumera1creator");
    assert_eq!(report.expires_at, 1_750_000_000);
    assert_eq!(report.is_public, Some(true));
    assert!(report.app_pubkey.is_some());
    assert_eq!(h.transport.address_queries(), 0);
}

#[tokio::test]
async fn test_status_of_unknown_action() {
    let h = Harness::standard();
    let err = h.workflow(Deadline::default()).status("404").await.unwrap_err();
    assert!(matches!(err, IcaError::NotFound(_)));
}

// === Keyring on disk ===

#[test]
fn test_local_keyring_resolves_both_addresses() {
    let dir = tempfile::tempdir().unwrap();
    LocalKeystore::write_key(
        dir.path(),
        KeyringBackend::Test,
        CONTROLLER_KEY,
        KeyAlgorithm::Secp256k1,
        &CONTROLLER_SECRET,
        None,
    )
    .unwrap();
    let config = sample_config(dir.path());

    let keyring = KeyringProvider::new(LocalKeystore).open_for(&config).unwrap();
    let identity = ResolvedIdentity::resolve(&keyring, &config).unwrap();

    assert!(identity.controller_address.starts_with("cosmos1"));
    assert!(identity.host_address.starts_with("lumera1"));
    let (_, controller_bytes) = decode_address(&identity.controller_address).unwrap();
    let (_, host_bytes) = decode_address(&identity.host_address).unwrap();
    assert_eq!(controller_bytes, host_bytes);
    assert_eq!(keyring.app_name(), "simd");
}

#[test]
fn test_keyring_opened_with_configured_namespace() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = sample_config(dir.path());
    config.controller.passphrase = cascade_ica::config::PassphraseSource::Plain("hunter2".into());
    let provider = KeyringProvider::new(MemoryBackend::new(MemoryKeyStore::sample()));

    provider.open_for(&config).unwrap();

    let opened = provider.backend().opened();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].0.app_name, "simd");
    assert_eq!(opened[0].0.backend, KeyringBackend::Test);
    assert_eq!(opened[0].0.dir.as_deref(), Some(dir.path()));
    assert_eq!(opened[0].0.keys, vec![CONTROLLER_KEY.to_string()]);
    assert_eq!(opened[0].1.as_deref(), Some("hunter2"));
}

#[test]
fn test_keyring_rejects_mismatched_host_key_type() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = sample_config(dir.path());
    config.host.key_type = KeyAlgorithm::EthSecp256k1;
    let provider = KeyringProvider::new(MemoryBackend::new(MemoryKeyStore::sample()));

    let err = provider.open_for(&config).unwrap_err();
    assert!(matches!(err, cascade_ica::KeyringError::AlgorithmMismatch { .. }));
}
