//! Domain types shared by the workflow, the collaborator traits and the
//! chain adapters.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// ACTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle state of a host-chain action. The set is owned by the host ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionState {
    Unspecified,
    Pending,
    Processing,
    Done,
    Approved,
    Rejected,
    Failed,
    Expired,
}

impl ActionState {
    /// Map the ledger's protobuf enum value.
    pub fn from_proto(value: i32) -> Self {
        match value {
            1 => ActionState::Pending,
            2 => ActionState::Processing,
            3 => ActionState::Done,
            4 => ActionState::Approved,
            5 => ActionState::Rejected,
            6 => ActionState::Failed,
            7 => ActionState::Expired,
            _ => ActionState::Unspecified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionState::Unspecified => "ACTION_STATE_UNSPECIFIED",
            ActionState::Pending => "ACTION_STATE_PENDING",
            ActionState::Processing => "ACTION_STATE_PROCESSING",
            ActionState::Done => "ACTION_STATE_DONE",
            ActionState::Approved => "ACTION_STATE_APPROVED",
            ActionState::Rejected => "ACTION_STATE_REJECTED",
            ActionState::Failed => "ACTION_STATE_FAILED",
            ActionState::Expired => "ACTION_STATE_EXPIRED",
        }
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of work an action requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    Unspecified,
    Sense,
    Cascade,
}

impl ActionType {
    pub fn from_proto(value: i32) -> Self {
        match value {
            1 => ActionType::Sense,
            2 => ActionType::Cascade,
            _ => ActionType::Unspecified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Unspecified => "ACTION_TYPE_UNSPECIFIED",
            ActionType::Sense => "ACTION_TYPE_SENSE",
            ActionType::Cascade => "ACTION_TYPE_CASCADE",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage-action metadata as recorded by the host ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeMetadata {
    /// Base64 BLAKE3 digest of the file bytes.
    pub data_hash: String,
    pub file_name: String,
    pub rq_ids_ic: u64,
    pub rq_ids_max: u64,
    pub rq_ids_ids: Vec<String>,
    pub signatures: String,
    pub public: bool,
}

/// Metadata of an action, by action type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionMetadata {
    Cascade(CascadeMetadata),
    /// Metadata of a known non-storage action type, kept opaque.
    Other { action_type: ActionType, raw: Vec<u8> },
    /// Nothing recorded, or bytes that could not be decoded.
    Unknown,
}

impl ActionMetadata {
    pub fn cascade(&self) -> Option<&CascadeMetadata> {
        match self {
            ActionMetadata::Cascade(meta) => Some(meta),
            ActionMetadata::Other { .. } | ActionMetadata::Unknown => None,
        }
    }

    /// Visibility flag; only storage metadata carries one.
    pub fn is_public(&self) -> Option<bool> {
        self.cascade().map(|meta| meta.public)
    }

    /// Original file name; only storage metadata carries one.
    pub fn file_name(&self) -> Option<&str> {
        self.cascade()
            .map(|meta| meta.file_name.as_str())
            .filter(|name| !name.is_empty())
    }
}

/// Host-chain action record.
#[derive(Clone, Debug, PartialEq)]
pub struct Action {
    pub id: String,
    pub state: ActionState,
    /// Delegated account address or a regular host address.
    pub creator: String,
    pub action_type: ActionType,
    pub price: String,
    pub expiration_time: DateTime<Utc>,
    pub block_height: i64,
    pub metadata: ActionMetadata,
    pub app_pubkey: Option<Vec<u8>>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// DELEGATED ACCOUNTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Where the delegated account is in its lifecycle, as seen by one command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    /// Registration transaction accepted; address not yet observable.
    Pending { tx_hash: String },
    Registered,
}

/// Delegated (interchain) account for an (owner, connection) pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelegatedAccount {
    pub owner_address: String,
    pub connection_id: String,
    pub delegated_address: Option<String>,
    pub state: RegistrationState,
}

impl DelegatedAccount {
    pub fn unregistered(
        owner_address: impl Into<String>,
        connection_id: impl Into<String>,
    ) -> Self {
        Self {
            owner_address: owner_address.into(),
            connection_id: connection_id.into(),
            delegated_address: None,
            state: RegistrationState::Unregistered,
        }
    }

    pub fn registered(mut self, delegated_address: impl Into<String>) -> Self {
        self.delegated_address = Some(delegated_address.into());
        self.state = RegistrationState::Registered;
        self
    }
}

/// Status of an IBC light client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientStatus {
    Active,
    Frozen,
    Expired,
    Unknown(String),
}

impl ClientStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "Active" => ClientStatus::Active,
            "Frozen" => ClientStatus::Frozen,
            "Expired" => ClientStatus::Expired,
            other => ClientStatus::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientStatus::Active => f.write_str("Active"),
            ClientStatus::Frozen => f.write_str("Frozen"),
            ClientStatus::Expired => f.write_str("Expired"),
            ClientStatus::Unknown(s) if s.is_empty() => f.write_str("Unknown"),
            ClientStatus::Unknown(s) => f.write_str(s),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOST MESSAGES
// ═══════════════════════════════════════════════════════════════════════════════

/// Request to register a storage action on the host chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestActionMsg {
    /// Delegated account address paying for the action.
    pub creator: String,
    pub action_type: ActionType,
    /// JSON metadata the host ledger verifies.
    pub metadata: String,
    pub price: String,
    /// Unix seconds, as text.
    pub expiration_time: String,
    pub app_pubkey: Vec<u8>,
}

/// Approval of a finished action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApproveActionMsg {
    pub creator: String,
    pub action_id: String,
}

/// A host-chain message dispatched through the delegated account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostMsg {
    RequestAction(RequestActionMsg),
    ApproveAction(ApproveActionMsg),
}

impl HostMsg {
    pub fn creator(&self) -> &str {
        match self {
            HostMsg::RequestAction(msg) => &msg.creator,
            HostMsg::ApproveAction(msg) => &msg.creator,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HostMsg::RequestAction(_) => "request_action",
            HostMsg::ApproveAction(_) => "approve_action",
        }
    }
}

/// Outcome of a send once the host chain has acknowledged it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AckResult {
    /// Controller-chain transaction carrying the packet.
    pub tx_hash: String,
    /// New action id, for action requests.
    pub action_id: Option<String>,
}

/// Where a mesh download ended up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub action_id: String,
    pub task_id: String,
    pub output_path: String,
}
