//! Protobuf messages exchanged with the controller and host chains.
//!
//! Declared by hand with `prost` derives; only the fields this client reads
//! or writes are present, with the field numbers of the upstream `.proto`
//! files.

use prost::Message;

// ═══════════════════════════════════════════════════════════════════════════════
// TYPE URLS & QUERY PATHS
// ═══════════════════════════════════════════════════════════════════════════════

pub const SECP256K1_PUBKEY_URL: &str = "/cosmos.crypto.secp256k1.PubKey";
pub const ETH_SECP256K1_PUBKEY_URL: &str = "/ethermint.crypto.v1.ethsecp256k1.PubKey";

pub const MSG_REGISTER_ICA_URL: &str =
    "/ibc.applications.interchain_accounts.controller.v1.MsgRegisterInterchainAccount";
pub const MSG_SEND_TX_URL: &str = "/ibc.applications.interchain_accounts.controller.v1.MsgSendTx";

pub const MSG_REQUEST_ACTION_URL: &str = "/lumera.action.v1.MsgRequestAction";
pub const MSG_REQUEST_ACTION_RESPONSE_URL: &str = "/lumera.action.v1.MsgRequestActionResponse";
pub const MSG_APPROVE_ACTION_URL: &str = "/lumera.action.v1.MsgApproveAction";

pub const QUERY_ACCOUNT_PATH: &str = "/cosmos.auth.v1beta1.Query/Account";
pub const QUERY_ICA_PATH: &str =
    "/ibc.applications.interchain_accounts.controller.v1.Query/InterchainAccount";
pub const QUERY_CONNECTION_PATH: &str = "/ibc.core.connection.v1.Query/Connection";
pub const QUERY_CLIENT_STATUS_PATH: &str = "/ibc.core.client.v1.Query/ClientStatus";
pub const QUERY_GET_ACTION_PATH: &str = "/lumera.action.v1.Query/GetAction";
pub const QUERY_GET_ACTION_FEE_PATH: &str = "/lumera.action.v1.Query/GetActionFee";

/// `SIGN_MODE_DIRECT`.
pub const SIGN_MODE_DIRECT: i32 = 1;
/// `InterchainAccountPacketData.type` for executing messages.
pub const ICA_EXECUTE_TX: i32 = 1;

// ═══════════════════════════════════════════════════════════════════════════════
// COMMON
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, PartialEq, Message)]
pub struct Any {
    #[prost(string, tag = "1")]
    pub type_url: String,
    #[prost(bytes = "vec", tag = "2")]
    pub value: Vec<u8>,
}

impl Any {
    pub fn pack<M: Message>(type_url: &str, msg: &M) -> Self {
        Self {
            type_url: type_url.to_string(),
            value: msg.encode_to_vec(),
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Coin {
    #[prost(string, tag = "1")]
    pub denom: String,
    #[prost(string, tag = "2")]
    pub amount: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct PubKey {
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTION ENVELOPE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, PartialEq, Message)]
pub struct TxBody {
    #[prost(message, repeated, tag = "1")]
    pub messages: Vec<Any>,
    #[prost(string, tag = "2")]
    pub memo: String,
    #[prost(uint64, tag = "3")]
    pub timeout_height: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct ModeInfoSingle {
    #[prost(int32, tag = "1")]
    pub mode: i32,
}

/// Only the `single` arm of the oneof is used.
#[derive(Clone, PartialEq, Message)]
pub struct ModeInfo {
    #[prost(message, optional, tag = "1")]
    pub single: Option<ModeInfoSingle>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SignerInfo {
    #[prost(message, optional, tag = "1")]
    pub public_key: Option<Any>,
    #[prost(message, optional, tag = "2")]
    pub mode_info: Option<ModeInfo>,
    #[prost(uint64, tag = "3")]
    pub sequence: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Fee {
    #[prost(message, repeated, tag = "1")]
    pub amount: Vec<Coin>,
    #[prost(uint64, tag = "2")]
    pub gas_limit: u64,
    #[prost(string, tag = "3")]
    pub payer: String,
    #[prost(string, tag = "4")]
    pub granter: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct AuthInfo {
    #[prost(message, repeated, tag = "1")]
    pub signer_infos: Vec<SignerInfo>,
    #[prost(message, optional, tag = "2")]
    pub fee: Option<Fee>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SignDoc {
    #[prost(bytes = "vec", tag = "1")]
    pub body_bytes: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub auth_info_bytes: Vec<u8>,
    #[prost(string, tag = "3")]
    pub chain_id: String,
    #[prost(uint64, tag = "4")]
    pub account_number: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct TxRaw {
    #[prost(bytes = "vec", tag = "1")]
    pub body_bytes: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub auth_info_bytes: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub signatures: Vec<Vec<u8>>,
}

/// Result data of a delivered transaction (`cosmos.base.abci.v1beta1.TxMsgData`).
#[derive(Clone, PartialEq, Message)]
pub struct TxMsgData {
    #[prost(message, repeated, tag = "2")]
    pub msg_responses: Vec<Any>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUTH
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, PartialEq, Message)]
pub struct QueryAccountRequest {
    #[prost(string, tag = "1")]
    pub address: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryAccountResponse {
    #[prost(message, optional, tag = "1")]
    pub account: Option<Any>,
}

#[derive(Clone, PartialEq, Message)]
pub struct BaseAccount {
    #[prost(string, tag = "1")]
    pub address: String,
    #[prost(message, optional, tag = "2")]
    pub pub_key: Option<Any>,
    #[prost(uint64, tag = "3")]
    pub account_number: u64,
    #[prost(uint64, tag = "4")]
    pub sequence: u64,
}

/// Accounts that wrap a `BaseAccount` in field 1 (e.g. `EthAccount`).
#[derive(Clone, PartialEq, Message)]
pub struct WrappedAccount {
    #[prost(message, optional, tag = "1")]
    pub base_account: Option<BaseAccount>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// IBC
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, PartialEq, Message)]
pub struct QueryInterchainAccountRequest {
    #[prost(string, tag = "1")]
    pub owner: String,
    #[prost(string, tag = "2")]
    pub connection_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryInterchainAccountResponse {
    #[prost(string, tag = "1")]
    pub address: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryConnectionRequest {
    #[prost(string, tag = "1")]
    pub connection_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct ConnectionEnd {
    #[prost(string, tag = "1")]
    pub client_id: String,
    #[prost(int32, tag = "3")]
    pub state: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryConnectionResponse {
    #[prost(message, optional, tag = "1")]
    pub connection: Option<ConnectionEnd>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryClientStatusRequest {
    #[prost(string, tag = "1")]
    pub client_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryClientStatusResponse {
    #[prost(string, tag = "1")]
    pub status: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgRegisterInterchainAccount {
    #[prost(string, tag = "1")]
    pub owner: String,
    #[prost(string, tag = "2")]
    pub connection_id: String,
    #[prost(string, tag = "3")]
    pub version: String,
    #[prost(int32, tag = "4")]
    pub ordering: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct InterchainAccountPacketData {
    #[prost(int32, tag = "1")]
    pub r#type: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
    #[prost(string, tag = "3")]
    pub memo: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct CosmosTx {
    #[prost(message, repeated, tag = "1")]
    pub messages: Vec<Any>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgSendTx {
    #[prost(string, tag = "1")]
    pub owner: String,
    #[prost(string, tag = "2")]
    pub connection_id: String,
    #[prost(message, optional, tag = "3")]
    pub packet_data: Option<InterchainAccountPacketData>,
    /// Nanoseconds after the current block time.
    #[prost(uint64, tag = "4")]
    pub relative_timeout: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOST ACTION MODULE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone, PartialEq, Message)]
pub struct MsgRequestAction {
    #[prost(string, tag = "1")]
    pub creator: String,
    #[prost(string, tag = "2")]
    pub action_type: String,
    #[prost(string, tag = "3")]
    pub metadata: String,
    #[prost(string, tag = "4")]
    pub price: String,
    #[prost(string, tag = "5")]
    pub expiration_time: String,
    #[prost(bytes = "vec", tag = "6")]
    pub app_pubkey: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgRequestActionResponse {
    #[prost(string, tag = "1")]
    pub action_id: String,
    #[prost(string, tag = "2")]
    pub status: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgApproveAction {
    #[prost(string, tag = "1")]
    pub creator: String,
    #[prost(string, tag = "2")]
    pub action_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Action {
    #[prost(string, tag = "1")]
    pub creator: String,
    #[prost(string, tag = "2")]
    pub action_id: String,
    #[prost(int32, tag = "3")]
    pub action_type: i32,
    #[prost(bytes = "vec", tag = "4")]
    pub metadata: Vec<u8>,
    #[prost(string, tag = "5")]
    pub price: String,
    #[prost(int64, tag = "6")]
    pub expiration_time: i64,
    #[prost(int32, tag = "7")]
    pub state: i32,
    #[prost(int64, tag = "8")]
    pub block_height: i64,
    #[prost(string, repeated, tag = "9")]
    pub super_nodes: Vec<String>,
    #[prost(uint64, tag = "10")]
    pub file_size_kbs: u64,
    #[prost(bytes = "vec", tag = "11")]
    pub app_pubkey: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CascadeMetadata {
    #[prost(string, tag = "1")]
    pub data_hash: String,
    #[prost(string, tag = "2")]
    pub file_name: String,
    #[prost(uint64, tag = "3")]
    pub rq_ids_ic: u64,
    #[prost(uint64, tag = "4")]
    pub rq_ids_max: u64,
    #[prost(string, repeated, tag = "5")]
    pub rq_ids_ids: Vec<String>,
    #[prost(string, tag = "6")]
    pub signatures: String,
    #[prost(bool, tag = "7")]
    pub public: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryGetActionRequest {
    #[prost(string, tag = "1")]
    pub action_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryGetActionResponse {
    #[prost(message, optional, tag = "1")]
    pub action: Option<Action>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryGetActionFeeRequest {
    #[prost(string, tag = "1")]
    pub data_size: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryGetActionFeeResponse {
    #[prost(string, tag = "1")]
    pub amount: String,
}
