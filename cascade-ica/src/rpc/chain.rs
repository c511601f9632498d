//! Chain adapters over Tendermint RPC: the interchain-account transport on
//! the controller chain and the action queries on the host chain.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use prost::Message;
use serde::Deserialize;
use tracing::{debug, info};

use super::client::{TendermintClient, TxResult};
use super::proto;
use crate::config::{ControllerChainConfig, GasPrice, KeyAlgorithm};
use crate::deadline::DEFAULT_COMMAND_TIMEOUT;
use crate::error::{IcaError, Result};
use crate::keyring::KeyringHandle;
use crate::transport::{HostLedger, IcaTransport};
use crate::types::{
    AckResult, Action, ActionMetadata, ActionState, ActionType, CascadeMetadata, ClientStatus,
    HostMsg,
};

/// Packet timeout relative to the controller block time.
pub const ICA_PACKET_TIMEOUT: Duration = DEFAULT_COMMAND_TIMEOUT;

// ═══════════════════════════════════════════════════════════════════════════════
// HOST MESSAGE ENCODING
// ═══════════════════════════════════════════════════════════════════════════════

/// Encode a host message as the `Any` executed by the delegated account.
pub fn encode_host_msg(msg: &HostMsg) -> proto::Any {
    match msg {
        HostMsg::RequestAction(req) => proto::Any::pack(
            proto::MSG_REQUEST_ACTION_URL,
            &proto::MsgRequestAction {
                creator: req.creator.clone(),
                action_type: action_type_name(req.action_type).to_string(),
                metadata: req.metadata.clone(),
                price: req.price.clone(),
                expiration_time: req.expiration_time.clone(),
                app_pubkey: req.app_pubkey.clone(),
            },
        ),
        HostMsg::ApproveAction(approve) => proto::Any::pack(
            proto::MSG_APPROVE_ACTION_URL,
            &proto::MsgApproveAction {
                creator: approve.creator.clone(),
                action_id: approve.action_id.clone(),
            },
        ),
    }
}

fn action_type_name(action_type: ActionType) -> &'static str {
    match action_type {
        ActionType::Cascade => "CASCADE",
        ActionType::Sense => "SENSE",
        ActionType::Unspecified => "UNSPECIFIED",
    }
}

/// Channel acknowledgement as written by the host chain.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Acknowledgement {
    Result(String),
    Error(String),
}

/// Decode a raw acknowledgement into the new action id, if any.
pub fn decode_acknowledgement(ack: &[u8]) -> Result<Option<String>> {
    let ack: Acknowledgement = serde_json::from_slice(ack)
        .map_err(|e| IcaError::SendAck(format!("malformed acknowledgement: {e}")))?;
    let result = match ack {
        Acknowledgement::Error(reason) => return Err(IcaError::SendAck(reason)),
        Acknowledgement::Result(result) => result,
    };

    let bytes = STANDARD
        .decode(result)
        .map_err(|e| IcaError::SendAck(format!("acknowledgement result: {e}")))?;
    let data = proto::TxMsgData::decode(bytes.as_slice())
        .map_err(|e| IcaError::SendAck(format!("acknowledgement result: {e}")))?;

    for response in &data.msg_responses {
        if response.type_url == proto::MSG_REQUEST_ACTION_RESPONSE_URL {
            let decoded = proto::MsgRequestActionResponse::decode(response.value.as_slice())
                .map_err(|e| IcaError::SendAck(format!("request action response: {e}")))?;
            return Ok(Some(decoded.action_id));
        }
    }
    Ok(None)
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONTROLLER TRANSPORT
// ═══════════════════════════════════════════════════════════════════════════════

/// Interchain-account transport that signs and broadcasts on the controller
/// chain and watches the host chain for acknowledgements.
pub struct RpcIcaTransport {
    controller: TendermintClient,
    host: TendermintClient,
    keyring: KeyringHandle,
    key_name: String,
    key_type: KeyAlgorithm,
    chain_id: String,
    gas_limit: u64,
    gas_price: Option<GasPrice>,
    poll_interval: Duration,
}

impl RpcIcaTransport {
    pub fn new(
        controller: TendermintClient,
        host: TendermintClient,
        keyring: KeyringHandle,
        config: &ControllerChainConfig,
    ) -> Self {
        Self {
            controller,
            host,
            keyring,
            key_name: config.key_name.clone(),
            key_type: config.key_type,
            chain_id: config.chain_id.clone(),
            gas_limit: config.gas_limit,
            gas_price: config.gas_price.clone(),
            poll_interval: config.poll_interval,
        }
    }

    async fn account(&self, address: &str) -> Result<proto::BaseAccount> {
        let request = proto::QueryAccountRequest {
            address: address.to_string(),
        };
        let response = self
            .controller
            .abci_query(proto::QUERY_ACCOUNT_PATH, &request.encode_to_vec())
            .await?;
        if !response.is_ok() {
            return Err(IcaError::NotFound(format!("account {address} ({})", response.log)));
        }

        let any = proto::QueryAccountResponse::decode(response.value.as_slice())
            .map_err(|e| self.invalid(format!("account response: {e}")))?
            .account
            .ok_or_else(|| IcaError::NotFound(format!("account {address}")))?;

        if any.type_url.ends_with(".BaseAccount") {
            return proto::BaseAccount::decode(any.value.as_slice())
                .map_err(|e| self.invalid(format!("base account: {e}")));
        }
        proto::WrappedAccount::decode(any.value.as_slice())
            .ok()
            .and_then(|wrapped| wrapped.base_account)
            .ok_or_else(|| self.invalid(format!("unsupported account type {}", any.type_url)))
    }

    fn public_key_any(&self, public_key: Vec<u8>) -> proto::Any {
        let url = match self.key_type {
            KeyAlgorithm::Secp256k1 => proto::SECP256K1_PUBKEY_URL,
            KeyAlgorithm::EthSecp256k1 => proto::ETH_SECP256K1_PUBKEY_URL,
        };
        proto::Any::pack(url, &proto::PubKey { key: public_key })
    }

    fn fee(&self) -> proto::Fee {
        let amount = self
            .gas_price
            .as_ref()
            .map(|price| proto::Coin {
                denom: price.denom.clone(),
                amount: price.fee_for(self.gas_limit).to_string(),
            })
            .into_iter()
            .collect();
        proto::Fee {
            amount,
            gas_limit: self.gas_limit,
            ..Default::default()
        }
    }

    /// Sign `msg` with the owner key, broadcast it and wait until it is included.
    async fn submit(&self, owner: &str, msg: proto::Any) -> Result<TxResult> {
        let account = self.account(owner).await?;
        let key = self.keyring.key(&self.key_name)?;

        let body = proto::TxBody {
            messages: vec![msg],
            ..Default::default()
        };
        let auth_info = proto::AuthInfo {
            signer_infos: vec![proto::SignerInfo {
                public_key: Some(self.public_key_any(key.public_key)),
                mode_info: Some(proto::ModeInfo {
                    single: Some(proto::ModeInfoSingle {
                        mode: proto::SIGN_MODE_DIRECT,
                    }),
                }),
                sequence: account.sequence,
            }],
            fee: Some(self.fee()),
        };
        let body_bytes = body.encode_to_vec();
        let auth_info_bytes = auth_info.encode_to_vec();
        let sign_doc = proto::SignDoc {
            body_bytes: body_bytes.clone(),
            auth_info_bytes: auth_info_bytes.clone(),
            chain_id: self.chain_id.clone(),
            account_number: account.account_number,
        };
        let signature = self.keyring.sign(&self.key_name, &sign_doc.encode_to_vec())?;
        let tx = proto::TxRaw {
            body_bytes,
            auth_info_bytes,
            signatures: vec![signature],
        };

        let broadcast = self.controller.broadcast_tx_sync(&tx.encode_to_vec()).await?;
        if broadcast.code != 0 {
            return Err(self.transport(format!(
                "tx rejected (code {}): {}",
                broadcast.code, broadcast.log
            )));
        }
        debug!(tx_hash = %broadcast.hash, "controller tx broadcast");

        loop {
            if let Some(result) = self.controller.tx(&broadcast.hash).await? {
                if result.code != 0 {
                    return Err(self.transport(format!(
                        "tx {} failed (code {}): {}",
                        result.hash, result.code, result.log
                    )));
                }
                return Ok(result);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Wait for the host chain to write the acknowledgement of a packet.
    async fn await_acknowledgement(
        &self,
        sequence: &str,
        src_channel: &str,
        dst_channel: &str,
    ) -> Result<Vec<u8>> {
        let query = format!(
            "write_acknowledgement.packet_sequence='{sequence}' AND \
             write_acknowledgement.packet_src_channel='{src_channel}' AND \
             write_acknowledgement.packet_dst_channel='{dst_channel}'"
        );
        loop {
            let txs = self.host.tx_search(&query).await?;
            if let Some(ack_hex) = txs
                .iter()
                .find_map(|tx| tx.attribute("write_acknowledgement", "packet_ack_hex"))
            {
                return hex::decode(ack_hex)
                    .map_err(|e| IcaError::SendAck(format!("acknowledgement hex: {e}")));
            }
            debug!(sequence, src_channel, "acknowledgement not yet written");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn transport(&self, reason: String) -> IcaError {
        IcaError::Transport {
            endpoint: self.controller.url().to_string(),
            reason,
        }
    }

    fn invalid(&self, reason: String) -> IcaError {
        IcaError::InvalidResponse {
            endpoint: self.controller.url().to_string(),
            reason,
        }
    }
}

#[async_trait]
impl IcaTransport for RpcIcaTransport {
    async fn query_ica_address(&self, owner: &str, connection_id: &str) -> Result<Option<String>> {
        let request = proto::QueryInterchainAccountRequest {
            owner: owner.to_string(),
            connection_id: connection_id.to_string(),
        };
        let response = self
            .controller
            .abci_query(proto::QUERY_ICA_PATH, &request.encode_to_vec())
            .await?;
        if response.is_not_found() {
            return Ok(None);
        }
        if !response.is_ok() {
            return Err(self.transport(format!("interchain account query: {}", response.log)));
        }
        let address = proto::QueryInterchainAccountResponse::decode(response.value.as_slice())
            .map_err(|e| self.invalid(format!("interchain account response: {e}")))?
            .address;
        Ok((!address.is_empty()).then_some(address))
    }

    async fn connection_client(&self, connection_id: &str) -> Result<Option<String>> {
        let request = proto::QueryConnectionRequest {
            connection_id: connection_id.to_string(),
        };
        let response = self
            .controller
            .abci_query(proto::QUERY_CONNECTION_PATH, &request.encode_to_vec())
            .await?;
        if response.is_not_found() {
            return Ok(None);
        }
        if !response.is_ok() {
            return Err(self.transport(format!("connection query: {}", response.log)));
        }
        let client_id = proto::QueryConnectionResponse::decode(response.value.as_slice())
            .map_err(|e| self.invalid(format!("connection response: {e}")))?
            .connection
            .map(|c| c.client_id)
            .unwrap_or_default();
        Ok((!client_id.is_empty()).then_some(client_id))
    }

    async fn client_status(&self, client_id: &str) -> Result<ClientStatus> {
        let request = proto::QueryClientStatusRequest {
            client_id: client_id.to_string(),
        };
        let response = self
            .controller
            .abci_query(proto::QUERY_CLIENT_STATUS_PATH, &request.encode_to_vec())
            .await?;
        if !response.is_ok() {
            return Err(self.transport(format!("client status query: {}", response.log)));
        }
        let status = proto::QueryClientStatusResponse::decode(response.value.as_slice())
            .map_err(|e| self.invalid(format!("client status response: {e}")))?
            .status;
        Ok(ClientStatus::parse(&status))
    }

    async fn register(&self, owner: &str, connection_id: &str, version: &str) -> Result<String> {
        let msg = proto::Any::pack(
            proto::MSG_REGISTER_ICA_URL,
            &proto::MsgRegisterInterchainAccount {
                owner: owner.to_string(),
                connection_id: connection_id.to_string(),
                version: version.to_string(),
                ordering: 0,
            },
        );
        let result = self.submit(owner, msg).await?;
        Ok(result.hash)
    }

    async fn send(&self, owner: &str, connection_id: &str, msg: &HostMsg) -> Result<AckResult> {
        let send_error = |e: IcaError| {
            if e.is_timeout() {
                e
            } else {
                IcaError::SendAck(e.to_string())
            }
        };

        let packet = proto::InterchainAccountPacketData {
            r#type: proto::ICA_EXECUTE_TX,
            data: proto::CosmosTx {
                messages: vec![encode_host_msg(msg)],
            }
            .encode_to_vec(),
            memo: String::new(),
        };
        let send_tx = proto::Any::pack(
            proto::MSG_SEND_TX_URL,
            &proto::MsgSendTx {
                owner: owner.to_string(),
                connection_id: connection_id.to_string(),
                packet_data: Some(packet),
                relative_timeout: ICA_PACKET_TIMEOUT.as_nanos() as u64,
            },
        );

        let result = self.submit(owner, send_tx).await.map_err(send_error)?;
        let (Some(sequence), Some(src), Some(dst)) = (
            result.attribute("send_packet", "packet_sequence"),
            result.attribute("send_packet", "packet_src_channel"),
            result.attribute("send_packet", "packet_dst_channel"),
        ) else {
            return Err(IcaError::SendAck(format!(
                "tx {} emitted no send_packet event",
                result.hash
            )));
        };
        info!(tx_hash = %result.hash, sequence, src, dst, "packet sent, awaiting acknowledgement");

        let ack = self
            .await_acknowledgement(sequence, src, dst)
            .await
            .map_err(send_error)?;
        let action_id = decode_acknowledgement(&ack)?;

        Ok(AckResult {
            tx_hash: result.hash.clone(),
            action_id,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOST LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Action queries against the host chain.
pub struct RpcHostLedger {
    host: TendermintClient,
}

impl RpcHostLedger {
    pub fn new(host: TendermintClient) -> Self {
        Self { host }
    }
}

#[async_trait]
impl HostLedger for RpcHostLedger {
    async fn get_action(&self, action_id: &str) -> Result<Action> {
        let request = proto::QueryGetActionRequest {
            action_id: action_id.to_string(),
        };
        let response = self
            .host
            .abci_query(proto::QUERY_GET_ACTION_PATH, &request.encode_to_vec())
            .await?;
        let not_found = || IcaError::NotFound(format!("action {action_id}"));
        if response.is_not_found() {
            return Err(not_found());
        }
        if !response.is_ok() {
            return Err(IcaError::Transport {
                endpoint: self.host.url().to_string(),
                reason: format!("action query: {}", response.log),
            });
        }

        let action = proto::QueryGetActionResponse::decode(response.value.as_slice())
            .map_err(|e| IcaError::InvalidResponse {
                endpoint: self.host.url().to_string(),
                reason: format!("action response: {e}"),
            })?
            .action
            .ok_or_else(not_found)?;
        Ok(action_from_proto(action))
    }

    async fn action_fee(&self, size_kib: u64) -> Result<String> {
        let request = proto::QueryGetActionFeeRequest {
            data_size: size_kib.to_string(),
        };
        let response = self
            .host
            .abci_query(proto::QUERY_GET_ACTION_FEE_PATH, &request.encode_to_vec())
            .await?;
        if !response.is_ok() {
            return Err(IcaError::Transport {
                endpoint: self.host.url().to_string(),
                reason: format!("action fee query: {}", response.log),
            });
        }
        let amount = proto::QueryGetActionFeeResponse::decode(response.value.as_slice())
            .map_err(|e| IcaError::InvalidResponse {
                endpoint: self.host.url().to_string(),
                reason: format!("action fee response: {e}"),
            })?
            .amount;
        Ok(amount)
    }
}

/// Convert the ledger record, decoding metadata by action type.
pub fn action_from_proto(action: proto::Action) -> Action {
    let action_type = ActionType::from_proto(action.action_type);
    let metadata = match action_type {
        _ if action.metadata.is_empty() => ActionMetadata::Unknown,
        ActionType::Cascade => proto::CascadeMetadata::decode(action.metadata.as_slice())
            .map(|m| {
                ActionMetadata::Cascade(CascadeMetadata {
                    data_hash: m.data_hash,
                    file_name: m.file_name,
                    rq_ids_ic: m.rq_ids_ic,
                    rq_ids_max: m.rq_ids_max,
                    rq_ids_ids: m.rq_ids_ids,
                    signatures: m.signatures,
                    public: m.public,
                })
            })
            .unwrap_or(ActionMetadata::Unknown),
        ActionType::Sense => ActionMetadata::Other {
            action_type,
            raw: action.metadata,
        },
        ActionType::Unspecified => ActionMetadata::Unknown,
    };

    Action {
        id: action.action_id,
        state: ActionState::from_proto(action.state),
        creator: action.creator,
        action_type,
        price: action.price,
        expiration_time: DateTime::<Utc>::from_timestamp(action.expiration_time, 0)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        block_height: action.block_height,
        metadata,
        app_pubkey: (!action.app_pubkey.is_empty()).then_some(action.app_pubkey),
    }
}
