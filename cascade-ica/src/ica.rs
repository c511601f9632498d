//! Delegated (interchain) account coordination.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::address::ResolvedIdentity;
use crate::config::ControllerChainConfig;
use crate::deadline::Deadline;
use crate::error::{IcaError, Result};
use crate::keyring::KeyringHandle;
use crate::transport::IcaTransport;
use crate::types::{AckResult, ClientStatus, DelegatedAccount, HostMsg, RegistrationState};

/// ICS-27 channel version metadata sent with a registration.
#[derive(Debug, Serialize)]
struct Ics27Version<'a> {
    version: &'a str,
    controller_connection_id: &'a str,
    host_connection_id: &'a str,
    address: &'a str,
    encoding: &'a str,
    tx_type: &'a str,
}

/// Version string for a registration: metadata JSON when the counterparty
/// connection is known, otherwise empty so the host negotiates it.
pub fn registration_version(connection_id: &str, counterparty: Option<&str>) -> Result<String> {
    let Some(host_connection_id) = counterparty else {
        return Ok(String::new());
    };
    let metadata = Ics27Version {
        version: "ics27-1",
        controller_connection_id: connection_id,
        host_connection_id,
        address: "",
        encoding: "proto3",
        tx_type: "sdk_multi_msg",
    };
    serde_json::to_string(&metadata)
        .map_err(|e| IcaError::InvalidInput(format!("encode ics27 metadata: {e}")))
}

/// Makes the delegated account available and exposes the owner identity.
pub struct IcaCoordinator {
    transport: Arc<dyn IcaTransport>,
    keyring: KeyringHandle,
    key_name: String,
    owner_address: String,
    connection_id: String,
    counterparty_connection_id: Option<String>,
    poll_interval: Duration,
    app_pubkey: Vec<u8>,
}

impl IcaCoordinator {
    /// Coordinator owned by `identity`, signing with the controller key.
    pub fn new(
        transport: Arc<dyn IcaTransport>,
        keyring: KeyringHandle,
        identity: ResolvedIdentity,
        controller: &ControllerChainConfig,
    ) -> Result<Self> {
        let key = keyring.key(&controller.key_name)?;
        debug!(
            owner = %identity.controller_address,
            host_account = %identity.host_address,
            connection = %controller.connection_id,
            "coordinator ready"
        );
        Ok(Self {
            transport,
            keyring,
            key_name: controller.key_name.clone(),
            owner_address: identity.controller_address,
            connection_id: controller.connection_id.clone(),
            counterparty_connection_id: controller.counterparty_connection_id.clone(),
            poll_interval: controller.poll_interval,
            app_pubkey: key.public_key,
        })
    }

    /// Controller-chain address of the registering key.
    pub fn owner_address(&self) -> &str {
        &self.owner_address
    }

    /// Public key of the registering key, embedded in action requests.
    pub fn app_pubkey(&self) -> &[u8] {
        &self.app_pubkey
    }

    /// Application-level signature over `data` with the registering key.
    pub fn sign_app_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(self.keyring.sign(&self.key_name, data)?)
    }

    /// Current delegated address, without registering.
    pub async fn query_address(&self, deadline: &Deadline) -> Result<Option<String>> {
        deadline
            .run(
                "querying interchain account",
                self.transport
                    .query_ica_address(&self.owner_address, &self.connection_id),
            )
            .await
    }

    /// Current delegated address; `NotFound` if the account was never registered.
    pub async fn require_address(&self, deadline: &Deadline) -> Result<String> {
        self.query_address(deadline).await?.ok_or_else(|| {
            IcaError::NotFound(format!(
                "interchain account for {} on {}",
                self.owner_address, self.connection_id
            ))
        })
    }

    /// Delegated address, registering the account first if needed.
    pub async fn ensure_address(&self, deadline: &Deadline) -> Result<String> {
        let account = self.ensure_account(deadline).await?;
        account.delegated_address.ok_or_else(|| {
            IcaError::NotFound(format!(
                "interchain account for {} on {}",
                self.owner_address, self.connection_id
            ))
        })
    }

    /// Query, check preconditions, register and poll until observable.
    pub async fn ensure_account(&self, deadline: &Deadline) -> Result<DelegatedAccount> {
        let account = DelegatedAccount::unregistered(&self.owner_address, &self.connection_id);

        if let Some(address) = self.query_address(deadline).await? {
            debug!(ica_address = %address, "interchain account already registered");
            return Ok(account.registered(address));
        }

        self.check_preconditions(deadline).await?;

        let version = registration_version(
            &self.connection_id,
            self.counterparty_connection_id.as_deref(),
        )?;
        let tx_hash = deadline
            .run(
                "registering interchain account",
                self.transport
                    .register(&self.owner_address, &self.connection_id, &version),
            )
            .await?;
        info!(
            owner = %self.owner_address,
            connection = %self.connection_id,
            tx_hash = %tx_hash,
            "interchain account registration submitted"
        );
        let account = DelegatedAccount {
            state: RegistrationState::Pending { tx_hash },
            ..account
        };

        self.await_registration(account, deadline).await
    }

    async fn check_preconditions(&self, deadline: &Deadline) -> Result<()> {
        let client_id = deadline
            .run(
                "querying connection",
                self.transport.connection_client(&self.connection_id),
            )
            .await?
            .ok_or_else(|| IcaError::ConnectionMissing(self.connection_id.clone()))?;

        let status = deadline
            .run("querying client status", self.transport.client_status(&client_id))
            .await?;
        if status != ClientStatus::Active {
            return Err(IcaError::ClientInactive {
                connection_id: self.connection_id.clone(),
                client_id,
                status: status.to_string(),
            });
        }
        Ok(())
    }

    async fn await_registration(
        &self,
        account: DelegatedAccount,
        deadline: &Deadline,
    ) -> Result<DelegatedAccount> {
        let timeout = || IcaError::RegistrationTimeout {
            owner: self.owner_address.clone(),
            connection_id: self.connection_id.clone(),
        };

        loop {
            match self.query_address(deadline).await {
                Ok(Some(address)) => {
                    info!(ica_address = %address, "interchain account registered");
                    return Ok(account.registered(address));
                }
                Ok(None) => debug!("interchain account not yet observable"),
                Err(e) if e.is_timeout() => return Err(timeout()),
                Err(e) => return Err(e),
            }
            if deadline
                .sleep("waiting for interchain account", self.poll_interval)
                .await
                .is_err()
            {
                return Err(timeout());
            }
        }
    }

    /// Dispatch `msg` through the delegated account and wait for the acknowledgement.
    pub async fn send(&self, msg: &HostMsg, deadline: &Deadline) -> Result<AckResult> {
        info!(kind = msg.kind(), creator = msg.creator(), "sending via interchain account");
        let ack = deadline
            .run(
                "waiting for acknowledgement",
                self.transport.send(&self.owner_address, &self.connection_id, msg),
            )
            .await?;
        info!(tx_hash = %ack.tx_hash, action_id = ?ack.action_id, "acknowledgement observed");
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_empty_without_counterparty() {
        assert_eq!(registration_version("connection-0", None).unwrap(), "");
    }

    #[test]
    fn test_version_metadata_with_counterparty() {
        let version = registration_version("connection-0", Some("connection-7")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&version).unwrap();
        assert_eq!(value["version"], "ics27-1");
        assert_eq!(value["controller_connection_id"], "connection-0");
        assert_eq!(value["host_connection_id"], "connection-7");
        assert_eq!(value["encoding"], "proto3");
        assert_eq!(value["tx_type"], "sdk_multi_msg");
    }
}
