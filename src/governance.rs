//! Governance VAA injection
//!
//! Admin-submitted governance messages are turned into unsigned governance
//! VAAs and handed to the governance sink, which the signing pipeline
//! consumes. Messages are processed in order; the first invalid one fails the
//! call and nothing after it is submitted.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::codec::governance::{GovernanceMessage, GovernanceRequest};
use crate::codec::Vaa;
use crate::error::RecoveryError;
use crate::hash::bytes32_to_hex;
use crate::metrics;

/// Destination of constructed governance VAAs
#[async_trait]
pub trait GovernanceSink: Send + Sync {
    async fn submit(&self, vaa: Vaa) -> Result<(), RecoveryError>;
}

#[async_trait]
impl GovernanceSink for mpsc::Sender<Vaa> {
    async fn submit(&self, vaa: Vaa) -> Result<(), RecoveryError> {
        self.send(vaa)
            .await
            .map_err(|_| RecoveryError::Internal("governance queue is closed".into()))
    }
}

#[derive(Clone)]
pub struct GovernanceInjector {
    sink: Arc<dyn GovernanceSink>,
}

impl GovernanceInjector {
    pub fn new(sink: Arc<dyn GovernanceSink>) -> Self {
        Self { sink }
    }

    /// Build, log and submit one governance VAA per message.
    ///
    /// Returns the signing digest of every submitted VAA, in input order.
    pub async fn inject_governance_vaa(
        &self,
        messages: &[GovernanceMessage],
        current_set_index: u32,
    ) -> Result<Vec<[u8; 32]>, RecoveryError> {
        let mut digests = Vec::with_capacity(messages.len());

        for message in messages {
            let vaa = message.to_vaa(current_set_index)?;
            let digest = vaa.signing_digest();
            let kind = request_kind(&message.request);

            info!(
                kind,
                sequence = vaa.sequence,
                nonce = vaa.nonce,
                guardian_set_index = vaa.guardian_set_index,
                digest = %bytes32_to_hex(&digest),
                payload = %hex::encode(&vaa.payload),
                "Governance VAA constructed"
            );

            self.sink.submit(vaa).await?;
            metrics::record_governance_vaa(kind);
            digests.push(digest);
        }

        Ok(digests)
    }
}

fn request_kind(request: &GovernanceRequest) -> &'static str {
    match request {
        GovernanceRequest::GuardianSet(_) => "guardian_set",
        GovernanceRequest::ContractUpgrade(_) => "contract_upgrade",
        GovernanceRequest::BridgeRegisterChain(_) => "bridge_register_chain",
        GovernanceRequest::BridgeContractUpgrade(_) => "bridge_contract_upgrade",
        GovernanceRequest::UndoneTransfer(_) => "undone_transfer",
    }
}
