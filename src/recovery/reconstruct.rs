//! Undone-transfer reconstruction
//!
//! Recovers a transfer that was emitted toward the local chain but never
//! completed and turns it into a governance message that returns the funds to
//! the recipient. Steps run strictly in order:
//!
//! 1. load the signed transfer VAA, backfilling it from peers if missing
//! 2. wait for the backfilled copy to be verified and stored
//! 3. decode the transfer payload
//! 4. resolve the local wrapper of the transferred token
//! 5. mark (chain, sequence) executing, at most once
//! 6. build the undone-transfer governance message

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::poll::poll_until;
use super::{parse_chain, parse_emitter_address, RecoveryService};
use crate::codec::governance::{GovernanceMessage, GovernanceRequest, UndoneTransfer};
use crate::codec::transfer::{undone_transfer_payload, Transfer};
use crate::codec::Vaa;
use crate::error::RecoveryError;
use crate::metrics;
use crate::types::{Byte32, ChainId, Emitter, VaaId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoneTransferRequest {
    pub emitter_chain: u32,
    /// Hex-encoded 32-byte emitter address
    pub emitter_address: String,
    pub sequence: u64,
    /// Sequence of the governance message to produce
    pub gov_sequence: u64,
    #[serde(default)]
    pub backfill_nodes: Vec<String>,
}

impl RecoveryService {
    /// Build the governance message that undoes the transfer at the requested
    /// coordinate. The sequence is marked executing before this returns Ok, so
    /// a second call for the same coordinate fails with a conflict.
    pub async fn gen_undone_transfer_governance_msg(
        &self,
        req: &UndoneTransferRequest,
        cancel: &CancellationToken,
    ) -> Result<GovernanceMessage, RecoveryError> {
        let chain = parse_chain(req.emitter_chain, "emitter_chain")?;
        let address = parse_emitter_address(&req.emitter_address)?;
        let id = Emitter::new(chain, address).vaa_id(req.sequence);

        let result = self
            .reconstruct(&id, req.gov_sequence, &req.backfill_nodes, cancel)
            .await;

        match &result {
            Ok(message) => {
                metrics::record_reconstruction(chain.to_u16(), "ok");
                info!(
                    vaa_id = %id,
                    gov_sequence = message.sequence,
                    nonce = message.nonce,
                    "Generated undone transfer governance message"
                );
            }
            Err(e) => {
                metrics::record_reconstruction(chain.to_u16(), outcome_label(e));
                warn!(vaa_id = %id, error = %e, "Undone transfer reconstruction failed");
            }
        }
        result
    }

    async fn reconstruct(
        &self,
        id: &VaaId,
        gov_sequence: u64,
        peers: &[String],
        cancel: &CancellationToken,
    ) -> Result<GovernanceMessage, RecoveryError> {
        let vaa_bytes = self.load_or_backfill(id, peers, cancel).await?;

        let transfer_vaa = Vaa::parse(&vaa_bytes)?;
        let transfer = Transfer::decode(&transfer_vaa.payload)?;
        let wrapper_id = self.token_wrapper_id(&transfer, id.emitter_chain).await?;

        if cancel.is_cancelled() {
            return Err(RecoveryError::Cancelled);
        }
        if !self
            .stores
            .undone
            .set_sequence_executing(id.emitter_chain, id.sequence)
            .await?
        {
            return Err(RecoveryError::Conflict(format!(
                "sequence {} of chain {} is already executing or done",
                id.sequence, id.emitter_chain
            )));
        }

        let payload = undone_transfer_payload(&transfer, &wrapper_id, id.sequence);
        Ok(GovernanceMessage {
            sequence: gov_sequence,
            nonce: rand::random(),
            request: GovernanceRequest::UndoneTransfer(UndoneTransfer {
                consistency_level: transfer_vaa.consistency_level,
                payload,
            }),
        })
    }

    async fn load_or_backfill(
        &self,
        id: &VaaId,
        peers: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, RecoveryError> {
        if let Some(bytes) = self.stores.vaas.get_signed_vaa(id).await? {
            return Ok(bytes);
        }

        info!(vaa_id = %id, peers = peers.len(), "VAA not stored locally, backfilling from peers");
        if !self.backfill.backfill(peers, id, cancel).await? {
            return Err(RecoveryError::NotRecoverable(format!(
                "failed to fetch vaa {} from remote guardians, try other guardians",
                id
            )));
        }

        let vaas = self.stores.vaas.clone();
        let id = *id;
        poll_until(&self.poll, &format!("vaa {}", id), cancel, move || {
            let vaas = vaas.clone();
            async move { Ok(vaas.get_signed_vaa(&id).await?) }
        })
        .await
    }

    /// Wrapper id on the local chain for the transferred token
    async fn token_wrapper_id(
        &self,
        transfer: &Transfer,
        remote_chain: ChainId,
    ) -> Result<Byte32, RecoveryError> {
        let wrapper = if transfer.token_chain_id == self.local_chain {
            self.stores
                .tokens
                .local_token_wrapper(&transfer.token_id, remote_chain)
                .await?
        } else {
            self.stores
                .tokens
                .remote_token_wrapper(&transfer.token_id)
                .await?
        };

        wrapper.ok_or_else(|| {
            RecoveryError::NotFound(format!(
                "no token wrapper for token {} (token chain {}, remote chain {})",
                transfer.token_id, transfer.token_chain_id, remote_chain
            ))
        })
    }
}

fn outcome_label(e: &RecoveryError) -> &'static str {
    match e {
        RecoveryError::Validation(_) | RecoveryError::Decode { .. } => "invalid",
        RecoveryError::NotRecoverable(_) => "not_recoverable",
        RecoveryError::NotFound(_) => "not_found",
        RecoveryError::Timeout(_) => "timeout",
        RecoveryError::Conflict(_) => "conflict",
        RecoveryError::Cancelled => "cancelled",
        _ => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::service;
    use super::*;
    use crate::codec::transfer::UNDONE_TRANSFER_ACTION;
    use crate::codec::vaa::VAA_VERSION;
    use crate::error::ErrorKind;
    use crate::store::{MemoryStore, TokenRegistry, UndoneSequenceStore, VaaStore};
    use crate::types::SequenceStatus;
    use alloy::primitives::U256;
    use std::sync::Arc;

    const TOKEN: Byte32 = Byte32([0x70; 32]);
    const WRAPPER: Byte32 = Byte32([0x77; 32]);

    fn transfer(token_chain: ChainId) -> Transfer {
        Transfer {
            amount: U256::from(5_000u64),
            token_id: TOKEN,
            token_chain_id: token_chain,
            to_address: Byte32([0x11; 32]),
            to_chain_id: ChainId::ALEPHIUM,
            fee: U256::from(7u64),
        }
    }

    fn transfer_vaa(id: &VaaId, payload: Vec<u8>) -> Vec<u8> {
        Vaa {
            version: VAA_VERSION,
            guardian_set_index: 0,
            signatures: vec![],
            timestamp: 1,
            nonce: 1,
            emitter_chain: id.emitter_chain,
            emitter_address: id.emitter_address,
            sequence: id.sequence,
            consistency_level: 15,
            payload,
        }
        .serialize()
    }

    fn request(id: &VaaId) -> UndoneTransferRequest {
        UndoneTransferRequest {
            emitter_chain: id.emitter_chain.to_u16() as u32,
            emitter_address: id.emitter_address.to_hex(),
            sequence: id.sequence,
            gov_sequence: 100,
            backfill_nodes: vec![],
        }
    }

    fn id() -> VaaId {
        Emitter::new(ChainId::ETHEREUM, Byte32([0xe0; 32])).vaa_id(5)
    }

    #[tokio::test]
    async fn test_reconstruct_stored_remote_token() {
        let store = Arc::new(MemoryStore::new());
        store
            .store_signed_vaa(&id(), &transfer_vaa(&id(), transfer(ChainId::ETHEREUM).encode()))
            .await
            .unwrap();
        store.add_remote_token_wrapper(&TOKEN, &WRAPPER).await.unwrap();
        let (service, _rx) = service(store.clone());

        let msg = service
            .gen_undone_transfer_governance_msg(&request(&id()), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(msg.sequence, 100);
        let GovernanceRequest::UndoneTransfer(undone) = msg.request else {
            panic!("expected undone transfer");
        };
        assert_eq!(undone.consistency_level, 15);
        assert_eq!(undone.payload[32], UNDONE_TRANSFER_ACTION);
        assert_eq!(&undone.payload[33..41], &5u64.to_be_bytes());
        assert_eq!(&undone.payload[41..73], WRAPPER.as_bytes());
        assert_eq!(
            store.sequence_status(ChainId::ETHEREUM, 5).await,
            Some(SequenceStatus::Executing)
        );
    }

    #[tokio::test]
    async fn test_reconstruct_local_token_uses_emitter_chain() {
        let store = Arc::new(MemoryStore::new());
        store
            .store_signed_vaa(&id(), &transfer_vaa(&id(), transfer(ChainId::ALEPHIUM).encode()))
            .await
            .unwrap();
        store
            .add_local_token_wrapper(&TOKEN, ChainId::ETHEREUM, &WRAPPER)
            .await
            .unwrap();
        let (service, _rx) = service(store);

        let msg = service
            .gen_undone_transfer_governance_msg(&request(&id()), &CancellationToken::new())
            .await
            .unwrap();
        let GovernanceRequest::UndoneTransfer(undone) = msg.request else {
            panic!("expected undone transfer");
        };
        assert_eq!(&undone.payload[41..73], WRAPPER.as_bytes());
    }

    #[tokio::test]
    async fn test_reconstruct_twice_conflicts() {
        let store = Arc::new(MemoryStore::new());
        store
            .store_signed_vaa(&id(), &transfer_vaa(&id(), transfer(ChainId::ETHEREUM).encode()))
            .await
            .unwrap();
        store.add_remote_token_wrapper(&TOKEN, &WRAPPER).await.unwrap();
        let (service, _rx) = service(store);

        let cancel = CancellationToken::new();
        service
            .gen_undone_transfer_governance_msg(&request(&id()), &cancel)
            .await
            .unwrap();
        let err = service
            .gen_undone_transfer_governance_msg(&request(&id()), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_reconstruct_unknown_token_leaves_sequence_untouched() {
        let store = Arc::new(MemoryStore::new());
        store
            .store_signed_vaa(&id(), &transfer_vaa(&id(), transfer(ChainId::ETHEREUM).encode()))
            .await
            .unwrap();
        store.add_undone_sequences(ChainId::ETHEREUM, &[5]).await.unwrap();
        let (service, _rx) = service(store.clone());

        let err = service
            .gen_undone_transfer_governance_msg(&request(&id()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            store.get_undone_sequences(ChainId::ETHEREUM).await.unwrap(),
            vec![5]
        );
    }

    #[tokio::test]
    async fn test_reconstruct_rejects_non_transfer_payload() {
        let store = Arc::new(MemoryStore::new());
        let mut payload = transfer(ChainId::ETHEREUM).encode();
        payload[0] = 2;
        store
            .store_signed_vaa(&id(), &transfer_vaa(&id(), payload))
            .await
            .unwrap();
        store.add_remote_token_wrapper(&TOKEN, &WRAPPER).await.unwrap();
        let (service, _rx) = service(store.clone());

        let err = service
            .gen_undone_transfer_governance_msg(&request(&id()), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.is_retryable());
        assert_eq!(store.sequence_status(ChainId::ETHEREUM, 5).await, None);
    }

    #[tokio::test]
    async fn test_reconstruct_missing_everywhere_is_not_recoverable() {
        let store = Arc::new(MemoryStore::new());
        let (service, _rx) = service(store);

        let mut req = request(&id());
        req.backfill_nodes = vec!["http://127.0.0.1:1".to_string()];
        let err = service
            .gen_undone_transfer_governance_msg(&req, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RecoveryError::NotRecoverable(_)));
        assert!(err.to_string().contains("try other guardians"));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome_label(&RecoveryError::Cancelled), "cancelled");
        assert_eq!(
            outcome_label(&RecoveryError::Timeout("x".into())),
            "timeout"
        );
        assert_eq!(
            outcome_label(&RecoveryError::Internal("x".into())),
            "error"
        );
    }
}
