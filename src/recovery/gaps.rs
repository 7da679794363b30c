//! Sequence gap detection
//!
//! Gaps are recomputed from storage on every call; nothing is cached.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{parse_chain, parse_emitter_address, RecoveryService};
use crate::error::RecoveryError;
use crate::store::VaaStore;
use crate::types::{Emitter, SequenceGap};

/// Every sequence in [first, last] with no stored VAA
pub async fn find_gaps(store: &dyn VaaStore, emitter: &Emitter) -> Result<SequenceGap, RecoveryError> {
    Ok(store.find_emitter_sequence_gap(emitter).await?)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindMissingMessagesRequest {
    pub emitter_chain: u32,
    /// Hex-encoded 32-byte emitter address
    pub emitter_address: String,
    /// Try to fill every gap from `backfill_nodes` before answering
    pub rpc_backfill: bool,
    pub backfill_nodes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindMissingMessagesResponse {
    /// `chain/emitter_hex/sequence` of each message still missing
    pub missing_messages: Vec<String>,
    pub first_sequence: u64,
    pub last_sequence: u64,
}

impl RecoveryService {
    pub async fn find_missing_messages(
        &self,
        req: &FindMissingMessagesRequest,
        cancel: &CancellationToken,
    ) -> Result<FindMissingMessagesResponse, RecoveryError> {
        let chain = parse_chain(req.emitter_chain, "emitter_chain")?;
        let address = parse_emitter_address(&req.emitter_address)?;
        let emitter = Emitter::new(chain, address);

        let gap = find_gaps(self.stores.vaas.as_ref(), &emitter).await?;
        let mut missing = gap.missing;

        if req.rpc_backfill && !missing.is_empty() {
            let mut unfilled = Vec::with_capacity(missing.len());
            for sequence in missing {
                let found = self
                    .backfill
                    .backfill(&req.backfill_nodes, &emitter.vaa_id(sequence), cancel)
                    .await
                    .map_err(|e| match e {
                        RecoveryError::Cancelled => e,
                        e => RecoveryError::Internal(format!("failed to backfill VAA: {}", e)),
                    })?;
                if !found {
                    unfilled.push(sequence);
                }
            }
            info!(
                chain = %chain,
                address = %address,
                unfilled = unfilled.len(),
                "Backfilled sequence gap"
            );
            missing = unfilled;
        }

        Ok(FindMissingMessagesResponse {
            missing_messages: missing
                .into_iter()
                .map(|seq| emitter.vaa_id(seq).to_string())
                .collect(),
            first_sequence: gap.first,
            last_sequence: gap.last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::service;
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::MemoryStore;
    use crate::types::{Byte32, ChainId};
    use std::sync::Arc;

    fn emitter() -> Emitter {
        Emitter::new(ChainId::ETHEREUM, Byte32([0x0e; 32]))
    }

    async fn store_with(sequences: &[u64]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for seq in sequences {
            store
                .store_signed_vaa(&emitter().vaa_id(*seq), &[0])
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_find_gaps() {
        let store = store_with(&[0, 1, 3, 4]).await;
        let gap = find_gaps(store.as_ref(), &emitter()).await.unwrap();
        assert_eq!(gap.missing, vec![2]);
        assert_eq!((gap.first, gap.last), (0, 4));
    }

    #[tokio::test]
    async fn test_find_missing_messages_without_backfill() {
        let store = store_with(&[10, 13]).await;
        let (service, _rx) = service(store);
        let req = FindMissingMessagesRequest {
            emitter_chain: 2,
            emitter_address: "0e".repeat(32),
            ..Default::default()
        };

        let resp = service
            .find_missing_messages(&req, &CancellationToken::new())
            .await
            .unwrap();
        let prefix = format!("2/{}", "0e".repeat(32));
        assert_eq!(
            resp.missing_messages,
            vec![format!("{}/11", prefix), format!("{}/12", prefix)]
        );
        assert_eq!((resp.first_sequence, resp.last_sequence), (10, 13));
    }

    #[tokio::test]
    async fn test_find_missing_messages_empty_emitter() {
        let (service, _rx) = service(Arc::new(MemoryStore::new()));
        let req = FindMissingMessagesRequest {
            emitter_chain: 2,
            emitter_address: "0e".repeat(32),
            rpc_backfill: true,
            backfill_nodes: vec!["http://127.0.0.1:1".to_string()],
        };
        let resp = service
            .find_missing_messages(&req, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resp, FindMissingMessagesResponse::default());
    }

    #[tokio::test]
    async fn test_find_missing_messages_unreachable_peers_leave_gap() {
        let store = store_with(&[0, 2]).await;
        let (service, _rx) = service(store);
        let req = FindMissingMessagesRequest {
            emitter_chain: 2,
            emitter_address: "0e".repeat(32),
            rpc_backfill: true,
            backfill_nodes: vec!["http://127.0.0.1:1".to_string()],
        };
        let resp = service
            .find_missing_messages(&req, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resp.missing_messages.len(), 1);
        assert!(resp.missing_messages[0].ends_with("/1"));
    }

    #[tokio::test]
    async fn test_find_missing_messages_rejects_bad_address() {
        let (service, _rx) = service(Arc::new(MemoryStore::new()));
        let req = FindMissingMessagesRequest {
            emitter_chain: 2,
            emitter_address: "not-hex".to_string(),
            ..Default::default()
        };
        let err = service
            .find_missing_messages(&req, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
