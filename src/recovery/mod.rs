//! Recovery operations exposed to the admin surface
//!
//! - [`gaps`] - sequence gap detection and FindMissingMessages
//! - [`backfill`] - fetching missing VAAs from peer guardians
//! - [`poll`] - waiting for backfilled VAAs to be verified and stored
//! - [`reconstruct`] - undone-transfer governance message reconstruction

pub mod backfill;
pub mod gaps;
pub mod poll;
pub mod reconstruct;

pub use backfill::BackfillClient;
pub use gaps::{FindMissingMessagesRequest, FindMissingMessagesResponse};
pub use poll::PollConfig;
pub use reconstruct::UndoneTransferRequest;

use std::sync::Arc;

use crate::error::RecoveryError;
use crate::store::{TokenRegistry, UndoneSequenceStore, VaaStore};
use crate::types::{Byte32, ChainId};

/// Storage collaborators of the recovery operations
#[derive(Clone)]
pub struct RecoveryStores {
    pub vaas: Arc<dyn VaaStore>,
    pub tokens: Arc<dyn TokenRegistry>,
    pub undone: Arc<dyn UndoneSequenceStore>,
}

impl RecoveryStores {
    /// Use one backend for everything
    pub fn from_single<S>(store: Arc<S>) -> Self
    where
        S: VaaStore + TokenRegistry + UndoneSequenceStore + 'static,
    {
        Self {
            vaas: store.clone(),
            tokens: store.clone(),
            undone: store,
        }
    }
}

#[derive(Clone)]
pub struct RecoveryService {
    stores: RecoveryStores,
    backfill: BackfillClient,
    poll: PollConfig,
    local_chain: ChainId,
}

impl RecoveryService {
    pub fn new(
        stores: RecoveryStores,
        backfill: BackfillClient,
        poll: PollConfig,
        local_chain: ChainId,
    ) -> Self {
        Self {
            stores,
            backfill,
            poll,
            local_chain,
        }
    }

    /// Sequences the local token bridge recorded as undone for a remote chain
    pub async fn get_undone_sequences(&self, remote_chain_id: u32) -> Result<Vec<u64>, RecoveryError> {
        let chain = parse_chain(remote_chain_id, "remote_chain_id")?;
        Ok(self.stores.undone.get_undone_sequences(chain).await?)
    }
}

pub(crate) fn parse_chain(id: u32, field: &str) -> Result<ChainId, RecoveryError> {
    ChainId::try_from_u32(id)
        .ok_or_else(|| RecoveryError::validation(format!("invalid {}: {}", field, id)))
}

/// Hex emitter address, with or without 0x prefix
pub(crate) fn parse_emitter_address(hex: &str) -> Result<Byte32, RecoveryError> {
    Byte32::from_hex(hex).map_err(|e| {
        RecoveryError::validation(format!("invalid emitter address encoding: {}", e))
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::service;
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_get_undone_sequences() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_undone_sequences(ChainId::ETHEREUM, &[4, 2])
            .await
            .unwrap();
        let (service, _rx) = service(store);

        assert_eq!(service.get_undone_sequences(2).await.unwrap(), vec![2, 4]);
        assert!(service.get_undone_sequences(3).await.unwrap().is_empty());
        assert_eq!(
            service.get_undone_sequences(70_000).await.unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_parse_emitter_address() {
        assert!(parse_emitter_address(&"0a".repeat(32)).is_ok());
        let err = parse_emitter_address("xyz").unwrap_err();
        assert!(err.to_string().contains("invalid emitter address encoding"));
    }
}
