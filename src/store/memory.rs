//! In-memory storage backend

use async_trait::async_trait;
use eyre::Result;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{EventIndexStore, TokenRegistry, UndoneSequenceStore, VaaStore};
use crate::types::{Byte32, ChainId, Emitter, SequenceGap, SequenceStatus, VaaId};

#[derive(Default)]
struct Inner {
    vaas: HashMap<Emitter, BTreeMap<u64, Vec<u8>>>,
    local_wrappers: HashMap<(Byte32, ChainId), Byte32>,
    remote_wrappers: HashMap<Byte32, Byte32>,
    undone: HashMap<ChainId, BTreeMap<u64, SequenceStatus>>,
    event_indexes: HashMap<String, u64>,
}

/// All stores behind a single lock
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sequence_status(&self, remote_chain: ChainId, sequence: u64) -> Option<SequenceStatus> {
        let inner = self.inner.read().await;
        inner
            .undone
            .get(&remote_chain)
            .and_then(|seqs| seqs.get(&sequence).copied())
    }
}

#[async_trait]
impl VaaStore for MemoryStore {
    async fn get_signed_vaa(&self, id: &VaaId) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.read().await;
        Ok(inner
            .vaas
            .get(&id.emitter())
            .and_then(|seqs| seqs.get(&id.sequence).cloned()))
    }

    async fn store_signed_vaa(&self, id: &VaaId, vaa_bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .vaas
            .entry(id.emitter())
            .or_default()
            .entry(id.sequence)
            .or_insert_with(|| vaa_bytes.to_vec());
        Ok(())
    }

    async fn find_emitter_sequence_gap(&self, emitter: &Emitter) -> Result<SequenceGap> {
        let inner = self.inner.read().await;
        let stored: Vec<u64> = inner
            .vaas
            .get(emitter)
            .map(|seqs| seqs.keys().copied().collect())
            .unwrap_or_default();
        Ok(SequenceGap::from_sequences(&stored))
    }
}

#[async_trait]
impl TokenRegistry for MemoryStore {
    async fn local_token_wrapper(
        &self,
        token_id: &Byte32,
        remote_chain: ChainId,
    ) -> Result<Option<Byte32>> {
        let inner = self.inner.read().await;
        Ok(inner.local_wrappers.get(&(*token_id, remote_chain)).copied())
    }

    async fn remote_token_wrapper(&self, token_id: &Byte32) -> Result<Option<Byte32>> {
        let inner = self.inner.read().await;
        Ok(inner.remote_wrappers.get(token_id).copied())
    }

    async fn add_local_token_wrapper(
        &self,
        token_id: &Byte32,
        remote_chain: ChainId,
        wrapper_id: &Byte32,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .local_wrappers
            .insert((*token_id, remote_chain), *wrapper_id);
        Ok(())
    }

    async fn add_remote_token_wrapper(
        &self,
        token_id: &Byte32,
        wrapper_id: &Byte32,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.remote_wrappers.insert(*token_id, *wrapper_id);
        Ok(())
    }
}

#[async_trait]
impl UndoneSequenceStore for MemoryStore {
    async fn add_undone_sequences(&self, remote_chain: ChainId, sequences: &[u64]) -> Result<()> {
        let mut inner = self.inner.write().await;
        let entries = inner.undone.entry(remote_chain).or_default();
        for seq in sequences {
            entries.entry(*seq).or_insert(SequenceStatus::Undone);
        }
        Ok(())
    }

    async fn get_undone_sequences(&self, remote_chain: ChainId) -> Result<Vec<u64>> {
        let inner = self.inner.read().await;
        Ok(inner
            .undone
            .get(&remote_chain)
            .map(|seqs| {
                seqs.iter()
                    .filter(|(_, status)| **status == SequenceStatus::Undone)
                    .map(|(seq, _)| *seq)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_sequence_executing(&self, remote_chain: ChainId, sequence: u64) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let status = inner
            .undone
            .entry(remote_chain)
            .or_default()
            .entry(sequence)
            .or_insert(SequenceStatus::Undone);
        if *status != SequenceStatus::Undone {
            return Ok(false);
        }
        *status = SequenceStatus::Executing;
        Ok(true)
    }
}

#[async_trait]
impl EventIndexStore for MemoryStore {
    async fn next_event_index(&self, contract_address: &str) -> Result<Option<u64>> {
        let inner = self.inner.read().await;
        Ok(inner.event_indexes.get(contract_address).copied())
    }

    async fn set_next_event_index(&self, contract_address: &str, next_index: u64) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .event_indexes
            .insert(contract_address.to_string(), next_index);
        Ok(())
    }
}
