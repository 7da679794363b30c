//! Durable state used by the watcher and the recovery operations
//!
//! Traits are the seams; [`postgres::PgStore`] is the production backend and
//! [`memory::MemoryStore`] backs tests and local runs.

use async_trait::async_trait;
use eyre::Result;

use crate::types::{Byte32, ChainId, Emitter, SequenceGap, VaaId};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Signed VAAs that passed verification
#[async_trait]
pub trait VaaStore: Send + Sync {
    async fn get_signed_vaa(&self, id: &VaaId) -> Result<Option<Vec<u8>>>;

    /// Idempotent; storing the same coordinate twice keeps the first bytes
    async fn store_signed_vaa(&self, id: &VaaId, vaa_bytes: &[u8]) -> Result<()>;

    /// Missing sequences between the first and last stored sequence
    async fn find_emitter_sequence_gap(&self, emitter: &Emitter) -> Result<SequenceGap>;
}

/// Token wrapper registry
#[async_trait]
pub trait TokenRegistry: Send + Sync {
    /// Wrapper on the local chain for a token originating on `remote_chain`
    async fn local_token_wrapper(
        &self,
        token_id: &Byte32,
        remote_chain: ChainId,
    ) -> Result<Option<Byte32>>;

    /// Wrapper of a local token
    async fn remote_token_wrapper(&self, token_id: &Byte32) -> Result<Option<Byte32>>;

    async fn add_local_token_wrapper(
        &self,
        token_id: &Byte32,
        remote_chain: ChainId,
        wrapper_id: &Byte32,
    ) -> Result<()>;

    async fn add_remote_token_wrapper(&self, token_id: &Byte32, wrapper_id: &Byte32)
        -> Result<()>;
}

/// Undone sequences and their execution marker
#[async_trait]
pub trait UndoneSequenceStore: Send + Sync {
    async fn add_undone_sequences(&self, remote_chain: ChainId, sequences: &[u64]) -> Result<()>;

    /// Sequences still in the undone state, ascending
    async fn get_undone_sequences(&self, remote_chain: ChainId) -> Result<Vec<u64>>;

    /// Atomically mark a sequence as executing. Returns false when it was
    /// already executing or done.
    async fn set_sequence_executing(&self, remote_chain: ChainId, sequence: u64) -> Result<bool>;
}

/// Per-contract watcher progress
#[async_trait]
pub trait EventIndexStore: Send + Sync {
    /// None until the first cycle has been persisted
    async fn next_event_index(&self, contract_address: &str) -> Result<Option<u64>>;

    async fn set_next_event_index(&self, contract_address: &str, next_index: u64) -> Result<()>;
}
