//! Guardian Recovery - Library interface
//!
//! Confirmation and recovery subsystem of an Alephium guardian node:
//!
//! - **Chain Event Watcher** - turns reorgable contract events into a confirmed,
//!   ordered, exactly-once stream ([`alephium`])
//! - **Sequence Gap Detector / Peer Backfill** - finds holes in the locally
//!   observed VAA sequence and fills them from peer guardians ([`recovery`])
//! - **Undone-Transfer Reconstructor** - recovers a stalled transfer and emits a
//!   compensating governance message ([`recovery::reconstruct`])
//! - **Codec** - VAA envelope, transfer payload and governance bodies ([`codec`])
//!
//! Modules are re-exported for the binary and for integration tests.

pub mod admin;
pub mod alephium;
pub mod api;
pub mod bounded_cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod governance;
pub mod hash;
pub mod ingest;
pub mod metrics;
pub mod recovery;
pub mod store;
pub mod types;

pub use error::{ErrorKind, RecoveryError, WatcherError};
pub use types::{Byte32, ChainId, Emitter, SequenceGap, SequenceStatus, VaaId};
