//! Common types for guardian recovery
//!
//! Chain identifiers, 32-byte addresses, the VAA coordinate used both as a
//! storage key and as the unit of gap detection, and the undone-sequence status
//! persisted by the storage layer.

use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Chain ID (2 bytes)
// ============================================================================

/// Wormhole chain id
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct ChainId(pub u16);

impl ChainId {
    pub const SOLANA: ChainId = ChainId(1);
    pub const ETHEREUM: ChainId = ChainId(2);
    pub const ALEPHIUM: ChainId = ChainId(255);

    /// Governance VAAs are always emitted from the Solana chain id
    pub const GOVERNANCE: ChainId = ChainId::SOLANA;

    /// Convert a wide chain id from an admin request, rejecting values
    /// outside the 16-bit range
    pub fn try_from_u32(id: u32) -> Option<Self> {
        u16::try_from(id).ok().map(ChainId)
    }

    pub fn to_u16(self) -> u16 {
        self.0
    }

    pub fn to_be_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for ChainId {
    fn from(id: u16) -> Self {
        ChainId(id)
    }
}

// ============================================================================
// Byte32
// ============================================================================

/// 32-byte value: emitter addresses, token ids, wrapper ids, recipients
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Byte32(pub [u8; 32]);

impl Byte32 {
    pub const ZERO: Byte32 = Byte32([0u8; 32]);

    /// Parse from hex string (with or without 0x prefix), exactly 32 bytes
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex)?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(eyre!("expected 32 bytes, got {}", bytes.len()));
        }
        let mut result = [0u8; 32];
        result.copy_from_slice(bytes);
        Ok(Byte32(result))
    }

    /// Lowercase hex without prefix, the form used in peer URLs and
    /// missing-message coordinates
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Byte32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Byte32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Byte32({})", self.to_hex())
    }
}

impl From<[u8; 32]> for Byte32 {
    fn from(bytes: [u8; 32]) -> Self {
        Byte32(bytes)
    }
}

// ============================================================================
// Emitter / VAA coordinates
// ============================================================================

/// The (chain, address) pair that originates a sequence of messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Emitter {
    pub chain: ChainId,
    pub address: Byte32,
}

impl Emitter {
    pub fn new(chain: ChainId, address: Byte32) -> Self {
        Self { chain, address }
    }

    pub fn vaa_id(&self, sequence: u64) -> VaaId {
        VaaId {
            emitter_chain: self.chain,
            emitter_address: self.address,
            sequence,
        }
    }
}

/// Unique coordinate of a signed message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VaaId {
    pub emitter_chain: ChainId,
    pub emitter_address: Byte32,
    pub sequence: u64,
}

impl VaaId {
    pub fn emitter(&self) -> Emitter {
        Emitter::new(self.emitter_chain, self.emitter_address)
    }
}

impl fmt::Display for VaaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.emitter_chain, self.emitter_address, self.sequence
        )
    }
}

// ============================================================================
// Sequence gaps
// ============================================================================

/// Sequence numbers missing between the first and last stored sequence of an
/// emitter. Recomputed on every detection call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceGap {
    pub missing: Vec<u64>,
    pub first: u64,
    pub last: u64,
}

impl SequenceGap {
    /// Build a gap report from the stored sequences of one emitter.
    /// Input order and duplicates don't matter.
    pub fn from_sequences(stored: &[u64]) -> Self {
        let mut sorted = stored.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let (first, last) = match (sorted.first(), sorted.last()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => return Self::default(),
        };

        let mut missing = Vec::new();
        let mut expected = first;
        for seq in sorted {
            while expected < seq {
                missing.push(expected);
                expected += 1;
            }
            match seq.checked_add(1) {
                Some(next) => expected = next,
                None => break,
            }
        }

        Self {
            missing,
            first,
            last,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }
}

// ============================================================================
// Undone sequence status
// ============================================================================

/// Lifecycle of a sequence the local token bridge recorded as undone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceStatus {
    Undone,
    Executing,
}

impl SequenceStatus {
    /// Get the status as a lowercase string
    pub fn as_str(&self) -> &'static str {
        match self {
            SequenceStatus::Undone => "undone",
            SequenceStatus::Executing => "executing",
        }
    }
}

impl fmt::Display for SequenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
