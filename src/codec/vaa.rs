//! Signed VAA envelope
//!
//! ```text
//! header: version u8 | guardian_set_index u32 | sig_count u8 | sig_count * (index u8 | sig [65])
//! body:   timestamp u32 | nonce u32 | emitter_chain u16 | emitter_address [32]
//!         | sequence u64 | consistency_level u8 | payload ..
//! ```
//!
//! Signatures are over keccak256(keccak256(body)).

use super::Reader;
use crate::error::RecoveryError;
use crate::hash::{keccak256, signing_digest};
use crate::types::{Byte32, ChainId, VaaId};

pub const VAA_VERSION: u8 = 1;

/// Signature length: r (32) | s (32) | recovery id (1)
pub const SIGNATURE_LENGTH: usize = 65;

/// Consistency level stamped on governance VAAs
pub const GOVERNANCE_CONSISTENCY_LEVEL: u8 = 32;

/// Governance emitter address: 31 zero bytes followed by 0x04
pub const GOVERNANCE_EMITTER: Byte32 = {
    let mut addr = [0u8; 32];
    addr[31] = 4;
    Byte32(addr)
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardianSignature {
    pub index: u8,
    pub signature: [u8; SIGNATURE_LENGTH],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vaa {
    pub version: u8,
    pub guardian_set_index: u32,
    pub signatures: Vec<GuardianSignature>,
    pub timestamp: u32,
    pub nonce: u32,
    pub emitter_chain: ChainId,
    pub emitter_address: Byte32,
    pub sequence: u64,
    pub consistency_level: u8,
    pub payload: Vec<u8>,
}

impl Vaa {
    /// Parse a signed VAA
    pub fn parse(data: &[u8]) -> Result<Self, RecoveryError> {
        let mut r = Reader::new("vaa", data);

        let version = r.u8("version")?;
        if version != VAA_VERSION {
            return Err(RecoveryError::decode(
                "vaa",
                format!("unsupported VAA version: {}", version),
            ));
        }
        let guardian_set_index = r.u32("guardian_set_index")?;

        let sig_count = r.u8("signature count")?;
        let mut signatures = Vec::with_capacity(sig_count as usize);
        for _ in 0..sig_count {
            let index = r.u8("signature index")?;
            let signature = r.array::<SIGNATURE_LENGTH>("signature")?;
            signatures.push(GuardianSignature { index, signature });
        }

        let timestamp = r.u32("timestamp")?;
        let nonce = r.u32("nonce")?;
        let emitter_chain = r.chain_id("emitter_chain")?;
        let emitter_address = r.byte32("emitter_address")?;
        let sequence = r.u64("sequence")?;
        let consistency_level = r.u8("consistency_level")?;
        let payload = r.rest().to_vec();

        Ok(Self {
            version,
            guardian_set_index,
            signatures,
            timestamp,
            nonce,
            emitter_chain,
            emitter_address,
            sequence,
            consistency_level,
            payload,
        })
    }

    /// Body bytes covered by guardian signatures
    pub fn body(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(51 + self.payload.len());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        buf.extend_from_slice(&self.emitter_chain.to_be_bytes());
        buf.extend_from_slice(self.emitter_address.as_bytes());
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.push(self.consistency_level);
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn serialize(&self) -> Vec<u8> {
        let body = self.body();
        let mut buf =
            Vec::with_capacity(6 + self.signatures.len() * (1 + SIGNATURE_LENGTH) + body.len());
        buf.push(self.version);
        buf.extend_from_slice(&self.guardian_set_index.to_be_bytes());
        buf.push(self.signatures.len() as u8);
        for sig in &self.signatures {
            buf.push(sig.index);
            buf.extend_from_slice(&sig.signature);
        }
        buf.extend_from_slice(&body);
        buf
    }

    /// keccak256(keccak256(body)), what guardians sign
    pub fn signing_digest(&self) -> [u8; 32] {
        signing_digest(&self.body())
    }

    /// keccak256(body), reported to admin callers after injection
    pub fn digest(&self) -> [u8; 32] {
        keccak256(&self.body())
    }

    pub fn id(&self) -> VaaId {
        VaaId {
            emitter_chain: self.emitter_chain,
            emitter_address: self.emitter_address,
            sequence: self.sequence,
        }
    }
}

/// Unsigned governance VAA: zero timestamp, governance emitter, fixed
/// consistency level
pub fn create_governance_vaa(
    nonce: u32,
    sequence: u64,
    guardian_set_index: u32,
    payload: Vec<u8>,
) -> Vaa {
    Vaa {
        version: VAA_VERSION,
        guardian_set_index,
        signatures: Vec::new(),
        timestamp: 0,
        nonce,
        emitter_chain: ChainId::GOVERNANCE,
        emitter_address: GOVERNANCE_EMITTER,
        sequence,
        consistency_level: GOVERNANCE_CONSISTENCY_LEVEL,
        payload,
    }
}
