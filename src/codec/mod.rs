//! Binary payload codec
//!
//! All integers are big-endian and all addresses and ids are fixed 32 bytes.
//!
//! - [`vaa`] - signed VAA envelope and signing digest
//! - [`transfer`] - token transfer payload and the undone-transfer payload
//! - [`governance`] - governance bodies and their VAA constructors

pub mod governance;
pub mod transfer;
pub mod vaa;

pub use governance::{GovernanceMessage, GovernanceRequest};
pub use transfer::Transfer;
pub use vaa::Vaa;

use crate::error::RecoveryError;
use crate::types::{Byte32, ChainId};

/// Serde adapter for byte payloads carried as hex strings in JSON
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

/// Sequential big-endian reader that reports short reads as decode errors
pub(crate) struct Reader<'a> {
    what: &'static str,
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(what: &'static str, data: &'a [u8]) -> Self {
        Self { what, data, pos: 0 }
    }

    fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8], RecoveryError> {
        let end = self.pos + len;
        if end > self.data.len() {
            return Err(RecoveryError::decode(
                self.what,
                format!(
                    "truncated at {}: need {} bytes at offset {}, have {}",
                    field,
                    len,
                    self.pos,
                    self.data.len() - self.pos
                ),
            ));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn array<const N: usize>(&mut self, field: &str) -> Result<[u8; N], RecoveryError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self, field: &str) -> Result<u8, RecoveryError> {
        Ok(self.take(1, field)?[0])
    }

    pub(crate) fn u16(&mut self, field: &str) -> Result<u16, RecoveryError> {
        Ok(u16::from_be_bytes(self.array(field)?))
    }

    pub(crate) fn u32(&mut self, field: &str) -> Result<u32, RecoveryError> {
        Ok(u32::from_be_bytes(self.array(field)?))
    }

    pub(crate) fn u64(&mut self, field: &str) -> Result<u64, RecoveryError> {
        Ok(u64::from_be_bytes(self.array(field)?))
    }

    pub(crate) fn chain_id(&mut self, field: &str) -> Result<ChainId, RecoveryError> {
        Ok(ChainId(self.u16(field)?))
    }

    pub(crate) fn byte32(&mut self, field: &str) -> Result<Byte32, RecoveryError> {
        Ok(Byte32(self.array(field)?))
    }

    /// Everything after the current position
    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }
}
