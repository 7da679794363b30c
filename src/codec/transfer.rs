//! Token transfer payload
//!
//! Transfer (payload id 1):
//! ```text
//! 1 | amount u256 | token_id [32] | token_chain u16 | to_address [32] | to_chain u16 | fee u256
//! ```
//!
//! Undone transfer governance payload (action 3):
//! ```text
//! module [32] | 3 | sequence u64 | wrapper_id [32] | to_address [32] | amount u256 | fee u256
//! ```

use alloy::primitives::U256;

use super::governance::TOKEN_BRIDGE_MODULE;
use super::Reader;
use crate::error::RecoveryError;
use crate::types::{Byte32, ChainId};

pub const TRANSFER_PAYLOAD_ID: u8 = 1;
pub const UNDONE_TRANSFER_ACTION: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub amount: U256,
    pub token_id: Byte32,
    pub token_chain_id: ChainId,
    pub to_address: Byte32,
    pub to_chain_id: ChainId,
    pub fee: U256,
}

impl Transfer {
    /// Decode a transfer payload. Bytes after the fee are ignored.
    pub fn decode(data: &[u8]) -> Result<Self, RecoveryError> {
        let mut r = Reader::new("transfer", data);

        let payload_id = r.u8("payload id")?;
        if payload_id != TRANSFER_PAYLOAD_ID {
            return Err(RecoveryError::decode(
                "transfer",
                format!(
                    "invalid payload id {}, expect transfer vaa ({})",
                    payload_id, TRANSFER_PAYLOAD_ID
                ),
            ));
        }

        let amount = U256::from_be_bytes(r.array::<32>("amount")?);
        let token_id = r.byte32("token_id")?;
        let token_chain_id = r.chain_id("token_chain_id")?;
        let to_address = r.byte32("to_address")?;
        let to_chain_id = r.chain_id("to_chain_id")?;
        let fee = U256::from_be_bytes(r.array::<32>("fee")?);

        Ok(Self {
            amount,
            token_id,
            token_chain_id,
            to_address,
            to_chain_id,
            fee,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(133);
        buf.push(TRANSFER_PAYLOAD_ID);
        buf.extend_from_slice(&self.amount.to_be_bytes::<32>());
        buf.extend_from_slice(self.token_id.as_bytes());
        buf.extend_from_slice(&self.token_chain_id.to_be_bytes());
        buf.extend_from_slice(self.to_address.as_bytes());
        buf.extend_from_slice(&self.to_chain_id.to_be_bytes());
        buf.extend_from_slice(&self.fee.to_be_bytes::<32>());
        buf
    }
}

/// Compensating payload that returns a stalled transfer to its recipient via
/// the local wrapper of the transferred token
pub fn undone_transfer_payload(transfer: &Transfer, wrapper_id: &Byte32, sequence: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(169);
    buf.extend_from_slice(&TOKEN_BRIDGE_MODULE);
    buf.push(UNDONE_TRANSFER_ACTION);
    buf.extend_from_slice(&sequence.to_be_bytes());
    buf.extend_from_slice(wrapper_id.as_bytes());
    buf.extend_from_slice(transfer.to_address.as_bytes());
    buf.extend_from_slice(&transfer.amount.to_be_bytes::<32>());
    buf.extend_from_slice(&transfer.fee.to_be_bytes::<32>());
    buf
}
