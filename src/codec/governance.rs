//! Governance bodies and VAA constructors
//!
//! Every governance payload starts with a 32-byte module tag (the module name
//! left-padded with zeros) and a one-byte action.
//!
//! | Module      | Action | Body                                            |
//! |-------------|--------|-------------------------------------------------|
//! | Core        | 1      | chain u16 \| new_contract [32]                  |
//! | Core        | 2      | chain u16 (0) \| new_index u32 \| n u8 \| keys  |
//! | TokenBridge | 1      | chain u16 (0) \| emitter_chain u16 \| emitter [32] |
//! | TokenBridge | 2      | target_chain u16 \| new_contract [32]           |
//! | TokenBridge | 3      | undone transfer, see [`super::transfer`]        |

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use super::vaa::{create_governance_vaa, Vaa};
use super::Reader;
use crate::error::RecoveryError;
use crate::types::{Byte32, ChainId};

/// Maximum number of guardians in a set
pub const MAX_GUARDIAN_COUNT: usize = 19;

pub const CORE_MODULE: [u8; 32] = module_tag(b"Core");
pub const TOKEN_BRIDGE_MODULE: [u8; 32] = module_tag(b"TokenBridge");

pub const ACTION_CONTRACT_UPGRADE: u8 = 1;
pub const ACTION_GUARDIAN_SET_UPDATE: u8 = 2;
pub const ACTION_REGISTER_CHAIN: u8 = 1;
pub const ACTION_UPGRADE_CONTRACT: u8 = 2;

/// Left-pad a module name to 32 bytes. Names longer than 32 bytes keep their
/// trailing 32 bytes.
pub const fn module_tag(name: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let len = if name.len() > 32 { 32 } else { name.len() };
    let skip = name.len() - len;
    let mut i = 0;
    while i < len {
        out[32 - len + i] = name[skip + i];
        i += 1;
    }
    out
}

// ============================================================================
// Admin requests
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianKey {
    /// 20-byte hex address
    pub pubkey: String,
    /// Operator-facing label, echoed in validation errors
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianSetUpdate {
    pub guardians: Vec<GuardianKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractUpgrade {
    pub chain_id: u32,
    pub new_contract: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeRegisterChain {
    pub module: String,
    pub chain_id: u32,
    pub emitter_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeUpgradeContract {
    pub module: String,
    pub target_chain_id: u32,
    pub new_contract: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoneTransfer {
    pub consistency_level: u8,
    #[serde(with = "super::hex_bytes")]
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GovernanceRequest {
    GuardianSet(GuardianSetUpdate),
    ContractUpgrade(ContractUpgrade),
    BridgeRegisterChain(BridgeRegisterChain),
    BridgeContractUpgrade(BridgeUpgradeContract),
    UndoneTransfer(UndoneTransfer),
}

/// A governance message as submitted for injection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceMessage {
    pub sequence: u64,
    pub nonce: u32,
    pub request: GovernanceRequest,
}

impl GovernanceMessage {
    /// Build the unsigned governance VAA for this message
    pub fn to_vaa(&self, guardian_set_index: u32) -> Result<Vaa, RecoveryError> {
        let (nonce, sequence) = (self.nonce, self.sequence);
        match &self.request {
            GovernanceRequest::GuardianSet(req) => {
                guardian_set_update_vaa(req, guardian_set_index, nonce, sequence)
            }
            GovernanceRequest::ContractUpgrade(req) => {
                contract_upgrade_vaa(req, guardian_set_index, nonce, sequence)
            }
            GovernanceRequest::BridgeRegisterChain(req) => {
                register_chain_vaa(req, guardian_set_index, nonce, sequence)
            }
            GovernanceRequest::BridgeContractUpgrade(req) => {
                bridge_upgrade_contract_vaa(req, guardian_set_index, nonce, sequence)
            }
            GovernanceRequest::UndoneTransfer(req) => Ok(undone_transfer_vaa(
                req,
                guardian_set_index,
                nonce,
                sequence,
            )),
        }
    }
}

// ============================================================================
// Bodies
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyGuardianSetUpdate {
    pub keys: Vec<Address>,
    pub new_index: u32,
}

impl BodyGuardianSetUpdate {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 + 1 + 2 + 4 + 1 + self.keys.len() * 20);
        buf.extend_from_slice(&CORE_MODULE);
        buf.push(ACTION_GUARDIAN_SET_UPDATE);
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&self.new_index.to_be_bytes());
        buf.push(self.keys.len() as u8);
        for key in &self.keys {
            buf.extend_from_slice(key.as_slice());
        }
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, RecoveryError> {
        let mut r = Reader::new("guardian set update", data);
        let module = r.array::<32>("module")?;
        if module != CORE_MODULE {
            return Err(RecoveryError::decode(
                "guardian set update",
                "module is not Core",
            ));
        }
        let action = r.u8("action")?;
        if action != ACTION_GUARDIAN_SET_UPDATE {
            return Err(RecoveryError::decode(
                "guardian set update",
                format!("unexpected action {}", action),
            ));
        }
        r.u16("chain")?;
        let new_index = r.u32("new_index")?;
        let count = r.u8("key count")?;
        let mut keys = Vec::with_capacity(count as usize);
        for _ in 0..count {
            keys.push(Address::from(r.array::<20>("guardian key")?));
        }
        Ok(Self { keys, new_index })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyContractUpgrade {
    pub chain_id: ChainId,
    pub new_contract: Byte32,
}

impl BodyContractUpgrade {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(67);
        buf.extend_from_slice(&CORE_MODULE);
        buf.push(ACTION_CONTRACT_UPGRADE);
        buf.extend_from_slice(&self.chain_id.to_be_bytes());
        buf.extend_from_slice(self.new_contract.as_bytes());
        buf
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyTokenBridgeRegisterChain {
    pub module: String,
    pub chain_id: ChainId,
    pub emitter_address: Byte32,
}

impl BodyTokenBridgeRegisterChain {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(69);
        buf.extend_from_slice(&module_tag(self.module.as_bytes()));
        buf.push(ACTION_REGISTER_CHAIN);
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&self.chain_id.to_be_bytes());
        buf.extend_from_slice(self.emitter_address.as_bytes());
        buf
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyTokenBridgeUpgradeContract {
    pub module: String,
    pub target_chain_id: ChainId,
    pub new_contract: Byte32,
}

impl BodyTokenBridgeUpgradeContract {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(67);
        buf.extend_from_slice(&module_tag(self.module.as_bytes()));
        buf.push(ACTION_UPGRADE_CONTRACT);
        buf.extend_from_slice(&self.target_chain_id.to_be_bytes());
        buf.extend_from_slice(self.new_contract.as_bytes());
        buf
    }
}

// ============================================================================
// Constructors
// ============================================================================

fn parse_guardian_address(pubkey: &str) -> Option<Address> {
    let hex_str = pubkey.strip_prefix("0x").unwrap_or(pubkey);
    if hex_str.len() != 40 {
        return None;
    }
    let bytes = hex::decode(hex_str).ok()?;
    Some(Address::from_slice(&bytes))
}

fn parse_module(module: &str) -> Result<String, RecoveryError> {
    if module.is_empty() || module.len() > 32 {
        return Err(RecoveryError::validation(format!(
            "invalid module name {:?} (expected 1 to 32 bytes)",
            module
        )));
    }
    Ok(module.to_string())
}

/// Guardian set update; the new set index is the current one plus one
pub fn guardian_set_update_vaa(
    req: &GuardianSetUpdate,
    guardian_set_index: u32,
    nonce: u32,
    sequence: u64,
) -> Result<Vaa, RecoveryError> {
    if req.guardians.is_empty() {
        return Err(RecoveryError::validation("empty guardian set specified"));
    }
    if req.guardians.len() > MAX_GUARDIAN_COUNT {
        return Err(RecoveryError::validation(format!(
            "too many guardians - {}, maximum is {}",
            req.guardians.len(),
            MAX_GUARDIAN_COUNT
        )));
    }

    let mut keys: Vec<Address> = Vec::with_capacity(req.guardians.len());
    for (i, guardian) in req.guardians.iter().enumerate() {
        let key = parse_guardian_address(&guardian.pubkey).ok_or_else(|| {
            RecoveryError::validation(format!(
                "invalid pubkey format at index {} ({})",
                i, guardian.name
            ))
        })?;
        if let Some(j) = keys.iter().position(|k| *k == key) {
            return Err(RecoveryError::validation(format!(
                "duplicate pubkey at index {} (duplicate of {}): {}",
                i, j, guardian.name
            )));
        }
        keys.push(key);
    }

    let new_index = guardian_set_index
        .checked_add(1)
        .ok_or_else(|| RecoveryError::validation("guardian set index overflow"))?;
    let body = BodyGuardianSetUpdate { keys, new_index };
    Ok(create_governance_vaa(
        nonce,
        sequence,
        guardian_set_index,
        body.serialize(),
    ))
}

pub fn contract_upgrade_vaa(
    req: &ContractUpgrade,
    guardian_set_index: u32,
    nonce: u32,
    sequence: u64,
) -> Result<Vaa, RecoveryError> {
    let bytes = hex::decode(&req.new_contract).map_err(|_| {
        RecoveryError::validation("invalid new contract address encoding (expected hex)")
    })?;
    let new_contract = Byte32::from_slice(&bytes)
        .map_err(|_| RecoveryError::validation("invalid new_contract address"))?;
    let chain_id = ChainId::try_from_u32(req.chain_id)
        .ok_or_else(|| RecoveryError::validation("invalid chain_id"))?;

    let body = BodyContractUpgrade {
        chain_id,
        new_contract,
    };
    Ok(create_governance_vaa(
        nonce,
        sequence,
        guardian_set_index,
        body.serialize(),
    ))
}

pub fn register_chain_vaa(
    req: &BridgeRegisterChain,
    guardian_set_index: u32,
    nonce: u32,
    sequence: u64,
) -> Result<Vaa, RecoveryError> {
    let chain_id = ChainId::try_from_u32(req.chain_id)
        .ok_or_else(|| RecoveryError::validation("invalid chain_id"))?;
    let bytes = hex::decode(&req.emitter_address).map_err(|_| {
        RecoveryError::validation("invalid emitter address encoding (expected hex)")
    })?;
    let emitter_address = Byte32::from_slice(&bytes)
        .map_err(|_| RecoveryError::validation("invalid emitter address (expected 32 bytes)"))?;

    let body = BodyTokenBridgeRegisterChain {
        module: parse_module(&req.module)?,
        chain_id,
        emitter_address,
    };
    Ok(create_governance_vaa(
        nonce,
        sequence,
        guardian_set_index,
        body.serialize(),
    ))
}

pub fn bridge_upgrade_contract_vaa(
    req: &BridgeUpgradeContract,
    guardian_set_index: u32,
    nonce: u32,
    sequence: u64,
) -> Result<Vaa, RecoveryError> {
    let target_chain_id = ChainId::try_from_u32(req.target_chain_id)
        .ok_or_else(|| RecoveryError::validation("invalid target_chain_id"))?;
    let bytes = hex::decode(&req.new_contract).map_err(|_| {
        RecoveryError::validation("invalid new contract address (expected hex)")
    })?;
    let new_contract = Byte32::from_slice(&bytes).map_err(|_| {
        RecoveryError::validation("invalid new contract address (expected 32 bytes)")
    })?;

    let body = BodyTokenBridgeUpgradeContract {
        module: parse_module(&req.module)?,
        target_chain_id,
        new_contract,
    };
    Ok(create_governance_vaa(
        nonce,
        sequence,
        guardian_set_index,
        body.serialize(),
    ))
}

/// The payload was built by the reconstructor; only the consistency level of
/// the original transfer is carried over
pub fn undone_transfer_vaa(
    req: &UndoneTransfer,
    guardian_set_index: u32,
    nonce: u32,
    sequence: u64,
) -> Vaa {
    let mut vaa = create_governance_vaa(nonce, sequence, guardian_set_index, req.payload.clone());
    vaa.consistency_level = req.consistency_level;
    vaa
}
