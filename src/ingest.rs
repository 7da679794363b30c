//! Signed VAA ingestion
//!
//! Live gossip and peer backfill push [`SignedVaaWithQuorum`] messages into
//! one bounded queue. The [`IngestWorker`] drains it, verifies guardian
//! signatures against the current guardian set and stores what passes. The
//! submitter never learns the outcome; callers that need the bytes poll
//! storage afterwards.

use alloy::primitives::Address;
use async_trait::async_trait;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bounded_cache::BoundedHashCache;
use crate::codec::vaa::{GuardianSignature, Vaa};
use crate::error::RecoveryError;
use crate::hash::keccak256;
use crate::metrics;
use crate::store::VaaStore;

/// A signed VAA awaiting verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedVaaWithQuorum {
    pub vaa: Vec<u8>,
}

/// Entry point of the ingestion path
#[async_trait]
pub trait SignedVaaSink: Send + Sync {
    /// Waits for queue capacity
    async fn submit(&self, message: SignedVaaWithQuorum) -> Result<(), RecoveryError>;
}

#[async_trait]
impl SignedVaaSink for mpsc::Sender<SignedVaaWithQuorum> {
    async fn submit(&self, message: SignedVaaWithQuorum) -> Result<(), RecoveryError> {
        self.send(message)
            .await
            .map_err(|_| RecoveryError::Internal("signed VAA ingestion queue is closed".into()))
    }
}

/// Guardian set the worker verifies against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardianSet {
    pub index: u32,
    pub keys: Vec<Address>,
}

impl GuardianSet {
    pub fn new(index: u32, keys: Vec<Address>) -> Self {
        Self { index, keys }
    }

    /// More than two thirds of the set
    pub fn quorum(&self) -> usize {
        self.keys.len() * 2 / 3 + 1
    }
}

/// Ethereum-style address of the key that produced `signature` over `digest`
pub fn recover_signer(digest: &[u8; 32], signature: &GuardianSignature) -> Result<Address, RecoveryError> {
    let sig = Signature::from_slice(&signature.signature[..64])
        .map_err(|e| RecoveryError::validation(format!("malformed signature: {}", e)))?;
    let recovery_id = RecoveryId::from_byte(signature.signature[64]).ok_or_else(|| {
        RecoveryError::validation(format!(
            "invalid recovery id {}",
            signature.signature[64]
        ))
    })?;

    let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
        .map_err(|e| RecoveryError::validation(format!("signature recovery failed: {}", e)))?;
    let point = PublicKey::from(&key).to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Ok(Address::from_slice(&hash[12..]))
}

/// Check that a quorum of distinct guardians of `set` signed the VAA
pub fn verify_signatures(vaa: &Vaa, set: &GuardianSet) -> Result<(), RecoveryError> {
    if vaa.guardian_set_index != set.index {
        return Err(RecoveryError::validation(format!(
            "guardian set index {} does not match current set {}",
            vaa.guardian_set_index, set.index
        )));
    }
    if vaa.signatures.len() < set.quorum() {
        return Err(RecoveryError::validation(format!(
            "{} signatures, quorum is {}",
            vaa.signatures.len(),
            set.quorum()
        )));
    }

    let digest = vaa.signing_digest();
    let mut last_index: Option<u8> = None;
    for sig in &vaa.signatures {
        if last_index.is_some_and(|last| sig.index <= last) {
            return Err(RecoveryError::validation(
                "guardian indices must be strictly increasing",
            ));
        }
        last_index = Some(sig.index);

        let expected = set.keys.get(sig.index as usize).ok_or_else(|| {
            RecoveryError::validation(format!("guardian index {} out of range", sig.index))
        })?;
        let signer = recover_signer(&digest, sig)?;
        if signer != *expected {
            return Err(RecoveryError::validation(format!(
                "signature {} recovers to {}, expected {}",
                sig.index, signer, expected
            )));
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored,
    Duplicate,
}

pub struct IngestWorker {
    store: Arc<dyn VaaStore>,
    guardian_set: GuardianSet,
    seen: BoundedHashCache,
}

impl IngestWorker {
    pub fn new(store: Arc<dyn VaaStore>, guardian_set: GuardianSet, seen: BoundedHashCache) -> Self {
        Self {
            store,
            guardian_set,
            seen,
        }
    }

    /// Verify and store one message
    pub async fn process(
        &mut self,
        message: &SignedVaaWithQuorum,
    ) -> Result<IngestOutcome, RecoveryError> {
        let vaa = Vaa::parse(&message.vaa)?;
        let digest = vaa.signing_digest();
        if self.seen.contains(&digest) {
            return Ok(IngestOutcome::Duplicate);
        }

        verify_signatures(&vaa, &self.guardian_set)?;
        self.store.store_signed_vaa(&vaa.id(), &message.vaa).await?;
        self.seen.insert(digest);
        Ok(IngestOutcome::Stored)
    }

    pub async fn run(
        mut self,
        mut receiver: mpsc::Receiver<SignedVaaWithQuorum>,
        cancel: CancellationToken,
    ) {
        info!(
            guardian_set_index = self.guardian_set.index,
            guardians = self.guardian_set.keys.len(),
            "Starting signed VAA ingest worker"
        );

        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = receiver.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            match self.process(&message).await {
                Ok(IngestOutcome::Stored) => {
                    metrics::record_vaa_ingested("stored");
                    debug!(num_bytes = message.vaa.len(), "Stored signed VAA");
                }
                Ok(IngestOutcome::Duplicate) => {
                    metrics::record_vaa_ingested("duplicate");
                }
                Err(e) => {
                    metrics::record_vaa_ingested("rejected");
                    warn!(error = %e, "Rejected signed VAA");
                }
            }
        }

        info!("Signed VAA ingest worker stopped");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::codec::vaa::{GuardianSignature, SIGNATURE_LENGTH};
    use k256::ecdsa::SigningKey;

    pub fn guardian_keys(n: usize) -> Vec<SigningKey> {
        (1..=n)
            .map(|i| {
                let mut secret = [0u8; 32];
                secret[31] = i as u8;
                secret[0] = 0x42;
                SigningKey::from_bytes(&secret.into()).unwrap()
            })
            .collect()
    }

    pub fn address_of(key: &SigningKey) -> Address {
        let point = PublicKey::from(key.verifying_key()).to_encoded_point(false);
        Address::from_slice(&keccak256(&point.as_bytes()[1..])[12..])
    }

    pub fn sign(vaa: &mut Vaa, keys: &[SigningKey]) {
        let digest = vaa.signing_digest();
        vaa.signatures = keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                let (sig, recid) = key.sign_prehash_recoverable(&digest).unwrap();
                let mut signature = [0u8; SIGNATURE_LENGTH];
                signature[..64].copy_from_slice(&sig.to_bytes());
                signature[64] = recid.to_byte();
                GuardianSignature {
                    index: i as u8,
                    signature,
                }
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::codec::vaa::VAA_VERSION;
    use crate::store::MemoryStore;
    use crate::types::{Byte32, ChainId};
    use std::time::Duration;

    fn unsigned_vaa(sequence: u64) -> Vaa {
        Vaa {
            version: VAA_VERSION,
            guardian_set_index: 0,
            signatures: vec![],
            timestamp: 1,
            nonce: 2,
            emitter_chain: ChainId::ETHEREUM,
            emitter_address: Byte32([5u8; 32]),
            sequence,
            consistency_level: 1,
            payload: vec![1, 2, 3],
        }
    }

    fn worker(store: Arc<MemoryStore>, n: usize) -> IngestWorker {
        let keys = guardian_keys(n);
        let set = GuardianSet::new(0, keys.iter().map(address_of).collect());
        IngestWorker::new(store, set, BoundedHashCache::new(100, Duration::from_secs(60)))
    }

    #[test]
    fn test_quorum() {
        assert_eq!(GuardianSet::new(0, vec![Address::ZERO; 1]).quorum(), 1);
        assert_eq!(GuardianSet::new(0, vec![Address::ZERO; 3]).quorum(), 3);
        assert_eq!(GuardianSet::new(0, vec![Address::ZERO; 19]).quorum(), 13);
    }

    #[test]
    fn test_recover_signer() {
        let keys = guardian_keys(1);
        let mut vaa = unsigned_vaa(1);
        sign(&mut vaa, &keys);
        let signer = recover_signer(&vaa.signing_digest(), &vaa.signatures[0]).unwrap();
        assert_eq!(signer, address_of(&keys[0]));
    }

    #[tokio::test]
    async fn test_process_stores_verified_vaa() {
        let store = Arc::new(MemoryStore::new());
        let mut worker = worker(store.clone(), 3);
        let mut vaa = unsigned_vaa(9);
        sign(&mut vaa, &guardian_keys(3));
        let message = SignedVaaWithQuorum {
            vaa: vaa.serialize(),
        };

        assert_eq!(worker.process(&message).await.unwrap(), IngestOutcome::Stored);
        assert_eq!(
            worker.process(&message).await.unwrap(),
            IngestOutcome::Duplicate
        );
        assert_eq!(
            store.get_signed_vaa(&vaa.id()).await.unwrap(),
            Some(message.vaa)
        );
    }

    #[tokio::test]
    async fn test_process_rejects_missing_quorum() {
        let store = Arc::new(MemoryStore::new());
        let mut worker = worker(store.clone(), 3);
        let mut vaa = unsigned_vaa(9);
        sign(&mut vaa, &guardian_keys(2));
        let message = SignedVaaWithQuorum {
            vaa: vaa.serialize(),
        };

        let err = worker.process(&message).await.unwrap_err();
        assert!(err.to_string().contains("quorum is 3"));
        assert_eq!(store.get_signed_vaa(&vaa.id()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_process_rejects_tampered_body() {
        let store = Arc::new(MemoryStore::new());
        let mut worker = worker(store.clone(), 1);
        let mut vaa = unsigned_vaa(9);
        sign(&mut vaa, &guardian_keys(1));
        vaa.payload = vec![9, 9, 9];

        let err = worker
            .process(&SignedVaaWithQuorum {
                vaa: vaa.serialize(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_process_rejects_wrong_set_index() {
        let store = Arc::new(MemoryStore::new());
        let mut worker = worker(store, 1);
        let mut vaa = unsigned_vaa(9);
        vaa.guardian_set_index = 1;
        sign(&mut vaa, &guardian_keys(1));

        let err = worker
            .process(&SignedVaaWithQuorum {
                vaa: vaa.serialize(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("guardian set index 1"));
    }

    #[tokio::test]
    async fn test_run_drains_queue_until_cancelled() {
        let store = Arc::new(MemoryStore::new());
        let worker = worker(store.clone(), 1);
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(rx, cancel.clone()));

        let mut vaa = unsigned_vaa(3);
        sign(&mut vaa, &guardian_keys(1));
        tx.submit(SignedVaaWithQuorum {
            vaa: vaa.serialize(),
        })
        .await
        .unwrap();

        for _ in 0..50 {
            if store.get_signed_vaa(&vaa.id()).await.unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.get_signed_vaa(&vaa.id()).await.unwrap().is_some());

        cancel.cancel();
        handle.await.unwrap();
    }
}
