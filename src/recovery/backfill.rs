//! Peer backfill client
//!
//! Asks peer guardians' public endpoints for a signed VAA the local node never
//! observed and pushes the first copy found into the ingestion queue, where it
//! is verified exactly like gossip.
//!
//! Per peer:
//! - transport error or undecodable body: logged, next peer
//! - 404: next peer
//! - 200 with the requested VAA: submitted, done
//! - any other status, or a 200 carrying a different VAA: protocol
//!   violation, the call fails

use base64::Engine;
use rand::seq::SliceRandom;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::codec::Vaa;
use crate::error::RecoveryError;
use crate::ingest::{SignedVaaSink, SignedVaaWithQuorum};
use crate::metrics;
use crate::types::VaaId;

pub const DEFAULT_BACKFILL_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedVaaResponse {
    vaa_bytes: String,
}

/// Result of asking one peer
enum PeerReply {
    Found(Vec<u8>),
    Missing,
}

#[derive(Clone)]
pub struct BackfillClient {
    client: reqwest::Client,
    timeout: Duration,
    sink: Arc<dyn SignedVaaSink>,
}

impl BackfillClient {
    /// `timeout` bounds one whole backfill call across all peers
    pub fn new(sink: Arc<dyn SignedVaaSink>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            sink,
        }
    }

    /// Fetch the VAA at `id` from the first peer that has it.
    ///
    /// Returns false when no peer had it. Peers are tried in a fresh random
    /// order on every call.
    pub async fn backfill(
        &self,
        peers: &[String],
        id: &VaaId,
        cancel: &CancellationToken,
    ) -> Result<bool, RecoveryError> {
        let mut nodes = peers.to_vec();
        nodes.shuffle(&mut rand::thread_rng());

        let deadline = Instant::now() + self.timeout;
        let chain = id.emitter_chain.to_u16();

        for node in &nodes {
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(RecoveryError::Cancelled),
                result = tokio::time::timeout_at(deadline, self.fetch_from_peer(node, id)) => result,
            };

            let reply = match result {
                Ok(reply) => reply,
                Err(_) => Err(RecoveryError::Timeout(format!(
                    "backfill deadline of {:?} exceeded",
                    self.timeout
                ))),
            };

            match reply {
                Ok(PeerReply::Found(vaa_bytes)) => {
                    metrics::record_backfill_attempt(chain, "found");
                    info!(
                        node = %node,
                        chain,
                        address = %id.emitter_address,
                        sequence = id.sequence,
                        num_bytes = vaa_bytes.len(),
                        "Backfilled VAA"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(RecoveryError::Cancelled),
                        submitted = self.sink.submit(SignedVaaWithQuorum { vaa: vaa_bytes }) => submitted?,
                    }
                    return Ok(true);
                }
                Ok(PeerReply::Missing) => {
                    metrics::record_backfill_attempt(chain, "not_found");
                }
                Err(e @ RecoveryError::Protocol(_)) => {
                    metrics::record_backfill_attempt(chain, "protocol_error");
                    warn!(
                        node = %node,
                        chain,
                        address = %id.emitter_address,
                        sequence = id.sequence,
                        error = %e,
                        "Peer violated the signed VAA protocol"
                    );
                    return Err(e);
                }
                Err(e) => {
                    metrics::record_backfill_attempt(chain, "error");
                    warn!(
                        node = %node,
                        chain,
                        address = %id.emitter_address,
                        sequence = id.sequence,
                        error = %e,
                        "Failed to fetch missing VAA"
                    );
                }
            }
        }

        Ok(false)
    }

    async fn fetch_from_peer(&self, node: &str, id: &VaaId) -> Result<PeerReply, RecoveryError> {
        let url = format!(
            "{}/v1/signed_vaa/{}/{}/{}",
            node.trim_end_matches('/'),
            id.emitter_chain,
            id.emitter_address,
            id.sequence
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RecoveryError::Transport(format!("{}: {}", url, e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(PeerReply::Missing),
            StatusCode::OK => {
                let body: SignedVaaResponse = response.json().await.map_err(|e| {
                    RecoveryError::decode("signed VAA response", e.to_string())
                })?;
                let vaa_bytes = base64::engine::general_purpose::STANDARD
                    .decode(body.vaa_bytes.as_bytes())
                    .map_err(|e| RecoveryError::decode("signed VAA bytes", e.to_string()))?;

                let vaa = Vaa::parse(&vaa_bytes)?;
                if vaa.id() != *id {
                    return Err(RecoveryError::Protocol(format!(
                        "requested {}, peer returned {}",
                        id,
                        vaa.id()
                    )));
                }
                Ok(PeerReply::Found(vaa_bytes))
            }
            status => Err(RecoveryError::Protocol(format!(
                "unexpected response status: {}",
                status.as_u16()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::vaa::VAA_VERSION;
    use crate::types::{Byte32, ChainId, Emitter};
    use axum::http::StatusCode as HttpStatus;
    use axum::response::{IntoResponse, Response};
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    #[derive(Clone)]
    enum Peer {
        NotFound,
        Serve(Vec<u8>),
        Status(u16),
        Garbage,
    }

    fn vaa_id(sequence: u64) -> VaaId {
        Emitter::new(ChainId::ETHEREUM, Byte32([0xab; 32])).vaa_id(sequence)
    }

    fn vaa_bytes(id: &VaaId) -> Vec<u8> {
        Vaa {
            version: VAA_VERSION,
            guardian_set_index: 0,
            signatures: vec![],
            timestamp: 0,
            nonce: 0,
            emitter_chain: id.emitter_chain,
            emitter_address: id.emitter_address,
            sequence: id.sequence,
            consistency_level: 1,
            payload: vec![1],
        }
        .serialize()
    }

    async fn spawn_peer(peer: Peer) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().fallback(move || {
            let peer = peer.clone();
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let response: Response = match peer {
                    Peer::NotFound => HttpStatus::NOT_FOUND.into_response(),
                    Peer::Serve(bytes) => axum::Json(serde_json::json!({
                        "vaaBytes": base64::engine::general_purpose::STANDARD.encode(bytes)
                    }))
                    .into_response(),
                    Peer::Status(code) => HttpStatus::from_u16(code).unwrap().into_response(),
                    Peer::Garbage => (HttpStatus::OK, "not json").into_response(),
                };
                response
            }
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), hits)
    }

    fn client() -> (BackfillClient, mpsc::Receiver<SignedVaaWithQuorum>) {
        let (tx, rx) = mpsc::channel::<SignedVaaWithQuorum>(8);
        (
            BackfillClient::new(Arc::new(tx), Duration::from_secs(5)),
            rx,
        )
    }

    #[tokio::test]
    async fn test_backfill_stops_at_first_peer_with_vaa() {
        let id = vaa_id(5);
        let mut peers = Vec::new();
        let mut hits = Vec::new();
        for _ in 0..4 {
            let (url, counter) = spawn_peer(Peer::Serve(vaa_bytes(&id))).await;
            peers.push(url);
            hits.push(counter);
        }

        let (client, mut rx) = client();
        let found = client
            .backfill(&peers, &id, &CancellationToken::new())
            .await
            .unwrap();

        assert!(found);
        let total: usize = hits.iter().map(|h| h.load(Ordering::SeqCst)).sum();
        assert_eq!(total, 1);
        assert_eq!(rx.recv().await.unwrap().vaa, vaa_bytes(&id));
    }

    #[tokio::test]
    async fn test_backfill_all_peers_missing() {
        let id = vaa_id(5);
        let mut peers = Vec::new();
        let mut hits = Vec::new();
        for _ in 0..3 {
            let (url, counter) = spawn_peer(Peer::NotFound).await;
            peers.push(url);
            hits.push(counter);
        }

        let (client, mut rx) = client();
        let found = client
            .backfill(&peers, &id, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!found);
        assert!(hits.iter().all(|h| h.load(Ordering::SeqCst) == 1));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_backfill_unexpected_status_is_hard_stop() {
        let (url, _) = spawn_peer(Peer::Status(500)).await;
        let (client, _rx) = client();
        let err = client
            .backfill(&[url], &vaa_id(5), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RecoveryError::Protocol(_)));
        assert!(err.to_string().contains("unexpected response status: 500"));
    }

    #[tokio::test]
    async fn test_backfill_wrong_vaa_is_hard_stop() {
        let (url, _) = spawn_peer(Peer::Serve(vaa_bytes(&vaa_id(6)))).await;
        let (client, _rx) = client();
        let err = client
            .backfill(&[url], &vaa_id(5), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RecoveryError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_backfill_skips_unreachable_and_garbage_peers() {
        let id = vaa_id(5);
        let (garbage, _) = spawn_peer(Peer::Garbage).await;
        let (good, good_hits) = spawn_peer(Peer::Serve(vaa_bytes(&id))).await;
        let unreachable = "http://127.0.0.1:1".to_string();

        let (client, mut rx) = client();
        let found = client
            .backfill(&[unreachable, garbage, good], &id, &CancellationToken::new())
            .await
            .unwrap();

        assert!(found);
        assert_eq!(good_hits.load(Ordering::SeqCst), 1);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_backfill_cancelled_while_ingest_queue_full() {
        let id = vaa_id(5);
        let (url, _) = spawn_peer(Peer::Serve(vaa_bytes(&id))).await;

        let (tx, _rx) = mpsc::channel::<SignedVaaWithQuorum>(1);
        tx.send(SignedVaaWithQuorum { vaa: vec![0] }).await.unwrap();
        let client = BackfillClient::new(Arc::new(tx), Duration::from_secs(5));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(3),
            client.backfill(&[url], &id, &cancel),
        )
        .await
        .expect("backfill should return once cancelled");
        assert!(matches!(result, Err(RecoveryError::Cancelled)));
    }

    #[tokio::test]
    async fn test_backfill_no_peers() {
        let (client, _rx) = client();
        let found = client
            .backfill(&[], &vaa_id(1), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!found);
    }
}
