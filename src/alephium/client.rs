//! Minimal Alephium full-node REST client
//!
//! Only the endpoints the watcher needs: event count, event range, block
//! header, main-chain membership and chain height.

use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::events::{BlockHeader, ChainInfo, Event, EventsResponse};
use crate::error::WatcherError;

const API_KEY_HEADER: &str = "X-API-KEY";

#[derive(Clone)]
pub struct AlephiumClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl AlephiumClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, WatcherError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WatcherError::Transport {
                url: base_url.to_string(),
                source: e,
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<T, WatcherError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let fetch = async {
            let response = request.send().await.map_err(|e| WatcherError::Transport {
                url: url.clone(),
                source: e,
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(WatcherError::Status {
                    url: url.clone(),
                    status: status.as_u16(),
                });
            }

            response.bytes().await.map_err(|e| WatcherError::Transport {
                url: url.clone(),
                source: e,
            })
        };

        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(WatcherError::Cancelled),
            body = fetch => body?,
        };
        serde_json::from_slice(&body).map_err(|e| WatcherError::Decode {
            url,
            reason: e.to_string(),
        })
    }

    /// Number of events the contract has emitted so far
    pub async fn event_count(
        &self,
        contract_address: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, WatcherError> {
        self.get_json(
            "/events/contract/current-count",
            &[("contractAddress", contract_address.to_string())],
            cancel,
        )
        .await
    }

    /// Events in the inclusive index range [start, end]
    pub async fn events(
        &self,
        contract_address: &str,
        start: u64,
        end: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Event>, WatcherError> {
        let response: EventsResponse = self
            .get_json(
                "/events/contract",
                &[
                    ("start", start.to_string()),
                    ("end", end.to_string()),
                    ("contractAddress", contract_address.to_string()),
                ],
                cancel,
            )
            .await?;
        Ok(response.into_events())
    }

    pub async fn block_header(
        &self,
        block_hash: &str,
        cancel: &CancellationToken,
    ) -> Result<BlockHeader, WatcherError> {
        self.get_json(&format!("/blockflow/blocks/{}", block_hash), &[], cancel)
            .await
    }

    pub async fn is_block_in_main_chain(
        &self,
        block_hash: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, WatcherError> {
        self.get_json(
            "/blockflow/is-block-in-main-chain",
            &[("blockHash", block_hash.to_string())],
            cancel,
        )
        .await
    }

    /// Current height of the chain between two groups
    pub async fn current_height(
        &self,
        from_group: u32,
        to_group: u32,
        cancel: &CancellationToken,
    ) -> Result<u64, WatcherError> {
        let info: ChainInfo = self
            .get_json(
                "/blockflow/chain-info",
                &[
                    ("fromGroup", from_group.to_string()),
                    ("toGroup", to_group.to_string()),
                ],
                cancel,
            )
            .await?;
        Ok(info.current_height)
    }
}
