//! Chain event watcher
//!
//! One watch cycle per call to [`AlephiumWatcher::fetch_events`]:
//!
//! 1. read the next event index for the contract (none on first run)
//! 2. query the contract's current event count
//! 3. fetch the new events in batches and classify each against its block
//! 4. keep the contiguous confirmed prefix, dropping events of orphaned blocks
//! 5. hand the confirmed batch to the handler once and return the new index
//!
//! The caller persists the returned index before the next cycle. An error at
//! any step aborts the cycle without calling the handler.

use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::AlephiumClient;
use super::events::{BlockHeader, ConfirmedEvent, ConfirmedEvents, Event, UnconfirmedEvent};
use crate::error::WatcherError;
use crate::metrics;
use crate::store::EventIndexStore;

pub const DEFAULT_EVENT_BATCH_SIZE: u64 = 100;

/// Consumer of confirmed events
#[async_trait]
pub trait ConfirmedEventsHandler: Send + Sync {
    async fn handle(&self, confirmed: &ConfirmedEvents) -> eyre::Result<()>;
}

/// Pairs fetched events with their block header and main-chain status
#[async_trait]
pub trait EventClassifier: Send + Sync {
    async fn classify(
        &self,
        client: &AlephiumClient,
        events: Vec<(u64, Event)>,
        cancel: &CancellationToken,
    ) -> Result<Vec<UnconfirmedEvent>, WatcherError>;
}

/// Looks up every distinct block once per call. Nothing is cached across
/// calls since main-chain membership can change between cycles.
#[derive(Debug, Default, Clone, Copy)]
pub struct MainChainClassifier;

#[async_trait]
impl EventClassifier for MainChainClassifier {
    async fn classify(
        &self,
        client: &AlephiumClient,
        events: Vec<(u64, Event)>,
        cancel: &CancellationToken,
    ) -> Result<Vec<UnconfirmedEvent>, WatcherError> {
        let mut blocks: HashMap<String, (BlockHeader, bool)> = HashMap::new();
        let mut unconfirmed = Vec::with_capacity(events.len());

        for (index, event) in events {
            if !blocks.contains_key(&event.block_hash) {
                let header = client.block_header(&event.block_hash, cancel).await?;
                let canonical = client
                    .is_block_in_main_chain(&event.block_hash, cancel)
                    .await?;
                blocks.insert(event.block_hash.clone(), (header, canonical));
            }
            let (header, canonical) = blocks[&event.block_hash].clone();
            unconfirmed.push(UnconfirmedEvent {
                index,
                event,
                header,
                canonical,
            });
        }

        Ok(unconfirmed)
    }
}

/// How deep a block must be before its events are final
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    /// Blocks required on top of the event's block. With zero, main-chain
    /// membership alone decides.
    pub min_confirmations: u64,
}

impl ConfirmationPolicy {
    pub fn new(min_confirmations: u64) -> Self {
        Self { min_confirmations }
    }

    pub fn is_settled(&self, block_height: u64, current_height: u64) -> bool {
        current_height.saturating_sub(block_height) >= self.min_confirmations
    }
}

/// Outcome of walking one classified batch
#[derive(Debug, Default, PartialEq)]
struct Confirmation {
    confirmed: Vec<ConfirmedEvent>,
    dropped: u64,
    next_index: u64,
    stopped: bool,
}

pub struct AlephiumWatcher {
    client: AlephiumClient,
    policy: ConfirmationPolicy,
    batch_size: u64,
}

impl AlephiumWatcher {
    pub fn new(client: AlephiumClient, policy: ConfirmationPolicy, batch_size: u64) -> Self {
        Self {
            client,
            policy,
            batch_size: batch_size.max(1),
        }
    }

    /// Run one watch cycle and return the next event index to process
    pub async fn fetch_events(
        &self,
        contract_address: &str,
        index_store: &dyn EventIndexStore,
        classifier: &dyn EventClassifier,
        handler: &dyn ConfirmedEventsHandler,
        cancel: &CancellationToken,
    ) -> Result<u64, WatcherError> {
        let last_index = index_store
            .next_event_index(contract_address)
            .await
            .map_err(|e| WatcherError::Store(format!("{:#}", e)))?;

        let count = self.client.event_count(contract_address, cancel).await?;

        let start = match last_index {
            Some(index) => index,
            None => {
                info!(
                    contract = %contract_address,
                    event_count = count,
                    "No event index stored, starting from index 0"
                );
                return Ok(0);
            }
        };

        let mut confirmed = Vec::new();
        let mut next_index = start;

        let mut batch_start = start;
        while batch_start < count {
            let batch_end = (batch_start + self.batch_size - 1).min(count - 1);
            let events = self
                .client
                .events(contract_address, batch_start, batch_end, cancel)
                .await?;

            let expected = (batch_end - batch_start + 1) as usize;
            if events.len() != expected {
                return Err(WatcherError::Decode {
                    url: self.client.base_url().to_string(),
                    reason: format!(
                        "expected {} events for range [{}, {}], got {}",
                        expected,
                        batch_start,
                        batch_end,
                        events.len()
                    ),
                });
            }

            let indexed = (batch_start..).zip(events).collect();
            let unconfirmed = classifier.classify(&self.client, indexed, cancel).await?;
            let heights = self.current_heights(&unconfirmed, cancel).await?;

            let batch = confirm_prefix(&self.policy, unconfirmed, &heights, batch_start);
            if batch.dropped > 0 {
                warn!(
                    contract = %contract_address,
                    dropped = batch.dropped,
                    "Dropped events from blocks outside the main chain"
                );
                metrics::record_events_dropped(contract_address, batch.dropped);
            }

            confirmed.extend(batch.confirmed);
            next_index = batch.next_index;
            if batch.stopped {
                debug!(
                    contract = %contract_address,
                    next_index,
                    "Stopped at event from an unsettled block"
                );
                break;
            }
            batch_start = batch_end + 1;
        }

        let batch = ConfirmedEvents {
            contract_address: contract_address.to_string(),
            events: confirmed,
            next_index,
        };
        handler
            .handle(&batch)
            .await
            .map_err(|e| WatcherError::Handler(format!("{:#}", e)))?;

        if !batch.events.is_empty() {
            info!(
                contract = %contract_address,
                confirmed = batch.events.len(),
                next_index,
                "Confirmed contract events"
            );
        }
        metrics::record_events_confirmed(contract_address, batch.events.len() as u64);

        Ok(next_index)
    }

    /// Current height of every chain referenced by the batch. Skipped when
    /// the policy doesn't require depth.
    async fn current_heights(
        &self,
        unconfirmed: &[UnconfirmedEvent],
        cancel: &CancellationToken,
    ) -> Result<HashMap<(u32, u32), u64>, WatcherError> {
        let mut heights = HashMap::new();
        if self.policy.min_confirmations == 0 {
            return Ok(heights);
        }
        for event in unconfirmed {
            let key = (event.header.chain_from, event.header.chain_to);
            if let Entry::Vacant(entry) = heights.entry(key) {
                let height = self.client.current_height(key.0, key.1, cancel).await?;
                entry.insert(height);
            }
        }
        Ok(heights)
    }

    /// Poll the contract until cancelled, persisting the index after each
    /// successful cycle
    pub async fn run(
        &self,
        contract_address: &str,
        index_store: &dyn EventIndexStore,
        classifier: &dyn EventClassifier,
        handler: &dyn ConfirmedEventsHandler,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) {
        info!(contract = %contract_address, "Starting Alephium event watcher");

        loop {
            match self
                .fetch_events(contract_address, index_store, classifier, handler, &cancel)
                .await
            {
                Ok(next_index) => {
                    metrics::record_watch_cycle(contract_address, "ok");
                    metrics::set_event_index(contract_address, next_index);
                    if let Err(e) = index_store
                        .set_next_event_index(contract_address, next_index)
                        .await
                    {
                        warn!(
                            contract = %contract_address,
                            error = %e,
                            "Failed to persist event index"
                        );
                    }
                }
                Err(WatcherError::Cancelled) => break,
                Err(e) => {
                    metrics::record_watch_cycle(contract_address, "error");
                    warn!(contract = %contract_address, error = %e, "Watch cycle failed");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        info!(contract = %contract_address, "Alephium event watcher stopped");
    }
}

/// Walk a classified batch in index order. Events of settled orphaned blocks
/// are dropped for good; the first event of an unsettled block stops the walk.
fn confirm_prefix(
    policy: &ConfirmationPolicy,
    unconfirmed: Vec<UnconfirmedEvent>,
    heights: &HashMap<(u32, u32), u64>,
    start: u64,
) -> Confirmation {
    let mut result = Confirmation {
        next_index: start,
        ..Default::default()
    };

    for event in unconfirmed {
        let settled = match heights.get(&(event.header.chain_from, event.header.chain_to)) {
            Some(current) => policy.is_settled(event.header.height, *current),
            None => policy.min_confirmations == 0,
        };
        if !settled {
            result.stopped = true;
            break;
        }

        result.next_index = event.index + 1;
        if event.canonical {
            result.confirmed.push(ConfirmedEvent {
                index: event.index,
                event: event.event,
            });
        } else {
            result.dropped += 1;
        }
    }

    result
}
