//! Alephium chain access and the confirmed event watcher

pub mod client;
pub mod events;
pub mod watcher;

pub use client::AlephiumClient;
pub use events::{BlockHeader, ConfirmedEvent, ConfirmedEvents, Event, Field, UnconfirmedEvent};
pub use watcher::{
    AlephiumWatcher, ConfirmationPolicy, ConfirmedEventsHandler, EventClassifier,
    MainChainClassifier, DEFAULT_EVENT_BATCH_SIZE,
};
