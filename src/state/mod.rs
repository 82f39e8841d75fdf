//! Relay progress: the last fully handled block and the relayed nonces.
//!
//! [`RelayState`] is owned by the relay loop and only ever moves forward.
//! [`StateStore`] implementations checkpoint it between iterations so a
//! restart resumes where the previous process stopped.

use std::collections::BTreeSet;
use std::sync::Mutex;

use alloy::primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreError;

pub mod db;
pub mod file;

pub use db::PgStateStore;
pub use file::JsonFileStateStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayState {
    last_processed_block: u64,
    processed_nonces: BTreeSet<U256>,
}

impl RelayState {
    /// Fresh state; `start_block` is treated as already processed
    pub fn new(start_block: u64) -> Self {
        Self {
            last_processed_block: start_block,
            processed_nonces: BTreeSet::new(),
        }
    }

    pub fn from_parts(last_processed_block: u64, processed_nonces: BTreeSet<U256>) -> Self {
        Self {
            last_processed_block,
            processed_nonces,
        }
    }

    pub fn last_processed_block(&self) -> u64 {
        self.last_processed_block
    }

    pub fn processed_nonces(&self) -> &BTreeSet<U256> {
        &self.processed_nonces
    }

    pub fn is_processed(&self, nonce: &U256) -> bool {
        self.processed_nonces.contains(nonce)
    }

    /// Record a nonce as relayed. Returns false if it was already present.
    pub fn mark_processed(&mut self, nonce: U256) -> bool {
        self.processed_nonces.insert(nonce)
    }

    /// Move the block cursor forward to `block`.
    ///
    /// Moving backwards is refused and leaves the state untouched.
    /// Returns whether the cursor moved.
    pub fn advance_to(&mut self, block: u64) -> bool {
        if block < self.last_processed_block {
            warn!(
                current = self.last_processed_block,
                requested = block,
                "Refusing to move last processed block backwards"
            );
            return false;
        }
        let moved = block > self.last_processed_block;
        self.last_processed_block = block;
        moved
    }
}

/// Durable storage for [`RelayState`] snapshots
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Latest snapshot, or `None` if nothing has been saved yet
    async fn load(&self) -> Result<Option<RelayState>, StoreError>;

    /// Replace the stored snapshot with `state`
    async fn save(&self, state: &RelayState) -> Result<(), StoreError>;

    /// Short name for logs
    fn describe(&self) -> String;
}

/// In-process store. Keeps the last snapshot for the life of the value;
/// tests use it to simulate a restart.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    snapshot: Mutex<Option<RelayState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(state: RelayState) -> Self {
        Self {
            snapshot: Mutex::new(Some(state)),
        }
    }

    pub fn snapshot(&self) -> Option<RelayState> {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<RelayState>, StoreError> {
        Ok(self.snapshot())
    }

    async fn save(&self, state: &RelayState) -> Result<(), StoreError> {
        *self
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(state.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Resume from the store if it holds a snapshot, else start at `start_block`
pub async fn load_or_init(
    store: &dyn StateStore,
    start_block: u64,
) -> Result<RelayState, StoreError> {
    match store.load().await? {
        Some(state) => {
            if state.last_processed_block() < start_block {
                warn!(
                    persisted = state.last_processed_block(),
                    start_block,
                    "Persisted cursor is behind START_BLOCK; resuming from persisted cursor"
                );
            }
            Ok(state)
        }
        None => Ok(RelayState::new(start_block)),
    }
}
