//! Domain types shared by the scanner, the relay loop and the sinks.

use alloy::primitives::U256;
use std::fmt;

/// Inclusive block range `[from_block, to_block]`.
///
/// A window with `from_block > to_block` is empty. The relay loop produces
/// such windows whenever the safe head has not moved past the last processed
/// block, so they are a normal value rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub from_block: u64,
    pub to_block: u64,
}

impl ScanWindow {
    pub fn new(from_block: u64, to_block: u64) -> Self {
        Self {
            from_block,
            to_block,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.from_block > self.to_block
    }

    /// Number of blocks covered (0 for an empty window)
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.to_block - self.from_block + 1
        }
    }

    /// Split into contiguous, ascending sub-windows of at most `max_size` blocks.
    ///
    /// The union of the returned windows is exactly `self`; no block appears
    /// twice. A `max_size` of 0 is treated as 1.
    pub fn chunks(&self, max_size: u64) -> Vec<ScanWindow> {
        let max_size = max_size.max(1);
        let mut chunks = Vec::new();
        if self.is_empty() {
            return chunks;
        }

        let mut start = self.from_block;
        loop {
            let end = start.saturating_add(max_size - 1).min(self.to_block);
            chunks.push(ScanWindow::new(start, end));
            if end == self.to_block {
                break;
            }
            start = end + 1;
        }
        chunks
    }

    /// Split into two halves for RangeTooLarge recovery.
    /// Returns `None` when the window covers a single block (or none).
    pub fn split(&self) -> Option<(ScanWindow, ScanWindow)> {
        if self.len() < 2 {
            return None;
        }
        let mid = self.from_block + (self.to_block - self.from_block) / 2;
        Some((
            ScanWindow::new(self.from_block, mid),
            ScanWindow::new(mid + 1, self.to_block),
        ))
    }

    pub fn contains(&self, block_number: u64) -> bool {
        block_number >= self.from_block && block_number <= self.to_block
    }
}

impl fmt::Display for ScanWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from_block, self.to_block)
    }
}

/// Raw log record as returned by a [`crate::reader::ChainReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub block_number: u64,
    pub log_index: Option<u64>,
    pub topics: Vec<alloy::primitives::B256>,
    pub data: alloy::primitives::Bytes,
}

/// One decoded `TokensLocked` occurrence on the source chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    pub block_number: u64,
    pub log_index: Option<u64>,
    pub nonce: U256,
    pub recipient: String,
    pub amount: U256,
    pub sender: String,
    pub destination_chain_id: U256,
}

impl ChainEvent {
    /// Ordering key: block, then log index, then nonce.
    ///
    /// `None` log indexes sort before `Some`, so events without a provider
    /// supplied index fall back to nonce order within their block.
    pub fn sort_key(&self) -> (u64, Option<u64>, U256) {
        (self.block_number, self.log_index, self.nonce)
    }
}

/// Validated mint instruction handed to a [`crate::sink::RelaySink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayAction {
    pub nonce: U256,
    pub recipient: String,
    pub amount: U256,
    pub source_block_number: u64,
}

impl From<&ChainEvent> for RelayAction {
    fn from(event: &ChainEvent) -> Self {
        Self {
            nonce: event.nonce,
            recipient: event.recipient.clone(),
            amount: event.amount,
            source_block_number: event.block_number,
        }
    }
}
