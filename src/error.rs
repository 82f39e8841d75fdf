//! Error types at the collaborator seams.
//!
//! The relay loop has to tell transient read failures from range-limit
//! failures and per-action send failures, so these are typed. Bootstrap code
//! uses `eyre` instead.

use alloy::primitives::U256;
use thiserror::Error;

use crate::types::ScanWindow;

/// Failure reported by a [`crate::reader::ChainReader`]
#[derive(Debug, Error)]
pub enum ChainReadError {
    /// RPC unreachable, timed out or returned an unusable response
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// The provider refused the query because the block range is too wide
    #[error("block range {from_block}..={to_block} exceeds provider limits: {message}")]
    RangeTooLarge {
        from_block: u64,
        to_block: u64,
        message: String,
    },
}

/// Failure while scanning a window. Always aborts the current iteration.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to fetch logs for {window}: {source}")]
    Read {
        window: ScanWindow,
        #[source]
        source: ChainReadError,
    },

    /// Provider misbehaviour that cannot be repaired by splitting the range
    #[error("provider error for {window}: {message}")]
    Provider { window: ScanWindow, message: String },

    /// A matching log could not be decoded; its fields are never guessed
    #[error("failed to decode log at block {block_number} (log index {log_index:?}): {reason}")]
    Decode {
        block_number: u64,
        log_index: Option<u64>,
        reason: String,
    },
}

impl ScanError {
    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::Read { .. } => "read",
            ScanError::Provider { .. } => "provider",
            ScanError::Decode { .. } => "decode",
        }
    }
}

/// Failure to relay a single action to the destination chain
#[derive(Debug, Error)]
#[error("relay of nonce {nonce} failed: {message}")]
pub struct RelaySendError {
    pub nonce: U256,
    pub message: String,
}

impl RelaySendError {
    pub fn new(nonce: U256, message: impl Into<String>) -> Self {
        Self {
            nonce,
            message: message.into(),
        }
    }
}

/// Failure that aborts an iteration before any action is relayed
#[derive(Debug, Error)]
pub enum IterationError {
    #[error("failed to fetch chain head: {0}")]
    Head(#[source] ChainReadError),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

impl IterationError {
    pub fn kind(&self) -> &'static str {
        match self {
            IterationError::Head(_) => "head",
            IterationError::Scan(e) => e.kind(),
        }
    }
}

/// Failure of a [`crate::state::StateStore`]
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state snapshot is malformed: {0}")]
    Format(#[from] serde_json::Error),

    #[error("state database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid persisted state: {0}")]
    Invalid(String),
}
