//! Read access to the source chain.
//!
//! The relay core only needs two calls from a node: the current head height
//! and the logs matching a filter inside an inclusive block range.

use alloy::primitives::{Address, B256};
use async_trait::async_trait;

use crate::error::ChainReadError;
use crate::types::RawLog;

pub mod evm;

pub use evm::EvmChainReader;

/// Contract address and event topic a scan is restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub event_signature: B256,
}

/// Source chain access used by the scanner and the relay loop.
///
/// Implementations must bound every call with a finite timeout and must
/// return [`ChainReadError::RangeTooLarge`] instead of a truncated result when
/// a range exceeds provider limits. Returned logs may be in any order.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Current head height
    async fn get_head(&self) -> Result<u64, ChainReadError>;

    /// Logs matching `filter` in `[from_block, to_block]`
    async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        filter: &LogFilter,
    ) -> Result<Vec<RawLog>, ChainReadError>;
}
