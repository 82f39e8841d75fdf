//! Destination side of the relay: where validated actions are handed off.

use async_trait::async_trait;
use tracing::info;

use crate::error::RelaySendError;
use crate::types::RelayAction;

pub mod evm;

pub use evm::EvmRelaySink;

/// Successful result of a send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// A new destination transaction was confirmed
    Relayed { tx_hash: Option<String> },
    /// The destination reports this nonce as already minted
    AlreadyRelayed,
}

/// Accepts relay actions in order and turns them into destination-chain
/// transactions. "Already relayed" must be reported as
/// [`SendOutcome::AlreadyRelayed`], not as an error.
#[async_trait]
pub trait RelaySink: Send + Sync {
    async fn send(&self, action: &RelayAction) -> Result<SendOutcome, RelaySendError>;
}

/// Classifies destination errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendErrorClass {
    /// The destination already minted for this nonce
    AlreadyRelayed,
    /// RPC timeout, network issues, rate limiting
    Transient,
    /// Needs an operator: revert, funds, bad key
    Permanent,
    Unknown,
}

/// Classify a destination error message
pub fn classify_send_error(error: &str) -> SendErrorClass {
    let error_lower = error.to_lowercase();

    if error_lower.contains("already processed")
        || error_lower.contains("already relayed")
        || error_lower.contains("already minted")
        || error_lower.contains("nonce already processed")
    {
        return SendErrorClass::AlreadyRelayed;
    }

    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection")
        || error_lower.contains("network")
        || error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("temporarily unavailable")
    {
        return SendErrorClass::Transient;
    }

    if error_lower.contains("reverted")
        || error_lower.contains("execution reverted")
        || error_lower.contains("insufficient funds")
        || error_lower.contains("invalid signature")
        || error_lower.contains("out of gas")
        || error_lower.contains("invalid recipient")
    {
        return SendErrorClass::Permanent;
    }

    SendErrorClass::Unknown
}

/// Logs the mint it would perform and reports success.
/// Selected with `RELAY_DRY_RUN=true`.
#[derive(Debug, Default)]
pub struct DryRunSink;

#[async_trait]
impl RelaySink for DryRunSink {
    async fn send(&self, action: &RelayAction) -> Result<SendOutcome, RelaySendError> {
        info!(
            nonce = %action.nonce,
            recipient = %action.recipient,
            amount = %action.amount,
            source_block = action.source_block_number,
            "[DRY RUN] Would send mintTokens"
        );
        Ok(SendOutcome::Relayed { tx_hash: None })
    }
}
