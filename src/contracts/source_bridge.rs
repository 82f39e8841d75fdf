//! Source bridge `TokensLocked` event binding and decoding

use alloy::primitives::Address;
use alloy::sol;
use alloy::sol_types::SolEvent;

use crate::error::ScanError;
use crate::reader::LogFilter;
use crate::types::{ChainEvent, RawLog};

sol! {
    /// Emitted by the source bridge when a user locks tokens
    #[derive(Debug)]
    event TokensLocked(
        address indexed sender,
        address indexed recipient,
        uint256 amount,
        uint256 destinationChainId,
        uint256 nonce
    );
}

/// Filter selecting `TokensLocked` logs emitted by `bridge_address`
pub fn lock_event_filter(bridge_address: Address) -> LogFilter {
    LogFilter {
        address: bridge_address,
        event_signature: TokensLocked::SIGNATURE_HASH,
    }
}

/// Decode a raw `TokensLocked` log.
///
/// Topic 0 must match the event signature and the data section must hold
/// exactly the three non-indexed words; anything else is a decode error.
pub fn decode_lock_log(log: &RawLog) -> Result<ChainEvent, ScanError> {
    let decoded = TokensLocked::decode_raw_log(log.topics.iter().copied(), &log.data, true)
        .map_err(|e| ScanError::Decode {
            block_number: log.block_number,
            log_index: log.log_index,
            reason: e.to_string(),
        })?;

    Ok(ChainEvent {
        block_number: log.block_number,
        log_index: log.log_index,
        nonce: decoded.nonce,
        recipient: decoded.recipient.to_string(),
        amount: decoded.amount,
        sender: decoded.sender.to_string(),
        destination_chain_id: decoded.destinationChainId,
    })
}

/// Encode a `TokensLocked` log. Used by tests and local tooling.
pub fn encode_lock_log(
    block_number: u64,
    log_index: Option<u64>,
    event: &TokensLocked,
) -> RawLog {
    let data = event.encode_log_data();
    RawLog {
        block_number,
        log_index,
        topics: data.topics().to_vec(),
        data: data.data,
    }
}
