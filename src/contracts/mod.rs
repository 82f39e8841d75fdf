//! Bridge contract bindings for the source and destination chains.

pub mod dest_bridge;
pub mod source_bridge;

pub use dest_bridge::DestinationBridge;
pub use source_bridge::{decode_lock_log, lock_event_filter, TokensLocked};
