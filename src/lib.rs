//! Lock-and-mint bridge relayer.
//!
//! Watches a source chain for `TokensLocked` events behind a reorg safety
//! margin and relays each one exactly once as a `mintTokens` call on the
//! destination chain.

pub mod api;
pub mod backoff;
pub mod config;
pub mod contracts;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod reader;
pub mod scanner;
pub mod sink;
pub mod state;
pub mod types;

pub use error::{ChainReadError, IterationError, RelaySendError, ScanError, StoreError};
pub use orchestrator::{safe_window, IterationOutcome, RelayOrchestrator, RelaySettings};
pub use reader::{ChainReader, LogFilter};
pub use scanner::EventScanner;
pub use sink::{RelaySink, SendOutcome};
pub use state::{RelayState, StateStore};
pub use types::{ChainEvent, RawLog, RelayAction, ScanWindow};
