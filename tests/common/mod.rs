//! In-memory fakes of the relay collaborators

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use lockmint_relayer::contracts::lock_event_filter;
use lockmint_relayer::contracts::source_bridge::{encode_lock_log, TokensLocked};
use lockmint_relayer::error::{ChainReadError, RelaySendError, StoreError};
use lockmint_relayer::orchestrator::{RelayOrchestrator, RelaySettings};
use lockmint_relayer::reader::{ChainReader, LogFilter};
use lockmint_relayer::scanner::EventScanner;
use lockmint_relayer::sink::{RelaySink, SendOutcome};
use lockmint_relayer::state::{MemoryStateStore, RelayState, StateStore};
use lockmint_relayer::types::{RawLog, RelayAction};

pub fn bridge_address() -> Address {
    Address::repeat_byte(0xb1)
}

/// Lock event log with `amount = nonce * 100`
pub fn lock_log(block: u64, log_index: Option<u64>, nonce: u64) -> RawLog {
    encode_lock_log(
        block,
        log_index,
        &TokensLocked {
            sender: Address::repeat_byte(0x11),
            recipient: Address::repeat_byte(0x22),
            amount: U256::from(nonce * 100),
            destinationChainId: U256::from(2u64),
            nonce: U256::from(nonce),
        },
    )
}

/// Source chain fake with a settable head and an optional range limit
#[derive(Default)]
pub struct MockChainReader {
    head: Mutex<u64>,
    logs: Mutex<Vec<RawLog>>,
    max_range: Mutex<Option<u64>>,
    fail_head: Mutex<bool>,
    fail_logs: Mutex<bool>,
    head_calls: AtomicUsize,
    log_calls: Mutex<Vec<(u64, u64)>>,
}

impl MockChainReader {
    pub fn new(head: u64, logs: Vec<RawLog>) -> Self {
        Self {
            head: Mutex::new(head),
            logs: Mutex::new(logs),
            ..Default::default()
        }
    }

    pub fn set_head(&self, head: u64) {
        *self.head.lock().unwrap() = head;
    }

    pub fn push_log(&self, log: RawLog) {
        self.logs.lock().unwrap().push(log);
    }

    /// Reject queries wider than `max` blocks with RangeTooLarge
    pub fn set_max_range(&self, max: Option<u64>) {
        *self.max_range.lock().unwrap() = max;
    }

    pub fn set_fail_head(&self, fail: bool) {
        *self.fail_head.lock().unwrap() = fail;
    }

    pub fn set_fail_logs(&self, fail: bool) {
        *self.fail_logs.lock().unwrap() = fail;
    }

    pub fn head_calls(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    pub fn log_calls(&self) -> Vec<(u64, u64)> {
        self.log_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainReader for MockChainReader {
    async fn get_head(&self) -> Result<u64, ChainReadError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_head.lock().unwrap() {
            return Err(ChainReadError::Connectivity("connection refused".into()));
        }
        Ok(*self.head.lock().unwrap())
    }

    async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        _filter: &LogFilter,
    ) -> Result<Vec<RawLog>, ChainReadError> {
        self.log_calls.lock().unwrap().push((from_block, to_block));
        if *self.fail_logs.lock().unwrap() {
            return Err(ChainReadError::Connectivity("request timed out".into()));
        }
        if let Some(max) = *self.max_range.lock().unwrap() {
            if to_block - from_block + 1 > max {
                return Err(ChainReadError::RangeTooLarge {
                    from_block,
                    to_block,
                    message: format!("block range exceeds {}", max),
                });
            }
        }
        // newest first, like some providers
        let mut logs: Vec<RawLog> = self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.block_number >= from_block && l.block_number <= to_block)
            .cloned()
            .collect();
        logs.reverse();
        Ok(logs)
    }
}

/// Sink fake that records every attempt and every delivery
#[derive(Default)]
pub struct RecordingSink {
    attempts: Mutex<Vec<RelayAction>>,
    delivered: Mutex<Vec<RelayAction>>,
    /// 1-based call number that fails once
    fail_on_call: Mutex<Option<usize>>,
    fail_nonces: Mutex<HashSet<U256>>,
    already_relayed: Mutex<HashSet<U256>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on_call(&self, n: usize) {
        *self.fail_on_call.lock().unwrap() = Some(n);
    }

    pub fn fail_nonce(&self, nonce: u64) {
        self.fail_nonces.lock().unwrap().insert(U256::from(nonce));
    }

    pub fn heal_nonce(&self, nonce: u64) {
        self.fail_nonces.lock().unwrap().remove(&U256::from(nonce));
    }

    pub fn mark_already_relayed(&self, nonce: u64) {
        self.already_relayed.lock().unwrap().insert(U256::from(nonce));
    }

    pub fn attempts(&self) -> Vec<RelayAction> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn delivered(&self) -> Vec<RelayAction> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn delivered_nonces(&self) -> Vec<u64> {
        self.delivered()
            .iter()
            .map(|a| a.nonce.to::<u64>())
            .collect()
    }
}

#[async_trait]
impl RelaySink for RecordingSink {
    async fn send(&self, action: &RelayAction) -> Result<SendOutcome, RelaySendError> {
        let call = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(action.clone());
            attempts.len()
        };

        {
            let mut fail_on = self.fail_on_call.lock().unwrap();
            if *fail_on == Some(call) {
                *fail_on = None;
                return Err(RelaySendError::new(action.nonce, "injected failure"));
            }
        }
        if self.fail_nonces.lock().unwrap().contains(&action.nonce) {
            return Err(RelaySendError::new(action.nonce, "execution reverted"));
        }
        if self.already_relayed.lock().unwrap().contains(&action.nonce) {
            return Ok(SendOutcome::AlreadyRelayed);
        }

        self.delivered.lock().unwrap().push(action.clone());
        Ok(SendOutcome::Relayed {
            tx_hash: Some(format!("0x{:064x}", call)),
        })
    }
}

/// Store whose first `failures` saves fail
pub struct FlakyStore {
    inner: MemoryStateStore,
    failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: MemoryStateStore::new(),
            failures: AtomicUsize::new(failures),
        }
    }

    pub fn snapshot(&self) -> Option<RelayState> {
        self.inner.snapshot()
    }
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn load(&self) -> Result<Option<RelayState>, StoreError> {
        self.inner.load().await
    }

    async fn save(&self, state: &RelayState) -> Result<(), StoreError> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Invalid("disk full".into()));
        }
        self.inner.save(state).await
    }

    fn describe(&self) -> String {
        "flaky".to_string()
    }
}

/// Store whose saves never complete while `hang` is set
pub struct HangingStore {
    inner: MemoryStateStore,
    hang: AtomicBool,
}

impl HangingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStateStore::new(),
            hang: AtomicBool::new(true),
        }
    }

    pub fn release(&self) {
        self.hang.store(false, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Option<RelayState> {
        self.inner.snapshot()
    }
}

#[async_trait]
impl StateStore for HangingStore {
    async fn load(&self) -> Result<Option<RelayState>, StoreError> {
        self.inner.load().await
    }

    async fn save(&self, state: &RelayState) -> Result<(), StoreError> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.save(state).await
    }

    fn describe(&self) -> String {
        "hanging".to_string()
    }
}

pub fn settings(margin: u64) -> RelaySettings {
    RelaySettings {
        poll_interval: Duration::from_millis(100),
        reorg_safety_margin: margin,
        max_backoff: Duration::from_millis(800),
        alert_after_failures: 3,
        store_timeout: Duration::from_secs(1),
    }
}

pub struct Harness {
    pub reader: Arc<MockChainReader>,
    pub sink: Arc<RecordingSink>,
    pub store: Arc<MemoryStateStore>,
    pub orchestrator: RelayOrchestrator<MockChainReader>,
}

/// Orchestrator over fresh fakes, starting after `start_block`
pub fn harness(
    head: u64,
    logs: Vec<RawLog>,
    start_block: u64,
    margin: u64,
    max_chunk_size: u64,
) -> Harness {
    harness_with_state(
        head,
        logs,
        RelayState::new(start_block),
        margin,
        max_chunk_size,
    )
}

pub fn harness_with_state(
    head: u64,
    logs: Vec<RawLog>,
    state: RelayState,
    margin: u64,
    max_chunk_size: u64,
) -> Harness {
    let reader = Arc::new(MockChainReader::new(head, logs));
    let sink = Arc::new(RecordingSink::new());
    let store = Arc::new(MemoryStateStore::new());
    let scanner = EventScanner::new(
        reader.clone(),
        lock_event_filter(bridge_address()),
        max_chunk_size,
    );
    let orchestrator = RelayOrchestrator::new(
        scanner,
        sink.clone(),
        store.clone(),
        state,
        settings(margin),
    );
    Harness {
        reader,
        sink,
        store,
        orchestrator,
    }
}
