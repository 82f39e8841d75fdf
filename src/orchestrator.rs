//! The relay loop.
//!
//! Each iteration computes the safe window behind the chain head, scans it,
//! skips nonces that were already relayed, hands the rest to the sink in
//! order and only then advances the block cursor. A failure anywhere leaves
//! the cursor where it was, so the next iteration retries the same window.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, error, info, warn};

use crate::api::SharedStats;
use crate::backoff::PollBackoff;
use crate::error::{IterationError, RelaySendError, StoreError};
use crate::metrics;
use crate::reader::ChainReader;
use crate::scanner::EventScanner;
use crate::sink::{RelaySink, SendOutcome};
use crate::state::{RelayState, StateStore};
use crate::types::{RelayAction, ScanWindow};

/// Loop tuning
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub poll_interval: Duration,
    pub reorg_safety_margin: u64,
    pub max_backoff: Duration,
    /// Failures of the same nonce before every further failure is an alert
    pub alert_after_failures: u32,
    /// Upper bound on one checkpoint save
    pub store_timeout: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(15_000),
            reorg_safety_margin: 12,
            max_backoff: Duration::from_millis(60_000),
            alert_after_failures: 5,
            store_timeout: Duration::from_millis(10_000),
        }
    }
}

/// What a single iteration did
#[derive(Debug)]
pub enum IterationOutcome {
    /// The safe head has not moved past the last processed block
    Idle { head: u64, safe_head: u64 },
    /// Every new action in the window was relayed and the cursor advanced
    Completed {
        window: ScanWindow,
        relayed: usize,
        skipped: usize,
    },
    /// The sink failed; the cursor stays put and the window is retried
    Halted {
        window: ScanWindow,
        relayed: usize,
        skipped: usize,
        failed_nonce: U256,
        error: RelaySendError,
    },
}

impl IterationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            IterationOutcome::Idle { .. } => "idle",
            IterationOutcome::Completed { .. } => "completed",
            IterationOutcome::Halted { .. } => "halted",
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, IterationOutcome::Halted { .. })
    }
}

/// Window of blocks that are at least `margin` blocks behind `head` and
/// newer than `last_processed_block`. Empty when there is nothing to do.
pub fn safe_window(last_processed_block: u64, head: u64, margin: u64) -> ScanWindow {
    ScanWindow::new(
        last_processed_block.saturating_add(1),
        head.saturating_sub(margin),
    )
}

pub struct RelayOrchestrator<R: ChainReader> {
    scanner: EventScanner<R>,
    sink: Arc<dyn RelaySink>,
    store: Arc<dyn StateStore>,
    state: RelayState,
    settings: RelaySettings,
    backoff: PollBackoff,
    stats: SharedStats,
    consecutive_failures: u32,
    stuck_nonce: Option<(U256, u32)>,
    /// State changed since the last successful save
    dirty: bool,
}

impl<R: ChainReader> RelayOrchestrator<R> {
    pub fn new(
        scanner: EventScanner<R>,
        sink: Arc<dyn RelaySink>,
        store: Arc<dyn StateStore>,
        state: RelayState,
        settings: RelaySettings,
    ) -> Self {
        let backoff = PollBackoff::new(settings.poll_interval, settings.max_backoff);
        let stats = SharedStats::default();
        metrics::record_state(state.last_processed_block(), state.processed_nonces().len());
        Self {
            scanner,
            sink,
            store,
            state,
            settings,
            backoff,
            stats,
            consecutive_failures: 0,
            stuck_nonce: None,
            dirty: false,
        }
    }

    /// Publish status into `stats` instead of a private handle
    pub fn with_stats(mut self, stats: SharedStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> SharedStats {
        self.stats.clone()
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Consecutive send failures of the nonce currently blocking the batch
    pub fn stuck_nonce_failures(&self) -> u32 {
        self.stuck_nonce.map(|(_, count)| count).unwrap_or(0)
    }

    /// Delay before the next iteration given the current failure streak
    pub fn next_delay(&self) -> Duration {
        self.backoff.delay_after(self.consecutive_failures)
    }

    /// Run until a shutdown message arrives (or the sender is dropped).
    ///
    /// Shutdown is checked before each iteration and while sleeping; an
    /// iteration that has started always runs to completion.
    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) {
        info!(
            start_after_block = self.state.last_processed_block(),
            processed_nonces = self.state.processed_nonces().len(),
            reorg_safety_margin = self.settings.reorg_safety_margin,
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            store = %self.store.describe(),
            "Relay loop starting"
        );

        loop {
            match shutdown.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            // Errors are logged and recorded inside
            let _ = self.run_iteration().await;

            let delay = self.next_delay();
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        // Last attempt to persist anything a failed save left behind
        self.checkpoint().await;
        info!(
            last_processed_block = self.state.last_processed_block(),
            "Relay loop stopped"
        );
    }

    /// One full COMPUTE_WINDOW .. ADVANCE_STATE pass, followed by a
    /// checkpoint and a stats update. Never sleeps.
    pub async fn run_iteration(&mut self) -> Result<IterationOutcome, IterationError> {
        let result = self.execute().await;

        self.checkpoint().await;
        self.record_result(&result).await;
        result
    }

    async fn execute(&mut self) -> Result<IterationOutcome, IterationError> {
        let head = self
            .scanner
            .reader()
            .get_head()
            .await
            .map_err(IterationError::Head)?;
        let safe_head = head.saturating_sub(self.settings.reorg_safety_margin);
        metrics::record_heads(head, safe_head);
        {
            let mut stats = self.stats.write().await;
            stats.chain_head = Some(head);
            stats.safe_head = Some(safe_head);
        }

        let window = safe_window(
            self.state.last_processed_block(),
            head,
            self.settings.reorg_safety_margin,
        );
        if window.is_empty() {
            debug!(
                head,
                safe_head,
                last_processed_block = self.state.last_processed_block(),
                "No new finalized blocks"
            );
            return Ok(IterationOutcome::Idle { head, safe_head });
        }

        let events = self.scanner.scan(window).await?;

        let mut relayed = 0;
        let mut skipped = 0;
        for event in &events {
            // Also catches a nonce repeated inside this window
            if self.state.is_processed(&event.nonce) {
                debug!(
                    nonce = %event.nonce,
                    block = event.block_number,
                    "Nonce already relayed, skipping"
                );
                metrics::record_duplicate_skipped();
                skipped += 1;
                continue;
            }

            let action = RelayAction::from(event);
            match self.sink.send(&action).await {
                Ok(outcome) => {
                    self.on_relayed(&action, &outcome);
                    relayed += 1;
                }
                Err(error) => {
                    self.on_send_failure(&action, &window, &error);
                    return Ok(IterationOutcome::Halted {
                        window,
                        relayed,
                        skipped,
                        failed_nonce: action.nonce,
                        error,
                    });
                }
            }
        }

        if self.state.advance_to(window.to_block) {
            self.dirty = true;
        }
        info!(
            from_block = window.from_block,
            to_block = window.to_block,
            relayed,
            skipped,
            "Window processed"
        );

        Ok(IterationOutcome::Completed {
            window,
            relayed,
            skipped,
        })
    }

    fn on_relayed(&mut self, action: &RelayAction, outcome: &SendOutcome) {
        if self.state.mark_processed(action.nonce) {
            self.dirty = true;
        }
        if matches!(self.stuck_nonce, Some((nonce, _)) if nonce == action.nonce) {
            info!(nonce = %action.nonce, "Previously failing nonce relayed");
            self.stuck_nonce = None;
            metrics::set_stuck_nonce_failures(0);
        }

        match outcome {
            SendOutcome::Relayed { tx_hash } => {
                metrics::record_relay(false);
                info!(
                    nonce = %action.nonce,
                    recipient = %action.recipient,
                    amount = %action.amount,
                    source_block = action.source_block_number,
                    tx_hash = tx_hash.as_deref().unwrap_or("-"),
                    "Mint relayed"
                );
            }
            SendOutcome::AlreadyRelayed => {
                metrics::record_relay(true);
                info!(
                    nonce = %action.nonce,
                    source_block = action.source_block_number,
                    "Mint already present on destination"
                );
            }
        }
    }

    fn on_send_failure(&mut self, action: &RelayAction, window: &ScanWindow, err: &RelaySendError) {
        let count = match self.stuck_nonce {
            Some((nonce, count)) if nonce == action.nonce => count.saturating_add(1),
            _ => 1,
        };
        self.stuck_nonce = Some((action.nonce, count));
        metrics::set_stuck_nonce_failures(count);
        metrics::record_error("send");

        if count >= self.settings.alert_after_failures {
            error!(
                nonce = %action.nonce,
                source_block = action.source_block_number,
                from_block = window.from_block,
                to_block = window.to_block,
                failures = count,
                error = %err,
                "ALERT: relay is stuck on nonce"
            );
        } else {
            warn!(
                nonce = %action.nonce,
                source_block = action.source_block_number,
                from_block = window.from_block,
                to_block = window.to_block,
                failures = count,
                error = %err,
                "Relay failed, batch halted until next poll"
            );
        }
    }

    async fn checkpoint(&mut self) {
        if !self.dirty {
            return;
        }
        let saved = tokio::time::timeout(self.settings.store_timeout, self.store.save(&self.state))
            .await
            .unwrap_or_else(|_| {
                Err(StoreError::Invalid(format!(
                    "save timed out after {}ms",
                    self.settings.store_timeout.as_millis()
                )))
            });
        match saved {
            Ok(()) => {
                self.dirty = false;
                debug!(
                    last_processed_block = self.state.last_processed_block(),
                    store = %self.store.describe(),
                    "Relay state saved"
                );
            }
            Err(e) => {
                metrics::record_error("store");
                error!(
                    store = %self.store.describe(),
                    error = %e,
                    "Failed to save relay state, will retry after next iteration"
                );
            }
        }
    }

    async fn record_result(&mut self, result: &Result<IterationOutcome, IterationError>) {
        let last_error = match result {
            Ok(outcome) => {
                metrics::record_iteration(outcome.label());
                if outcome.is_success() {
                    self.consecutive_failures = 0;
                    metrics::record_successful_poll();
                    None
                } else {
                    self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                    match outcome {
                        IterationOutcome::Halted { error, .. } => Some(error.to_string()),
                        _ => None,
                    }
                }
            }
            Err(e) => {
                metrics::record_iteration("error");
                metrics::record_error(e.kind());
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                warn!(
                    error = %e,
                    last_processed_block = self.state.last_processed_block(),
                    consecutive_failures = self.consecutive_failures,
                    "Iteration aborted, window will be retried"
                );
                Some(e.to_string())
            }
        };

        metrics::set_consecutive_failures(self.consecutive_failures);
        metrics::record_state(
            self.state.last_processed_block(),
            self.state.processed_nonces().len(),
        );

        let mut stats = self.stats.write().await;
        stats.last_processed_block = self.state.last_processed_block();
        stats.processed_nonces = self.state.processed_nonces().len();
        stats.consecutive_failures = self.consecutive_failures;
        stats.stuck_nonce = self
            .stuck_nonce
            .map(|(nonce, count)| (nonce.to_string(), count));
        if last_error.is_none() {
            stats.last_successful_poll = Some(chrono::Utc::now());
        }
        stats.last_error = last_error;
    }
}

impl<R: ChainReader> std::fmt::Debug for RelayOrchestrator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayOrchestrator")
            .field("state", &self.state)
            .field("settings", &self.settings)
            .field("consecutive_failures", &self.consecutive_failures)
            .field("stuck_nonce", &self.stuck_nonce)
            .finish()
    }
}
