//! Event scanner: turns one scan window into an ordered list of lock events.
//!
//! Windows wider than the configured chunk size are split into contiguous
//! sub-windows and scanned in ascending order. A provider that still rejects
//! a sub-window as too large gets it halved until the query fits. Any failure
//! aborts the whole scan so a chunk is never silently dropped.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::contracts::decode_lock_log;
use crate::error::{ChainReadError, ScanError};
use crate::metrics;
use crate::reader::{ChainReader, LogFilter};
use crate::types::{ChainEvent, ScanWindow};

pub struct EventScanner<R: ChainReader> {
    reader: Arc<R>,
    filter: LogFilter,
    max_chunk_size: u64,
}

impl<R: ChainReader> EventScanner<R> {
    pub fn new(reader: Arc<R>, filter: LogFilter, max_chunk_size: u64) -> Self {
        Self {
            reader,
            filter,
            max_chunk_size: max_chunk_size.max(1),
        }
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    /// Scan `window` for lock events.
    ///
    /// The result is ordered by block number, then log index, then nonce.
    /// An empty window returns immediately without querying the reader.
    pub async fn scan(&self, window: ScanWindow) -> Result<Vec<ChainEvent>, ScanError> {
        if window.is_empty() {
            return Ok(Vec::new());
        }

        let chunks = window.chunks(self.max_chunk_size);
        info!(
            from_block = window.from_block,
            to_block = window.to_block,
            chunks = chunks.len(),
            "Scanning for TokensLocked events"
        );

        let mut events = Vec::new();
        for chunk in chunks {
            let chunk_events = self.scan_chunk(chunk).await?;
            if !chunk_events.is_empty() {
                info!(
                    from_block = chunk.from_block,
                    to_block = chunk.to_block,
                    count = chunk_events.len(),
                    "Found lock event(s)"
                );
            }
            events.extend(chunk_events);
        }

        if events.is_empty() {
            debug!(%window, "No lock events in window");
        }
        metrics::record_events_scanned(events.len());
        Ok(events)
    }

    /// Scan one sub-window, halving it while the provider reports the range
    /// as too large. Halves are processed left to right, so the output stays
    /// in ascending block order.
    async fn scan_chunk(&self, chunk: ScanWindow) -> Result<Vec<ChainEvent>, ScanError> {
        let mut pending = vec![chunk];
        let mut events = Vec::new();

        while let Some(current) = pending.pop() {
            metrics::record_chunk_query();
            let logs = match self
                .reader
                .get_logs(current.from_block, current.to_block, &self.filter)
                .await
            {
                Ok(logs) => logs,
                Err(ChainReadError::RangeTooLarge { message, .. }) => match current.split() {
                    Some((left, right)) => {
                        warn!(
                            from_block = current.from_block,
                            to_block = current.to_block,
                            error = %message,
                            "Provider rejected range, splitting"
                        );
                        metrics::record_range_split();
                        // stack: push right first so left is scanned next
                        pending.push(right);
                        pending.push(left);
                        continue;
                    }
                    None => {
                        return Err(ScanError::Provider {
                            window: current,
                            message: format!(
                                "single-block query rejected as too large: {}",
                                message
                            ),
                        });
                    }
                },
                Err(source) => {
                    return Err(ScanError::Read {
                        window: current,
                        source,
                    })
                }
            };

            let mut decoded = Vec::with_capacity(logs.len());
            for log in &logs {
                if !current.contains(log.block_number) {
                    return Err(ScanError::Provider {
                        window: current,
                        message: format!(
                            "log at block {} outside requested range",
                            log.block_number
                        ),
                    });
                }
                decoded.push(decode_lock_log(log)?);
            }
            decoded.sort_by_key(ChainEvent::sort_key);
            events.extend(decoded);
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::source_bridge::{encode_lock_log, TokensLocked};
    use crate::types::RawLog;
    use alloy::primitives::{Address, U256};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StaticReader {
        logs: Vec<RawLog>,
        max_range: Option<u64>,
        calls: Mutex<Vec<(u64, u64)>>,
    }

    #[async_trait]
    impl ChainReader for StaticReader {
        async fn get_head(&self) -> Result<u64, ChainReadError> {
            Ok(0)
        }

        async fn get_logs(
            &self,
            from_block: u64,
            to_block: u64,
            _filter: &LogFilter,
        ) -> Result<Vec<RawLog>, ChainReadError> {
            self.calls.lock().unwrap().push((from_block, to_block));
            if let Some(max) = self.max_range {
                if to_block - from_block + 1 > max {
                    return Err(ChainReadError::RangeTooLarge {
                        from_block,
                        to_block,
                        message: "block range too large".into(),
                    });
                }
            }
            // reversed to check the scanner does its own ordering
            Ok(self
                .logs
                .iter()
                .rev()
                .filter(|l| l.block_number >= from_block && l.block_number <= to_block)
                .cloned()
                .collect())
        }
    }

    fn lock_log(block: u64, log_index: Option<u64>, nonce: u64) -> RawLog {
        encode_lock_log(
            block,
            log_index,
            &TokensLocked {
                sender: Address::repeat_byte(1),
                recipient: Address::repeat_byte(2),
                amount: U256::from(1000u64),
                destinationChainId: U256::from(1u64),
                nonce: U256::from(nonce),
            },
        )
    }

    fn scanner(logs: Vec<RawLog>, max_range: Option<u64>, chunk: u64) -> EventScanner<StaticReader> {
        let reader = StaticReader {
            logs,
            max_range,
            calls: Mutex::new(Vec::new()),
        };
        let filter = crate::contracts::lock_event_filter(Address::repeat_byte(9));
        EventScanner::new(Arc::new(reader), filter, chunk)
    }

    #[tokio::test]
    async fn test_empty_window_issues_no_query() {
        let s = scanner(vec![lock_log(5, Some(0), 1)], None, 10);
        let events = s.scan(ScanWindow::new(6, 5)).await.unwrap();
        assert!(events.is_empty());
        assert!(s.reader().calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_orders_within_block_by_log_index_then_nonce() {
        let logs = vec![
            lock_log(10, Some(2), 30),
            lock_log(10, Some(1), 40),
            lock_log(9, None, 8),
            lock_log(9, None, 5),
        ];
        let s = scanner(logs, None, 100);
        let events = s.scan(ScanWindow::new(1, 20)).await.unwrap();
        let nonces: Vec<u64> = events.iter().map(|e| e.nonce.to::<u64>()).collect();
        assert_eq!(nonces, vec![5, 8, 40, 30]);
    }

    #[tokio::test]
    async fn test_chunk_queries_are_contiguous() {
        let s = scanner(vec![], None, 10);
        s.scan(ScanWindow::new(1, 25)).await.unwrap();
        let calls = s.reader().calls.lock().unwrap().clone();
        assert_eq!(calls, vec![(1, 10), (11, 20), (21, 25)]);
    }

    #[tokio::test]
    async fn test_range_too_large_is_split_not_surfaced() {
        let logs = vec![lock_log(3, Some(0), 1), lock_log(8, Some(0), 2), lock_log(16, Some(0), 3)];
        let s = scanner(logs, Some(4), 16);
        let events = s.scan(ScanWindow::new(1, 16)).await.unwrap();
        let nonces: Vec<u64> = events.iter().map(|e| e.nonce.to::<u64>()).collect();
        assert_eq!(nonces, vec![1, 2, 3]);

        let calls = s.reader().calls.lock().unwrap().clone();
        assert_eq!(calls[0], (1, 16));
        assert!(calls.contains(&(1, 4)));
        assert!(calls.contains(&(13, 16)));
    }

    #[tokio::test]
    async fn test_single_block_range_rejection_is_provider_error() {
        let s = scanner(vec![], Some(0), 4);
        let err = s.scan(ScanWindow::new(1, 2)).await.unwrap_err();
        assert!(matches!(err, ScanError::Provider { .. }));
    }

    #[tokio::test]
    async fn test_undecodable_log_aborts_scan() {
        let mut bad = lock_log(4, Some(0), 1);
        bad.data = alloy::primitives::Bytes::from_static(&[0u8; 3]);
        let s = scanner(vec![lock_log(2, Some(0), 9), bad], None, 100);
        let err = s.scan(ScanWindow::new(1, 10)).await.unwrap_err();
        assert!(matches!(err, ScanError::Decode { block_number: 4, .. }));
    }
}
