//! alloy-backed [`ChainReader`] with RPC fallback and per-call timeouts

use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Filter, Log};
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ChainReader, LogFilter};
use crate::error::ChainReadError;
use crate::types::RawLog;

/// Substrings providers use when rejecting an eth_getLogs range.
/// Matched case-insensitively.
const RANGE_LIMIT_MARKERS: &[&str] = &[
    "block range too large",
    "block range is too large",
    "block range exceeds",
    "block range limit",
    "range too large",
    "range is too large",
    "exceed maximum block range",
    "exceeds maximum block range",
    "max block range",
    "query returned more than",
    "more than 10000 results",
    "too many results",
    "log response size exceeded",
    "response size exceeded",
];

/// Throttling messages. These say nothing about the range and must move on
/// to the next endpoint.
const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "ratelimit",
    "too many requests",
    "request limit",
];

/// Whether an RPC error message means "split the range and try again"
pub fn is_range_limit_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    if RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m)) {
        return false;
    }
    RANGE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}

/// Map a failed eth_getLogs call on `url` to a reader error
pub fn classify_logs_error(
    url: &str,
    from_block: u64,
    to_block: u64,
    message: String,
) -> ChainReadError {
    if is_range_limit_error(&message) {
        ChainReadError::RangeTooLarge {
            from_block,
            to_block,
            message,
        }
    } else {
        ChainReadError::Connectivity(format!("{}: {}", url, message))
    }
}

/// Parse a comma-separated RPC URL string into individual trimmed URLs.
pub fn parse_rpc_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Create alloy HTTP providers for each RPC URL.
pub fn create_providers(urls: &[String]) -> Result<Vec<RootProvider<Http<Client>>>> {
    if urls.is_empty() {
        return Err(eyre!("At least one RPC URL is required"));
    }
    urls.iter()
        .map(|url| {
            let parsed = url
                .parse()
                .wrap_err_with(|| format!("Invalid RPC URL: {}", url))?;
            Ok(ProviderBuilder::new().on_http(parsed))
        })
        .collect()
}

/// Source chain reader over one or more EVM JSON-RPC endpoints.
///
/// Providers are tried in configuration order; the first success wins.
/// Range-limit errors are returned immediately since another endpoint will
/// not help the scanner more than splitting the range will.
pub struct EvmChainReader {
    providers: Vec<RootProvider<Http<Client>>>,
    urls: Vec<String>,
    timeout: Duration,
}

impl EvmChainReader {
    pub fn new(urls: &[String], timeout: Duration) -> Result<Self> {
        let providers = create_providers(urls)?;
        Ok(Self {
            providers,
            urls: urls.to_vec(),
            timeout,
        })
    }

    /// Startup health check: every endpoint must answer eth_chainId.
    /// Returns the chain id reported by the primary endpoint.
    pub async fn check_connectivity(&self) -> Result<u64> {
        let mut primary = None;
        for (provider, url) in self.providers.iter().zip(&self.urls) {
            let chain_id = tokio::time::timeout(self.timeout, provider.get_chain_id())
                .await
                .map_err(|_| eyre!("Timed out reaching RPC endpoint {}", url))?
                .wrap_err_with(|| format!("RPC endpoint {} failed health check", url))?;
            debug!(url = %url, chain_id, "RPC endpoint reachable");
            primary.get_or_insert(chain_id);
        }
        primary.ok_or_else(|| eyre!("No RPC endpoints configured"))
    }

    async fn with_timeout<T, E, F>(&self, url: &str, fut: F) -> Result<T, ChainReadError>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ChainReadError::Connectivity(format!("{}: {}", url, e))),
            Err(_) => Err(ChainReadError::Connectivity(format!(
                "{}: timed out after {}ms",
                url,
                self.timeout.as_millis()
            ))),
        }
    }
}

fn to_raw_log(log: Log) -> Result<RawLog, ChainReadError> {
    let block_number = log.block_number.ok_or_else(|| {
        ChainReadError::Connectivity("provider returned a pending log without block number".into())
    })?;
    Ok(RawLog {
        block_number,
        log_index: log.log_index,
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
    })
}

#[async_trait]
impl ChainReader for EvmChainReader {
    async fn get_head(&self) -> Result<u64, ChainReadError> {
        let mut last_err = None;
        for (provider, url) in self.providers.iter().zip(&self.urls) {
            match self.with_timeout(url, provider.get_block_number()).await {
                Ok(head) => return Ok(head),
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to get block number, trying next RPC");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| ChainReadError::Connectivity("no RPC endpoints configured".into())))
    }

    async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        filter: &LogFilter,
    ) -> Result<Vec<RawLog>, ChainReadError> {
        let rpc_filter = Filter::new()
            .address(filter.address)
            .event_signature(filter.event_signature)
            .from_block(from_block)
            .to_block(to_block);

        let mut last_err = None;
        for (provider, url) in self.providers.iter().zip(&self.urls) {
            match tokio::time::timeout(self.timeout, provider.get_logs(&rpc_filter)).await {
                Ok(Ok(logs)) => return logs.into_iter().map(to_raw_log).collect(),
                Ok(Err(e)) => match classify_logs_error(url, from_block, to_block, e.to_string()) {
                    range @ ChainReadError::RangeTooLarge { .. } => return Err(range),
                    err => {
                        warn!(
                            url = %url,
                            from_block,
                            to_block,
                            error = %err,
                            "Failed to get logs, trying next RPC"
                        );
                        last_err = Some(err);
                    }
                },
                Err(_) => {
                    warn!(url = %url, from_block, to_block, "get_logs timed out, trying next RPC");
                    last_err = Some(ChainReadError::Connectivity(format!(
                        "{}: get_logs timed out after {}ms",
                        url,
                        self.timeout.as_millis()
                    )));
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| ChainReadError::Connectivity("no RPC endpoints configured".into())))
    }
}
