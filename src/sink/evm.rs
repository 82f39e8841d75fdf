//! EVM sink - submits mintTokens transactions to the destination bridge
//!
//! Each action is first simulated with eth_call so a nonce the destination
//! already minted for is detected without spending gas. Only that
//! simulation may report [`SendOutcome::AlreadyRelayed`].

use std::str::FromStr;
use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use tracing::{debug, error, info, warn};

use super::{classify_send_error, RelaySink, SendErrorClass, SendOutcome};
use crate::contracts::DestinationBridge;
use crate::error::RelaySendError;
use crate::types::RelayAction;

pub struct EvmRelaySink {
    rpc_url: String,
    bridge_address: Address,
    signer: PrivateKeySigner,
    rpc_timeout: Duration,
    receipt_timeout: Duration,
}

impl EvmRelaySink {
    pub fn new(
        rpc_url: &str,
        bridge_address: &str,
        private_key: &str,
        rpc_timeout: Duration,
        receipt_timeout: Duration,
    ) -> Result<Self> {
        let _: Url = rpc_url.parse().wrap_err("Invalid destination RPC URL")?;
        let bridge_address =
            Address::from_str(bridge_address).wrap_err("Invalid destination bridge address")?;
        let signer: PrivateKeySigner = private_key.parse().wrap_err("Invalid private key")?;

        info!(
            relayer_address = %signer.address(),
            bridge_address = %bridge_address,
            "EVM relay sink initialized"
        );

        Ok(Self {
            rpc_url: rpc_url.to_string(),
            bridge_address,
            signer,
            rpc_timeout,
            receipt_timeout,
        })
    }

    pub fn relayer_address(&self) -> Address {
        self.signer.address()
    }

    /// Startup health check against the destination endpoint
    pub async fn check_connectivity(&self) -> Result<u64> {
        let provider =
            ProviderBuilder::new().on_http(self.rpc_url.parse().wrap_err("Invalid RPC URL")?);
        let chain_id = tokio::time::timeout(self.rpc_timeout, provider.get_chain_id())
            .await
            .map_err(|_| eyre!("Timed out reaching destination RPC {}", self.rpc_url))?
            .wrap_err_with(|| format!("Destination RPC {} failed health check", self.rpc_url))?;
        Ok(chain_id)
    }

    fn send_error(&self, action: &RelayAction, message: String) -> RelaySendError {
        let class = classify_send_error(&message);
        if class == SendErrorClass::Permanent {
            error!(
                nonce = %action.nonce,
                error = %message,
                "Destination rejected mint; operator attention required"
            );
        }
        RelaySendError::new(action.nonce, format!("{:?}: {}", class, message))
    }
}

#[async_trait]
impl RelaySink for EvmRelaySink {
    async fn send(&self, action: &RelayAction) -> Result<SendOutcome, RelaySendError> {
        let recipient = Address::from_str(&action.recipient).map_err(|_| {
            RelaySendError::new(
                action.nonce,
                format!("invalid recipient address: {}", action.recipient),
            )
        })?;

        let url: Url = self
            .rpc_url
            .parse()
            .map_err(|e| RelaySendError::new(action.nonce, format!("invalid RPC URL: {}", e)))?;
        let wallet = EthereumWallet::from(self.signer.clone());
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(url);
        let contract = DestinationBridge::new(self.bridge_address, &provider);
        let call = contract.mintTokens(recipient, action.amount, action.nonce);

        // Simulate first
        match tokio::time::timeout(self.rpc_timeout, call.call()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                let message = e.to_string();
                if classify_send_error(&message) == SendErrorClass::AlreadyRelayed {
                    info!(nonce = %action.nonce, "Destination already minted for nonce");
                    return Ok(SendOutcome::AlreadyRelayed);
                }
                return Err(self.send_error(action, format!("simulation failed: {}", message)));
            }
            Err(_) => {
                return Err(self.send_error(action, "simulation timed out".to_string()));
            }
        }

        debug!(
            nonce = %action.nonce,
            recipient = %recipient,
            amount = %action.amount,
            "Submitting mintTokens"
        );

        let pending = match tokio::time::timeout(self.rpc_timeout, call.send()).await {
            Ok(Ok(pending)) => pending,
            // The simulation just passed, so this is about our own transaction,
            // never the bridge nonce. The next simulation settles it.
            Ok(Err(e)) => {
                return Err(self.send_error(action, format!("failed to send transaction: {}", e)))
            }
            Err(_) => return Err(self.send_error(action, "send timed out".to_string())),
        };

        let tx_hash = *pending.tx_hash();
        info!(nonce = %action.nonce, tx_hash = %tx_hash, "Mint sent, waiting for confirmation");

        let receipt = match tokio::time::timeout(self.receipt_timeout, pending.get_receipt()).await
        {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                return Err(self.send_error(action, format!("failed to get receipt: {}", e)))
            }
            Err(_) => {
                warn!(nonce = %action.nonce, tx_hash = %tx_hash, "Timed out waiting for receipt");
                return Err(self.send_error(
                    action,
                    format!("receipt for {} not received in time", tx_hash),
                ));
            }
        };

        if !receipt.status() {
            return Err(self.send_error(action, format!("transaction {} reverted", tx_hash)));
        }

        Ok(SendOutcome::Relayed {
            tx_hash: Some(format!("{:?}", tx_hash)),
        })
    }
}
