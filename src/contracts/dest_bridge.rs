//! Destination bridge ABI definition
//!
//! Uses alloy's sol! macro to generate type-safe bindings for the mint side.

use alloy::sol;

sol! {
    /// Destination bridge contract interface
    #[sol(rpc)]
    contract DestinationBridge {
        /// Mint the wrapped representation of a source-chain lock.
        /// The contract rejects a `sourceNonce` it has already minted for.
        function mintTokens(address recipient, uint256 amount, uint256 sourceNonce) external;
    }
}
