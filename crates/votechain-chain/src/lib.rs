pub mod abi;
pub mod artifact;
pub mod provider;
pub mod session;

pub use artifact::ContractArtifact;
pub use provider::{ProviderError, RpcWallet, WalletProvider};
pub use session::{connect, ChainSession, TxReceipt};

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("no wallet provider available: {0}")]
    WalletAbsent(String),
    #[error("request rejected in wallet")]
    WalletRejected,
    #[error("wrong network: expected chain id {expected}, wallet is on {actual}")]
    WrongNetwork { expected: u64, actual: u64 },
    #[error("wallet connection failed: {0}")]
    ConnectFailed(String),
    #[error("contract call failed: {0}")]
    ContractCallFailed(String),
    #[error("contract artifact: {0}")]
    Artifact(String),
}

impl From<abi::AbiError> for ChainError {
    fn from(e: abi::AbiError) -> Self {
        ChainError::ContractCallFailed(format!("undecodable response: {e}"))
    }
}

impl ChainError {
    /// Maps a provider failure during a contract call.
    pub(crate) fn from_contract_call(err: ProviderError) -> Self {
        match err {
            ProviderError::Unavailable(msg) => ChainError::WalletAbsent(msg),
            e if e.is_user_rejection() => ChainError::WalletRejected,
            ProviderError::Rpc { message, .. } => ChainError::ContractCallFailed(message),
        }
    }

    /// Transient failures worth retrying: the provider could not be reached.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::WalletAbsent(_))
    }
}

/// Network the wallet must be on, plus what to offer when adding it.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub chain_name: String,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
    pub contract_address: String,
    pub receipt_poll_interval: Duration,
    pub receipt_timeout: Duration,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 1337,
            chain_name: "Hardhat Local Network".to_string(),
            rpc_urls: vec!["http://127.0.0.1:8545".to_string()],
            block_explorer_urls: Vec::new(),
            contract_address: String::new(),
            receipt_poll_interval: Duration::from_millis(500),
            receipt_timeout: Duration::from_secs(120),
        }
    }
}
