use serde_json::{json, Value};
use std::time::Duration;
use votechain_models::{Candidate, CandidateIndex, VotingStatus};

use crate::abi::{self, Token};
use crate::provider::{ProviderError, WalletProvider};
use crate::{ChainConfig, ChainError};

/// A wallet connection bound to one account on the expected network.
///
/// Created by [`connect`]; every contract call goes through it, so there is
/// no ambient provider or signer state anywhere else.
#[derive(Debug)]
pub struct ChainSession<P> {
    provider: P,
    account: String,
    chain_id: u64,
    contract: String,
    receipt_poll_interval: Duration,
    receipt_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: String,
    pub block_number: Option<u64>,
}

/// Requests account access and makes sure the wallet is on `config.chain_id`.
///
/// On a mismatch the wallet is asked to switch networks; if that fails the
/// network is added and a second switch is attempted. The chain id is read
/// again afterwards and [`ChainError::WrongNetwork`] is returned if it still
/// differs.
pub async fn connect<P: WalletProvider>(
    provider: P,
    config: &ChainConfig,
) -> Result<ChainSession<P>, ChainError> {
    let contract = config.contract_address.trim().to_string();
    abi::parse_address(&contract).map_err(|e| {
        ChainError::Artifact(format!("contract address not configured or invalid: {e}"))
    })?;

    let accounts = provider
        .request("eth_requestAccounts", json!([]))
        .await
        .map_err(connect_error)?;
    let account = accounts
        .as_array()
        .and_then(|list| list.first())
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(ChainError::WalletRejected)?;

    let mut chain_id = read_chain_id(&provider).await?;
    if chain_id != config.chain_id {
        tracing::warn!(
            expected = config.chain_id,
            actual = chain_id,
            "wallet is on the wrong network, requesting a switch"
        );
        remediate_network(&provider, config).await?;
        chain_id = read_chain_id(&provider).await?;
        if chain_id != config.chain_id {
            return Err(ChainError::WrongNetwork {
                expected: config.chain_id,
                actual: chain_id,
            });
        }
    }

    tracing::info!(account = %account, chain_id, contract = %contract, "wallet connected");
    Ok(ChainSession {
        provider,
        account,
        chain_id,
        contract,
        receipt_poll_interval: config.receipt_poll_interval,
        receipt_timeout: config.receipt_timeout,
    })
}

fn connect_error(err: ProviderError) -> ChainError {
    match err {
        ProviderError::Unavailable(msg) => ChainError::WalletAbsent(msg),
        e if e.is_user_rejection() || e.code() == Some(ProviderError::UNAUTHORIZED) => {
            ChainError::WalletRejected
        }
        e => ChainError::ConnectFailed(e.to_string()),
    }
}

async fn read_chain_id<P: WalletProvider>(provider: &P) -> Result<u64, ChainError> {
    let value = provider
        .request("eth_chainId", json!([]))
        .await
        .map_err(connect_error)?;
    value
        .as_str()
        .and_then(|raw| abi::parse_quantity(raw).ok())
        .ok_or_else(|| ChainError::ConnectFailed(format!("unexpected eth_chainId result: {value}")))
}

async fn switch_chain<P: WalletProvider>(provider: &P, chain_id: u64) -> Result<(), ProviderError> {
    provider
        .request(
            "wallet_switchEthereumChain",
            json!([{ "chainId": abi::format_quantity(chain_id) }]),
        )
        .await
        .map(|_| ())
}

/// Only a user rejection is returned as an error; any other failure is left
/// for the caller's chain id re-check to report.
async fn remediate_network<P: WalletProvider>(
    provider: &P,
    config: &ChainConfig,
) -> Result<(), ChainError> {
    match switch_chain(provider, config.chain_id).await {
        Ok(()) => return Ok(()),
        Err(e) if e.is_user_rejection() => return Err(ChainError::WalletRejected),
        Err(e) => tracing::info!(error = %e, "network switch failed, adding network"),
    }

    let add_params = json!([{
        "chainId": abi::format_quantity(config.chain_id),
        "chainName": config.chain_name,
        "nativeCurrency": { "name": "ETH", "symbol": "ETH", "decimals": 18 },
        "rpcUrls": config.rpc_urls,
        "blockExplorerUrls": config.block_explorer_urls,
    }]);
    if let Err(e) = provider.request("wallet_addEthereumChain", add_params).await {
        if e.is_user_rejection() {
            return Err(ChainError::WalletRejected);
        }
        tracing::warn!(error = %e, "adding network failed");
        return Ok(());
    }

    match switch_chain(provider, config.chain_id).await {
        Err(e) if e.is_user_rejection() => Err(ChainError::WalletRejected),
        Err(e) => {
            tracing::warn!(error = %e, "network switch failed after adding network");
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

impl<P: WalletProvider> ChainSession<P> {
    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn contract_address(&self) -> &str {
        &self.contract
    }

    pub async fn get_candidates(&self) -> Result<Vec<Candidate>, ChainError> {
        let data = self.call(abi::encode_call(abi::GET_CANDIDATES, &[])).await?;
        Ok(abi::decode_candidates(&data)?)
    }

    /// Casts a vote for the poll candidate at `index`; the contract receives
    /// the matching 1-based id.
    pub async fn submit_vote(&self, index: CandidateIndex) -> Result<TxReceipt, ChainError> {
        let chain_id = index.to_chain_id();
        let data = abi::encode_call(abi::VOTE, &[Token::Uint(chain_id.0)]);
        let receipt = self.transact("vote", data).await?;
        tracing::info!(candidate = %chain_id, tx = %receipt.hash, "vote confirmed");
        Ok(receipt)
    }

    pub async fn has_voted(&self, address: &str) -> Result<bool, ChainError> {
        let address = abi::parse_address(address)
            .map_err(|e| ChainError::ContractCallFailed(e.to_string()))?;
        let data = self
            .call(abi::encode_call(abi::VOTERS, &[Token::Address(address)]))
            .await?;
        Ok(abi::decode_bool(&data)?)
    }

    pub async fn get_voting_status(&self) -> Result<VotingStatus, ChainError> {
        let data = self
            .call(abi::encode_call(abi::GET_VOTING_STATUS, &[]))
            .await?;
        Ok(abi::decode_voting_status(&data)?)
    }

    pub async fn add_candidate(&self, name: &str) -> Result<TxReceipt, ChainError> {
        let data = abi::encode_call(abi::ADD_CANDIDATE, &[Token::Str(name.to_string())]);
        self.transact("addCandidate", data).await
    }

    pub async fn start_voting(&self) -> Result<TxReceipt, ChainError> {
        self.transact("startVoting", abi::encode_call(abi::START_VOTING, &[]))
            .await
    }

    pub async fn end_voting(&self) -> Result<TxReceipt, ChainError> {
        self.transact("endVoting", abi::encode_call(abi::END_VOTING, &[]))
            .await
    }

    pub async fn owner(&self) -> Result<String, ChainError> {
        let data = self.call(abi::encode_call(abi::OWNER, &[])).await?;
        Ok(abi::decode_address(&data)?)
    }

    async fn call(&self, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        let result = self
            .provider
            .request(
                "eth_call",
                json!([
                    { "from": self.account, "to": self.contract, "data": abi::encode_hex(&data) },
                    "latest"
                ]),
            )
            .await
            .map_err(ChainError::from_contract_call)?;
        let raw = result.as_str().ok_or_else(|| {
            ChainError::ContractCallFailed(format!("unexpected eth_call result: {result}"))
        })?;
        let bytes = abi::decode_hex(raw)?;
        if bytes.is_empty() {
            return Err(ChainError::ContractCallFailed(format!(
                "empty return data, is a contract deployed at {}?",
                self.contract
            )));
        }
        Ok(bytes)
    }

    async fn transact(&self, function: &str, data: Vec<u8>) -> Result<TxReceipt, ChainError> {
        let result = self
            .provider
            .request(
                "eth_sendTransaction",
                json!([{ "from": self.account, "to": self.contract, "data": abi::encode_hex(&data) }]),
            )
            .await
            .map_err(ChainError::from_contract_call)?;
        let hash = result
            .as_str()
            .ok_or_else(|| {
                ChainError::ContractCallFailed(format!("unexpected transaction hash: {result}"))
            })?
            .to_string();
        tracing::info!(function, tx = %hash, "transaction sent");
        self.wait_for_receipt(hash).await
    }

    async fn wait_for_receipt(&self, hash: String) -> Result<TxReceipt, ChainError> {
        let deadline = tokio::time::Instant::now() + self.receipt_timeout;
        loop {
            let receipt = self
                .provider
                .request("eth_getTransactionReceipt", json!([hash]))
                .await
                .map_err(ChainError::from_contract_call)?;

            if !receipt.is_null() {
                let status = receipt
                    .get("status")
                    .and_then(Value::as_str)
                    .map(abi::parse_quantity)
                    .transpose()?;
                let block_number = receipt
                    .get("blockNumber")
                    .and_then(Value::as_str)
                    .map(abi::parse_quantity)
                    .transpose()?;
                if status == Some(0) {
                    return Err(ChainError::ContractCallFailed(format!(
                        "transaction {hash} reverted"
                    )));
                }
                return Ok(TxReceipt { hash, block_number });
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(ChainError::ContractCallFailed(format!(
                    "timed out waiting for receipt of {hash}"
                )));
            }
            tokio::time::sleep(self.receipt_poll_interval).await;
        }
    }
}
