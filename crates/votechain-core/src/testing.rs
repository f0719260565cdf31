//! Shared fixtures for the crate's tests.

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use votechain_chain::abi::{self, encode_hex, format_quantity};
use votechain_chain::{connect, ChainConfig, ChainSession, ProviderError, WalletProvider};
use votechain_models::{AuthUser, NewPoll, Poll, PollStatus};
use votechain_store::{DocumentStore, SqlStore};

pub const ACCOUNT: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
pub const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

pub async fn test_store() -> SqlStore {
    SqlStore::connect("sqlite::memory:", 1)
        .await
        .expect("store")
}

pub fn user(uid: &str, email: &str) -> AuthUser {
    AuthUser {
        uid: uid.to_string(),
        display_name: None,
        email: Some(email.to_string()),
        id_token: "token".to_string(),
        expires_at: Utc::now() + Duration::hours(1),
    }
}

pub fn new_poll(title: &str, candidates: &[&str]) -> NewPoll {
    let start = Utc::now();
    NewPoll {
        title: title.to_string(),
        description: String::new(),
        candidates: candidates.iter().map(|c| c.to_string()).collect(),
        start_date: start,
        end_date: start + Duration::days(1),
        created_by: "admin".to_string(),
    }
}

pub async fn poll_with_status(
    store: &SqlStore,
    title: &str,
    candidates: &[&str],
    status: PollStatus,
) -> Poll {
    let poll = store
        .create_poll(&new_poll(title, candidates))
        .await
        .expect("create poll");
    store
        .update_poll_status(&poll.id, status)
        .await
        .expect("set status")
}

/// Wallet on the local development chain that answers the contract's reads
/// from fixed state and mines every transaction immediately.
pub struct TestWallet {
    pub owner: String,
    pub voted: AtomicBool,
    pub calls: Mutex<Vec<String>>,
}

impl TestWallet {
    pub fn new() -> Self {
        Self {
            owner: ACCOUNT.to_string(),
            voted: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_owner(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn sent_transactions(&self) -> usize {
        self.calls()
            .iter()
            .filter(|m| m.as_str() == "eth_sendTransaction")
            .count()
    }
}

fn word(last: &[u8]) -> String {
    let mut out = vec![0u8; 32 - last.len()];
    out.extend_from_slice(last);
    encode_hex(&out)
}

impl WalletProvider for TestWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.calls.lock().expect("calls").push(method.to_string());
        match method {
            "eth_requestAccounts" | "eth_accounts" => Ok(json!([ACCOUNT])),
            "eth_chainId" => Ok(json!(format_quantity(1337))),
            "eth_call" => {
                let data = params[0]["data"].as_str().unwrap_or_default();
                if data.starts_with(&encode_hex(&abi::VOTERS)) {
                    let voted = self.voted.load(Ordering::SeqCst);
                    Ok(json!(word(&[u8::from(voted)])))
                } else if data.starts_with(&encode_hex(&abi::OWNER)) {
                    let owner = abi::parse_address(&self.owner).expect("owner");
                    Ok(json!(word(&owner)))
                } else {
                    Err(ProviderError::rpc(-32000, "execution reverted"))
                }
            }
            "eth_sendTransaction" => {
                let data = params[0]["data"].as_str().unwrap_or_default();
                if data.starts_with(&encode_hex(&abi::VOTE)) {
                    self.voted.store(true, Ordering::SeqCst);
                }
                Ok(json!(format!("0x{}", "ab".repeat(32))))
            }
            "eth_getTransactionReceipt" => Ok(json!({ "status": "0x1", "blockNumber": "0x2a" })),
            other => Err(ProviderError::rpc(-32601, format!("{other} not supported"))),
        }
    }
}

pub async fn session(wallet: Arc<TestWallet>) -> ChainSession<Arc<TestWallet>> {
    let config = ChainConfig {
        contract_address: CONTRACT.to_string(),
        receipt_poll_interval: std::time::Duration::from_millis(1),
        ..ChainConfig::default()
    };
    connect(wallet, &config).await.expect("connect")
}
