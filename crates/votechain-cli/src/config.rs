use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use votechain_auth::{AdminAllowList, GoogleOAuthConfig};
use votechain_chain::ChainConfig;
use votechain_core::RetryPolicy;
use votechain_store::firestore::DEFAULT_BASE_URL;
use votechain_store::FirestoreConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chain: ChainSection,
    pub store: StoreSection,
    pub auth: AuthSection,
    pub retry: RetrySection,
    pub prefs: PrefsSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainSection {
    pub rpc_url: String,
    pub chain_id: u64,
    pub chain_name: String,
    pub block_explorer_urls: Vec<String>,
    /// Takes precedence over `artifact_path`.
    pub contract_address: Option<String>,
    /// Deploy output with `{ "address": ..., "abi": [...] }`.
    pub artifact_path: Option<String>,
    pub receipt_poll_interval_ms: u64,
    pub receipt_timeout_secs: u64,
}

impl Default for ChainSection {
    fn default() -> Self {
        let chain = ChainConfig::default();
        Self {
            rpc_url: chain.rpc_urls.first().cloned().unwrap_or_default(),
            chain_id: chain.chain_id,
            chain_name: chain.chain_name,
            block_explorer_urls: Vec::new(),
            contract_address: None,
            artifact_path: Some("contracts/Voting.json".to_string()),
            receipt_poll_interval_ms: chain.receipt_poll_interval.as_millis() as u64,
            receipt_timeout_secs: chain.receipt_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// `sqlite` or `firestore`.
    pub backend: String,
    pub database_url: String,
    pub max_connections: u32,
    pub firestore_project_id: Option<String>,
    pub firestore_api_key: Option<String>,
    pub firestore_base_url: Option<String>,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            database_url: "sqlite://./data/votechain.db?mode=rwc".to_string(),
            max_connections: 5,
            firestore_project_id: None,
            firestore_api_key: None,
            firestore_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub admin_emails: Vec<String>,
    pub session_path: String,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            redirect_uri: GoogleOAuthConfig::default().redirect_uri,
            admin_emails: Vec::new(),
            session_path: "./data/session.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrefsSection {
    pub path: String,
}

impl Default for PrefsSection {
    fn default() -> Self {
        Self {
            path: "./data/preferences.json".to_string(),
        }
    }
}

/// File path of a `sqlite://` URL, if it names a file.
pub fn sqlite_file_path(database_url: &str) -> Option<PathBuf> {
    let rest = database_url.strip_prefix("sqlite://")?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}

impl Config {
    /// Read `path` (defaults when it does not exist), then apply
    /// `VOTECHAIN_*` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {path}"))?;
            toml::from_str(&raw).with_context(|| format!("parsing config file {path}"))?
        } else {
            tracing::debug!("config file {} not found, using defaults", path);
            Config::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).and_then(non_empty);

        if let Some(v) = var("VOTECHAIN_RPC_URL") {
            self.chain.rpc_url = v;
        }
        if let Some(v) = var("VOTECHAIN_CONTRACT_ADDRESS") {
            self.chain.contract_address = Some(v);
        }
        if let Some(v) = var("VOTECHAIN_STORE_BACKEND") {
            self.store.backend = v;
        }
        if let Some(v) = var("VOTECHAIN_DATABASE_URL") {
            self.store.database_url = v;
        }
        if let Some(v) = var("VOTECHAIN_FIRESTORE_PROJECT_ID") {
            self.store.firestore_project_id = Some(v);
        }
        if let Some(v) = var("VOTECHAIN_FIRESTORE_API_KEY") {
            self.store.firestore_api_key = Some(v);
        }
        if let Some(v) = var("VOTECHAIN_OAUTH_CLIENT_ID") {
            self.auth.client_id = v;
        }
        if let Some(v) = var("VOTECHAIN_OAUTH_CLIENT_SECRET") {
            self.auth.client_secret = Some(v);
        }
        if let Some(v) = var("VOTECHAIN_ADMIN_EMAIL") {
            self.auth
                .admin_emails
                .extend(v.split(',').filter_map(|e| non_empty(e.to_string())));
        }
    }

    pub fn chain_config(&self, contract_address: String) -> ChainConfig {
        ChainConfig {
            chain_id: self.chain.chain_id,
            chain_name: self.chain.chain_name.clone(),
            rpc_urls: vec![self.chain.rpc_url.clone()],
            block_explorer_urls: self.chain.block_explorer_urls.clone(),
            contract_address,
            receipt_poll_interval: Duration::from_millis(self.chain.receipt_poll_interval_ms),
            receipt_timeout: Duration::from_secs(self.chain.receipt_timeout_secs),
        }
    }

    pub fn firestore_config(&self) -> Option<FirestoreConfig> {
        let project_id = self.store.firestore_project_id.clone()?;
        Some(FirestoreConfig {
            project_id,
            api_key: self.store.firestore_api_key.clone(),
            base_url: self
                .store
                .firestore_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    pub fn oauth_config(&self) -> GoogleOAuthConfig {
        GoogleOAuthConfig {
            client_id: self.auth.client_id.clone(),
            client_secret: self.auth.client_secret.clone(),
            redirect_uri: self.auth.redirect_uri.clone(),
            ..GoogleOAuthConfig::default()
        }
    }

    pub fn allow_list(&self) -> AdminAllowList {
        AdminAllowList::new(&self.auth.admin_emails)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
        )
    }

    pub fn session_path(&self) -> PathBuf {
        PathBuf::from(&self.auth.session_path)
    }

    pub fn prefs_path(&self) -> PathBuf {
        PathBuf::from(&self.prefs.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_target_the_local_development_chain() {
        let config = Config::default();
        assert_eq!(config.chain.chain_id, 1337);
        assert_eq!(config.chain.rpc_url, "http://127.0.0.1:8545");
        assert_eq!(config.store.backend, "sqlite");
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert!(config.firestore_config().is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [chain]
            contract_address = "0x5fbdb2315678afecb367f032d93f642f64180aa3"

            [auth]
            admin_emails = ["Owner@Example.com"]

            [retry]
            max_attempts = 5
            "#,
        )
        .expect("parse");

        assert_eq!(config.chain.chain_id, 1337);
        assert!(config.allow_list().contains("owner@example.com"));
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 500);
        let chain = config.chain_config("0xabc".into());
        assert_eq!(chain.receipt_timeout, Duration::from_secs(120));
    }

    #[test]
    fn environment_overrides_secrets_and_identifiers() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("VOTECHAIN_FIRESTORE_PROJECT_ID", "votes-prod"),
            ("VOTECHAIN_FIRESTORE_API_KEY", "AIza-test"),
            ("VOTECHAIN_OAUTH_CLIENT_ID", "client.apps.googleusercontent.com"),
            ("VOTECHAIN_ADMIN_EMAIL", "a@x.io, ,b@x.io"),
            ("VOTECHAIN_RPC_URL", "  "),
        ]);
        let mut config = Config::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        let firestore = config.firestore_config().expect("firestore");
        assert_eq!(firestore.project_id, "votes-prod");
        assert_eq!(firestore.api_key.as_deref(), Some("AIza-test"));
        assert_eq!(firestore.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.oauth_config().client_id, "client.apps.googleusercontent.com");
        assert_eq!(config.auth.admin_emails, vec!["a@x.io", "b@x.io"]);
        assert_eq!(config.chain.rpc_url, "http://127.0.0.1:8545");
    }

    #[test]
    fn sqlite_url_to_file_path() {
        assert_eq!(
            sqlite_file_path("sqlite://./data/votechain.db?mode=rwc"),
            Some(PathBuf::from("./data/votechain.db"))
        );
        assert_eq!(sqlite_file_path("sqlite::memory:"), None);
        assert_eq!(sqlite_file_path("postgres://db"), None);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.toml");
        let config = Config::load(path.to_str().expect("utf-8 path")).expect("load");
        assert_eq!(config.store.max_connections, 5);
    }
}
