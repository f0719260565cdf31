use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::abi;
use crate::ChainError;

/// Deployment output: the contract address and its ABI as written by the
/// deploy script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractArtifact {
    pub address: String,
    #[serde(default)]
    pub abi: serde_json::Value,
}

impl ContractArtifact {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ChainError::Artifact(format!("{}: {e}", path.display())))?;
        let artifact: ContractArtifact = serde_json::from_str(&raw)
            .map_err(|e| ChainError::Artifact(format!("{}: {e}", path.display())))?;
        abi::parse_address(&artifact.address)
            .map_err(|e| ChainError::Artifact(e.to_string()))?;
        Ok(artifact)
    }
}
