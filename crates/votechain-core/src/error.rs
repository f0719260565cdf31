use thiserror::Error;
use votechain_auth::AuthError;
use votechain_chain::ChainError;
use votechain_store::StoreError;

/// Every failure a user-facing action can end in.
#[derive(Debug, Error)]
pub enum VoteError {
    #[error("no wallet available: {0}")]
    WalletAbsent(String),
    #[error("request rejected in wallet")]
    WalletRejected,
    #[error("wrong network: expected chain id {expected}, wallet is on {actual}")]
    WrongNetwork { expected: u64, actual: u64 },
    #[error("wallet connection failed: {0}")]
    WalletConnectFailed(String),
    #[error("contract call failed: {0}")]
    ContractCallFailed(String),
    #[error("document store operation failed: {0}")]
    StoreOperationFailed(StoreError),
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("you have already voted in this poll")]
    AlreadyVoted,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl VoteError {
    /// Machine-readable error code string.
    pub fn error_code(&self) -> &'static str {
        match self {
            VoteError::WalletAbsent(_) => "WALLET_ABSENT",
            VoteError::WalletRejected => "WALLET_REJECTED",
            VoteError::WrongNetwork { .. } => "WRONG_NETWORK",
            VoteError::WalletConnectFailed(_) => "WALLET_CONNECT_FAILED",
            VoteError::ContractCallFailed(_) => "CONTRACT_CALL_FAILED",
            VoteError::StoreOperationFailed(_) => "STORE_OPERATION_FAILED",
            VoteError::AuthFailed(_) => "AUTH_FAILED",
            VoteError::AlreadyVoted => "ALREADY_VOTED",
            VoteError::Forbidden(_) => "FORBIDDEN",
            VoteError::NotFound(_) => "NOT_FOUND",
            VoteError::BadRequest(_) => "BAD_REQUEST",
        }
    }
}

impl From<ChainError> for VoteError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::WalletAbsent(msg) => VoteError::WalletAbsent(msg),
            ChainError::WalletRejected => VoteError::WalletRejected,
            ChainError::WrongNetwork { expected, actual } => {
                VoteError::WrongNetwork { expected, actual }
            }
            ChainError::ConnectFailed(msg) => VoteError::WalletConnectFailed(msg),
            ChainError::ContractCallFailed(msg) | ChainError::Artifact(msg) => {
                VoteError::ContractCallFailed(msg)
            }
        }
    }
}

impl From<StoreError> for VoteError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => VoteError::NotFound(what),
            other => VoteError::StoreOperationFailed(other),
        }
    }
}

impl From<AuthError> for VoteError {
    fn from(e: AuthError) -> Self {
        VoteError::AuthFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_errors_map_onto_the_user_taxonomy() {
        assert!(matches!(
            VoteError::from(ChainError::WalletRejected),
            VoteError::WalletRejected
        ));
        let pending = VoteError::from(ChainError::ConnectFailed("request already pending".into()));
        assert_eq!(pending.error_code(), "WALLET_CONNECT_FAILED");
        assert!(pending.to_string().contains("already pending"));
        assert!(matches!(
            VoteError::from(ChainError::Artifact("missing".into())),
            VoteError::ContractCallFailed(_)
        ));
        assert!(matches!(
            VoteError::from(StoreError::NotFound("poll p1".into())),
            VoteError::NotFound(_)
        ));
        assert!(matches!(
            VoteError::from(StoreError::Http("reset".into())),
            VoteError::StoreOperationFailed(_)
        ));
        assert!(matches!(
            VoteError::from(AuthError::InvalidState),
            VoteError::AuthFailed(_)
        ));
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(VoteError::AlreadyVoted.error_code(), "ALREADY_VOTED");
        assert_eq!(
            VoteError::WrongNetwork {
                expected: 1337,
                actual: 1
            }
            .error_code(),
            "WRONG_NETWORK"
        );
    }
}
