pub mod gateway;
pub mod oauth;
pub mod session;
pub mod state;

pub use gateway::{AuthGateway, AuthSubscription};
pub use oauth::{parse_redirect, GoogleOAuth, GoogleOAuthConfig, IdClaims, PendingLogin};
pub use session::SessionFile;
pub use state::{AdminAllowList, AuthState};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("http error: {0}")]
    Http(String),
    #[error("login state mismatch; restart the sign-in")]
    InvalidState,
    #[error("invalid id token: {0}")]
    InvalidToken(String),
    #[error("identity provider error: {0}")]
    Provider(String),
    #[error("session file error: {0}")]
    Io(#[from] std::io::Error),
}
