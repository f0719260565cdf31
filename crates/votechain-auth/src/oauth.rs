//! Redirect-based Google sign-in: authorization URL with PKCE, code exchange,
//! and ID-token verification against the provider's published keys.

use crate::AuthError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::DateTime;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use rand::RngCore;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use url::Url;
use votechain_models::AuthUser;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];

#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub auth_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
}

impl Default for GoogleOAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            redirect_uri: "http://127.0.0.1:8765/callback".to_string(),
            auth_endpoint: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_endpoint: "https://oauth2.googleapis.com/token".to_string(),
            jwks_uri: "https://www.googleapis.com/oauth2/v3/certs".to_string(),
        }
    }
}

/// A sign-in that has been started but not yet completed.
#[derive(Debug, Clone)]
pub struct PendingLogin {
    /// Where the user signs in.
    pub auth_url: String,
    pub state: String,
    pub nonce: String,
    code_verifier: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdClaims {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Extract `(state, code)` from the URL the provider redirected to.
pub fn parse_redirect(redirect: &str) -> Result<(String, String), AuthError> {
    let url = Url::parse(redirect.trim())
        .map_err(|e| AuthError::Provider(format!("invalid redirect url: {e}")))?;
    let mut state = None;
    let mut code = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "state" => state = Some(value.into_owned()),
            "code" => code = Some(value.into_owned()),
            "error" => return Err(AuthError::Provider(value.into_owned())),
            _ => {}
        }
    }
    let state = state.ok_or(AuthError::InvalidState)?;
    let code = code.ok_or_else(|| AuthError::Provider("missing authorization code".into()))?;
    Ok((state, code))
}

/// HTTP client for the Google OAuth 2.0 endpoints.
#[derive(Debug, Clone)]
pub struct GoogleOAuth {
    http: Client,
    config: GoogleOAuthConfig,
}

impl GoogleOAuth {
    pub fn new(config: GoogleOAuthConfig) -> Result<Self, AuthError> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent("VoteChain/0.3")
            .build()
            .map_err(|e| AuthError::Http(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GoogleOAuthConfig {
        &self.config
    }

    /// Build the authorization URL with fresh `state`, `nonce` and PKCE verifier.
    pub fn begin_login(&self) -> Result<PendingLogin, AuthError> {
        if self.config.client_id.is_empty() {
            return Err(AuthError::Provider("oauth client id is not configured".into()));
        }
        let state = random_token();
        let nonce = random_token();
        let code_verifier = random_token();
        let challenge = code_challenge(&code_verifier);
        let url = Url::parse_with_params(
            &self.config.auth_endpoint,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state.as_str()),
                ("nonce", nonce.as_str()),
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("prompt", "select_account"),
            ],
        )
        .map_err(|e| AuthError::Provider(format!("invalid auth endpoint: {e}")))?;
        Ok(PendingLogin {
            auth_url: url.to_string(),
            state,
            nonce,
            code_verifier,
        })
    }

    /// Finish a sign-in: check `state`, exchange `code`, verify the ID token.
    pub async fn complete(
        &self,
        pending: &PendingLogin,
        returned_state: &str,
        code: &str,
    ) -> Result<AuthUser, AuthError> {
        if returned_state != pending.state {
            return Err(AuthError::InvalidState);
        }
        let id_token = self.exchange_code(pending, code).await?;
        let jwks = self.fetch_jwks().await?;
        let claims = self.verify_id_token(&id_token, &jwks, &pending.nonce)?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::InvalidToken("exp out of range".into()))?;
        tracing::info!(uid = %claims.sub, "sign-in completed");
        Ok(AuthUser {
            uid: claims.sub,
            display_name: claims.name,
            email: claims.email,
            id_token,
            expires_at,
        })
    }

    async fn exchange_code(&self, pending: &PendingLogin, code: &str) -> Result<String, AuthError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", pending.code_verifier.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.as_str()));
        }
        let resp = self
            .http
            .post(&self.config.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Http(e.to_string()))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| AuthError::Http(e.to_string()))?;
        if !status.is_success() {
            let message = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| e.error_description.unwrap_or(e.error))
                .unwrap_or_else(|_| format!("token endpoint returned {status}"));
            return Err(AuthError::Provider(message));
        }
        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::Provider(format!("invalid token response: {e}")))?;
        token
            .id_token
            .ok_or_else(|| AuthError::Provider("token response has no id_token".into()))
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, AuthError> {
        let resp = self
            .http
            .get(&self.config.jwks_uri)
            .send()
            .await
            .map_err(|e| AuthError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(AuthError::Provider(format!(
                "key endpoint returned {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map_err(|e| AuthError::Provider(format!("invalid key set: {e}")))
    }

    /// Verify signature (RS256), issuer, audience, expiry and nonce.
    pub fn verify_id_token(
        &self,
        id_token: &str,
        jwks: &JwkSet,
        expected_nonce: &str,
    ) -> Result<IdClaims, AuthError> {
        let header = decode_header(id_token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("missing key id".into()))?;
        let jwk = jwks
            .find(&kid)
            .ok_or_else(|| AuthError::InvalidToken(format!("unknown key id {kid}")))?;
        let key = DecodingKey::from_jwk(jwk).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.config.client_id.as_str()]);
        validation.set_issuer(&GOOGLE_ISSUERS);

        let claims = decode::<IdClaims>(id_token, &key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?
            .claims;
        if claims.nonce.as_deref() != Some(expected_nonce) {
            return Err(AuthError::InvalidToken("nonce mismatch".into()));
        }
        Ok(claims)
    }
}
