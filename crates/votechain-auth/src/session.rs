use crate::AuthError;
use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use votechain_models::AuthUser;

/// Signed-in user persisted between runs as a JSON file.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved user. Expired or unreadable sessions are removed and
    /// reported as signed out.
    pub async fn load(&self) -> Result<Option<AuthUser>, AuthError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let user: AuthUser = match serde_json::from_slice(&raw) {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "discarding unreadable session: {e}");
                self.clear().await?;
                return Ok(None);
            }
        };
        if user.is_expired(Utc::now()) {
            tracing::info!(uid = %user.uid, "saved session expired");
            self.clear().await?;
            return Ok(None);
        }
        Ok(Some(user))
    }

    pub async fn save(&self, user: &AuthUser) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let raw = serde_json::to_vec_pretty(user).map_err(io::Error::other)?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }

    /// No-op when there is no saved session.
    pub async fn clear(&self) -> Result<(), AuthError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
