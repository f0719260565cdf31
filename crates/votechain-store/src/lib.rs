pub mod fields;
pub mod firestore;
pub mod sql;

pub use firestore::{FirestoreConfig, FirestoreStore};
pub use sql::SqlStore;

use thiserror::Error;
use votechain_db::DbError;
use votechain_models::{CandidateIndex, NewPoll, Poll, PollStatus, Role, VoteRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("remote error ({status}): {message}")]
    Remote { status: u16, message: String },
    #[error("undecodable document: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Failures that may succeed when the same request is sent again.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(_) | StoreError::Http(_) => true,
            StoreError::Remote { status, .. } => *status == 429 || *status >= 500,
            StoreError::Decode(_) | StoreError::NotFound(_) => false,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound => StoreError::NotFound("record".into()),
            DbError::Corrupt(msg) => StoreError::Decode(msg),
            DbError::Sqlx(e) => StoreError::Database(e.to_string()),
        }
    }
}

/// Persistence for poll metadata, vote records and user roles.
///
/// Implementations exist for a local SQLite database and the hosted document
/// database. Vote records carry the canonical 0-based candidate index.
#[allow(async_fn_in_trait)]
pub trait DocumentStore: Send + Sync {
    /// Insert a new poll in `draft` status with a fresh id.
    async fn create_poll(&self, poll: &NewPoll) -> Result<Poll, StoreError>;

    /// Every poll, newest first.
    async fn get_polls(&self) -> Result<Vec<Poll>, StoreError>;

    async fn get_active_poll(&self) -> Result<Option<Poll>, StoreError>;

    async fn get_poll(&self, id: &str) -> Result<Option<Poll>, StoreError>;

    /// Overwrite the status of poll `id`. Activating a poll ends every other
    /// active poll first, so at most one poll is ever `active`.
    async fn update_poll_status(&self, id: &str, status: PollStatus)
        -> Result<Poll, StoreError>;

    /// Append a vote record. Duplicates are not rejected here.
    async fn record_vote(
        &self,
        poll_id: &str,
        user_id: &str,
        candidate: CandidateIndex,
        wallet_address: &str,
    ) -> Result<VoteRecord, StoreError>;

    async fn get_user_votes(&self, user_id: &str) -> Result<Vec<VoteRecord>, StoreError>;

    async fn get_poll_votes(&self, poll_id: &str) -> Result<Vec<VoteRecord>, StoreError>;

    async fn set_user_role(&self, user_id: &str, role: Role) -> Result<(), StoreError>;

    /// Stored role, or `Role::User` when the user has no document.
    async fn get_user_role(&self, user_id: &str) -> Result<Role, StoreError>;
}

/// Enum-dispatch wrapper over the available backends.
#[derive(Clone)]
pub enum Store {
    Sql(SqlStore),
    Firestore(FirestoreStore),
}

impl DocumentStore for Store {
    async fn create_poll(&self, poll: &NewPoll) -> Result<Poll, StoreError> {
        match self {
            Store::Sql(s) => s.create_poll(poll).await,
            Store::Firestore(s) => s.create_poll(poll).await,
        }
    }

    async fn get_polls(&self) -> Result<Vec<Poll>, StoreError> {
        match self {
            Store::Sql(s) => s.get_polls().await,
            Store::Firestore(s) => s.get_polls().await,
        }
    }

    async fn get_active_poll(&self) -> Result<Option<Poll>, StoreError> {
        match self {
            Store::Sql(s) => s.get_active_poll().await,
            Store::Firestore(s) => s.get_active_poll().await,
        }
    }

    async fn get_poll(&self, id: &str) -> Result<Option<Poll>, StoreError> {
        match self {
            Store::Sql(s) => s.get_poll(id).await,
            Store::Firestore(s) => s.get_poll(id).await,
        }
    }

    async fn update_poll_status(
        &self,
        id: &str,
        status: PollStatus,
    ) -> Result<Poll, StoreError> {
        match self {
            Store::Sql(s) => s.update_poll_status(id, status).await,
            Store::Firestore(s) => s.update_poll_status(id, status).await,
        }
    }

    async fn record_vote(
        &self,
        poll_id: &str,
        user_id: &str,
        candidate: CandidateIndex,
        wallet_address: &str,
    ) -> Result<VoteRecord, StoreError> {
        match self {
            Store::Sql(s) => {
                s.record_vote(poll_id, user_id, candidate, wallet_address)
                    .await
            }
            Store::Firestore(s) => {
                s.record_vote(poll_id, user_id, candidate, wallet_address)
                    .await
            }
        }
    }

    async fn get_user_votes(&self, user_id: &str) -> Result<Vec<VoteRecord>, StoreError> {
        match self {
            Store::Sql(s) => s.get_user_votes(user_id).await,
            Store::Firestore(s) => s.get_user_votes(user_id).await,
        }
    }

    async fn get_poll_votes(&self, poll_id: &str) -> Result<Vec<VoteRecord>, StoreError> {
        match self {
            Store::Sql(s) => s.get_poll_votes(poll_id).await,
            Store::Firestore(s) => s.get_poll_votes(poll_id).await,
        }
    }

    async fn set_user_role(&self, user_id: &str, role: Role) -> Result<(), StoreError> {
        match self {
            Store::Sql(s) => s.set_user_role(user_id, role).await,
            Store::Firestore(s) => s.set_user_role(user_id, role).await,
        }
    }

    async fn get_user_role(&self, user_id: &str) -> Result<Role, StoreError> {
        match self {
            Store::Sql(s) => s.get_user_role(user_id).await,
            Store::Firestore(s) => s.get_user_role(user_id).await,
        }
    }
}

/// Create a `Store` from the configured backend name.
///
/// - `backend = "sqlite"` (default): opens `database_url` and applies migrations.
/// - `backend = "firestore"`: talks to the hosted document database over REST.
pub async fn create_store(
    backend: &str,
    database_url: &str,
    max_connections: u32,
    firestore: Option<&FirestoreConfig>,
) -> Result<Store, StoreError> {
    match backend {
        "sqlite" | "" => {
            tracing::info!("Using SQLite document store ({})", database_url);
            Ok(Store::Sql(
                SqlStore::connect(database_url, max_connections).await?,
            ))
        }
        "firestore" => {
            let cfg = firestore.ok_or_else(|| {
                StoreError::Database(
                    "backend is 'firestore' but no project is configured".into(),
                )
            })?;
            if cfg.project_id.is_empty() {
                return Err(StoreError::Database(
                    "firestore project id must not be empty".into(),
                ));
            }
            tracing::info!(
                "Using Firestore document store (project={}, endpoint={})",
                cfg.project_id,
                cfg.base_url
            );
            Ok(Store::Firestore(FirestoreStore::new(cfg)?))
        }
        other => Err(StoreError::Database(format!(
            "unknown store backend '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_network_and_server_side() {
        assert!(StoreError::Http("timeout".into()).is_transient());
        assert!(StoreError::Remote {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());
        assert!(!StoreError::Remote {
            status: 403,
            message: "permission denied".into()
        }
        .is_transient());
        assert!(!StoreError::NotFound("poll".into()).is_transient());
    }

    #[test]
    fn db_not_found_maps_to_store_not_found() {
        let err = StoreError::from(DbError::NotFound);
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn unknown_backend_is_rejected() {
        let result = create_store("mongo", "sqlite::memory:", 1, None).await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }

    #[tokio::test]
    async fn firestore_backend_requires_configuration() {
        let result = create_store("firestore", "", 1, None).await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }
}
