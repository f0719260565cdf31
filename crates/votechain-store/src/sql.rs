use crate::{DocumentStore, StoreError};
use chrono::Utc;
use uuid::Uuid;
use votechain_db::{polls, users, votes, DbError, DbPool};
use votechain_models::{CandidateIndex, NewPoll, Poll, PollStatus, Role, VoteRecord};

/// Document store over the local SQLite database.
#[derive(Clone)]
pub struct SqlStore {
    pool: DbPool,
}

impl SqlStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database and apply migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = votechain_db::create_pool(database_url, max_connections)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        votechain_db::run_migrations(&pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn to_records(rows: Vec<votes::VoteRow>) -> Result<Vec<VoteRecord>, StoreError> {
    rows.into_iter()
        .map(|row| VoteRecord::try_from(row).map_err(StoreError::from))
        .collect()
}

impl DocumentStore for SqlStore {
    async fn create_poll(&self, poll: &NewPoll) -> Result<Poll, StoreError> {
        let id = Uuid::new_v4().to_string();
        let row = polls::create_poll(&self.pool, &id, poll, Utc::now()).await?;
        tracing::info!(poll = %id, title = %poll.title, "poll created");
        Ok(Poll::try_from(row)?)
    }

    async fn get_polls(&self) -> Result<Vec<Poll>, StoreError> {
        polls::list_polls(&self.pool)
            .await?
            .into_iter()
            .map(|row| Poll::try_from(row).map_err(StoreError::from))
            .collect()
    }

    async fn get_active_poll(&self) -> Result<Option<Poll>, StoreError> {
        match polls::get_active_poll(&self.pool).await? {
            Some(row) => Ok(Some(Poll::try_from(row)?)),
            None => Ok(None),
        }
    }

    async fn get_poll(&self, id: &str) -> Result<Option<Poll>, StoreError> {
        match polls::get_poll(&self.pool, id).await? {
            Some(row) => Ok(Some(Poll::try_from(row)?)),
            None => Ok(None),
        }
    }

    async fn update_poll_status(
        &self,
        id: &str,
        status: PollStatus,
    ) -> Result<Poll, StoreError> {
        let row = polls::update_poll_status(&self.pool, id, status, Utc::now())
            .await
            .map_err(|e| match e {
                DbError::NotFound => StoreError::NotFound(format!("poll {id}")),
                other => other.into(),
            })?;
        tracing::info!(poll = id, status = %status, "poll status updated");
        Ok(Poll::try_from(row)?)
    }

    async fn record_vote(
        &self,
        poll_id: &str,
        user_id: &str,
        candidate: CandidateIndex,
        wallet_address: &str,
    ) -> Result<VoteRecord, StoreError> {
        let id = Uuid::new_v4().to_string();
        let row = votes::insert_vote(
            &self.pool,
            &id,
            poll_id,
            user_id,
            candidate,
            wallet_address,
            Utc::now(),
        )
        .await?;
        Ok(VoteRecord::try_from(row)?)
    }

    async fn get_user_votes(&self, user_id: &str) -> Result<Vec<VoteRecord>, StoreError> {
        to_records(votes::get_votes_by_user(&self.pool, user_id).await?)
    }

    async fn get_poll_votes(&self, poll_id: &str) -> Result<Vec<VoteRecord>, StoreError> {
        to_records(votes::get_votes_by_poll(&self.pool, poll_id).await?)
    }

    async fn set_user_role(&self, user_id: &str, role: Role) -> Result<(), StoreError> {
        users::upsert_user_role(&self.pool, user_id, role.as_str(), Utc::now()).await?;
        tracing::info!(user = user_id, role = %role, "user role stored");
        Ok(())
    }

    async fn get_user_role(&self, user_id: &str) -> Result<Role, StoreError> {
        match users::get_user(&self.pool, user_id).await? {
            Some(row) => row
                .role
                .parse::<Role>()
                .map_err(|e| StoreError::Decode(format!("user {user_id}: {e}"))),
            None => Ok(Role::User),
        }
    }
}
