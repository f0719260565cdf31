use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};
use votechain_models::{CandidateIndex, VoteRecord};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VoteRow {
    pub id: String,
    pub poll_id: String,
    pub user_id: String,
    pub candidate_index: i64,
    pub wallet_address: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<VoteRow> for VoteRecord {
    type Error = DbError;

    fn try_from(row: VoteRow) -> Result<Self, Self::Error> {
        let index = u32::try_from(row.candidate_index).map_err(|_| {
            DbError::Corrupt(format!(
                "vote {}: candidate index {} out of range",
                row.id, row.candidate_index
            ))
        })?;
        Ok(VoteRecord {
            id: row.id,
            poll_id: row.poll_id,
            user_id: row.user_id,
            candidate_index: CandidateIndex(index),
            wallet_address: row.wallet_address,
            created_at: row.created_at,
        })
    }
}

pub async fn insert_vote(
    pool: &DbPool,
    id: &str,
    poll_id: &str,
    user_id: &str,
    candidate_index: CandidateIndex,
    wallet_address: &str,
    now: DateTime<Utc>,
) -> Result<VoteRow, DbError> {
    let row = sqlx::query_as::<_, VoteRow>(
        "INSERT INTO votes (id, poll_id, user_id, candidate_index, wallet_address, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         RETURNING id, poll_id, user_id, candidate_index, wallet_address, created_at",
    )
    .bind(id)
    .bind(poll_id)
    .bind(user_id)
    .bind(i64::from(candidate_index.0))
    .bind(wallet_address)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_votes_by_user(pool: &DbPool, user_id: &str) -> Result<Vec<VoteRow>, DbError> {
    let rows = sqlx::query_as::<_, VoteRow>(
        "SELECT id, poll_id, user_id, candidate_index, wallet_address, created_at
         FROM votes WHERE user_id = ?1
         ORDER BY created_at",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_votes_by_poll(pool: &DbPool, poll_id: &str) -> Result<Vec<VoteRow>, DbError> {
    let rows = sqlx::query_as::<_, VoteRow>(
        "SELECT id, poll_id, user_id, candidate_index, wallet_address, created_at
         FROM votes WHERE poll_id = ?1
         ORDER BY created_at",
    )
    .bind(poll_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
