use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use votechain_models::{NewPoll, Poll, PollStatus};

const POLL_COLUMNS: &str =
    "id, title, description, candidates, start_date, end_date, status, created_at, updated_at, created_by";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PollRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub candidates: Json<Vec<String>>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
}

impl TryFrom<PollRow> for Poll {
    type Error = DbError;

    fn try_from(row: PollRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<PollStatus>()
            .map_err(|e| DbError::Corrupt(format!("poll {}: {e}", row.id)))?;
        Ok(Poll {
            id: row.id,
            title: row.title,
            description: row.description,
            candidates: row.candidates.0,
            start_date: row.start_date,
            end_date: row.end_date,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            created_by: row.created_by,
        })
    }
}

pub async fn create_poll(
    pool: &DbPool,
    id: &str,
    poll: &NewPoll,
    now: DateTime<Utc>,
) -> Result<PollRow, DbError> {
    let row = sqlx::query_as::<_, PollRow>(&format!(
        "INSERT INTO polls (id, title, description, candidates, start_date, end_date, status, created_at, updated_at, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'draft', ?7, ?7, ?8)
         RETURNING {POLL_COLUMNS}"
    ))
    .bind(id)
    .bind(&poll.title)
    .bind(&poll.description)
    .bind(Json(&poll.candidates))
    .bind(poll.start_date)
    .bind(poll.end_date)
    .bind(now)
    .bind(&poll.created_by)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_poll(pool: &DbPool, id: &str) -> Result<Option<PollRow>, DbError> {
    let row = sqlx::query_as::<_, PollRow>(&format!(
        "SELECT {POLL_COLUMNS} FROM polls WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Newest first.
pub async fn list_polls(pool: &DbPool) -> Result<Vec<PollRow>, DbError> {
    let rows = sqlx::query_as::<_, PollRow>(&format!(
        "SELECT {POLL_COLUMNS} FROM polls ORDER BY created_at DESC, rowid DESC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_active_poll(pool: &DbPool) -> Result<Option<PollRow>, DbError> {
    let row = sqlx::query_as::<_, PollRow>(&format!(
        "SELECT {POLL_COLUMNS} FROM polls
         WHERE status = 'active'
         ORDER BY updated_at DESC
         LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Overwrites the status without checking the transition. Activating a poll
/// ends every other active poll in the same transaction.
pub async fn update_poll_status(
    pool: &DbPool,
    id: &str,
    status: PollStatus,
    now: DateTime<Utc>,
) -> Result<PollRow, DbError> {
    let mut tx = pool.begin().await?;

    if status == PollStatus::Active {
        let ended = sqlx::query(
            "UPDATE polls SET status = 'ended', updated_at = ?2
             WHERE status = 'active' AND id != ?1",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if ended.rows_affected() > 0 {
            tracing::info!(
                poll = id,
                ended = ended.rows_affected(),
                "ended previously active polls"
            );
        }
    }

    let row = sqlx::query_as::<_, PollRow>(&format!(
        "UPDATE polls SET status = ?2, updated_at = ?3
         WHERE id = ?1
         RETURNING {POLL_COLUMNS}"
    ))
    .bind(id)
    .bind(status.as_str())
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    tx.commit().await?;
    Ok(row)
}
