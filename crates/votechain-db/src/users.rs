use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRoleRow {
    pub id: String,
    pub role: String,
    pub updated_at: DateTime<Utc>,
}

pub async fn upsert_user_role(
    pool: &DbPool,
    id: &str,
    role: &str,
    now: DateTime<Utc>,
) -> Result<UserRoleRow, DbError> {
    let row = sqlx::query_as::<_, UserRoleRow>(
        "INSERT INTO users (id, role, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (id) DO UPDATE SET
            role = excluded.role,
            updated_at = excluded.updated_at
         RETURNING id, role, updated_at",
    )
    .bind(id)
    .bind(role)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_user(pool: &DbPool, id: &str) -> Result<Option<UserRoleRow>, DbError> {
    let row = sqlx::query_as::<_, UserRoleRow>(
        "SELECT id, role, updated_at FROM users WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup_test_db;

    #[tokio::test]
    async fn upsert_replaces_existing_role() {
        let db = setup_test_db("users-upsert").await;
        let now = Utc::now();
        upsert_user_role(&db, "u1", "user", now).await.expect("insert");
        let updated = upsert_user_role(&db, "u1", "admin", now)
            .await
            .expect("update");

        assert_eq!(updated.role, "admin");
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&db)
            .await
            .expect("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn missing_user_is_none() {
        let db = setup_test_db("users-missing").await;
        assert!(get_user(&db, "nobody").await.expect("query").is_none());
    }
}
