use crate::{datetime_to_db_text, DbError, DbPool};
use parley_models::presence::PresenceStatus;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PresenceRow {
    pub user_id: i64,
    pub status: String,
    pub last_seen: String,
    pub transport_id: Option<String>,
}

/// Upsert an online presence row. Called fire-and-forget on session
/// establishment; the in-memory registry stays authoritative either way.
pub async fn mark_online(pool: &DbPool, user_id: i64, transport_id: &str) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO user_presence (user_id, status, last_seen, transport_id)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (user_id) DO UPDATE SET status = ?2, last_seen = ?3, transport_id = ?4",
    )
    .bind(user_id)
    .bind(PresenceStatus::Online.as_str())
    .bind(datetime_to_db_text(chrono::Utc::now()))
    .bind(transport_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_offline(pool: &DbPool, user_id: i64) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO user_presence (user_id, status, last_seen, transport_id)
         VALUES (?1, ?2, ?3, NULL)
         ON CONFLICT (user_id) DO UPDATE SET status = ?2, last_seen = ?3, transport_id = NULL",
    )
    .bind(user_id)
    .bind(PresenceStatus::Offline.as_str())
    .bind(datetime_to_db_text(chrono::Utc::now()))
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_presence(pool: &DbPool, user_id: i64) -> Result<Option<PresenceRow>, DbError> {
    let row = sqlx::query_as::<_, PresenceRow>(
        "SELECT user_id, status, last_seen, transport_id FROM user_presence WHERE user_id = ?1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn test_pool() -> DbPool {
        let pool = create_pool("sqlite::memory:", 1).await.expect("pool");
        run_migrations(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn online_then_offline_overwrites_row() {
        let pool = test_pool().await;

        mark_online(&pool, 42, "transport-a").await.expect("online");
        let row = get_presence(&pool, 42)
            .await
            .expect("get")
            .expect("row exists");
        assert_eq!(row.status, "online");
        assert_eq!(row.transport_id.as_deref(), Some("transport-a"));

        mark_offline(&pool, 42).await.expect("offline");
        let row = get_presence(&pool, 42)
            .await
            .expect("get")
            .expect("row exists");
        assert_eq!(row.status, "offline");
        assert!(row.transport_id.is_none());
    }

    #[tokio::test]
    async fn reconnect_replaces_transport_id() {
        let pool = test_pool().await;

        mark_online(&pool, 7, "transport-a").await.expect("online");
        mark_online(&pool, 7, "transport-b").await.expect("online");
        let row = get_presence(&pool, 7)
            .await
            .expect("get")
            .expect("row exists");
        assert_eq!(row.transport_id.as_deref(), Some("transport-b"));
    }
}
