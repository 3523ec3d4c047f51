use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::store::BotUser;

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(
        &self,
        tg_id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (tg_id, username, first_name) VALUES ($1, $2, $3) \
             ON CONFLICT (tg_id) DO UPDATE SET username = EXCLUDED.username, first_name = EXCLUDED.first_name",
        )
        .bind(tg_id)
        .bind(username)
        .bind(first_name)
        .execute(&self.pool)
        .await
        .context("Failed to upsert user")?;
        Ok(())
    }

    pub async fn get(&self, tg_id: i64) -> Result<Option<BotUser>> {
        sqlx::query_as::<_, BotUser>("SELECT * FROM users WHERE tg_id = $1")
            .bind(tg_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")
    }

    pub async fn all_ids(&self) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT tg_id FROM users ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list user ids")?;
        Ok(ids)
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}
