use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::store::Card;

#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: PgPool,
}

impl SettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT value FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read setting")
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .context("Failed to write setting")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CardRepository {
    pool: PgPool,
}

impl CardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Card>> {
        sqlx::query_as::<_, Card>("SELECT * FROM cards ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list cards")
    }

    pub async fn create(&self, card_number: &str, holder_name: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO cards (card_number, holder_name) VALUES ($1, $2) RETURNING id",
        )
        .bind(card_number)
        .bind(holder_name)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create card")?;
        Ok(id)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM cards WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
