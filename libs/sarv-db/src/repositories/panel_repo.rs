use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::panel::{Panel, PanelInbound};

#[derive(Debug, Clone)]
pub struct PanelRepository {
    pool: PgPool,
}

impl PanelRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_active(&self) -> Result<Vec<Panel>> {
        sqlx::query_as::<_, Panel>("SELECT * FROM panels WHERE is_active = TRUE ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list panels")
    }

    pub async fn get(&self, id: i64) -> Result<Option<Panel>> {
        sqlx::query_as::<_, Panel>("SELECT * FROM panels WHERE id = $1 AND is_active = TRUE")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch panel")
    }

    pub async fn first_active(&self) -> Result<Option<Panel>> {
        sqlx::query_as::<_, Panel>(
            "SELECT * FROM panels WHERE is_active = TRUE ORDER BY id LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch first panel")
    }

    pub async fn create(&self, name: &str, url: &str, username: &str, password: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO panels (name, url, username, password) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(name)
        .bind(url.trim_end_matches('/'))
        .bind(username)
        .bind(password)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create panel")?;
        Ok(id)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM panels WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn active_inbounds(&self, panel_id: i64) -> Result<Vec<PanelInbound>> {
        sqlx::query_as::<_, PanelInbound>(
            "SELECT * FROM panel_inbounds WHERE panel_id = $1 AND is_active = TRUE ORDER BY id",
        )
        .bind(panel_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list panel inbounds")
    }

    pub async fn add_inbound(&self, panel_id: i64, protocol: &str, tag: &str) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO panel_inbounds (panel_id, protocol, tag) VALUES ($1, $2, $3) \
             ON CONFLICT (panel_id, tag) DO UPDATE SET protocol = EXCLUDED.protocol, is_active = TRUE \
             RETURNING id",
        )
        .bind(panel_id)
        .bind(protocol)
        .bind(tag)
        .fetch_one(&self.pool)
        .await
        .context("Failed to add inbound")?;
        Ok(id)
    }

    pub async fn delete_inbound(&self, inbound_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM panel_inbounds WHERE id = $1")
            .bind(inbound_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
