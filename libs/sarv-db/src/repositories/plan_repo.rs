use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::plan::Plan;

#[derive(Debug, Clone)]
pub struct PlanRepository {
    pool: PgPool,
}

impl PlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_active(&self) -> Result<Vec<Plan>> {
        sqlx::query_as::<_, Plan>(
            "SELECT * FROM plans WHERE is_active = TRUE ORDER BY price ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list active plans")
    }

    pub async fn get(&self, id: i64) -> Result<Option<Plan>> {
        sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch plan")
    }

    pub async fn create(
        &self,
        name: &str,
        description: &str,
        price: i64,
        duration_days: i32,
        traffic_gb: f64,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO plans (name, description, price, duration_days, traffic_gb) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(name)
        .bind(description)
        .bind(price)
        .bind(duration_days)
        .bind(traffic_gb)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create plan")?;
        Ok(id)
    }

    pub async fn update_price(&self, id: i64, price: i64) -> Result<()> {
        sqlx::query("UPDATE plans SET price = $1 WHERE id = $2")
            .bind(price)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_name(&self, id: i64, name: &str) -> Result<()> {
        sqlx::query("UPDATE plans SET name = $1 WHERE id = $2")
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Plans referenced by orders are never deleted, only hidden.
    pub async fn deactivate(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE plans SET is_active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to deactivate plan")?;
        Ok(())
    }
}
