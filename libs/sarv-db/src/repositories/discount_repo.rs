use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::models::discount::DiscountCode;

#[derive(Debug, Clone)]
pub struct DiscountRepository {
    pool: PgPool,
}

impl DiscountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Option<DiscountCode>> {
        sqlx::query_as::<_, DiscountCode>(
            "SELECT * FROM discount_codes WHERE UPPER(code) = UPPER($1)",
        )
        .bind(code.trim())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to look up discount code")
    }

    pub async fn list(&self) -> Result<Vec<DiscountCode>> {
        sqlx::query_as::<_, DiscountCode>("SELECT * FROM discount_codes ORDER BY id DESC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list discount codes")
    }

    pub async fn create(
        &self,
        code: &str,
        percentage: i32,
        usage_limit: i32,
        expiry_date: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO discount_codes (code, percentage, usage_limit, expiry_date) \
             VALUES (UPPER($1), $2, $3, $4) RETURNING id",
        )
        .bind(code.trim())
        .bind(percentage)
        .bind(usage_limit)
        .bind(expiry_date)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create discount code")?;
        Ok(id)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM discount_codes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Takes one usage slot. The WHERE clause keeps times_used bounded by
    /// usage_limit even under concurrent approvals; returns false when the
    /// code was already spent. Takes a connection so callers can run it
    /// inside the same transaction that flips the order status.
    pub async fn consume_by_code_in(conn: &mut PgConnection, code: &str) -> Result<bool> {
        let taken = sqlx::query(
            "UPDATE discount_codes SET times_used = times_used + 1 \
             WHERE UPPER(code) = UPPER($1) AND (usage_limit = 0 OR times_used < usage_limit)",
        )
        .bind(code.trim())
        .execute(conn)
        .await
        .context("Failed to consume discount code")?
        .rows_affected();
        Ok(taken > 0)
    }

    pub async fn consume_by_code(&self, code: &str) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        Self::consume_by_code_in(&mut conn, code).await
    }
}
