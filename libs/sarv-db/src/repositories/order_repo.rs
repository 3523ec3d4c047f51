use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgPool;

use crate::models::order::Order;

#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: i64) -> Result<Option<Order>> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch order")
    }

    /// New purchase waiting for admin review. Price and code are
    /// snapshotted here so later plan edits don't rewrite the order.
    pub async fn insert_pending(
        &self,
        user_id: i64,
        plan_id: i64,
        screenshot_file_id: &str,
        final_price: i64,
        discount_code: Option<&str>,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO orders (user_id, plan_id, status, screenshot_file_id, final_price, discount_code) \
             VALUES ($1, $2, 'pending', $3, $4, $5) RETURNING id",
        )
        .bind(user_id)
        .bind(plan_id)
        .bind(screenshot_file_id)
        .bind(final_price)
        .bind(discount_code)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert pending order")?;
        Ok(id)
    }

    /// Guarded terminal transition; re-clicking reject on a reviewed order
    /// changes nothing.
    pub async fn set_rejected(&self, id: i64) -> Result<bool> {
        let n = sqlx::query("UPDATE orders SET status = 'rejected' WHERE id = $1 AND status = 'pending'")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to reject order")?
            .rows_affected();
        Ok(n > 0)
    }

    pub async fn clear_reminder(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE orders SET last_reminder_date = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_reminder_date(&self, id: i64, date: NaiveDate) -> Result<()> {
        sqlx::query("UPDATE orders SET last_reminder_date = $1 WHERE id = $2")
            .bind(date)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Orders the sweeper cares about: approved and provisioned.
    pub async fn active_provisioned(&self) -> Result<Vec<Order>> {
        sqlx::query_as::<_, Order>(
            "SELECT * FROM orders \
             WHERE status = 'approved' AND marzban_username IS NOT NULL AND panel_id IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load provisioned orders")
    }

    pub async fn for_user(&self, user_id: i64) -> Result<Vec<Order>> {
        sqlx::query_as::<_, Order>(
            "SELECT * FROM orders \
             WHERE user_id = $1 AND status = 'approved' AND marzban_username IS NOT NULL \
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load user orders")
    }

    pub async fn count_by_status(&self, status: &str) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE status = $1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[derive(Debug, Clone)]
pub struct FreeTrialRepository {
    pool: PgPool,
}

impl FreeTrialRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn exists(&self, user_id: i64) -> Result<bool> {
        let found: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM free_trials WHERE user_id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .context("Failed to check free trial record")?;
        Ok(found)
    }
}
