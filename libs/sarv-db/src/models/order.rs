use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Approved,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Approved => "approved",
            OrderStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    /// None for free-trial orders, which are not tied to a purchased plan.
    pub plan_id: Option<i64>,
    pub status: OrderStatus,
    pub panel_id: Option<i64>,
    /// External panel account name. Set together with panel_id and the
    /// approved status, never on its own.
    pub marzban_username: Option<String>,
    pub screenshot_file_id: Option<String>,
    pub discount_code: Option<String>,
    pub final_price: i64,
    pub created_at: DateTime<Utc>,
    /// Date-granularity dedup for the reminder sweep.
    pub last_reminder_date: Option<NaiveDate>,
}
