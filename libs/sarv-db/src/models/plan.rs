use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Integer currency units (toman). Orders snapshot their own
    /// final_price, so editing this never rewrites history.
    pub price: i64,
    /// 0 = no expiry.
    pub duration_days: i32,
    /// 0.0 = unlimited traffic.
    pub traffic_gb: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn is_unlimited_traffic(&self) -> bool {
        self.traffic_gb <= 0.0
    }

    pub fn is_unlimited_duration(&self) -> bool {
        self.duration_days <= 0
    }
}
