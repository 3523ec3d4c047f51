use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DiscountCode {
    pub id: i64,
    /// Stored uppercase; lookups are case-insensitive.
    pub code: String,
    /// 1..=100
    pub percentage: i32,
    /// 0 = unlimited uses.
    pub usage_limit: i32,
    pub times_used: i32,
    pub expiry_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DiscountCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expiry_date, Some(exp) if exp < now)
    }

    pub fn is_exhausted(&self) -> bool {
        self.usage_limit > 0 && self.times_used >= self.usage_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn code(usage_limit: i32, times_used: i32, expiry: Option<DateTime<Utc>>) -> DiscountCode {
        DiscountCode {
            id: 1,
            code: "OFF20".into(),
            percentage: 20,
            usage_limit,
            times_used,
            expiry_date: expiry,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn unlimited_code_never_exhausts() {
        assert!(!code(0, 10_000, None).is_exhausted());
    }

    #[test]
    fn limited_code_exhausts_at_limit() {
        assert!(!code(5, 4, None).is_exhausted());
        assert!(code(5, 5, None).is_exhausted());
    }

    #[test]
    fn expiry_is_checked_against_now() {
        let now = Utc::now();
        assert!(code(0, 0, Some(now - Duration::hours(1))).is_expired(now));
        assert!(!code(0, 0, Some(now + Duration::hours(1))).is_expired(now));
        assert!(!code(0, 0, None).is_expired(now));
    }
}
