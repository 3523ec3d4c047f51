use anyhow::Result;
use chrono::{DateTime, Utc};
use sarv_db::models::discount::DiscountCode;
use sarv_db::repositories::DiscountRepository;
use sqlx::PgPool;
use thiserror::Error;

/// Why a code was turned down. Display text goes straight to the user;
/// a rejection ends the attempt, not the order.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiscountRejection {
    #[error("Discount code not found.")]
    NotFound,
    #[error("This discount code has expired.")]
    Expired,
    #[error("This discount code has reached its usage limit.")]
    Exhausted,
}

#[derive(Clone)]
pub struct DiscountService {
    repo: DiscountRepository,
}

impl DiscountService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: DiscountRepository::new(pool),
        }
    }

    /// Validation never consumes a usage slot; abandoning checkout after
    /// entering a code must not burn it.
    pub async fn validate(&self, code: &str) -> Result<Result<DiscountCode, DiscountRejection>> {
        let Some(found) = self.repo.find_by_code(code).await? else {
            return Ok(Err(DiscountRejection::NotFound));
        };
        Ok(check_code(&found, Utc::now()).map(|_| found))
    }

    pub async fn list(&self) -> Result<Vec<DiscountCode>> {
        self.repo.list().await
    }

    pub async fn create(
        &self,
        code: &str,
        percentage: i32,
        usage_limit: i32,
        expiry_date: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        anyhow::ensure!(
            is_valid_code(code.trim()),
            "Discount codes must contain letters and digits only"
        );
        self.repo.create(code.trim(), percentage, usage_limit, expiry_date).await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.repo.delete(id).await
    }
}

/// Ordered checks, first failure wins: expired before exhausted.
pub fn check_code(code: &DiscountCode, now: DateTime<Utc>) -> Result<(), DiscountRejection> {
    if code.is_expired(now) {
        return Err(DiscountRejection::Expired);
    }
    if code.is_exhausted() {
        return Err(DiscountRejection::Exhausted);
    }
    Ok(())
}

/// Integer floor of the discounted price.
pub fn apply_discount(price: i64, percentage: i32) -> i64 {
    price * (100 - percentage as i64) / 100
}

/// Codes travel inside colon-delimited callback data, so anything beyond
/// letters and digits is rejected at creation.
pub fn is_valid_code(code: &str) -> bool {
    !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(limit: i32, used: i32, expiry: Option<DateTime<Utc>>) -> DiscountCode {
        DiscountCode {
            id: 1,
            code: "OFF20".into(),
            percentage: 20,
            usage_limit: limit,
            times_used: used,
            expiry_date: expiry,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn apply_floors_the_result() {
        assert_eq!(apply_discount(99, 10), 89);
        assert_eq!(apply_discount(100, 50), 50);
        assert_eq!(apply_discount(100_000, 20), 80_000);
        assert_eq!(apply_discount(0, 99), 0);
    }

    #[test]
    fn valid_code_passes() {
        let now = Utc::now();
        assert_eq!(check_code(&sample(5, 0, None), now), Ok(()));
    }

    #[test]
    fn expired_reported_before_exhausted() {
        let now = Utc::now();
        let code = sample(1, 1, Some(now - Duration::days(1)));
        assert_eq!(check_code(&code, now), Err(DiscountRejection::Expired));
    }

    #[test]
    fn exhausted_code_rejected() {
        let now = Utc::now();
        assert_eq!(
            check_code(&sample(1, 1, None), now),
            Err(DiscountRejection::Exhausted)
        );
    }

    #[test]
    fn unlimited_code_survives_heavy_use() {
        let now = Utc::now();
        assert_eq!(check_code(&sample(0, 9_999, None), now), Ok(()));
    }

    #[test]
    fn single_use_code_rejects_a_second_order() {
        let now = Utc::now();
        let mut code = sample(1, 0, None);
        assert_eq!(check_code(&code, now), Ok(()));
        code.times_used += 1;
        assert_eq!(check_code(&code, now), Err(DiscountRejection::Exhausted));
    }

    #[test]
    fn code_charset_is_alphanumeric_only() {
        assert!(is_valid_code("OFF20"));
        assert!(is_valid_code("summer2026"));
        assert!(!is_valid_code(""));
        assert!(!is_valid_code("OFF:20"));
        assert!(!is_valid_code("OFF 20"));
        assert!(!is_valid_code("OFF-20"));
    }
}
