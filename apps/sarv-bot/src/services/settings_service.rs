use std::collections::HashMap;
use std::sync::Arc;

use sarv_db::repositories::SettingsRepository;
use sqlx::PgPool;
use tokio::sync::RwLock;

/// DB-backed key/value settings with a small in-memory cache. Writes go
/// through here so the cache never serves stale values.
#[derive(Clone)]
pub struct SettingsService {
    repo: SettingsRepository,
    cache: Arc<RwLock<HashMap<String, String>>>,
}

impl SettingsService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: SettingsRepository::new(pool),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        if let Some(val) = self.cache.read().await.get(key) {
            return Some(val.clone());
        }

        match self.repo.get(key).await {
            Ok(Some(val)) => {
                self.cache.write().await.insert(key.to_string(), val.clone());
                Some(val)
            }
            _ => None,
        }
    }

    pub async fn get_or_default(&self, key: &str, default: &str) -> String {
        self.get(key).await.unwrap_or_else(|| default.to_string())
    }

    pub async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.repo.set(key, value).await?;
        self.cache
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
