use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

/// In-flight purchase or renewal data, snapshotted step by step. The final
/// price travels with the draft so a plan edit mid-checkout cannot change
/// what the user was quoted.
#[derive(Debug, Clone)]
pub struct PurchaseDraft {
    pub plan_id: i64,
    pub original_price: i64,
    pub final_price: i64,
    pub discount_code: Option<String>,
    /// Set when this draft renews an existing service instead of buying.
    pub renewing_order_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub enum Session {
    AwaitDiscountCode(PurchaseDraft),
    AwaitScreenshot(PurchaseDraft),
    AwaitBroadcast,
    /// Admin is about to send the message that fulfils this order by hand.
    AwaitManualDelivery { order_id: i64 },
}

/// Per-user conversation scratch state, keyed by telegram id and cleared on
/// completion or /cancel. Explicit and passed through handlers rather than
/// living in framework globals.
#[derive(Clone, Default)]
pub struct Sessions {
    inner: Arc<RwLock<HashMap<i64, Session>>>,
}

impl Sessions {
    pub async fn get(&self, user_id: i64) -> Option<Session> {
        self.inner.read().await.get(&user_id).cloned()
    }

    pub async fn set(&self, user_id: i64, session: Session) {
        self.inner.write().await.insert(user_id, session);
    }

    pub async fn clear(&self, user_id: i64) {
        self.inner.write().await.remove(&user_id);
    }

    pub async fn take(&self, user_id: i64) -> Option<Session> {
        self.inner.write().await.remove(&user_id)
    }
}
