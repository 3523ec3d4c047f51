use anyhow::{Context, Result};
use chrono::Utc;
use sarv_db::models::order::OrderStatus;
use sarv_db::models::panel::Panel;
use sarv_db::models::plan::Plan;
use sarv_db::repositories::{
    DiscountRepository, FreeTrialRepository, OrderRepository, PanelRepository,
};
use sqlx::PgPool;
use tracing::{error, info};

use crate::marzban::types::{
    data_limit_bytes, expire_timestamp, generate_username, group_inbounds, renewed_expire,
    resolve_subscription_link,
};
use crate::marzban::{AccountPatch, MarzbanClient, NewAccount, PanelError};
use crate::services::settings_service::SettingsService;

/// Traffic/duration pair to provision with. Free trials use a synthetic
/// spec from settings rather than a stored plan.
#[derive(Debug, Clone, Copy)]
pub struct ProvisionSpec {
    pub duration_days: i32,
    pub traffic_gb: f64,
}

impl From<&Plan> for ProvisionSpec {
    fn from(plan: &Plan) -> Self {
        Self {
            duration_days: plan.duration_days,
            traffic_gb: plan.traffic_gb,
        }
    }
}

#[derive(Debug)]
pub enum ApproveOutcome {
    Provisioned {
        user_id: i64,
        marzban_username: String,
        subscription_link: String,
    },
    /// Duplicate button press or a retried callback; nothing changed.
    AlreadyReviewed,
    /// Order untouched so the admin can retry, possibly on another panel.
    PanelFailed(String),
}

#[derive(Debug)]
pub enum RenewOutcome {
    Renewed { user_id: i64 },
    PanelFailed(String),
}

#[derive(Debug)]
pub enum TrialOutcome {
    Granted {
        marzban_username: String,
        subscription_link: String,
        traffic_gb: f64,
        duration_days: i32,
    },
    AlreadyUsed,
    NoPanels,
    PanelFailed(String),
}

#[derive(Clone)]
pub struct ProvisionService {
    pool: PgPool,
    orders: OrderRepository,
    panels: PanelRepository,
    trials: FreeTrialRepository,
    discounts: DiscountRepository,
    settings: SettingsService,
}

impl ProvisionService {
    pub fn new(pool: PgPool, settings: SettingsService) -> Self {
        Self {
            orders: OrderRepository::new(pool.clone()),
            panels: PanelRepository::new(pool.clone()),
            trials: FreeTrialRepository::new(pool.clone()),
            discounts: DiscountRepository::new(pool.clone()),
            settings,
            pool,
        }
    }

    /// Creates an account on the given panel. Hard precondition: the panel
    /// must have inbounds configured; nothing is ever guessed.
    async fn create_account(
        &self,
        panel: &Panel,
        user_id: i64,
        spec: ProvisionSpec,
    ) -> Result<(String, String), PanelError> {
        let inbound_rows = self
            .panels
            .active_inbounds(panel.id)
            .await
            .map_err(|e| PanelError::Api(e.to_string()))?;
        if inbound_rows.is_empty() {
            return Err(PanelError::NoInbounds);
        }

        let client = MarzbanClient::from_panel(panel)?;
        let now = Utc::now().timestamp();
        let account = NewAccount::new(
            generate_username(user_id),
            data_limit_bytes(spec.traffic_gb),
            expire_timestamp(spec.duration_days, now),
            group_inbounds(&inbound_rows),
        );

        let created = client.create_account(&account).await?;
        let link = resolve_subscription_link(client.base_url(), &created);
        info!(
            "Provisioned account {} on panel {} for user {}",
            created.username, panel.name, user_id
        );
        Ok((created.username, link))
    }

    /// Admin approval of a pending purchase. The username, panel id and
    /// approved status land in one UPDATE, and the discount slot is taken in
    /// the same transaction: the order can never end up half-provisioned.
    pub async fn approve_order(&self, order_id: i64, panel_id: i64) -> Result<ApproveOutcome> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .context("Order not found")?;
        if order.status != OrderStatus::Pending {
            return Ok(ApproveOutcome::AlreadyReviewed);
        }

        let plan_id = order.plan_id.context("Order has no plan attached")?;
        let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1")
            .bind(plan_id)
            .fetch_one(&self.pool)
            .await
            .context("Plan for this order no longer exists")?;
        let panel = self
            .panels
            .get(panel_id)
            .await?
            .context("Panel not found or inactive")?;

        let (username, link) = match self
            .create_account(&panel, order.user_id, ProvisionSpec::from(&plan))
            .await
        {
            Ok(created) => created,
            Err(e) => {
                error!("Provisioning failed for order {}: {}", order_id, e);
                return Ok(ApproveOutcome::PanelFailed(e.to_string()));
            }
        };

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE orders SET status = 'approved', marzban_username = $1, panel_id = $2 \
             WHERE id = $3 AND status = 'pending'",
        )
        .bind(&username)
        .bind(panel.id)
        .bind(order_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            // Raced with another approval; the panel account is orphaned but
            // the ledger stays consistent.
            tx.rollback().await?;
            return Ok(ApproveOutcome::AlreadyReviewed);
        }

        if let Some(code) = &order.discount_code {
            DiscountRepository::consume_by_code_in(&mut tx, code).await?;
        }
        tx.commit().await?;

        info!("Order {} approved with account {}", order_id, username);
        Ok(ApproveOutcome::Provisioned {
            user_id: order.user_id,
            marzban_username: username,
            subscription_link: link,
        })
    }

    /// Guarded terminal rejection; false means the order was already reviewed.
    pub async fn reject_order(&self, order_id: i64) -> Result<bool> {
        self.orders.set_rejected(order_id).await
    }

    /// Approval without a panel account: the admin delivers the config out
    /// of band. Same pending guard and discount consumption as the
    /// provisioned path; false means the order was already reviewed.
    pub async fn approve_manual(&self, order_id: i64) -> Result<bool> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .context("Order not found")?;

        let mut tx = self.pool.begin().await?;
        let updated =
            sqlx::query("UPDATE orders SET status = 'approved' WHERE id = $1 AND status = 'pending'")
                .bind(order_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        if let Some(code) = &order.discount_code {
            DiscountRepository::consume_by_code_in(&mut tx, code).await?;
        }
        tx.commit().await?;

        info!("Order {} approved manually", order_id);
        Ok(true)
    }

    /// Renewal mutates the panel account, not the ledger: expiry is anchored
    /// at max(current, now) and traffic is added on top of what remains.
    pub async fn renew_order(
        &self,
        order_id: i64,
        plan: &Plan,
        discount_code: Option<&str>,
    ) -> Result<RenewOutcome> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .context("Order not found")?;
        let username = order
            .marzban_username
            .as_deref()
            .context("Order has no panel account recorded")?;
        let panel_id = order.panel_id.context("Order has no panel recorded")?;
        let panel = self
            .panels
            .get(panel_id)
            .await?
            .context("Panel not found or inactive")?;

        let client = match MarzbanClient::from_panel(&panel) {
            Ok(c) => c,
            Err(e) => return Ok(RenewOutcome::PanelFailed(e.to_string())),
        };

        let account = match client.get_account(username).await {
            Ok(a) => a,
            Err(PanelError::NotFound) => {
                return Ok(RenewOutcome::PanelFailed(format!(
                    "Account {} not found on panel for renewal",
                    username
                )));
            }
            Err(e) => return Ok(RenewOutcome::PanelFailed(e.to_string())),
        };

        let now = Utc::now().timestamp();
        let patch = AccountPatch {
            expire: renewed_expire(account.expire, now, plan.duration_days),
            data_limit: account.data_limit_bytes() + data_limit_bytes(plan.traffic_gb),
        };

        if let Err(e) = client.update_account(username, &patch).await {
            error!("Renewal failed for order {}: {}", order_id, e);
            return Ok(RenewOutcome::PanelFailed(e.to_string()));
        }

        // Fresh reminder cycle for the extended service, and the renewal's
        // discount slot is taken only now that the panel side succeeded.
        self.orders.clear_reminder(order_id).await?;
        if let Some(code) = discount_code {
            self.discounts.consume_by_code(code).await?;
        }

        info!("Order {} renewed ({} +{}d)", order_id, username, plan.duration_days);
        Ok(RenewOutcome::Renewed {
            user_id: order.user_id,
        })
    }

    /// Free trial bypasses payment entirely: it inserts an approved order
    /// directly, gated by the per-user trial record checked before any
    /// network call.
    pub async fn grant_free_trial(&self, user_id: i64) -> Result<TrialOutcome> {
        if self.trials.exists(user_id).await? {
            return Ok(TrialOutcome::AlreadyUsed);
        }

        let Some(panel) = self.panels.first_active().await? else {
            return Ok(TrialOutcome::NoPanels);
        };

        let spec = ProvisionSpec {
            traffic_gb: self
                .settings
                .get_or_default("free_trial_gb", "0.2")
                .await
                .parse()
                .unwrap_or(0.2),
            duration_days: self
                .settings
                .get_or_default("free_trial_days", "1")
                .await
                .parse()
                .unwrap_or(1),
        };

        let (username, link) = match self.create_account(&panel, user_id, spec).await {
            Ok(created) => created,
            Err(e) => return Ok(TrialOutcome::PanelFailed(e.to_string())),
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO orders (user_id, status, panel_id, marzban_username, final_price) \
             VALUES ($1, 'approved', $2, $3, 0)",
        )
        .bind(user_id)
        .bind(panel.id)
        .bind(&username)
        .execute(&mut *tx)
        .await?;
        sqlx::query("INSERT INTO free_trials (user_id) VALUES ($1)")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Free trial granted to user {} as {}", user_id, username);
        Ok(TrialOutcome::Granted {
            marzban_username: username,
            subscription_link: link,
            traffic_gb: spec.traffic_gb,
            duration_days: spec.duration_days,
        })
    }
}
