use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use sarv_db::models::order::Order;
use sarv_db::repositories::{OrderRepository, PanelRepository};
use sqlx::PgPool;
use teloxide::prelude::*;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use crate::marzban::{MarzbanAccount, MarzbanClient};
use crate::services::settings_service::SettingsService;

const SEND_GAP: Duration = Duration::from_millis(500);

const DEFAULT_TEMPLATE: &str = "⏰ Renewal reminder for service {username}\n\n{details}\n\n\
                                You can renew from the My Services menu.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderReason {
    ExpiresSoon { days_left: i64 },
    QuotaNearlyUsed { percent: u8 },
}

impl ReminderReason {
    pub fn detail_text(&self) -> String {
        match self {
            ReminderReason::ExpiresSoon { days_left } => format!(
                "Only {} day(s) of service time remain.",
                days_left + 1
            ),
            ReminderReason::QuotaNearlyUsed { percent } => format!(
                "More than {}% of your traffic has been used.",
                percent
            ),
        }
    }
}

/// Two independent rules, time-based checked first; first hit wins.
pub fn reminder_reason(account: &MarzbanAccount, now: i64) -> Option<ReminderReason> {
    if let Some(expire) = account.expire_ts() {
        let seconds_left = expire - now;
        if seconds_left >= 0 && seconds_left / 86400 <= 3 {
            return Some(ReminderReason::ExpiresSoon {
                days_left: seconds_left / 86400,
            });
        }
    }

    let limit = account.data_limit_bytes();
    if limit > 0 {
        let ratio = account.used_traffic as f64 / limit as f64;
        if ratio >= 0.80 {
            return Some(ReminderReason::QuotaNearlyUsed {
                percent: (ratio * 100.0).min(100.0) as u8,
            });
        }
    }

    None
}

#[derive(Debug, Default)]
pub struct SweepStats {
    pub reminders_sent: usize,
    pub panels_skipped: usize,
}

#[derive(Clone)]
pub struct SweeperService {
    orders: OrderRepository,
    panels: PanelRepository,
    settings: SettingsService,
    bot: Bot,
}

impl SweeperService {
    pub fn new(pool: PgPool, settings: SettingsService, bot: Bot) -> Self {
        Self {
            orders: OrderRepository::new(pool.clone()),
            panels: PanelRepository::new(pool),
            settings,
            bot,
        }
    }

    /// Daily schedule. The first tick fires immediately so a restart does
    /// not skip a day; the per-order date guard keeps that idempotent.
    pub async fn start(self) {
        let mut timer = interval(Duration::from_secs(86_400));
        loop {
            timer.tick().await;
            match self.run_once().await {
                Ok(stats) => info!(
                    "Expiration sweep done: {} reminders sent, {} panels skipped",
                    stats.reminders_sent, stats.panels_skipped
                ),
                Err(e) => error!("Expiration sweep failed: {:#}", e),
            }
        }
    }

    /// One full sweep. Panel list calls are bounded at one per panel; a
    /// failing panel or an unreachable recipient never stops the rest.
    pub async fn run_once(&self) -> Result<SweepStats> {
        let today = Utc::now().date_naive();
        let now_ts = Utc::now().timestamp();
        let template = self
            .settings
            .get_or_default("renewal_reminder_text", DEFAULT_TEMPLATE)
            .await;

        let orders = self.orders.active_provisioned().await?;
        let mut stats = SweepStats::default();

        for panel in self.panels.list_active().await? {
            // A username can map to several historical orders; all of them
            // are checked and reminded independently.
            let mut by_username: HashMap<&str, Vec<&Order>> = HashMap::new();
            for order in orders.iter().filter(|o| o.panel_id == Some(panel.id)) {
                if let Some(name) = order.marzban_username.as_deref() {
                    by_username.entry(name).or_default().push(order);
                }
            }
            if by_username.is_empty() {
                continue;
            }

            let client = match MarzbanClient::from_panel(&panel) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Skipping panel {}: {}", panel.name, e);
                    stats.panels_skipped += 1;
                    continue;
                }
            };
            let accounts = match client.list_accounts().await {
                Ok(list) => list,
                Err(e) => {
                    warn!("Skipping panel {}: account listing failed: {}", panel.name, e);
                    stats.panels_skipped += 1;
                    continue;
                }
            };

            for account in &accounts {
                let Some(mapped) = by_username.get(account.username.as_str()) else {
                    continue;
                };
                let Some(reason) = reminder_reason(account, now_ts) else {
                    continue;
                };

                for order in mapped {
                    if order.last_reminder_date == Some(today) {
                        continue;
                    }

                    let text = template
                        .replace("{username}", &account.username)
                        .replace("{details}", &reason.detail_text());

                    match self.bot.send_message(ChatId(order.user_id), text).await {
                        Ok(_) => {
                            self.orders.set_reminder_date(order.id, today).await?;
                            stats.reminders_sent += 1;
                            info!(
                                "Reminder sent to user {} for service {}",
                                order.user_id, account.username
                            );
                        }
                        Err(e) => {
                            warn!(
                                "Could not send reminder to user {}: {}",
                                order.user_id, e
                            );
                        }
                    }
                    tokio::time::sleep(SEND_GAP).await;
                }
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(expire: Option<i64>, data_limit: Option<i64>, used: i64) -> MarzbanAccount {
        MarzbanAccount {
            username: "user_1_abc123".into(),
            status: "active".into(),
            expire,
            data_limit,
            used_traffic: used,
            subscription_url: None,
            links: vec![],
        }
    }

    const NOW: i64 = 1_700_000_000;
    const GB: i64 = 1 << 30;

    #[test]
    fn expiry_within_three_days_triggers() {
        for days in 0..=3 {
            let acc = account(Some(NOW + days * 86400 + 3600), None, 0);
            assert_eq!(
                reminder_reason(&acc, NOW),
                Some(ReminderReason::ExpiresSoon { days_left: days }),
                "days={}",
                days
            );
        }
    }

    #[test]
    fn expiry_beyond_three_days_is_quiet() {
        let acc = account(Some(NOW + 5 * 86400), None, 0);
        assert_eq!(reminder_reason(&acc, NOW), None);
    }

    #[test]
    fn already_expired_is_quiet() {
        let acc = account(Some(NOW - 86400), None, 0);
        assert_eq!(reminder_reason(&acc, NOW), None);
    }

    #[test]
    fn unlimited_account_never_reminds() {
        let acc = account(None, None, 500 * GB);
        assert_eq!(reminder_reason(&acc, NOW), None);
        let acc = account(Some(0), Some(0), 500 * GB);
        assert_eq!(reminder_reason(&acc, NOW), None);
    }

    #[test]
    fn usage_at_eighty_percent_triggers() {
        let acc = account(None, Some(10 * GB), 8 * GB);
        assert_eq!(
            reminder_reason(&acc, NOW),
            Some(ReminderReason::QuotaNearlyUsed { percent: 80 })
        );
    }

    #[test]
    fn usage_just_below_threshold_is_quiet() {
        let acc = account(None, Some(1000), 799);
        assert_eq!(reminder_reason(&acc, NOW), None);
    }

    #[test]
    fn time_rule_wins_over_usage_rule() {
        let acc = account(Some(NOW + 86400), Some(10 * GB), 9 * GB);
        assert!(matches!(
            reminder_reason(&acc, NOW),
            Some(ReminderReason::ExpiresSoon { .. })
        ));
    }

    #[test]
    fn overused_percent_is_capped() {
        let acc = account(None, Some(GB), 3 * GB);
        assert_eq!(
            reminder_reason(&acc, NOW),
            Some(ReminderReason::QuotaNearlyUsed { percent: 100 })
        );
    }
}
