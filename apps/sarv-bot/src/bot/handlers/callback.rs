use chrono::Utc;
use sarv_db::models::order::OrderStatus;
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use tracing::{info, warn};

use crate::bot::keyboards;
use crate::bot::session::{PurchaseDraft, Session};
use crate::bot::utils::{format_expire, format_price};
use crate::bot::handlers::payment::show_payment_info;
use crate::marzban::types::bytes_to_gb;
use crate::marzban::MarzbanClient;
use crate::services::backup_service;
use crate::services::provision_service::{ApproveOutcome, RenewOutcome, TrialOutcome};
use crate::state::AppState;

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    let Some(data) = q.data.clone() else {
        return Ok(());
    };
    let tg_id = q.from.id.0 as i64;
    let Some(message) = q.message.as_ref() else {
        return Ok(());
    };
    let chat = message.chat().id;
    let msg_id = message.id();
    let _ = bot.answer_callback_query(q.id.clone()).await;

    let parts: Vec<&str> = data.split(':').collect();
    match parts.as_slice() {
        ["menu"] => {
            state.sessions.clear(tg_id).await;
            let trial_enabled = state
                .settings
                .get_or_default("free_trial_enabled", "true")
                .await
                == "true";
            let welcome = state
                .settings
                .get_or_default("welcome_text", "👋 Welcome! Pick an option from the menu below.")
                .await;
            let _ = bot
                .edit_message_text(chat, msg_id, welcome)
                .reply_markup(keyboards::main_menu(trial_enabled))
                .await;
        }

        ["buy"] => {
            state.sessions.clear(tg_id).await;
            match state.plans.list_active().await {
                Ok(plans) if plans.is_empty() => {
                    let _ = bot
                        .edit_message_text(chat, msg_id, "No plans are available right now.")
                        .reply_markup(keyboards::back_to_menu())
                        .await;
                }
                Ok(plans) => {
                    let _ = bot
                        .edit_message_text(chat, msg_id, "🛒 Choose a plan:")
                        .reply_markup(keyboards::plan_list(&plans))
                        .await;
                }
                Err(e) => warn!("Plan list failed: {:#}", e),
            }
        }

        ["plan", id] => {
            let Ok(plan_id) = id.parse::<i64>() else { return Ok(()) };
            if let Ok(Some(plan)) = state.plans.get(plan_id).await {
                let traffic = if plan.is_unlimited_traffic() {
                    "unlimited".to_string()
                } else {
                    format!("{} GB", plan.traffic_gb)
                };
                let duration = if plan.is_unlimited_duration() {
                    "unlimited".to_string()
                } else {
                    format!("{} days", plan.duration_days)
                };
                let text = format!(
                    "📋 {}\n{}\n\n⏳ Duration: {}\n📦 Traffic: {}\n💰 Price: {} toman",
                    plan.name,
                    plan.description,
                    duration,
                    traffic,
                    format_price(plan.price)
                );
                let _ = bot
                    .edit_message_text(chat, msg_id, text)
                    .reply_markup(keyboards::plan_confirm(plan_id))
                    .await;
            }
        }

        ["disc", id] => {
            let Ok(plan_id) = id.parse::<i64>() else { return Ok(()) };
            if let Ok(Some(plan)) = state.plans.get(plan_id).await {
                let draft = PurchaseDraft {
                    plan_id,
                    original_price: plan.price,
                    final_price: plan.price,
                    discount_code: None,
                    renewing_order_id: None,
                };
                state.sessions.set(tg_id, Session::AwaitDiscountCode(draft)).await;
                let _ = bot
                    .edit_message_text(chat, msg_id, "Enter your discount code (or /cancel):")
                    .await;
            }
        }

        ["pay", id] => {
            let Ok(plan_id) = id.parse::<i64>() else { return Ok(()) };
            if let Ok(Some(plan)) = state.plans.get(plan_id).await {
                let draft = PurchaseDraft {
                    plan_id,
                    original_price: plan.price,
                    final_price: plan.price,
                    discount_code: None,
                    renewing_order_id: None,
                };
                show_payment_info(&bot, chat, &state, tg_id, draft).await?;
            }
        }

        ["trial"] => {
            let _ = bot
                .edit_message_text(chat, msg_id, "Please wait... 🕒")
                .await;
            let text = match state.provision.grant_free_trial(tg_id).await {
                Ok(TrialOutcome::Granted {
                    marzban_username: _,
                    subscription_link,
                    traffic_gb,
                    duration_days,
                }) => format!(
                    "✅ Your free trial config is ready!\n\n📦 Traffic: {} GB\n⏳ Valid for: {} day(s)\n\nYour config link:\n<code>{}</code>",
                    traffic_gb, duration_days, subscription_link
                ),
                Ok(TrialOutcome::AlreadyUsed) => {
                    "You have already used your free trial.".to_string()
                }
                Ok(TrialOutcome::NoPanels) => {
                    "❌ No panel is configured to serve trials right now.".to_string()
                }
                Ok(TrialOutcome::PanelFailed(e)) => {
                    format!("❌ Trial config could not be created.\nError: {}", e)
                }
                Err(e) => {
                    warn!("Free trial failed for {}: {:#}", tg_id, e);
                    "❌ Something went wrong, try again later.".to_string()
                }
            };
            let _ = bot
                .edit_message_text(chat, msg_id, text)
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::back_to_menu())
                .await;
        }

        ["services"] => {
            match state.orders.for_user(tg_id).await {
                Ok(orders) if orders.is_empty() => {
                    let _ = bot
                        .edit_message_text(chat, msg_id, "You have no active services.")
                        .reply_markup(keyboards::back_to_menu())
                        .await;
                }
                Ok(orders) => {
                    let _ = bot
                        .edit_message_text(chat, msg_id, "🔑 Your services:")
                        .reply_markup(keyboards::service_list(&orders))
                        .await;
                }
                Err(e) => warn!("Service list failed: {:#}", e),
            }
        }

        ["svc", id] => {
            let Ok(order_id) = id.parse::<i64>() else { return Ok(()) };
            let text = service_detail_text(&state, tg_id, order_id).await;
            let _ = bot
                .edit_message_text(chat, msg_id, text)
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::service_detail(order_id))
                .await;
        }

        ["renewplans", oid] => {
            let Ok(order_id) = oid.parse::<i64>() else { return Ok(()) };
            if let Ok(plans) = state.plans.list_active().await {
                if plans.is_empty() {
                    let _ = bot
                        .edit_message_text(chat, msg_id, "No plans available for renewal.")
                        .reply_markup(keyboards::back_to_menu())
                        .await;
                } else {
                    let _ = bot
                        .edit_message_text(chat, msg_id, "♻️ Choose a renewal plan:")
                        .reply_markup(keyboards::renewal_plan_list(order_id, &plans))
                        .await;
                }
            }
        }

        ["rplan", oid, pid] => {
            let (Ok(order_id), Ok(plan_id)) = (oid.parse::<i64>(), pid.parse::<i64>()) else {
                return Ok(());
            };
            if let Ok(Some(plan)) = state.plans.get(plan_id).await {
                let text = format!(
                    "♻️ Renew with plan {}\n\n+{} days, +{} GB\n💰 Price: {} toman",
                    plan.name,
                    plan.duration_days,
                    plan.traffic_gb,
                    format_price(plan.price)
                );
                let _ = bot
                    .edit_message_text(chat, msg_id, text)
                    .reply_markup(keyboards::renewal_confirm(order_id, plan_id))
                    .await;
            }
        }

        ["rdisc", oid, pid] => {
            let (Ok(order_id), Ok(plan_id)) = (oid.parse::<i64>(), pid.parse::<i64>()) else {
                return Ok(());
            };
            if let Ok(Some(plan)) = state.plans.get(plan_id).await {
                let draft = PurchaseDraft {
                    plan_id,
                    original_price: plan.price,
                    final_price: plan.price,
                    discount_code: None,
                    renewing_order_id: Some(order_id),
                };
                state.sessions.set(tg_id, Session::AwaitDiscountCode(draft)).await;
                let _ = bot
                    .edit_message_text(
                        chat,
                        msg_id,
                        "Enter your discount code for this renewal (or /cancel):",
                    )
                    .await;
            }
        }

        ["rpay", oid, pid] => {
            let (Ok(order_id), Ok(plan_id)) = (oid.parse::<i64>(), pid.parse::<i64>()) else {
                return Ok(());
            };
            if let Ok(Some(plan)) = state.plans.get(plan_id).await {
                let draft = PurchaseDraft {
                    plan_id,
                    original_price: plan.price,
                    final_price: plan.price,
                    discount_code: None,
                    renewing_order_id: Some(order_id),
                };
                show_payment_info(&bot, chat, &state, tg_id, draft).await?;
            }
        }

        // --- Admin actions below; all are safe to re-click. ---
        ["approve", oid] if state.is_admin(tg_id) => {
            let Ok(order_id) = oid.parse::<i64>() else { return Ok(()) };
            match state.orders.get(order_id).await {
                Ok(Some(order)) if order.status == OrderStatus::Pending => {
                    match state.panels.list_active().await {
                        Ok(panels) if panels.is_empty() => {
                            let _ = bot
                                .edit_message_caption(chat, msg_id)
                                .caption(format!(
                                    "Order #{} — ❌ no panels configured to provision on.",
                                    order_id
                                ))
                                .await;
                        }
                        Ok(panels) => {
                            let _ = bot
                                .edit_message_reply_markup(chat, msg_id)
                                .reply_markup(keyboards::panel_pick(order_id, &panels))
                                .await;
                        }
                        Err(e) => warn!("Panel list failed: {:#}", e),
                    }
                }
                Ok(_) => {
                    let _ = bot
                        .edit_message_caption(chat, msg_id)
                        .caption(format!("Order #{} — ⚠️ already reviewed.", order_id))
                        .await;
                }
                Err(e) => warn!("Order load failed: {:#}", e),
            }
        }

        ["panelpick", oid, pid] if state.is_admin(tg_id) => {
            let (Ok(order_id), Ok(panel_id)) = (oid.parse::<i64>(), pid.parse::<i64>()) else {
                return Ok(());
            };
            match state.provision.approve_order(order_id, panel_id).await {
                Ok(ApproveOutcome::Provisioned {
                    user_id,
                    marzban_username,
                    subscription_link,
                }) => {
                    let user_msg = format!(
                        "✅ Your order was approved!\n\nYour config link:\n<code>{}</code>",
                        subscription_link
                    );
                    let delivery = bot
                        .send_message(ChatId(user_id), user_msg)
                        .parse_mode(ParseMode::Html)
                        .await;
                    let caption = match delivery {
                        Ok(_) => format!(
                            "Order #{} — ✅ provisioned as {} and delivered.",
                            order_id, marzban_username
                        ),
                        Err(e) => format!(
                            "Order #{} — ⚠️ provisioned as {} but delivery failed: {}\nConfig: {}",
                            order_id, marzban_username, e, subscription_link
                        ),
                    };
                    let _ = bot.edit_message_caption(chat, msg_id).caption(caption).await;
                }
                Ok(ApproveOutcome::AlreadyReviewed) => {
                    let _ = bot
                        .edit_message_caption(chat, msg_id)
                        .caption(format!("Order #{} — ⚠️ already reviewed.", order_id))
                        .await;
                }
                Ok(ApproveOutcome::PanelFailed(err)) => {
                    // Order is still pending; leave the review buttons up for
                    // a retry, possibly on a different panel.
                    let _ = bot
                        .edit_message_caption(chat, msg_id)
                        .caption(format!(
                            "Order #{} — ❌ panel error:\n{}\n\nThe order is still pending, you can retry.",
                            order_id, err
                        ))
                        .reply_markup(keyboards::order_review(order_id))
                        .await;
                }
                Err(e) => {
                    warn!("Approve failed for order {}: {:#}", order_id, e);
                    let _ = bot
                        .edit_message_caption(chat, msg_id)
                        .caption(format!("Order #{} — ❌ {:#}", order_id, e))
                        .await;
                }
            }
        }

        ["manual", oid] if state.is_admin(tg_id) => {
            let Ok(order_id) = oid.parse::<i64>() else { return Ok(()) };
            match state.orders.get(order_id).await {
                Ok(Some(order)) if order.status == OrderStatus::Pending => {
                    state
                        .sessions
                        .set(tg_id, Session::AwaitManualDelivery { order_id })
                        .await;
                    let _ = bot
                        .edit_message_caption(chat, msg_id)
                        .caption(format!(
                            "Order #{} — send the message to deliver to user {} \
                             (config, text or file). It will be copied as-is, \
                             then the order is approved. /cancel to abort.",
                            order_id, order.user_id
                        ))
                        .await;
                }
                Ok(_) => {
                    let _ = bot
                        .edit_message_caption(chat, msg_id)
                        .caption(format!("Order #{} — ⚠️ already reviewed.", order_id))
                        .await;
                }
                Err(e) => warn!("Order load failed: {:#}", e),
            }
        }

        ["reject", oid] if state.is_admin(tg_id) => {
            let Ok(order_id) = oid.parse::<i64>() else { return Ok(()) };
            match state.provision.reject_order(order_id).await {
                Ok(true) => {
                    if let Ok(Some(order)) = state.orders.get(order_id).await {
                        let _ = bot
                            .send_message(
                                ChatId(order.user_id),
                                "❌ Your payment was not approved. Please contact support.",
                            )
                            .await;
                    }
                    let _ = bot
                        .edit_message_caption(chat, msg_id)
                        .caption(format!("Order #{} — ❌ rejected.", order_id))
                        .await;
                }
                Ok(false) => {
                    let _ = bot
                        .edit_message_caption(chat, msg_id)
                        .caption(format!("Order #{} — ⚠️ already reviewed.", order_id))
                        .await;
                }
                Err(e) => warn!("Reject failed for order {}: {:#}", order_id, e),
            }
        }

        ["renewok", oid, pid] | ["renewok", oid, pid, _] if state.is_admin(tg_id) => {
            let (Ok(order_id), Ok(plan_id)) = (oid.parse::<i64>(), pid.parse::<i64>()) else {
                return Ok(());
            };
            let code = parts.get(3).copied();
            let Ok(Some(plan)) = state.plans.get(plan_id).await else {
                let _ = bot
                    .edit_message_caption(chat, msg_id)
                    .caption(format!("Order #{} — ❌ renewal plan not found.", order_id))
                    .await;
                return Ok(());
            };
            match state.provision.renew_order(order_id, &plan, code).await {
                Ok(RenewOutcome::Renewed { user_id }) => {
                    let _ = bot
                        .send_message(ChatId(user_id), "✅ Your service was renewed successfully!")
                        .await;
                    let _ = bot
                        .edit_message_caption(chat, msg_id)
                        .caption(format!("Order #{} — ✅ renewal completed.", order_id))
                        .await;
                    info!("Renewal approved for order {}", order_id);
                }
                Ok(RenewOutcome::PanelFailed(err)) => {
                    let _ = bot
                        .edit_message_caption(chat, msg_id)
                        .caption(format!(
                            "Order #{} — ❌ panel error during renewal:\n{}",
                            order_id, err
                        ))
                        .reply_markup(keyboards::renewal_review(order_id, plan_id, code))
                        .await;
                }
                Err(e) => warn!("Renewal failed for order {}: {:#}", order_id, e),
            }
        }

        ["sweep"] if state.is_admin(tg_id) => {
            let _ = bot
                .send_message(chat, "⏳ Running the reminder sweep...")
                .await;
            match state.sweeper.run_once().await {
                Ok(stats) => {
                    let _ = bot
                        .send_message(
                            chat,
                            format!(
                                "✅ Sweep finished: {} reminders sent, {} panels skipped.",
                                stats.reminders_sent, stats.panels_skipped
                            ),
                        )
                        .await;
                }
                Err(e) => {
                    let _ = bot
                        .send_message(chat, format!("❌ Sweep failed: {:#}", e))
                        .await;
                }
            }
        }

        ["backup"] if state.is_admin(tg_id) => {
            let _ = bot
                .send_message(chat, "⏳ Collecting accounts from the panels...")
                .await;
            let panels = match state.panels.list_active().await {
                Ok(panels) if panels.is_empty() => {
                    let _ = bot
                        .send_message(chat, "❌ No panels configured to back up.")
                        .await;
                    return Ok(());
                }
                Ok(panels) => panels,
                Err(e) => {
                    warn!("Panel list failed: {:#}", e);
                    return Ok(());
                }
            };

            let mut csv = String::from(backup_service::CSV_HEADER);
            let mut rows = 0usize;
            let mut skipped = 0usize;
            for panel in &panels {
                let client = match MarzbanClient::from_panel(panel) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("Backup skipping panel {}: {}", panel.name, e);
                        skipped += 1;
                        continue;
                    }
                };
                match client.list_accounts().await {
                    Ok(accounts) => {
                        for account in &accounts {
                            csv.push_str(&backup_service::csv_row(
                                &panel.name,
                                client.base_url(),
                                account,
                            ));
                            rows += 1;
                        }
                    }
                    Err(e) => {
                        warn!("Backup skipping panel {}: {}", panel.name, e);
                        skipped += 1;
                    }
                }
            }

            if rows == 0 {
                let _ = bot
                    .send_message(
                        chat,
                        format!("❌ No accounts found ({} panel(s) skipped).", skipped),
                    )
                    .await;
            } else {
                let file = InputFile::memory(csv.into_bytes())
                    .file_name(backup_service::backup_file_name(Utc::now().date_naive()));
                let _ = bot
                    .send_document(chat, file)
                    .caption(format!(
                        "✅ Backup of {} account(s) from {} panel(s); {} skipped.",
                        rows,
                        panels.len() - skipped,
                        skipped
                    ))
                    .await;
            }
        }

        ["stats"] if state.is_admin(tg_id) => {
            let users = state.users.count().await.unwrap_or(0);
            let pending = state
                .orders
                .count_by_status(OrderStatus::Pending.as_str())
                .await
                .unwrap_or(0);
            let approved = state
                .orders
                .count_by_status(OrderStatus::Approved.as_str())
                .await
                .unwrap_or(0);
            let rejected = state
                .orders
                .count_by_status(OrderStatus::Rejected.as_str())
                .await
                .unwrap_or(0);
            let _ = bot
                .send_message(
                    chat,
                    format!(
                        "📊 Stats\n\n👥 Users: {}\n🕑 Pending orders: {}\n✅ Approved orders: {}\n❌ Rejected orders: {}",
                        users, pending, approved, rejected
                    ),
                )
                .await;
        }

        ["broadcast"] if state.is_admin(tg_id) => {
            state.sessions.set(tg_id, Session::AwaitBroadcast).await;
            let _ = bot
                .send_message(
                    chat,
                    "Send the message to broadcast (text, photo, video or document), or /cancel.",
                )
                .await;
        }

        _ => {}
    }

    Ok(())
}

/// Live account details for one order, fetched from its panel. Panel trouble
/// degrades to a short notice instead of breaking the menu.
async fn service_detail_text(state: &AppState, tg_id: i64, order_id: i64) -> String {
    let order = match state.orders.get(order_id).await {
        Ok(Some(o)) if o.user_id == tg_id || state.is_admin(tg_id) => o,
        _ => return "❌ Service not found.".to_string(),
    };
    let (Some(username), Some(panel_id)) = (order.marzban_username.clone(), order.panel_id) else {
        return "❌ This order has no provisioned account.".to_string();
    };
    let panel = match state.panels.get(panel_id).await {
        Ok(Some(p)) => p,
        _ => return "❌ The panel for this service is unavailable.".to_string(),
    };

    let client = match MarzbanClient::from_panel(&panel) {
        Ok(c) => c,
        Err(e) => return format!("❌ Panel unavailable: {}", e),
    };
    match client.get_account(&username).await {
        Ok(account) => {
            let usage = if account.data_limit_bytes() > 0 {
                format!(
                    "{} / {} GB",
                    bytes_to_gb(account.used_traffic),
                    bytes_to_gb(account.data_limit_bytes())
                )
            } else {
                format!("{} GB / unlimited", bytes_to_gb(account.used_traffic))
            };
            format!(
                "🔐 <b>{}</b>\n\n▫️ Status: {}\n📦 Usage: {}\n⏳ Expires: {}",
                account.username,
                account.status,
                usage,
                format_expire(account.expire_ts())
            )
        }
        Err(e) => format!("🔐 {}\n\n⚠️ Could not fetch live status: {}", username, e),
    }
}
