use chrono::{NaiveDate, TimeZone, Utc};
use teloxide::prelude::*;
use tracing::{info, warn};

use crate::bot::handlers::payment;
use crate::bot::keyboards;
use crate::bot::session::Session;
use crate::bot::utils::{format_price, OutboundMedia};
use crate::services::discount_service::{apply_discount, is_valid_code};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageRoute {
    Command,
    Broadcast,
    ManualDelivery,
    PaymentProof,
    SessionText,
}

/// Commands win first so /cancel can escape any state. An armed broadcast
/// or manual-delivery session accepts any content, so those must be decided
/// before the screenshot path sees a photo.
fn route_message(session: Option<&Session>, text: Option<&str>, has_photo: bool) -> MessageRoute {
    if text.is_some_and(|t| t.starts_with('/')) {
        return MessageRoute::Command;
    }
    match session {
        Some(Session::AwaitBroadcast) => MessageRoute::Broadcast,
        Some(Session::AwaitManualDelivery { .. }) => MessageRoute::ManualDelivery,
        _ if has_photo => MessageRoute::PaymentProof,
        _ => MessageRoute::SessionText,
    }
}

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    let Some(user) = msg.from.clone() else {
        return Ok(());
    };
    let tg_id = user.id.0 as i64;

    let text = msg.text().map(|t| t.to_string());
    let session = state.sessions.get(tg_id).await;

    match route_message(session.as_ref(), text.as_deref(), msg.photo().is_some()) {
        MessageRoute::Command => {
            let text = text.unwrap_or_default();
            handle_command(bot, msg, state, tg_id, &text).await
        }
        MessageRoute::Broadcast => handle_broadcast(bot, msg, state, tg_id).await,
        MessageRoute::ManualDelivery => {
            let Some(Session::AwaitManualDelivery { order_id }) = session else {
                return Ok(());
            };
            handle_manual_delivery(bot, msg, state, tg_id, order_id).await
        }
        MessageRoute::PaymentProof => payment::handle_photo(bot, msg, state).await,
        MessageRoute::SessionText => match (session, text) {
            (Some(Session::AwaitDiscountCode(draft)), Some(text)) => {
                handle_discount_entry(bot, msg, state, tg_id, draft, &text).await
            }
            _ => Ok(()),
        },
    }
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    state: AppState,
    tg_id: i64,
    text: &str,
) -> Result<(), teloxide::RequestError> {
    let (cmd, rest) = match text.split_once(char::is_whitespace) {
        Some((c, r)) => (c, r.trim()),
        None => (text, ""),
    };

    match cmd {
        "/start" => {
            if let Some(user) = msg.from.as_ref() {
                if let Err(e) = state
                    .users
                    .upsert(tg_id, user.username.as_deref(), Some(&user.first_name))
                    .await
                {
                    warn!("User upsert failed for {}: {:#}", tg_id, e);
                }
            }
            state.sessions.clear(tg_id).await;
            send_main_menu(&bot, msg.chat.id, &state).await?;
        }
        "/cancel" => {
            state.sessions.clear(tg_id).await;
            bot.send_message(msg.chat.id, "Cancelled.").await?;
            send_main_menu(&bot, msg.chat.id, &state).await?;
        }
        "/admin" if state.is_admin(tg_id) => {
            bot.send_message(msg.chat.id, "🛠 Admin panel")
                .reply_markup(keyboards::admin_menu())
                .await?;
        }
        _ if state.is_admin(tg_id) => {
            return handle_admin_command(bot, msg.chat.id, state, cmd, rest).await;
        }
        _ => {}
    }
    Ok(())
}

pub async fn send_main_menu(
    bot: &Bot,
    chat: ChatId,
    state: &AppState,
) -> Result<(), teloxide::RequestError> {
    let trial_enabled = state
        .settings
        .get_or_default("free_trial_enabled", "true")
        .await
        == "true";
    let welcome = state
        .settings
        .get_or_default(
            "welcome_text",
            "👋 Welcome! Pick an option from the menu below.",
        )
        .await;
    bot.send_message(chat, welcome)
        .reply_markup(keyboards::main_menu(trial_enabled))
        .await?;
    Ok(())
}

async fn handle_discount_entry(
    bot: Bot,
    msg: Message,
    state: AppState,
    tg_id: i64,
    mut draft: crate::bot::session::PurchaseDraft,
    text: &str,
) -> Result<(), teloxide::RequestError> {
    match state.discounts.validate(text).await {
        Ok(Ok(code)) => {
            let new_price = apply_discount(draft.original_price, code.percentage);
            draft.final_price = new_price;
            draft.discount_code = Some(code.code.clone());
            bot.send_message(
                msg.chat.id,
                format!(
                    "✅ {}% discount applied.\nOriginal price: {} toman\nNew price: {} toman",
                    code.percentage,
                    format_price(draft.original_price),
                    format_price(new_price)
                ),
            )
            .await?;
            payment::show_payment_info(&bot, msg.chat.id, &state, tg_id, draft).await
        }
        Ok(Err(rejection)) => {
            // The attempt failed, not the order: the draft stays, the user
            // may retry another code or /cancel.
            bot.send_message(
                msg.chat.id,
                format!("❌ {} Enter another code or send /cancel.", rejection),
            )
            .await?;
            Ok(())
        }
        Err(e) => {
            warn!("Discount validation failed: {:#}", e);
            bot.send_message(msg.chat.id, "Something went wrong, try again.")
                .await?;
            Ok(())
        }
    }
}

async fn handle_broadcast(
    bot: Bot,
    msg: Message,
    state: AppState,
    tg_id: i64,
) -> Result<(), teloxide::RequestError> {
    if !state.is_admin(tg_id) {
        return Ok(());
    }
    state.sessions.clear(tg_id).await;

    let Some(media) = OutboundMedia::from_message(&msg) else {
        bot.send_message(msg.chat.id, "Unsupported message type for broadcast.")
            .await?;
        return Ok(());
    };

    let ids = match state.users.all_ids().await {
        Ok(ids) => ids,
        Err(e) => {
            warn!("Broadcast aborted, user list failed: {:#}", e);
            return Ok(());
        }
    };

    let mut sent = 0usize;
    let total = ids.len();
    for id in ids {
        match media.send_to(&bot, ChatId(id)).await {
            Ok(_) => sent += 1,
            Err(e) => warn!("Broadcast to {} failed: {}", id, e),
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    info!("Broadcast delivered to {}/{} users", sent, total);
    bot.send_message(
        msg.chat.id,
        format!("📣 Broadcast delivered to {}/{} users.", sent, total),
    )
    .await?;
    Ok(())
}

/// Out-of-band fulfilment: the admin's message is copied to the buyer
/// verbatim, then the order flips to approved and the discount slot is
/// taken. Delivery failure leaves the order pending for another attempt.
async fn handle_manual_delivery(
    bot: Bot,
    msg: Message,
    state: AppState,
    tg_id: i64,
    order_id: i64,
) -> Result<(), teloxide::RequestError> {
    if !state.is_admin(tg_id) {
        return Ok(());
    }
    state.sessions.clear(tg_id).await;

    let order = match state.orders.get(order_id).await {
        Ok(Some(order)) => order,
        _ => {
            bot.send_message(msg.chat.id, format!("❌ Order #{} not found.", order_id))
                .await?;
            return Ok(());
        }
    };

    if let Err(e) = bot.copy_message(ChatId(order.user_id), msg.chat.id, msg.id).await {
        bot.send_message(
            msg.chat.id,
            format!(
                "❌ Delivery to user {} failed: {}\nThe order is still pending.",
                order.user_id, e
            ),
        )
        .await?;
        return Ok(());
    }

    match state.provision.approve_manual(order_id).await {
        Ok(true) => {
            info!("Order {} fulfilled manually by admin", order_id);
            bot.send_message(
                msg.chat.id,
                format!("✅ Message delivered and order #{} approved.", order_id),
            )
            .await?;
        }
        Ok(false) => {
            bot.send_message(
                msg.chat.id,
                format!("⚠️ Message delivered, but order #{} was already reviewed.", order_id),
            )
            .await?;
        }
        Err(e) => {
            warn!("Manual approval failed for order {}: {:#}", order_id, e);
            bot.send_message(msg.chat.id, format!("❌ {:#}", e)).await?;
        }
    }
    Ok(())
}

/// Slash-command CRUD for the admin. Pipe-separated arguments keep this a
/// single round trip instead of a multi-step wizard.
async fn handle_admin_command(
    bot: Bot,
    chat: ChatId,
    state: AppState,
    cmd: &str,
    rest: &str,
) -> Result<(), teloxide::RequestError> {
    let parts: Vec<&str> = rest.split('|').map(str::trim).collect();

    let reply = match cmd {
        "/addplan" => match parts.as_slice() {
            [name, desc, price, days, gb] => {
                match (price.parse(), days.parse(), gb.parse()) {
                    (Ok(price), Ok(days), Ok(gb)) => {
                        match state.plans.create(name, desc, price, days, gb).await {
                            Ok(id) => format!("✅ Plan #{} created.", id),
                            Err(e) => format!("❌ {:#}", e),
                        }
                    }
                    _ => "Usage: /addplan name | description | price | days | gb".into(),
                }
            }
            _ => "Usage: /addplan name | description | price | days | gb".into(),
        },
        "/plans" => match state.plans.list_active().await {
            Ok(plans) if plans.is_empty() => "No active plans.".into(),
            Ok(plans) => plans
                .iter()
                .map(|p| {
                    format!(
                        "#{} {} — {} toman, {}d, {}GB",
                        p.id,
                        p.name,
                        format_price(p.price),
                        p.duration_days,
                        p.traffic_gb
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => format!("❌ {:#}", e),
        },
        "/editplan" => match parse_plan_edit(&parts) {
            Some((id, PlanEdit::Price(price))) => match state.plans.update_price(id, price).await {
                Ok(_) => format!("✅ Plan #{} price updated.", id),
                Err(e) => format!("❌ {:#}", e),
            },
            Some((id, PlanEdit::Name(name))) => match state.plans.update_name(id, &name).await {
                Ok(_) => format!("✅ Plan #{} renamed.", id),
                Err(e) => format!("❌ {:#}", e),
            },
            None => "Usage: /editplan id | price | 120000  or  /editplan id | name | New name".into(),
        },
        "/delplan" => match rest.parse::<i64>() {
            Ok(id) => match state.plans.deactivate(id).await {
                Ok(_) => format!("✅ Plan #{} deactivated.", id),
                Err(e) => format!("❌ {:#}", e),
            },
            Err(_) => "Usage: /delplan <id>".into(),
        },
        "/addcode" => {
            // /addcode CODE | percent | usage_limit | [YYYY-MM-DD]
            match parts.as_slice() {
                [code, pct, limit] | [code, pct, limit, _] => {
                    let expiry = parts.get(3).and_then(|d| {
                        NaiveDate::parse_from_str(d, "%Y-%m-%d").ok().map(|date| {
                            Utc.from_utc_datetime(&date.and_hms_opt(23, 59, 59).unwrap())
                        })
                    });
                    match (pct.parse::<i32>(), limit.parse::<i32>()) {
                        _ if !is_valid_code(code) => {
                            "Codes must contain letters and digits only.".into()
                        }
                        (Ok(p), Ok(l)) if (1..=100).contains(&p) && l >= 0 => {
                            match state.discounts.create(code, p, l, expiry).await {
                                Ok(id) => format!("✅ Discount code #{} created.", id),
                                Err(e) => format!("❌ {:#}", e),
                            }
                        }
                        _ => "Percent must be 1-100 and limit >= 0 (0 = unlimited).".into(),
                    }
                }
                _ => "Usage: /addcode CODE | percent | usage_limit | [YYYY-MM-DD]".into(),
            }
        }
        "/codes" => match state.discounts.list().await {
            Ok(codes) if codes.is_empty() => "No discount codes.".into(),
            Ok(codes) => codes
                .iter()
                .map(|c| {
                    let limit = if c.usage_limit == 0 {
                        "∞".to_string()
                    } else {
                        c.usage_limit.to_string()
                    };
                    let expiry = c
                        .expiry_date
                        .map(|d| d.format("%Y-%m-%d").to_string())
                        .unwrap_or_else(|| "never".into());
                    format!(
                        "#{} {} — {}%, used {}/{}, expires {}",
                        c.id, c.code, c.percentage, c.times_used, limit, expiry
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => format!("❌ {:#}", e),
        },
        "/delcode" => match rest.parse::<i64>() {
            Ok(id) => match state.discounts.delete(id).await {
                Ok(_) => format!("✅ Discount code #{} deleted.", id),
                Err(e) => format!("❌ {:#}", e),
            },
            Err(_) => "Usage: /delcode <id>".into(),
        },
        "/addcard" => match parts.as_slice() {
            [number, holder] => match state.cards.create(number, holder).await {
                Ok(id) => format!("✅ Card #{} added.", id),
                Err(e) => format!("❌ {:#}", e),
            },
            _ => "Usage: /addcard number | holder name".into(),
        },
        "/cards" => match state.cards.list().await {
            Ok(cards) if cards.is_empty() => "No cards configured.".into(),
            Ok(cards) => cards
                .iter()
                .map(|c| format!("#{} {} ({})", c.id, c.card_number, c.holder_name))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => format!("❌ {:#}", e),
        },
        "/delcard" => match rest.parse::<i64>() {
            Ok(id) => match state.cards.delete(id).await {
                Ok(_) => format!("✅ Card #{} removed.", id),
                Err(e) => format!("❌ {:#}", e),
            },
            Err(_) => "Usage: /delcard <id>".into(),
        },
        "/addpanel" => match parts.as_slice() {
            [name, url, username, password] => {
                match state.panels.create(name, url, username, password).await {
                    Ok(id) => format!(
                        "✅ Panel #{} added. Configure its inbounds with /addinbound.",
                        id
                    ),
                    Err(e) => format!("❌ {:#}", e),
                }
            }
            _ => "Usage: /addpanel name | url | username | password".into(),
        },
        "/panels" => match state.panels.list_active().await {
            Ok(panels) if panels.is_empty() => "No panels configured.".into(),
            Ok(panels) => {
                let mut lines = Vec::new();
                for p in &panels {
                    let inbounds = state
                        .panels
                        .active_inbounds(p.id)
                        .await
                        .map(|list| {
                            list.iter()
                                .map(|i| format!("{}/{}", i.protocol, i.tag))
                                .collect::<Vec<_>>()
                                .join(", ")
                        })
                        .unwrap_or_else(|_| "?".into());
                    lines.push(format!("#{} {} — {} [{}]", p.id, p.name, p.url, inbounds));
                }
                lines.join("\n")
            }
            Err(e) => format!("❌ {:#}", e),
        },
        "/delpanel" => match rest.parse::<i64>() {
            Ok(id) => match state.panels.delete(id).await {
                Ok(_) => format!("✅ Panel #{} removed.", id),
                Err(e) => format!("❌ {:#}", e),
            },
            Err(_) => "Usage: /delpanel <id>".into(),
        },
        "/addinbound" => match parts.as_slice() {
            [panel_id, protocol, tag] => match panel_id.parse::<i64>() {
                Ok(pid) => match state.panels.add_inbound(pid, protocol, tag).await {
                    Ok(_) => format!("✅ Inbound {}/{} added to panel #{}.", protocol, tag, pid),
                    Err(e) => format!("❌ {:#}", e),
                },
                Err(_) => "Usage: /addinbound panel_id | protocol | tag".into(),
            },
            _ => "Usage: /addinbound panel_id | protocol | tag".into(),
        },
        "/delinbound" => match rest.parse::<i64>() {
            Ok(id) => match state.panels.delete_inbound(id).await {
                Ok(_) => format!("✅ Inbound #{} removed.", id),
                Err(e) => format!("❌ {:#}", e),
            },
            Err(_) => "Usage: /delinbound <id>".into(),
        },
        "/set" => match rest.split_once(char::is_whitespace) {
            Some((key, value)) => match state.settings.set(key, value.trim()).await {
                Ok(_) => format!("✅ Setting {} updated.", key),
                Err(e) => format!("❌ {:#}", e),
            },
            None => "Usage: /set <key> <value>".into(),
        },
        _ => return Ok(()),
    };

    bot.send_message(chat, reply).await?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum PlanEdit {
    Price(i64),
    Name(String),
}

fn parse_plan_edit(parts: &[&str]) -> Option<(i64, PlanEdit)> {
    let [id, field, value] = parts else {
        return None;
    };
    let id = id.parse().ok()?;
    match *field {
        "price" => Some((id, PlanEdit::Price(value.parse().ok()?))),
        "name" => (!value.is_empty()).then(|| (id, PlanEdit::Name(value.to_string()))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::session::PurchaseDraft;

    fn draft() -> PurchaseDraft {
        PurchaseDraft {
            plan_id: 1,
            original_price: 100_000,
            final_price: 100_000,
            discount_code: None,
            renewing_order_id: None,
        }
    }

    #[test]
    fn photo_during_broadcast_routes_to_broadcast() {
        let session = Session::AwaitBroadcast;
        assert_eq!(
            route_message(Some(&session), None, true),
            MessageRoute::Broadcast
        );
    }

    #[test]
    fn photo_during_screenshot_wait_routes_to_payment() {
        let session = Session::AwaitScreenshot(draft());
        assert_eq!(
            route_message(Some(&session), None, true),
            MessageRoute::PaymentProof
        );
    }

    #[test]
    fn bare_photo_routes_to_payment() {
        assert_eq!(route_message(None, None, true), MessageRoute::PaymentProof);
    }

    #[test]
    fn command_escapes_any_session() {
        let session = Session::AwaitBroadcast;
        assert_eq!(
            route_message(Some(&session), Some("/cancel"), false),
            MessageRoute::Command
        );
        let session = Session::AwaitManualDelivery { order_id: 3 };
        assert_eq!(
            route_message(Some(&session), Some("/cancel"), false),
            MessageRoute::Command
        );
    }

    #[test]
    fn manual_delivery_accepts_any_content() {
        let session = Session::AwaitManualDelivery { order_id: 3 };
        assert_eq!(
            route_message(Some(&session), Some("vless://config"), false),
            MessageRoute::ManualDelivery
        );
        assert_eq!(
            route_message(Some(&session), None, true),
            MessageRoute::ManualDelivery
        );
    }

    #[test]
    fn plain_text_falls_through_to_session() {
        let session = Session::AwaitDiscountCode(draft());
        assert_eq!(
            route_message(Some(&session), Some("OFF20"), false),
            MessageRoute::SessionText
        );
    }

    #[test]
    fn plan_edit_parsing() {
        assert_eq!(
            parse_plan_edit(&["3", "price", "120000"]),
            Some((3, PlanEdit::Price(120_000)))
        );
        assert_eq!(
            parse_plan_edit(&["3", "name", "Gold 30d"]),
            Some((3, PlanEdit::Name("Gold 30d".into())))
        );
        assert_eq!(parse_plan_edit(&["3", "traffic", "50"]), None);
        assert_eq!(parse_plan_edit(&["x", "price", "120000"]), None);
        assert_eq!(parse_plan_edit(&["3", "price"]), None);
        assert_eq!(parse_plan_edit(&["3", "name", ""]), None);
    }
}
