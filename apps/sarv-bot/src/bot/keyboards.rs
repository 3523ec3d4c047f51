use sarv_db::models::order::Order;
use sarv_db::models::panel::Panel;
use sarv_db::models::plan::Plan;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::bot::utils::format_price;

pub fn main_menu(trial_enabled: bool) -> InlineKeyboardMarkup {
    let mut rows = vec![
        vec![InlineKeyboardButton::callback("🛒 Buy a service", "buy")],
        vec![InlineKeyboardButton::callback("🔑 My services", "services")],
    ];
    if trial_enabled {
        rows.push(vec![InlineKeyboardButton::callback(
            "🎁 Free trial config",
            "trial",
        )]);
    }
    InlineKeyboardMarkup::new(rows)
}

pub fn plan_list(plans: &[Plan]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = plans
        .iter()
        .map(|p| {
            vec![InlineKeyboardButton::callback(
                format!("{} — {} toman", p.name, format_price(p.price)),
                format!("plan:{}", p.id),
            )]
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback("🔙 Back", "menu")]);
    InlineKeyboardMarkup::new(rows)
}

pub fn plan_confirm(plan_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "💳 Pay full price",
            format!("pay:{}", plan_id),
        )],
        vec![InlineKeyboardButton::callback(
            "🎁 I have a discount code",
            format!("disc:{}", plan_id),
        )],
        vec![InlineKeyboardButton::callback("🔙 Back", "buy")],
    ])
}

pub fn service_list(orders: &[Order]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = orders
        .iter()
        .map(|o| {
            let name = o.marzban_username.as_deref().unwrap_or("service");
            vec![InlineKeyboardButton::callback(
                format!("🔐 {}", name),
                format!("svc:{}", o.id),
            )]
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback("🔙 Back", "menu")]);
    InlineKeyboardMarkup::new(rows)
}

pub fn service_detail(order_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "♻️ Renew this service",
            format!("renewplans:{}", order_id),
        )],
        vec![InlineKeyboardButton::callback("🔙 Back", "services")],
    ])
}

pub fn renewal_plan_list(order_id: i64, plans: &[Plan]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = plans
        .iter()
        .map(|p| {
            vec![InlineKeyboardButton::callback(
                format!("{} — {} toman", p.name, format_price(p.price)),
                format!("rplan:{}:{}", order_id, p.id),
            )]
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback(
        "🔙 Back",
        format!("svc:{}", order_id),
    )]);
    InlineKeyboardMarkup::new(rows)
}

pub fn renewal_confirm(order_id: i64, plan_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "💳 Pay full price",
            format!("rpay:{}:{}", order_id, plan_id),
        )],
        vec![InlineKeyboardButton::callback(
            "🎁 I have a discount code",
            format!("rdisc:{}:{}", order_id, plan_id),
        )],
        vec![InlineKeyboardButton::callback(
            "🔙 Cancel",
            format!("svc:{}", order_id),
        )],
    ])
}

/// Admin review buttons under a new purchase proof.
pub fn order_review(order_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "✅ Approve & provision",
            format!("approve:{}", order_id),
        )],
        vec![InlineKeyboardButton::callback(
            "📨 Fulfil manually",
            format!("manual:{}", order_id),
        )],
        vec![InlineKeyboardButton::callback(
            "❌ Reject",
            format!("reject:{}", order_id),
        )],
    ])
}

/// Panel choice shown after the admin hits approve.
pub fn panel_pick(order_id: i64, panels: &[Panel]) -> InlineKeyboardMarkup {
    let rows = panels
        .iter()
        .map(|p| {
            vec![InlineKeyboardButton::callback(
                format!("Create on: {}", p.name),
                format!("panelpick:{}:{}", order_id, p.id),
            )]
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

/// Renewal approval carries order, plan and the optional discount code so
/// the slot is only consumed after the panel update succeeds.
pub fn renewal_review(order_id: i64, plan_id: i64, discount_code: Option<&str>) -> InlineKeyboardMarkup {
    let data = match discount_code {
        Some(code) => format!("renewok:{}:{}:{}", order_id, plan_id, code),
        None => format!("renewok:{}:{}", order_id, plan_id),
    };
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "✅ Approve renewal",
        data,
    )]])
}

pub fn admin_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback("📊 Stats", "stats")],
        vec![InlineKeyboardButton::callback(
            "⏰ Run reminder sweep now",
            "sweep",
        )],
        vec![InlineKeyboardButton::callback("💾 Panel backup", "backup")],
        vec![InlineKeyboardButton::callback("📣 Broadcast", "broadcast")],
    ])
}

pub fn back_to_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback("🔙 Menu", "menu")]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    fn callback_data(markup: &InlineKeyboardMarkup) -> Vec<String> {
        markup
            .inline_keyboard
            .iter()
            .flatten()
            .filter_map(|b| match &b.kind {
                InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn order_review_offers_provision_manual_and_reject() {
        assert_eq!(
            callback_data(&order_review(7)),
            vec!["approve:7", "manual:7", "reject:7"]
        );
    }

    #[test]
    fn renewal_review_encodes_the_optional_code() {
        assert_eq!(
            callback_data(&renewal_review(5, 2, Some("OFF20"))),
            vec!["renewok:5:2:OFF20"]
        );
        assert_eq!(callback_data(&renewal_review(5, 2, None)), vec!["renewok:5:2"]);
    }

    #[test]
    fn admin_menu_includes_backup() {
        assert!(callback_data(&admin_menu()).contains(&"backup".to_string()));
    }
}
