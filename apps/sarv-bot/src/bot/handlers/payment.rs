use teloxide::prelude::*;
use teloxide::types::InputFile;
use tracing::{info, warn};

use crate::bot::keyboards;
use crate::bot::session::{PurchaseDraft, Session};
use crate::bot::utils::format_price;
use crate::state::AppState;

/// Cards + amount shown right before the user is asked for a screenshot.
pub async fn show_payment_info(
    bot: &Bot,
    chat: ChatId,
    state: &AppState,
    tg_id: i64,
    draft: PurchaseDraft,
) -> Result<(), teloxide::RequestError> {
    let cards = match state.cards.list().await {
        Ok(cards) => cards,
        Err(e) => {
            warn!("Card list failed: {:#}", e);
            Vec::new()
        }
    };

    if cards.is_empty() {
        state.sessions.clear(tg_id).await;
        bot.send_message(chat, "❌ No payment card is configured. Contact support.")
            .await?;
        return Ok(());
    }

    let header = state
        .settings
        .get_or_default(
            "payment_info_text",
            "Transfer the amount below to one of these cards, then send a screenshot of the receipt here.",
        )
        .await;

    let mut text = format!(
        "{}\n\n💰 Amount due: {} toman\n",
        header,
        format_price(draft.final_price)
    );
    for card in &cards {
        text.push_str(&format!("\n👤 {}\n💳 {}\n", card.holder_name, card.card_number));
    }
    text.push_str("\nSend the payment screenshot as a photo, or /cancel to abort.");

    state.sessions.set(tg_id, Session::AwaitScreenshot(draft)).await;
    bot.send_message(chat, text).await?;
    Ok(())
}

/// A photo is only meaningful while a draft awaits its payment proof. A new
/// purchase lands in the ledger as pending; a renewal goes straight to the
/// admin with everything the approval callback needs.
pub async fn handle_photo(
    bot: Bot,
    msg: Message,
    state: AppState,
) -> Result<(), teloxide::RequestError> {
    let Some(user) = msg.from.clone() else {
        return Ok(());
    };
    let tg_id = user.id.0 as i64;

    let Some(Session::AwaitScreenshot(draft)) = state.sessions.get(tg_id).await else {
        return Ok(());
    };
    let Some(file_id) = msg.photo().and_then(|p| p.last()).map(|p| p.file.id.to_string())
    else {
        return Ok(());
    };

    match draft.renewing_order_id {
        None => submit_purchase(&bot, &msg, &state, tg_id, &draft, &file_id).await?,
        Some(order_id) => submit_renewal(&bot, &msg, &state, tg_id, &draft, order_id, &file_id).await?,
    }

    state.sessions.clear(tg_id).await;
    Ok(())
}

async fn submit_purchase(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    tg_id: i64,
    draft: &PurchaseDraft,
    file_id: &str,
) -> Result<(), teloxide::RequestError> {
    let order_id = match state
        .orders
        .insert_pending(
            tg_id,
            draft.plan_id,
            file_id,
            draft.final_price,
            draft.discount_code.as_deref(),
        )
        .await
    {
        Ok(id) => id,
        Err(e) => {
            warn!("Pending order insert failed for {}: {:#}", tg_id, e);
            bot.send_message(msg.chat.id, "Something went wrong, please try again.")
                .await?;
            return Ok(());
        }
    };

    let plan_name = match state.plans.get(draft.plan_id).await {
        Ok(Some(p)) => p.name,
        _ => format!("plan #{}", draft.plan_id),
    };

    let mut caption = format!(
        "🔔 New purchase request (order #{})\n\n👤 {} ({})\n📋 Plan: {}\n💰 Paid: {} toman",
        order_id,
        msg.from.as_ref().map(|u| u.first_name.clone()).unwrap_or_default(),
        tg_id,
        plan_name,
        format_price(draft.final_price),
    );
    if let Some(code) = &draft.discount_code {
        caption.push_str(&format!("\n🎁 Discount code: {}", code));
    }

    let admin = ChatId(state.admin_id);
    if let Err(e) = bot
        .send_photo(admin, InputFile::file_id(file_id.to_string().into()))
        .caption(caption)
        .reply_markup(keyboards::order_review(order_id))
        .await
    {
        warn!("Failed to forward order #{} to admin: {}", order_id, e);
    }

    info!("Order #{} submitted by user {}", order_id, tg_id);
    bot.send_message(
        msg.chat.id,
        "✅ Your receipt was sent for review. You will get your config once it is approved.",
    )
    .await?;
    Ok(())
}

async fn submit_renewal(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    tg_id: i64,
    draft: &PurchaseDraft,
    order_id: i64,
    file_id: &str,
) -> Result<(), teloxide::RequestError> {
    let username = match state.orders.get(order_id).await {
        Ok(Some(order)) if order.user_id == tg_id => order
            .marzban_username
            .unwrap_or_else(|| "unknown".to_string()),
        _ => {
            bot.send_message(msg.chat.id, "❌ Could not find the service being renewed.")
                .await?;
            return Ok(());
        }
    };

    let plan_name = match state.plans.get(draft.plan_id).await {
        Ok(Some(p)) => p.name,
        _ => format!("plan #{}", draft.plan_id),
    };

    let mut caption = format!(
        "♻️ Renewal request for order #{}\n\n👤 {} ({})\n🔐 Account: {}\n📋 Plan: {}\n💰 Paid: {} toman",
        order_id,
        msg.from.as_ref().map(|u| u.first_name.clone()).unwrap_or_default(),
        tg_id,
        username,
        plan_name,
        format_price(draft.final_price),
    );
    if let Some(code) = &draft.discount_code {
        caption.push_str(&format!("\n🎁 Discount code: {}", code));
    }

    let admin = ChatId(state.admin_id);
    if let Err(e) = bot
        .send_photo(admin, InputFile::file_id(file_id.to_string().into()))
        .caption(caption)
        .reply_markup(keyboards::renewal_review(
            order_id,
            draft.plan_id,
            draft.discount_code.as_deref(),
        ))
        .await
    {
        warn!("Failed to forward renewal of #{} to admin: {}", order_id, e);
    }

    info!("Renewal for order #{} submitted by user {}", order_id, tg_id);
    bot.send_message(
        msg.chat.id,
        "✅ Your renewal receipt was sent for review. Please wait for confirmation.",
    )
    .await?;
    Ok(())
}
