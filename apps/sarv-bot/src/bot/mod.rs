use teloxide::{dptree, prelude::*, types::Update};
use tracing::{error, info};

pub mod handlers;
pub mod keyboards;
pub mod session;
pub mod utils;

pub async fn run_bot(bot: Bot, state: crate::state::AppState) {
    info!("Starting bot dispatcher...");

    match bot.get_me().await {
        Ok(me) => {
            info!(
                "Bot connected as: @{}",
                me.username.clone().unwrap_or("unknown".into())
            );
        }
        Err(e) => {
            error!("CRITICAL: Bot failed to connect to Telegram: {}", e);
            return;
        }
    }

    let message_branch = Update::filter_message().endpoint(handlers::command::message_handler);
    let callback_branch =
        Update::filter_callback_query().endpoint(handlers::callback::callback_handler);

    Dispatcher::builder(
        bot,
        dptree::entry().branch(message_branch).branch(callback_branch),
    )
    .dependencies(dptree::deps![state])
    .default_handler(|upd: std::sync::Arc<Update>| async move {
        info!("Unhandled update: {:?}", upd);
    })
    .build()
    .dispatch()
    .await;
}
