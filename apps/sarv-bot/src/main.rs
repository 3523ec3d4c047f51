use std::env;

use dotenvy::dotenv;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod bot;
mod marzban;
mod services;
mod state;

use crate::bot::session::Sessions;
use crate::services::discount_service::DiscountService;
use crate::services::provision_service::ProvisionService;
use crate::services::settings_service::SettingsService;
use crate::services::sweeper_service::SweeperService;
use crate::state::AppState;
use sarv_db::repositories::{
    CardRepository, OrderRepository, PanelRepository, PlanRepository, UserRepository,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting Sarv bot...");

    let token = env::var("BOT_TOKEN").expect("BOT_TOKEN is not set");
    let admin_id: i64 = env::var("ADMIN_ID")
        .expect("ADMIN_ID is not set")
        .parse()
        .expect("ADMIN_ID must be a Telegram user id");
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL is not set");

    let pool = sarv_db::connect(&database_url).await?;

    let bot = Bot::new(token);
    let settings = SettingsService::new(pool.clone());
    let state = AppState {
        admin_id,
        settings: settings.clone(),
        discounts: DiscountService::new(pool.clone()),
        provision: ProvisionService::new(pool.clone(), settings.clone()),
        sweeper: SweeperService::new(pool.clone(), settings, bot.clone()),
        sessions: Sessions::default(),
        plans: PlanRepository::new(pool.clone()),
        orders: OrderRepository::new(pool.clone()),
        panels: PanelRepository::new(pool.clone()),
        users: UserRepository::new(pool.clone()),
        cards: CardRepository::new(pool),
    };

    let sweeper = state.sweeper.clone();
    tokio::spawn(async move { sweeper.start().await });

    bot::run_bot(bot, state).await;
    Ok(())
}
