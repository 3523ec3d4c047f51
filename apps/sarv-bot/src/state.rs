use sarv_db::repositories::{
    CardRepository, OrderRepository, PanelRepository, PlanRepository, UserRepository,
};
use crate::bot::session::Sessions;
use crate::services::discount_service::DiscountService;
use crate::services::provision_service::ProvisionService;
use crate::services::settings_service::SettingsService;
use crate::services::sweeper_service::SweeperService;

#[derive(Clone)]
pub struct AppState {
    pub admin_id: i64,
    pub settings: SettingsService,
    pub discounts: DiscountService,
    pub provision: ProvisionService,
    pub sweeper: SweeperService,
    pub sessions: Sessions,
    pub plans: PlanRepository,
    pub orders: OrderRepository,
    pub panels: PanelRepository,
    pub users: UserRepository,
    pub cards: CardRepository,
}

impl AppState {
    pub fn is_admin(&self, tg_id: i64) -> bool {
        tg_id == self.admin_id
    }
}
