pub mod discount_repo;
pub mod order_repo;
pub mod panel_repo;
pub mod plan_repo;
pub mod settings_repo;
pub mod user_repo;

pub use discount_repo::DiscountRepository;
pub use order_repo::{FreeTrialRepository, OrderRepository};
pub use panel_repo::PanelRepository;
pub use plan_repo::PlanRepository;
pub use settings_repo::{CardRepository, SettingsRepository};
pub use user_repo::UserRepository;
