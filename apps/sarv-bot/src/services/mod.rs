pub mod backup_service;
pub mod discount_service;
pub mod provision_service;
pub mod settings_service;
pub mod sweeper_service;
