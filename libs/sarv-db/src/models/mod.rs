pub mod discount;
pub mod order;
pub mod panel;
pub mod plan;
pub mod store;
