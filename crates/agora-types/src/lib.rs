pub mod ai;
pub mod api;
pub mod events;
pub mod models;
