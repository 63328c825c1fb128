// src/config/mod.rs
pub mod hub;

pub use hub::{load_hub_config_default, load_hub_config_from, HubConfig, ProviderConfig};
