pub mod api;
pub mod config;
pub mod configuration;
pub mod error;
pub mod event;
pub mod inventory;
pub mod manager;
pub mod node;
pub mod scheduler;
pub mod shutdown;
pub mod worker;
